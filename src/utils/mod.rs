use std::time::Instant;
use tracing::info;

/// Logs how long a command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Group digits in threes with a space, the way the listings show them.
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let head = digits.len() % 3;

    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend((head..digits.len()).step_by(3).map(|i| &digits[i..i + 3]));

    let sign = if n < 0 { "-" } else { "" };
    format!("{}{}", sign, groups.join(" "))
}

/// "19 800" for whole prices, "19 800.50" otherwise.
pub fn fmt_price(price: f64) -> String {
    let cents = (price * 100.0).round() as i64;
    let (whole, frac) = (cents / 100, (cents % 100).abs());
    if frac == 0 {
        fmt_number(whole)
    } else {
        format!("{}.{:02}", fmt_number(whole), frac)
    }
}
