//! Text → typed value conversion for scraped listing rows.
//!
//! Nothing here fails: malformed input degrades to an empty string, `0`, or
//! `None` for rows that have to be dropped.

use crate::models::{Listing, RawListingRow};
use chrono::NaiveDateTime;

/// Prefix for ids recovered from the description text.
pub const TITLE_ID_PREFIX: &str = "title:";

// ── Text ──────────────────────────────────────────────────────────────────────

/// Non-breaking spaces become spaces, whitespace runs collapse, ends are trimmed.
pub fn clean_text(s: &str) -> String {
    s.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalise_make(s: &str) -> String {
    s.trim().to_uppercase()
}

fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

// ── URLs ──────────────────────────────────────────────────────────────────────

/// Resolve `href` against `origin`. Blank input gives `None`.
///
/// "https://a/b" → unchanged | "//cdn/x" → "https://cdn/x" |
/// "/msg/1" → origin + "/msg/1" | "msg/1" → origin + "/msg/1"
pub fn absolutize_url(href: &str, origin: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("//") {
        return Some(format!("https:{}", href));
    }
    if has_scheme(href) {
        return Some(href.to_string());
    }
    let origin = origin.trim_end_matches('/');
    if href.starts_with('/') {
        Some(format!("{}{}", origin, href))
    } else {
        Some(format!("{}/{}", origin, href))
    }
}

/// `scheme:` prefix per RFC 3986, whether or not the rest parses.
fn has_scheme(href: &str) -> bool {
    href.split_once(':').is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Row id attribute, then the link target, then the link text.
pub fn resolve_external_id(
    row_id: Option<&str>,
    href: Option<&str>,
    description_text: &str,
    origin: &str,
) -> Option<String> {
    if let Some(id) = row_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    if let Some(url) = href.and_then(|h| absolutize_url(h, origin)) {
        return Some(url);
    }
    let title = clean_text(description_text);
    if title.is_empty() {
        None
    } else {
        Some(format!("{}{}", TITLE_ID_PREFIX, title))
    }
}

// ── Column layout ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    pub model: String,
    pub year: String,
    pub volume: String,
    pub mileage: String,
    pub price: String,
}

/// Map the "other" cells (and the remainder cell) onto the five fields.
///
/// Five cells: model | year | volume | mileage | price.
/// Four cells: model | year | volume | price, mileage from the remainder cell.
/// Anything else: positional, missing fields left empty.
pub fn resolve_columns(others: &[String], remainder: &str) -> Columns {
    match others {
        [model, year, volume, mileage, price] => Columns {
            model: model.clone(),
            year: year.clone(),
            volume: volume.clone(),
            mileage: mileage.clone(),
            price: price.clone(),
        },
        [model, year, volume, price] => Columns {
            model: model.clone(),
            year: year.clone(),
            volume: volume.clone(),
            mileage: remainder.to_string(),
            price: price.clone(),
        },
        _ => {
            let cell = |i: usize| others.get(i).cloned().unwrap_or_default();
            Columns {
                model: cell(0),
                year: cell(1),
                volume: cell(2),
                mileage: cell(3),
                price: cell(4),
            }
        }
    }
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// "19 tūkst. km" → 19000 | "154000" → 154000 | "" / "abc" → 0
pub fn parse_mileage(s: &str) -> i64 {
    let expanded = s.replace(" tūkst.", "000").replace(" tūkst", "000");
    digits_only(&expanded)
        .parse::<i32>()
        .map(i64::from)
        .unwrap_or(0)
}

/// Locale-tolerant price parsing.
///
/// "19 800" → 19800 | "19,800.50" → 19800.5 | "19.800" → 19800 | "19.8" → 19.8
///
/// With both `,` and `.` present the rightmost one is the decimal point. A lone
/// separator is a thousands separator when it repeats or is followed by exactly
/// three digits, otherwise a decimal point.
pub fn parse_price(s: &str) -> f64 {
    let val: String = s
        .replace('\u{a0}', " ")
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(*c, ',' | '.' | ' '))
        .collect();
    let val = val.trim();
    if val.is_empty() {
        return 0.0;
    }

    if let (Some(comma), Some(dot)) = (val.rfind(','), val.rfind('.')) {
        let decimal = comma.max(dot);
        return join_decimal(&val[..decimal], &val[decimal + 1..]);
    }

    let val: String = val.chars().filter(|c| *c != ' ').collect();
    let separator = [',', '.']
        .into_iter()
        .find_map(|sep| val.rfind(sep).map(|last| (sep, last)));

    match separator {
        Some((sep, last)) => {
            let repeated = val.find(sep) != Some(last);
            let after = &val[last + 1..];
            let thousands = after.len() == 3 && after.chars().all(|c| c.is_ascii_digit());
            if repeated || thousands {
                parse_or_zero(&val.replace(sep, ""))
            } else {
                join_decimal(&val[..last], after)
            }
        }
        None => parse_or_zero(&digits_only(&val)),
    }
}

fn join_decimal(int_part: &str, frac_part: &str) -> f64 {
    let mut frac = digits_only(frac_part);
    if frac.is_empty() {
        frac.push('0');
    }
    parse_or_zero(&format!("{}.{}", digits_only(int_part), frac))
}

fn parse_or_zero(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

// ── Raw row → Listing ─────────────────────────────────────────────────────────

/// Type a scraped row. `None` when the row has no usable external id.
///
/// The mark is left at 0.0; scoring needs the store and happens in the pipeline.
pub fn row_to_listing(make: &str, raw: RawListingRow, now: NaiveDateTime) -> Option<Listing> {
    let external_id = raw.external_id.filter(|id| !id.trim().is_empty())?;

    Some(Listing {
        make: normalise_make(make),
        model: clean_text(&raw.model),
        year: clean_text(&raw.year),
        engine_volume: clean_text(&raw.volume),
        mileage_km: parse_mileage(&raw.mileage),
        price: parse_price(&raw.price),
        image_url: raw.image_url,
        description_text: clean_text(&raw.description_text),
        description_url: raw.description_url,
        ..Listing::new(external_id, now)
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
