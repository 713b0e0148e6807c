use chrono::NaiveDateTime;
use serde::Deserialize;

// ── Listing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Storage identity, assigned on first save.
    pub id: Option<i64>,
    pub external_id: String,
    pub make: String,
    pub model: String,
    pub year: String,          // opaque; the source does not guarantee digits
    pub engine_volume: String,
    pub mileage_km: i64,
    pub price: f64,
    pub is_new: bool,
    pub image_url: String,
    pub description_text: String,
    pub description_url: String,
    pub mark: f64,             // 0.0..=5.0, one decimal
    pub synced_at: NaiveDateTime,
}

impl Listing {
    /// An empty, freshly synced listing carrying only its external id.
    pub fn new(external_id: impl Into<String>, synced_at: NaiveDateTime) -> Self {
        Self {
            id: None,
            external_id: external_id.into(),
            make: String::new(),
            model: String::new(),
            year: String::new(),
            engine_volume: String::new(),
            mileage_km: 0,
            price: 0.0,
            is_new: true,
            image_url: String::new(),
            description_text: String::new(),
            description_url: String::new(),
            mark: 0.0,
            synced_at,
        }
    }
}

// ── Sync result ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub inserted: usize,
    pub parsed: usize,
    pub stopped_on_existing: bool,
}

// ── Raw scraped row ───────────────────────────────────────────────────────────

/// Cell text of one listing row, cleaned but not yet typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListingRow {
    pub external_id: Option<String>,
    pub image_url: String,
    pub description_text: String,
    pub description_url: String,
    pub model: String,
    pub year: String,
    pub volume: String,
    pub mileage: String,
    pub price: String,
}

// ── Bulk import record ────────────────────────────────────────────────────────

/// One record of a JSON import file. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingImport {
    pub external_id: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<YearValue>,
    pub engine_volume: Option<String>,
    pub mileage_km: Option<i64>,
    pub price: Option<f64>,
    pub is_new: Option<bool>,
    pub image_url: Option<String>,
    pub description_text: Option<String>,
    pub description_url: Option<String>,
}

/// Years arrive both as `2015` and `"2015"`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum YearValue {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for YearValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearValue::Number(n) => write!(f, "{}", n),
            YearValue::Text(s) => f.write_str(s.trim()),
        }
    }
}
