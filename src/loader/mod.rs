//! Bulk import of listings from JSON exports.
//!
//! Accepts either an array of records or a single record. Records are keyed on
//! `external_id`: known ids are updated field by field, unknown ids are
//! inserted. Either way the mark is reset to 0.0; imported listings are
//! unscored until the next valuation.

use crate::models::{Listing, ListingImport};
use crate::scraper::cleaner::normalise_make;
use crate::storage::ListingStore;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Many(Vec<ListingImport>),
    One(Box<ListingImport>),
}

/// Read and decode a `.json` import file.
pub fn read_import_file(path: &Path) -> Result<Vec<ListingImport>> {
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    anyhow::ensure!(is_json, "{:?} is not a .json file", path);

    let text = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    anyhow::ensure!(!text.trim().is_empty(), "{:?} is empty", path);

    parse_import(&text).with_context(|| format!("decode {:?}", path))
}

pub fn parse_import(json: &str) -> Result<Vec<ListingImport>> {
    let payload: ImportPayload = serde_json::from_str(json)?;
    Ok(match payload {
        ImportPayload::Many(records) => records,
        ImportPayload::One(record) => vec![*record],
    })
}

/// Upsert every record with a non-blank `external_id`.
pub fn import_listings(records: &[ListingImport], store: &dyn ListingStore) -> Result<ImportResult> {
    let now = Utc::now().naive_utc();
    let mut result = ImportResult { received: records.len(), ..Default::default() };

    for record in records {
        let Some(external_id) = record
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            debug!("Import record without external_id skipped");
            continue;
        };

        match store.find_by_external_id(external_id)?.into_iter().next() {
            Some(mut existing) => {
                apply(&mut existing, record);
                existing.mark = 0.0;
                store.save(&existing)?;
                result.updated += 1;
            }
            None => {
                // Listing::new starts as is_new with mark 0.0; the record may override is_new
                let mut listing = Listing::new(external_id, now);
                apply(&mut listing, record);
                store.save(&listing)?;
                result.inserted += 1;
            }
        }
    }

    info!(
        "Imported {} record(s): {} inserted, {} updated",
        result.received, result.inserted, result.updated
    );
    Ok(result)
}

/// Copy every field present in `record` onto `listing`.
fn apply(listing: &mut Listing, record: &ListingImport) {
    if let Some(make) = &record.make {
        listing.make = normalise_make(make);
    }
    if let Some(model) = &record.model {
        listing.model = model.clone();
    }
    if let Some(year) = &record.year {
        listing.year = year.to_string();
    }
    if let Some(volume) = &record.engine_volume {
        listing.engine_volume = volume.clone();
    }
    if let Some(mileage_km) = record.mileage_km {
        listing.mileage_km = mileage_km;
    }
    if let Some(price) = record.price {
        listing.price = price;
    }
    if let Some(is_new) = record.is_new {
        listing.is_new = is_new;
    }
    if let Some(image_url) = &record.image_url {
        listing.image_url = image_url.clone();
    }
    if let Some(text) = &record.description_text {
        listing.description_text = text.clone();
    }
    if let Some(url) = &record.description_url {
        listing.description_url = url.clone();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Repository;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_parse_array_and_single_record() {
        let many = parse_import(r#"[{"external_id": "a"}, {"external_id": "b", "year": 2015}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].year.as_ref().map(|y| y.to_string()).as_deref(), Some("2015"));

        let one = parse_import(r#"{"external_id": "c", "year": "2011"}"#).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].year.as_ref().map(|y| y.to_string()).as_deref(), Some("2011"));

        assert!(parse_import("not json").is_err());
    }

    #[test]
    fn test_import_inserts_then_updates() {
        let store = repo();
        let records = parse_import(
            r#"[
                {"external_id": "tr_1", "make": "bmw", "model": "320", "year": 2015,
                 "mileage_km": 180000, "price": 9500.5, "is_new": false},
                {"external_id": "  "},
                {"make": "BMW"}
            ]"#,
        )
        .unwrap();

        let result = import_listings(&records, &store).unwrap();
        assert_eq!(result, ImportResult { received: 3, inserted: 1, updated: 0 });

        let stored = store.find_by_external_id("tr_1").unwrap().remove(0);
        assert_eq!(stored.make, "BMW");
        assert_eq!(stored.year, "2015");
        assert_eq!(stored.price, 9500.5);
        assert!(!stored.is_new);
        assert_eq!(stored.mark, 0.0);

        let update = parse_import(r#"{"external_id": "tr_1", "price": 8000, "is_new": true}"#).unwrap();
        let result = import_listings(&update, &store).unwrap();
        assert_eq!(result, ImportResult { received: 1, inserted: 0, updated: 1 });

        let stored = store.find_by_external_id("tr_1").unwrap().remove(0);
        assert_eq!(stored.price, 8000.0);
        assert!(stored.is_new);
        // untouched fields survive
        assert_eq!(stored.model, "320");
        assert_eq!(stored.mileage_km, 180_000);
    }

    #[test]
    fn test_import_resets_mark_and_defaults_to_new() {
        let store = repo();
        let mut scored = Listing::new("tr_9", Utc::now().naive_utc());
        scored.is_new = false;
        scored.mark = 4.2;
        store.save(&scored).unwrap();

        let records = parse_import(r#"[{"external_id": "tr_9", "model": "X5"}, {"external_id": "tr_10"}]"#).unwrap();
        let result = import_listings(&records, &store).unwrap();
        assert_eq!(result, ImportResult { received: 2, inserted: 1, updated: 1 });

        let updated = store.find_by_external_id("tr_9").unwrap().remove(0);
        assert_eq!(updated.mark, 0.0);
        assert_eq!(updated.model, "X5");
        // is_new absent from the record: existing flag kept
        assert!(!updated.is_new);

        let inserted = store.find_by_external_id("tr_10").unwrap().remove(0);
        assert!(inserted.is_new);
        assert_eq!(inserted.mark, 0.0);
    }

    #[test]
    fn test_read_import_file_checks_extension_and_content() {
        let dir = std::env::temp_dir().join(format!("classifieds-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let txt = dir.join("listings.txt");
        std::fs::write(&txt, "[]").unwrap();
        assert!(read_import_file(&txt).is_err());

        let empty = dir.join("empty.json");
        std::fs::write(&empty, "  ").unwrap();
        assert!(read_import_file(&empty).is_err());

        let good = dir.join("listings.JSON");
        std::fs::write(&good, r#"[{"external_id": "x"}]"#).unwrap();
        assert_eq!(read_import_file(&good).unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
