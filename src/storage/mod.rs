use crate::models::{Listing, SyncResult};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection, Row};
use std::path::Path;
use tracing::info;

// ── Store seam ────────────────────────────────────────────────────────────────

/// What the sync engine needs from persistence.
pub trait ListingStore {
    fn find_by_external_id(&self, external_id: &str) -> Result<Vec<Listing>>;
    fn find_by_make_model_year(&self, make: &str, model: &str, year: &str) -> Result<Vec<Listing>>;
    /// Insert when `id` is unset, update otherwise. Returns the stored listing.
    fn save(&self, listing: &Listing) -> Result<Listing>;
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS listings_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS sync_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS listings (
    id                BIGINT   PRIMARY KEY DEFAULT nextval('listings_id_seq'),
    external_id       VARCHAR  NOT NULL UNIQUE,
    make              VARCHAR  NOT NULL,
    model             VARCHAR  NOT NULL DEFAULT '',
    -- opaque text, the source does not guarantee a number
    year              VARCHAR  NOT NULL DEFAULT '',
    engine_volume     VARCHAR  NOT NULL DEFAULT '',
    mileage_km        BIGINT   NOT NULL DEFAULT 0,
    price             DOUBLE   NOT NULL DEFAULT 0,
    is_new            BOOLEAN  NOT NULL DEFAULT TRUE,
    image_url         VARCHAR  NOT NULL DEFAULT '',
    description_text  VARCHAR  NOT NULL DEFAULT '',
    description_url   VARCHAR  NOT NULL DEFAULT '',
    mark              DOUBLE   NOT NULL DEFAULT 0,
    synced_at         TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('sync_runs_id_seq'),
    make                VARCHAR NOT NULL,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    inserted            BIGINT DEFAULT 0,
    parsed              BIGINT DEFAULT 0,
    stopped_on_existing BOOLEAN,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const LISTING_COLUMNS: &str = "id, external_id, make, model, year, engine_volume, mileage_km, \
     price, is_new, image_url, description_text, description_url, mark, synced_at";

fn listing_from_row(r: &Row<'_>) -> duckdb::Result<Listing> {
    Ok(Listing {
        id: r.get(0)?,
        external_id: r.get(1)?,
        make: r.get(2)?,
        model: r.get(3)?,
        year: r.get(4)?,
        engine_volume: r.get(5)?,
        mileage_km: r.get(6)?,
        price: r.get(7)?,
        is_new: r.get(8)?,
        image_url: r.get(9)?,
        description_text: r.get(10)?,
        description_url: r.get(11)?,
        mark: r.get(12)?,
        synced_at: r.get(13)?,
    })
}

/// One row of the sync audit log.
#[derive(Debug, Clone)]
pub struct SyncRunRecord {
    pub id: i64,
    pub make: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub inserted: i64,
    pub parsed: i64,
    pub stopped_on_existing: Option<bool>,
    pub error_msg: Option<String>,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    fn query_listings(&self, sql: &str, args: &[&dyn duckdb::ToSql]) -> Result<Vec<Listing>> {
        let mut stmt = self.conn.prepare(sql)?;
        let listings = stmt
            .query_map(args, listing_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(listings)
    }

    /// Listings of one make, most recently synced first.
    pub fn list_by_make(&self, make: &str, limit: usize) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE make = ? ORDER BY synced_at DESC, id DESC LIMIT ?",
            LISTING_COLUMNS
        );
        self.query_listings(&sql, params![make, limit as i64])
            .with_context(|| format!("list listings for {}", make))
    }

    pub fn listing_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn make_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(DISTINCT make) FROM listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    fn insert_listing(&self, l: &Listing) -> Result<i64> {
        let id = self
            .conn
            .query_row(
                r#"INSERT INTO listings
                       (external_id, make, model, year, engine_volume, mileage_km, price,
                        is_new, image_url, description_text, description_url, mark, synced_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   RETURNING id"#,
                params![
                    l.external_id, l.make, l.model, l.year, l.engine_volume,
                    l.mileage_km, l.price, l.is_new,
                    l.image_url, l.description_text, l.description_url,
                    l.mark, l.synced_at,
                ],
                |r| r.get(0),
            )
            .with_context(|| format!("insert listing {}", l.external_id))?;
        Ok(id)
    }

    fn update_listing(&self, id: i64, l: &Listing) -> Result<()> {
        let changed = self
            .conn
            .execute(
                r#"UPDATE listings SET
                       make = ?, model = ?, year = ?, engine_volume = ?,
                       mileage_km = ?, price = ?, is_new = ?,
                       image_url = ?, description_text = ?, description_url = ?,
                       mark = ?, synced_at = ?
                   WHERE id = ?"#,
                params![
                    l.make, l.model, l.year, l.engine_volume,
                    l.mileage_km, l.price, l.is_new,
                    l.image_url, l.description_text, l.description_url,
                    l.mark, l.synced_at, id,
                ],
            )
            .with_context(|| format!("update listing {} ({})", id, l.external_id))?;
        anyhow::ensure!(changed == 1, "listing {} does not exist", id);
        Ok(())
    }

    // ── Sync run log ──────────────────────────────────────────────────────────

    pub fn begin_sync_run(&self, make: &str) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO sync_runs (make, started_at, status) VALUES (?, ?, 'running') RETURNING id",
            params![make, Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_sync_run(
        &self, run_id: i64, result: Option<&SyncResult>, error: Option<&str>,
    ) -> Result<()> {
        let (inserted, parsed, stopped) = match result {
            Some(r) => (r.inserted as i64, r.parsed as i64, Some(r.stopped_on_existing)),
            None => (0, 0, None),
        };
        self.conn.execute(
            r#"UPDATE sync_runs SET
               finished_at = ?, status = ?,
               inserted = ?, parsed = ?, stopped_on_existing = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                inserted, parsed, stopped, error, run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_sync_run(&self) -> Result<Option<SyncRunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, make, started_at, finished_at, status,
                      inserted, parsed, stopped_on_existing, error_msg
               FROM sync_runs ORDER BY id DESC LIMIT 1"#,
        )?;
        let mut rows = stmt.query_map([], |r| {
            Ok(SyncRunRecord {
                id: r.get(0)?,
                make: r.get(1)?,
                started_at: r.get(2)?,
                finished_at: r.get(3)?,
                status: r.get(4)?,
                inserted: r.get(5)?,
                parsed: r.get(6)?,
                stopped_on_existing: r.get(7)?,
                error_msg: r.get(8)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}

impl ListingStore for Repository {
    fn find_by_external_id(&self, external_id: &str) -> Result<Vec<Listing>> {
        let sql = format!("SELECT {} FROM listings WHERE external_id = ?", LISTING_COLUMNS);
        self.query_listings(&sql, params![external_id])
            .with_context(|| format!("find listing {}", external_id))
    }

    fn find_by_make_model_year(&self, make: &str, model: &str, year: &str) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE make = ? AND model = ? AND year = ?",
            LISTING_COLUMNS
        );
        self.query_listings(&sql, params![make, model, year])
            .with_context(|| format!("find comparables for {} {} {}", make, model, year))
    }

    fn save(&self, listing: &Listing) -> Result<Listing> {
        let id = match listing.id {
            Some(id) => {
                self.update_listing(id, listing)?;
                id
            }
            None => self.insert_listing(listing)?,
        };
        Ok(Listing { id: Some(id), ..listing.clone() })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn listing(external_id: &str, model: &str, year: &str) -> Listing {
        Listing {
            make: "BMW".into(),
            model: model.into(),
            year: year.into(),
            price: 9_500.0,
            mileage_km: 180_000,
            mark: 3.1,
            ..Listing::new(external_id, Utc::now().naive_utc())
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.listing_count().unwrap(), 0);
    }

    #[test]
    fn test_save_assigns_identity_and_round_trips() {
        let repo = repo();
        let saved = repo.save(&listing("tr_1", "320", "2015")).unwrap();
        assert!(saved.id.is_some());

        let found = repo.find_by_external_id("tr_1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, saved.id);
        assert_eq!(found[0].mileage_km, 180_000);
        assert_eq!(found[0].mark, 3.1);
        assert!(found[0].is_new);

        assert!(repo.find_by_external_id("tr_2").unwrap().is_empty());
    }

    #[test]
    fn test_save_with_identity_updates_in_place() {
        let repo = repo();
        let mut saved = repo.save(&listing("tr_1", "320", "2015")).unwrap();
        saved.price = 8_000.0;
        saved.is_new = false;
        repo.save(&saved).unwrap();

        let found = repo.find_by_external_id("tr_1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].price, 8_000.0);
        assert!(!found[0].is_new);
        assert_eq!(repo.listing_count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_external_id_is_rejected() {
        let repo = repo();
        repo.save(&listing("tr_1", "320", "2015")).unwrap();
        assert!(repo.save(&listing("tr_1", "320", "2015")).is_err());
    }

    #[test]
    fn test_find_by_make_model_year() {
        let repo = repo();
        repo.save(&listing("a", "320", "2015")).unwrap();
        repo.save(&listing("b", "320", "2015")).unwrap();
        repo.save(&listing("c", "320", "2016")).unwrap();
        repo.save(&listing("d", "X5", "2015")).unwrap();

        let comps = repo.find_by_make_model_year("BMW", "320", "2015").unwrap();
        let mut ids: Vec<String> = comps.into_iter().map(|l| l.external_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(repo.find_by_make_model_year("AUDI", "320", "2015").unwrap().is_empty());
    }

    #[test]
    fn test_list_by_make_and_counts() {
        let repo = repo();
        repo.save(&listing("a", "320", "2015")).unwrap();
        repo.save(&listing("b", "X5", "2012")).unwrap();
        let mut audi = listing("c", "A4", "2014");
        audi.make = "AUDI".into();
        repo.save(&audi).unwrap();

        assert_eq!(repo.list_by_make("BMW", 10).unwrap().len(), 2);
        assert_eq!(repo.list_by_make("BMW", 1).unwrap().len(), 1);
        assert_eq!(repo.listing_count().unwrap(), 3);
        assert_eq!(repo.make_count().unwrap(), 2);
    }

    #[test]
    fn test_sync_run_log() {
        let repo = repo();
        assert!(repo.last_sync_run().unwrap().is_none());

        let run_id = repo.begin_sync_run("BMW").unwrap();
        let result = SyncResult { inserted: 3, parsed: 4, stopped_on_existing: true };
        repo.finish_sync_run(run_id, Some(&result), None).unwrap();

        let run = repo.last_sync_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, "success");
        assert_eq!(run.inserted, 3);
        assert_eq!(run.parsed, 4);
        assert_eq!(run.stopped_on_existing, Some(true));
        assert!(run.finished_at.is_some());

        let failed = repo.begin_sync_run("BMW").unwrap();
        repo.finish_sync_run(failed, None, Some("timed out")).unwrap();
        let run = repo.last_sync_run().unwrap().unwrap();
        assert_eq!(run.status, "error");
        assert_eq!(run.error_msg.as_deref(), Some("timed out"));
    }
}
