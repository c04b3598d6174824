use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::normalize::NormalizedRecord;

/// Columns written from a NormalizedRecord, in bind order. The first two form the key.
const LOT_COLUMNS: &[&str] = &[
    "source",
    "external_id",
    "category",
    "subcategory",
    "title",
    "normalized_title",
    "description",
    "description_preview",
    "value",
    "value_text",
    "auction_round",
    "discount_percentage",
    "first_round_value",
    "first_round_date",
    "city",
    "state",
    "address",
    "auction_date",
    "days_remaining",
    "auction_type",
    "auction_name",
    "store_name",
    "lot_number",
    "total_visits",
    "total_bids",
    "total_bidders",
    "link",
    "vehicle_type",
    "property_type",
    "animal_type",
    "appliance_type",
    "tech_type",
    "parts_type",
    "specialized_type",
    "construction_material_type",
    "consumption_goods_type",
    "metadata",
];

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lots (
            source                     TEXT NOT NULL,
            external_id                TEXT NOT NULL,
            category                   TEXT NOT NULL,
            subcategory                TEXT,
            title                      TEXT NOT NULL,
            normalized_title           TEXT NOT NULL,
            description                TEXT,
            description_preview        TEXT NOT NULL,
            value                      REAL CHECK(value IS NULL OR value >= 0),
            value_text                 TEXT,
            auction_round              INTEGER,
            discount_percentage        REAL,
            first_round_value          REAL,
            first_round_date           TEXT,
            city                       TEXT,
            state                      TEXT CHECK(state IS NULL OR length(state) = 2),
            address                    TEXT,
            auction_date               TEXT,
            days_remaining             INTEGER CHECK(days_remaining IS NULL OR days_remaining >= 0),
            auction_type               TEXT,
            auction_name               TEXT,
            store_name                 TEXT,
            lot_number                 TEXT,
            total_visits               INTEGER NOT NULL DEFAULT 0,
            total_bids                 INTEGER NOT NULL DEFAULT 0,
            total_bidders              INTEGER NOT NULL DEFAULT 0,
            link                       TEXT,
            vehicle_type               TEXT,
            property_type              TEXT,
            animal_type                TEXT,
            appliance_type             TEXT,
            tech_type                  TEXT,
            parts_type                 TEXT,
            specialized_type           TEXT,
            construction_material_type TEXT,
            consumption_goods_type     TEXT,
            metadata                   TEXT NOT NULL DEFAULT '{}',
            created_at                 TEXT NOT NULL,
            updated_at                 TEXT NOT NULL,
            last_scraped_at            TEXT NOT NULL,
            PRIMARY KEY (source, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_lots_category ON lots(category);
        CREATE INDEX IF NOT EXISTS idx_lots_state ON lots(state);
        CREATE INDEX IF NOT EXISTS idx_lots_auction_date ON lots(auction_date);

        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            source      TEXT NOT NULL,
            input       TEXT NOT NULL,
            total       INTEGER NOT NULL,
            upserted    INTEGER NOT NULL,
            skipped     INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            started_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Upsert ──

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertStats {
    pub upserted: usize,
    /// Records without an external id cannot be keyed.
    pub skipped: usize,
}

impl UpsertStats {
    pub fn add(&mut self, other: UpsertStats) {
        self.upserted += other.upserted;
        self.skipped += other.skipped;
    }
}

fn upsert_sql() -> String {
    let columns = LOT_COLUMNS.join(", ");
    let placeholders = (1..=LOT_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let now = LOT_COLUMNS.len() + 1;
    let updates = LOT_COLUMNS[2..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO lots ({columns}, created_at, updated_at, last_scraped_at)
         VALUES ({placeholders}, ?{now}, ?{now}, ?{now})
         ON CONFLICT(source, external_id) DO UPDATE SET {updates},
             updated_at = excluded.updated_at,
             last_scraped_at = excluded.last_scraped_at"
    )
}

/// Insert-or-update one batch in a single transaction, keyed by (source, external_id).
/// `created_at` survives updates; running the same batch twice changes nothing else.
pub fn upsert_lots(conn: &Connection, records: &[NormalizedRecord]) -> Result<UpsertStats> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut stats = UpsertStats::default();

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&upsert_sql())?;
        for r in records {
            let external_id = match r.external_id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => {
                    warn!(title = %r.title, "lot without external_id, not stored");
                    stats.skipped += 1;
                    continue;
                }
            };
            let metadata = serde_json::to_string(&r.metadata)?;
            stmt.execute(rusqlite::params![
                r.source,
                external_id,
                r.category.label(),
                r.subcategory,
                r.title,
                r.normalized_title,
                r.description,
                r.description_preview,
                r.value,
                r.value_text,
                r.auction_round,
                r.discount_percentage,
                r.first_round_value,
                r.first_round_date,
                r.city,
                r.state,
                r.address,
                r.auction_date,
                r.days_remaining,
                r.auction_type,
                r.auction_name,
                r.store_name,
                r.lot_number,
                r.total_visits,
                r.total_bids,
                r.total_bidders,
                r.link,
                r.vehicle_type,
                r.property_type,
                r.animal_type,
                r.appliance_type,
                r.tech_type,
                r.parts_type,
                r.specialized_type,
                r.construction_material_type,
                r.consumption_goods_type,
                metadata,
                now,
            ])?;
            stats.upserted += 1;
        }
    }
    tx.commit()?;
    debug!(upserted = stats.upserted, skipped = stats.skipped, "batch committed");
    Ok(stats)
}

// ── Runs ──

pub struct RunRow {
    pub source: String,
    pub input: String,
    pub total: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub duration_ms: i64,
    pub started_at: String,
}

pub fn record_run(conn: &Connection, run: &RunRow) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (source, input, total, upserted, skipped, duration_ms, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            run.source,
            run.input,
            run.total as i64,
            run.upserted as i64,
            run.skipped as i64,
            run.duration_ms,
            run.started_at,
        ],
    )?;
    Ok(())
}

pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT source, input, total, upserted, skipped, duration_ms, started_at
         FROM runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                source: row.get(0)?,
                input: row.get(1)?,
                total: row.get::<_, i64>(2)? as usize,
                upserted: row.get::<_, i64>(3)? as usize,
                skipped: row.get::<_, i64>(4)? as usize,
                duration_ms: row.get(5)?,
                started_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Overview ──

pub struct OverviewRow {
    pub source: String,
    pub external_id: String,
    pub category: String,
    pub title: String,
    pub city: String,
    pub state: String,
    pub value: Option<f64>,
    pub auction_date: String,
}

pub fn fetch_overview(
    conn: &Connection,
    category: Option<&str>,
    state: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(c) = category {
        conditions.push(format!("category = ?{}", params.len() + 1));
        params.push(Box::new(c.to_string()));
    }
    if let Some(s) = state {
        conditions.push(format!("state = ?{}", params.len() + 1));
        params.push(Box::new(s.to_uppercase()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT source, external_id, category, title, COALESCE(city,''), COALESCE(state,''),
                value, COALESCE(auction_date,'')
         FROM lots{}
         ORDER BY auction_date IS NULL, auction_date, source, external_id
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                source: row.get(0)?,
                external_id: row.get(1)?,
                category: row.get(2)?,
                title: row.get(3)?,
                city: row.get(4)?,
                state: row.get(5)?,
                value: row.get(6)?,
                auction_date: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// (category label, lots) for one source or all of them, largest first.
pub fn category_counts(conn: &Connection, source: Option<&str>) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM lots
         WHERE ?1 IS NULL OR source = ?1
         GROUP BY category
         ORDER BY COUNT(*) DESC, category",
    )?;
    let rows = stmt
        .query_map([source], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub sources: usize,
    pub with_value: usize,
    pub with_description: usize,
    pub with_state: usize,
    pub runs: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
        Ok(n as usize)
    };
    Ok(Stats {
        total: count("SELECT COUNT(*) FROM lots")?,
        sources: count("SELECT COUNT(DISTINCT source) FROM lots")?,
        with_value: count("SELECT COUNT(*) FROM lots WHERE value IS NOT NULL")?,
        with_description: count("SELECT COUNT(*) FROM lots WHERE description IS NOT NULL")?,
        with_state: count("SELECT COUNT(*) FROM lots WHERE state IS NOT NULL")?,
        runs: count("SELECT COUNT(*) FROM runs")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_batch;
    use crate::profiles::{self, SODRE};
    use crate::raw::RawRecord;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sodre_records() -> Vec<NormalizedRecord> {
        let text = std::fs::read_to_string("tests/fixtures/sodre_lots.json").unwrap();
        let raws = crate::input::parse_records(&text).unwrap();
        normalize_batch(&raws, profiles::builtin().get(SODRE).unwrap())
    }

    #[test]
    fn upsert_is_idempotent() {
        let conn = memory_db();
        let records = sodre_records();

        let first = upsert_lots(&conn, &records).unwrap();
        assert_eq!(first.upserted, records.len());
        assert_eq!(first.skipped, 0);

        let created: String = conn
            .query_row("SELECT created_at FROM lots WHERE external_id = '2714738'", [], |r| r.get(0))
            .unwrap();

        let second = upsert_lots(&conn, &records).unwrap();
        assert_eq!(second, first);
        assert_eq!(get_stats(&conn).unwrap().total, records.len());

        let created_again: String = conn
            .query_row("SELECT created_at FROM lots WHERE external_id = '2714738'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(created, created_again);
    }

    #[test]
    fn update_overwrites_fields() {
        let conn = memory_db();
        let mut records = sodre_records();
        upsert_lots(&conn, &records).unwrap();

        records[1].value = Some(47000.0);
        records[1].metadata.insert("condition".into(), json!("sinistro"));
        upsert_lots(&conn, &records[1..2]).unwrap();

        let (value, metadata): (f64, String) = conn
            .query_row(
                "SELECT value, metadata FROM lots WHERE source = 'sodre' AND external_id = '2714738'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(value, 47000.0);
        let metadata: serde_json::Value = serde_json::from_str(&metadata).unwrap();
        assert_eq!(metadata["condition"], "sinistro");
        assert_eq!(metadata["brand"], "VOLKSWAGEN");
    }

    #[test]
    fn records_without_id_are_skipped() {
        let conn = memory_db();
        let raws = vec![
            RawRecord::from_value(json!({ "title": "sem id" })).unwrap(),
            RawRecord::from_value(json!({ "external_id": "", "title": "id vazio" })).unwrap(),
            RawRecord::from_value(json!({ "external_id": "x1", "title": "ok" })).unwrap(),
        ];
        let records = normalize_batch(&raws, profiles::builtin().generic());
        let stats = upsert_lots(&conn, &records).unwrap();
        assert_eq!(stats, UpsertStats { upserted: 1, skipped: 2 });
    }

    #[test]
    fn same_id_different_source_are_distinct() {
        let conn = memory_db();
        let raws = vec![
            RawRecord::from_value(json!({ "source": "sodre", "external_id": "1" })).unwrap(),
            RawRecord::from_value(json!({ "source": "superbid", "external_id": "1" })).unwrap(),
        ];
        let records = normalize_batch(&raws, profiles::builtin().generic());
        upsert_lots(&conn, &records).unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.sources, 2);
    }

    #[test]
    fn counts_and_overview() {
        let conn = memory_db();
        upsert_lots(&conn, &sodre_records()).unwrap();

        let counts = category_counts(&conn, Some("sodre")).unwrap();
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<usize>(), 4);
        assert!(counts.contains(&("Veículos".to_string(), 1)));
        assert!(category_counts(&conn, Some("outro")).unwrap().is_empty());
        assert_eq!(category_counts(&conn, None).unwrap().len(), counts.len());

        let rows = fetch_overview(&conn, None, Some("sp"), 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_id, "2714738");
        assert_eq!(rows[0].city, "Guarulhos");

        let rows = fetch_overview(&conn, Some("Imóveis"), None, 10).unwrap();
        assert_eq!(rows.len(), 1);

        let rows = fetch_overview(&conn, None, None, 2).unwrap();
        assert_eq!(rows.len(), 2);
        // dated lots first
        assert_eq!(rows[0].auction_date, "2026-01-12 09:30:00");
    }

    #[test]
    fn runs_are_logged() {
        let conn = memory_db();
        record_run(
            &conn,
            &RunRow {
                source: "sodre".into(),
                input: "capture.json".into(),
                total: 4,
                upserted: 4,
                skipped: 0,
                duration_ms: 12,
                started_at: "2026-01-12T09:30:00+00:00".into(),
            },
        )
        .unwrap();
        let runs = fetch_runs(&conn, 5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].total, 4);
        assert_eq!(get_stats(&conn).unwrap().runs, 1);
    }

    #[test]
    fn column_list_matches_bind_count() {
        let sql = upsert_sql();
        assert!(sql.contains(&format!("?{}", LOT_COLUMNS.len() + 1)));
        assert!(!sql.contains("source = excluded.source"));
    }
}
