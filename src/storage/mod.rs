pub mod merge;
pub mod unit_of_work;

use crate::models::{
    Appeal, AppealDetail, AppealRecord, ExportedAppeal, Hearing, ParsedBatch, Property,
    PropertyExport, Representative,
};
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::{Connection, OptionalExt, Row, params};
use std::path::Path;
use tracing::info;

pub use self::unit_of_work::{StoreStats, UnitOfWork};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS appeal_details_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS representatives_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS hearings_id_seq START 1;

CREATE TABLE IF NOT EXISTS properties (
    roll_number     VARCHAR PRIMARY KEY,
    description     VARCHAR,
    municipality    VARCHAR,
    classification  VARCHAR,
    neighborhood    VARCHAR
);

-- appeal_number is global, not per property
CREATE TABLE IF NOT EXISTS appeals (
    appeal_number   VARCHAR PRIMARY KEY,
    roll_number     VARCHAR NOT NULL,
    appellant       VARCHAR,
    section         VARCHAR,
    tax_date        TIMESTAMP,
    status          VARCHAR,
    board_order_no  VARCHAR
);

CREATE TABLE IF NOT EXISTS appeal_details (
    id                      BIGINT PRIMARY KEY DEFAULT nextval('appeal_details_id_seq'),
    appeal_number           VARCHAR NOT NULL UNIQUE,
    filing_date             TIMESTAMP,
    reason_for_appeal       VARCHAR,
    decision_mailing_date   TIMESTAMP,
    decision_text           VARCHAR,
    decision_details        VARCHAR
);

CREATE TABLE IF NOT EXISTS representatives (
    id      BIGINT PRIMARY KEY DEFAULT nextval('representatives_id_seq'),
    name    VARCHAR NOT NULL,
    "type"  VARCHAR
);

CREATE TABLE IF NOT EXISTS appeal_representatives (
    appeal_number       VARCHAR NOT NULL,
    representative_id   BIGINT  NOT NULL,
    PRIMARY KEY (appeal_number, representative_id)
);

CREATE TABLE IF NOT EXISTS hearings (
    id              BIGINT PRIMARY KEY DEFAULT nextval('hearings_id_seq'),
    appeal_number   VARCHAR NOT NULL,
    hearing_number  VARCHAR,
    hearing_date    TIMESTAMP
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_appeals_roll     ON appeals (roll_number);
CREATE INDEX IF NOT EXISTS idx_appeals_status   ON appeals (status);
CREATE INDEX IF NOT EXISTS idx_hearings_appeal  ON hearings (appeal_number);
CREATE INDEX IF NOT EXISTS idx_reps_name        ON representatives (name);
"#;

// ── Row readers ───────────────────────────────────────────────────────────────

pub(crate) const PROPERTY_COLS: &str =
    "roll_number, description, municipality, classification, neighborhood";
pub(crate) const APPEAL_COLS: &str =
    "appeal_number, roll_number, appellant, section, tax_date, status, board_order_no";
pub(crate) const DETAIL_COLS: &str = "id, appeal_number, filing_date, reason_for_appeal, \
     decision_mailing_date, decision_text, decision_details";
pub(crate) const HEARING_COLS: &str = "id, appeal_number, hearing_number, hearing_date";

fn property_from_row(r: &Row<'_>) -> duckdb::Result<Property> {
    Ok(Property {
        roll_number: r.get(0)?,
        description: r.get(1)?,
        municipality: r.get(2)?,
        classification: r.get(3)?,
        neighborhood: r.get(4)?,
    })
}

fn appeal_from_row(r: &Row<'_>) -> duckdb::Result<Appeal> {
    Ok(Appeal {
        appeal_number: r.get(0)?,
        roll_number: r.get(1)?,
        appellant: r.get(2)?,
        section: r.get(3)?,
        tax_date: r.get(4)?,
        status: r.get(5)?,
        board_order_no: r.get(6)?,
    })
}

fn detail_from_row(r: &Row<'_>) -> duckdb::Result<AppealDetail> {
    Ok(AppealDetail {
        id: r.get(0)?,
        appeal_number: r.get(1)?,
        filing_date: r.get(2)?,
        reason_for_appeal: r.get(3)?,
        decision_mailing_date: r.get(4)?,
        decision_text: r.get(5)?,
        decision_details: r.get(6)?,
    })
}

fn hearing_from_row(r: &Row<'_>) -> duckdb::Result<Hearing> {
    Ok(Hearing {
        id: r.get(0)?,
        appeal_number: r.get(1)?,
        hearing_number: r.get(2)?,
        hearing_date: r.get(3)?,
    })
}

pub(crate) fn find_property(conn: &Connection, roll_number: &str) -> Result<Option<Property>> {
    let sql = format!("SELECT {PROPERTY_COLS} FROM properties WHERE roll_number = ?");
    Ok(conn.query_row(&sql, params![roll_number], property_from_row).optional()?)
}

pub(crate) fn find_appeal(conn: &Connection, appeal_number: &str) -> Result<Option<Appeal>> {
    let sql = format!("SELECT {APPEAL_COLS} FROM appeals WHERE appeal_number = ?");
    Ok(conn.query_row(&sql, params![appeal_number], appeal_from_row).optional()?)
}

pub(crate) fn find_detail(conn: &Connection, appeal_number: &str) -> Result<Option<AppealDetail>> {
    let sql = format!("SELECT {DETAIL_COLS} FROM appeal_details WHERE appeal_number = ?");
    Ok(conn.query_row(&sql, params![appeal_number], detail_from_row).optional()?)
}

pub(crate) fn find_hearing(
    conn: &Connection,
    appeal_number: &str,
    hearing_number: &str,
) -> Result<Option<Hearing>> {
    let sql = format!(
        "SELECT {HEARING_COLS} FROM hearings WHERE appeal_number = ? AND hearing_number = ? \
         ORDER BY id LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![appeal_number, hearing_number], hearing_from_row)
        .optional()?)
}

fn hearings_for(conn: &Connection, appeal_number: &str) -> Result<Vec<Hearing>> {
    let sql = format!("SELECT {HEARING_COLS} FROM hearings WHERE appeal_number = ? ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![appeal_number], hearing_from_row)?;
    Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
}

fn representatives_for(conn: &Connection, appeal_number: &str) -> Result<Vec<Representative>> {
    let mut stmt = conn.prepare(
        r#"SELECT r.id, r.name, r."type"
           FROM representatives r
           JOIN appeal_representatives ar ON ar.representative_id = r.id
           WHERE ar.appeal_number = ?
           ORDER BY r.id"#,
    )?;
    let rows = stmt.query_map(params![appeal_number], |r| {
        Ok(Representative { id: r.get(0)?, name: r.get(1)?, kind: r.get(2)? })
    })?;
    Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
}

/// Eager-load everything hanging off an appeal.
fn load_record(conn: &Connection, appeal: Appeal) -> Result<AppealRecord> {
    let number = appeal.appeal_number.clone();
    Ok(AppealRecord {
        detail: find_detail(conn, &number)?,
        representatives: representatives_for(conn, &number)?,
        hearings: hearings_for(conn, &number)?,
        appeal,
    })
}

// ── Repository ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub properties: i64,
    pub appeals: i64,
    pub appeal_details: i64,
    pub representatives: i64,
    pub hearings: i64,
}

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
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Start a batch. Nothing is visible to other readers until `commit`.
    pub fn begin(&self) -> Result<UnitOfWork<'_>> {
        let tx = self.conn.unchecked_transaction().context("Failed to begin transaction")?;
        Ok(UnitOfWork::new(tx))
    }

    /// Store a whole parsed batch in one transaction: all of it, or none of it.
    pub fn store(&self, batch: &ParsedBatch) -> Result<StoreStats> {
        info!("Storing {} parsed pages", batch.len());
        let mut uow = self.begin()?;
        for (url, page) in batch {
            uow.store_page(url, page)
                .with_context(|| format!("store payload from {}", url))?;
        }
        let stats = uow.commit()?;
        info!("{}", stats);
        Ok(stats)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn property_by_roll_number(&self, roll_number: &str) -> Result<Option<Property>> {
        find_property(&self.conn, roll_number)
    }

    pub fn appeal_by_number(&self, appeal_number: &str) -> Result<Option<AppealRecord>> {
        find_appeal(&self.conn, appeal_number)?
            .map(|appeal| load_record(&self.conn, appeal))
            .transpose()
    }

    pub fn appeals_by_property(&self, roll_number: &str) -> Result<Vec<AppealRecord>> {
        self.appeals_where("roll_number", roll_number)
    }

    /// A property and all of its appeals as one document, or `None` for an
    /// unknown roll number.
    pub fn export_property(&self, roll_number: &str) -> Result<Option<PropertyExport>> {
        let Some(property) = self.property_by_roll_number(roll_number)? else {
            return Ok(None);
        };
        let appeals = self.appeals_by_property(roll_number)?;
        Ok(Some(PropertyExport {
            property_info: property.into(),
            appeals: appeals.into_iter().map(ExportedAppeal::from).collect(),
        }))
    }

    pub fn appeals_by_status(&self, status: &str) -> Result<Vec<AppealRecord>> {
        self.appeals_where("status", status)
    }

    fn appeals_where(&self, column: &str, value: &str) -> Result<Vec<AppealRecord>> {
        let sql = format!("SELECT {APPEAL_COLS} FROM appeals WHERE {column} = ? ORDER BY appeal_number");
        let mut stmt = self.conn.prepare(&sql)?;
        let appeals = stmt
            .query_map(params![value], appeal_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;

        appeals.into_iter().map(|a| load_record(&self.conn, a)).collect()
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<i64> {
            let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {table}"))?;
            Ok(s.query_row([], |r| r.get(0))?)
        };
        Ok(TableCounts {
            properties: count("properties")?,
            appeals: count("appeals")?,
            appeal_details: count("appeal_details")?,
            representatives: count("representatives")?,
            hearings: count("hearings")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        APPEAL_NO, AppealDetailPage, AppealStub, Cell, DetailOutcome, HEARING_NO, Link, ListingPage,
        ParsedPage, PropertyHeader, STATUS, TAX_DATE,
    };
    use serde_json::json;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn stub(appeal_no: &str, cells: &[(&str, &str)], details: Option<AppealDetailPage>) -> AppealStub {
        let mut link = Link::new(appeal_no, format!("/Detail?{appeal_no}"));
        link.details = details.map(DetailOutcome::Parsed);
        let mut stub = AppealStub::default();
        stub.set(APPEAL_NO, Cell::Link(link));
        for (header, value) in cells {
            stub.set(header, Cell::Text(value.to_string()));
        }
        stub
    }

    fn listing(roll: &str, appeals: Vec<AppealStub>) -> ParsedPage {
        ParsedPage::Listing(ListingPage {
            property_info: PropertyHeader {
                roll_number: Some(roll.to_string()),
                property_description: Some("123 MAIN ST".to_string()),
                details: Some(AppealDetailPage {
                    property_information: [("municipality".to_string(), "Toronto".to_string())]
                        .into_iter()
                        .collect(),
                    ..AppealDetailPage::default()
                }),
            },
            appeals,
        })
    }

    #[test]
    fn export_writes_property_and_appeals() {
        let repo = repo();
        let detail = AppealDetailPage {
            appellant_information: [
                ("filing_date".to_string(), "2023-01-05".to_string()),
                ("reason_for_appeal".to_string(), "Overassessed".to_string()),
            ]
            .into_iter()
            .collect(),
            ..AppealDetailPage::default()
        };
        let mut batch = ParsedBatch::new();
        batch.insert(
            "https://arb.example/Default?R1".into(),
            listing(
                "R1",
                vec![
                    stub("A-1", &[(STATUS, "Open"), (TAX_DATE, "2022-01-01")], Some(detail)),
                    stub("A-2", &[(STATUS, "Closed")], None),
                ],
            ),
        );
        repo.store(&batch).unwrap();

        let export = repo.export_property("R1").unwrap().unwrap();

        assert_eq!(
            serde_json::to_value(&export).unwrap(),
            json!({
                "property_info": {
                    "roll_number": "R1",
                    "property_description": "123 MAIN ST",
                    "municipality": "Toronto",
                    "property_classification": null,
                    "neighborhood": null
                },
                "appeals": [
                    {
                        "appeal_number": "A-1",
                        "appellant": null,
                        "section": null,
                        "tax_date": "2022-01-01T00:00:00",
                        "status": "Open",
                        "board_order_no": null,
                        "details": {
                            "filing_date": "2023-01-05T00:00:00",
                            "reason_for_appeal": "Overassessed",
                            "decision_mailing_date": null,
                            "decision_text": null,
                            "decision_details": null
                        }
                    },
                    {
                        "appeal_number": "A-2",
                        "appellant": null,
                        "section": null,
                        "tax_date": null,
                        "status": "Closed",
                        "board_order_no": null
                    }
                ]
            })
        );
    }

    #[test]
    fn export_of_unknown_roll_number_is_none() {
        assert!(repo().export_property("missing").unwrap().is_none());
    }

    #[test]
    fn failing_payload_rolls_back_whole_batch() {
        let repo = repo();
        // Hearing inserts fail once the table is gone.
        repo.conn
            .execute_batch("DROP INDEX idx_hearings_appeal; DROP TABLE hearings;")
            .unwrap();

        let mut batch = ParsedBatch::new();
        batch.insert("https://arb.example/Default?1".into(), listing("R1", vec![stub("A-1", &[], None)]));
        batch.insert(
            "https://arb.example/Default?2".into(),
            listing("R2", vec![stub("A-2", &[(HEARING_NO, "H-1")], None)]),
        );

        tokio_test::assert_err!(repo.store(&batch));

        assert!(repo.property_by_roll_number("R1").unwrap().is_none());
        assert!(find_appeal(&repo.conn, "A-1").unwrap().is_none());
    }
}
