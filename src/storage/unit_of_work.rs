//! Transaction-scoped upserts for one parsed batch.
//!
//! Every write goes through a `UnitOfWork`. Dropping it without `commit`
//! rolls the whole batch back.

use crate::models::{
    Appeal, AppealDetail, AppealDetailPage, AppealStub, Cell, DetailOutcome, FieldMap, Hearing,
    ParsedPage, Property, PropertyHeader,
};
use crate::scraper::cleaner::{non_empty, parse_date};
use anyhow::{Context, Result};
use duckdb::{OptionalExt, Transaction, params};
use std::fmt;
use tracing::{debug, info, warn};

use super::merge::{Incoming, MergePolicy};
use super::{find_appeal, find_detail, find_hearing, find_property};

// ── Field policies ────────────────────────────────────────────────────────────

const PROPERTY_DESCRIPTION: MergePolicy = MergePolicy::ImmutableAfterCreate;
const PROPERTY_LOCATION: MergePolicy = MergePolicy::AlwaysOverwrite;
const APPEAL_TEXT: MergePolicy = MergePolicy::OverwriteIfPresent;
const APPEAL_TAX_DATE: MergePolicy = MergePolicy::OverwriteIfNonEmpty;
const DETAIL_FIELD: MergePolicy = MergePolicy::OverwriteIfNonEmpty;
const HEARING_DATE: MergePolicy = MergePolicy::OverwriteIfNonEmpty;

const DEFAULT_REPRESENTATIVE_TYPE: &str = "Unknown";

// Detail-page keys, as produced by the key normalizer.
const KEY_MUNICIPALITY: &str = "municipality";
const KEY_CLASSIFICATION: &str = "property_classification";
const KEY_NEIGHBORHOOD: &str = "nbhd";
const KEY_FILING_DATE: &str = "filing_date";
const KEY_REASON: &str = "reason_for_appeal";
const KEY_MAILING_DATE: &str = "decision_mailing_date";
const KEY_DECISION_TEXT: &str = "decision_s";
const KEY_DECISION_DETAILS: &str = "decisiondetails";

fn field<'a>(map: &'a FieldMap, key: &str) -> Option<&'a str> {
    map.get(key).map(String::as_str)
}

fn cell_text(cell: &Option<Cell>) -> Option<&str> {
    cell.as_ref().map(Cell::text)
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub pages_stored: usize,
    pub pages_skipped: usize,
    pub properties_created: usize,
    pub properties_updated: usize,
    pub appeals_created: usize,
    pub appeals_updated: usize,
    pub appeals_skipped: usize,
    pub representatives_created: usize,
    pub hearings_created: usize,
    pub details_created: usize,
    pub details_updated: usize,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stored {} pages ({} skipped) | properties +{} ~{} | appeals +{} ~{} ({} skipped) | \
             representatives +{} | hearings +{} | details +{} ~{}",
            self.pages_stored,
            self.pages_skipped,
            self.properties_created,
            self.properties_updated,
            self.appeals_created,
            self.appeals_updated,
            self.appeals_skipped,
            self.representatives_created,
            self.hearings_created,
            self.details_created,
            self.details_updated,
        )
    }
}

// ── Unit of work ──────────────────────────────────────────────────────────────

pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    stats: StoreStats,
}

impl<'conn> UnitOfWork<'conn> {
    pub(super) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx, stats: StoreStats::default() }
    }

    pub fn commit(self) -> Result<StoreStats> {
        self.tx.commit().context("Commit failed")?;
        Ok(self.stats)
    }

    /// Upsert one parsed page. Pages without a roll number are skipped.
    pub fn store_page(&mut self, url: &str, page: &ParsedPage) -> Result<()> {
        let listing = match page {
            ParsedPage::Listing(listing) => listing,
            ParsedPage::Failed { error } => {
                warn!("Skipping URL {} - parse error: {}", url, error);
                self.stats.pages_skipped += 1;
                return Ok(());
            }
            ParsedPage::Detail(_) => {
                warn!("Skipping URL {} - no valid property info", url);
                self.stats.pages_skipped += 1;
                return Ok(());
            }
        };

        let Some(roll_number) = listing.property_info.roll_number.as_deref().and_then(non_empty)
        else {
            warn!("Skipping URL {} - no valid property info", url);
            self.stats.pages_skipped += 1;
            return Ok(());
        };

        self.upsert_property(roll_number, &listing.property_info)?;
        for stub in &listing.appeals {
            self.upsert_appeal(roll_number, stub)?;
        }

        self.stats.pages_stored += 1;
        Ok(())
    }

    // ── Property ──────────────────────────────────────────────────────────────

    pub fn upsert_property(&mut self, roll_number: &str, header: &PropertyHeader) -> Result<Property> {
        let location = header
            .details
            .as_ref()
            .map(|d| &d.property_information)
            .filter(|info| !info.is_empty());

        let (mut property, created) = match find_property(&self.tx, roll_number)? {
            Some(existing) => (existing, false),
            None => (
                Property {
                    roll_number: roll_number.to_string(),
                    description: header.property_description.clone(),
                    municipality: None,
                    classification: None,
                    neighborhood: None,
                },
                true,
            ),
        };

        if !created {
            property.description = PROPERTY_DESCRIPTION
                .merge(property.description, Incoming::text(header.property_description.as_deref()));
        }

        if let Some(info) = location {
            property.municipality = PROPERTY_LOCATION
                .merge(property.municipality, Incoming::text(field(info, KEY_MUNICIPALITY)));
            property.classification = PROPERTY_LOCATION
                .merge(property.classification, Incoming::text(field(info, KEY_CLASSIFICATION)));
            property.neighborhood = PROPERTY_LOCATION
                .merge(property.neighborhood, Incoming::text(field(info, KEY_NEIGHBORHOOD)));
        }

        if created {
            self.tx
                .execute(
                    r#"INSERT INTO properties
                           (roll_number, description, municipality, classification, neighborhood)
                       VALUES (?, ?, ?, ?, ?)"#,
                    params![
                        property.roll_number,
                        property.description,
                        property.municipality,
                        property.classification,
                        property.neighborhood,
                    ],
                )
                .with_context(|| format!("insert property {}", roll_number))?;
            info!("Created new property: {}", roll_number);
            self.stats.properties_created += 1;
        } else {
            self.tx
                .execute(
                    r#"UPDATE properties SET
                           description = ?, municipality = ?, classification = ?, neighborhood = ?
                       WHERE roll_number = ?"#,
                    params![
                        property.description,
                        property.municipality,
                        property.classification,
                        property.neighborhood,
                        property.roll_number,
                    ],
                )
                .with_context(|| format!("update property {}", roll_number))?;
            self.stats.properties_updated += 1;
        }

        Ok(property)
    }

    // ── Appeal ────────────────────────────────────────────────────────────────

    /// Upsert one listing row and everything hanging off it. A row without an
    /// appeal number is skipped and yields `None`.
    pub fn upsert_appeal(&mut self, roll_number: &str, stub: &AppealStub) -> Result<Option<Appeal>> {
        let Some(appeal_number) = stub.appeal_number() else {
            warn!("Skipping appeal on {} - no valid appeal number", roll_number);
            self.stats.appeals_skipped += 1;
            return Ok(None);
        };

        let appeal = match find_appeal(&self.tx, appeal_number)? {
            None => {
                let appeal = Appeal {
                    appeal_number: appeal_number.to_string(),
                    roll_number: roll_number.to_string(),
                    appellant: Incoming::text(cell_text(&stub.appellant)).into_value(),
                    section: Incoming::text(cell_text(&stub.section)).into_value(),
                    tax_date: Incoming::date(cell_text(&stub.tax_date)).into_value(),
                    status: Incoming::text(cell_text(&stub.status)).into_value(),
                    board_order_no: Incoming::text(cell_text(&stub.board_order_no)).into_value(),
                };
                self.tx
                    .execute(
                        r#"INSERT INTO appeals
                               (appeal_number, roll_number, appellant, section, tax_date, status, board_order_no)
                           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                        params![
                            appeal.appeal_number,
                            appeal.roll_number,
                            appeal.appellant,
                            appeal.section,
                            appeal.tax_date,
                            appeal.status,
                            appeal.board_order_no,
                        ],
                    )
                    .with_context(|| format!("insert appeal {}", appeal_number))?;
                info!("Created new appeal: {}", appeal_number);
                self.stats.appeals_created += 1;
                appeal
            }
            Some(mut appeal) => {
                // roll_number stays with whichever property first reported the appeal
                appeal.appellant =
                    APPEAL_TEXT.merge(appeal.appellant, Incoming::text(cell_text(&stub.appellant)));
                appeal.section =
                    APPEAL_TEXT.merge(appeal.section, Incoming::text(cell_text(&stub.section)));
                appeal.status =
                    APPEAL_TEXT.merge(appeal.status, Incoming::text(cell_text(&stub.status)));
                appeal.board_order_no = APPEAL_TEXT
                    .merge(appeal.board_order_no, Incoming::text(cell_text(&stub.board_order_no)));
                appeal.tax_date =
                    APPEAL_TAX_DATE.merge(appeal.tax_date, Incoming::date(cell_text(&stub.tax_date)));

                self.tx
                    .execute(
                        r#"UPDATE appeals SET
                               appellant = ?, section = ?, tax_date = ?, status = ?, board_order_no = ?
                           WHERE appeal_number = ?"#,
                        params![
                            appeal.appellant,
                            appeal.section,
                            appeal.tax_date,
                            appeal.status,
                            appeal.board_order_no,
                            appeal.appeal_number,
                        ],
                    )
                    .with_context(|| format!("update appeal {}", appeal_number))?;
                self.stats.appeals_updated += 1;
                appeal
            }
        };

        if let Some(name) = cell_text(&stub.representative).and_then(non_empty) {
            self.link_representative(&appeal.appeal_number, name)?;
        }

        self.upsert_hearing(&appeal.appeal_number, stub)?;

        match stub.appeal_link().and_then(|link| link.details.as_ref()) {
            Some(DetailOutcome::Parsed(page)) => {
                self.upsert_appeal_detail(&appeal.appeal_number, page)?;
            }
            Some(DetailOutcome::Failed { error }) => {
                warn!("Not storing details for appeal {}: {}", appeal.appeal_number, error);
            }
            None => {}
        }

        Ok(Some(appeal))
    }

    // ── Representative ────────────────────────────────────────────────────────

    /// Find-or-create by exact name, then link. Existing links are never removed.
    pub fn link_representative(&mut self, appeal_number: &str, name: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .tx
            .query_row(
                "SELECT id FROM representatives WHERE name = ? ORDER BY id LIMIT 1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id: i64 = self
                    .tx
                    .query_row(
                        r#"INSERT INTO representatives (name, "type") VALUES (?, ?) RETURNING id"#,
                        params![name, DEFAULT_REPRESENTATIVE_TYPE],
                        |r| r.get(0),
                    )
                    .with_context(|| format!("insert representative {}", name))?;
                info!("Created new representative: {}", name);
                self.stats.representatives_created += 1;
                id
            }
        };

        let linked: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM appeal_representatives WHERE appeal_number = ? AND representative_id = ?",
            params![appeal_number, id],
            |r| r.get(0),
        )?;
        if linked == 0 {
            self.tx
                .execute(
                    "INSERT INTO appeal_representatives (appeal_number, representative_id) VALUES (?, ?)",
                    params![appeal_number, id],
                )
                .with_context(|| format!("link representative {} to {}", id, appeal_number))?;
        }

        Ok(id)
    }

    // ── Hearing ───────────────────────────────────────────────────────────────

    /// Hearings dedupe on (appeal, hearing number). Without a number there is
    /// nothing to match on, so every such row is new.
    pub fn upsert_hearing(&mut self, appeal_number: &str, stub: &AppealStub) -> Result<Option<Hearing>> {
        let hearing_number = cell_text(&stub.hearing_no).unwrap_or("");
        let hearing_date = parse_date(cell_text(&stub.hearing_date).unwrap_or(""));

        if hearing_number.is_empty() && hearing_date.is_none() {
            return Ok(None);
        }

        let existing = if hearing_number.is_empty() {
            None
        } else {
            find_hearing(&self.tx, appeal_number, hearing_number)?
        };

        let hearing = match existing {
            Some(mut hearing) => {
                hearing.hearing_date =
                    HEARING_DATE.merge(hearing.hearing_date, Incoming::parsed(hearing_date));
                self.tx
                    .execute(
                        "UPDATE hearings SET hearing_date = ? WHERE id = ?",
                        params![hearing.hearing_date, hearing.id],
                    )
                    .with_context(|| format!("update hearing {}", hearing.id))?;
                hearing
            }
            None => {
                let number = non_empty(hearing_number).map(str::to_string);
                let id: i64 = self
                    .tx
                    .query_row(
                        r#"INSERT INTO hearings (appeal_number, hearing_number, hearing_date)
                           VALUES (?, ?, ?) RETURNING id"#,
                        params![appeal_number, number, hearing_date],
                        |r| r.get(0),
                    )
                    .with_context(|| format!("insert hearing for {}", appeal_number))?;
                info!("Created new hearing for appeal: {}", appeal_number);
                self.stats.hearings_created += 1;
                Hearing {
                    id,
                    appeal_number: appeal_number.to_string(),
                    hearing_number: number,
                    hearing_date,
                }
            }
        };

        Ok(Some(hearing))
    }

    // ── Appeal detail ─────────────────────────────────────────────────────────

    pub fn upsert_appeal_detail(
        &mut self,
        appeal_number: &str,
        page: &AppealDetailPage,
    ) -> Result<AppealDetail> {
        let appellant = &page.appellant_information;
        let property = &page.property_information;

        let filing_date = Incoming::date(field(appellant, KEY_FILING_DATE));
        let reason = Incoming::text(field(appellant, KEY_REASON));
        let mailing_date = Incoming::date(field(property, KEY_MAILING_DATE));
        let decision_text = Incoming::text(field(property, KEY_DECISION_TEXT));
        let decision_details = Incoming::text(field(property, KEY_DECISION_DETAILS));

        let detail = match find_detail(&self.tx, appeal_number)? {
            None => {
                let mut detail = AppealDetail {
                    id: 0,
                    appeal_number: appeal_number.to_string(),
                    filing_date: filing_date.into_value(),
                    reason_for_appeal: reason.into_value(),
                    decision_mailing_date: mailing_date.into_value(),
                    decision_text: decision_text.into_value(),
                    decision_details: decision_details.into_value(),
                };
                detail.id = self
                    .tx
                    .query_row(
                        r#"INSERT INTO appeal_details
                               (appeal_number, filing_date, reason_for_appeal,
                                decision_mailing_date, decision_text, decision_details)
                           VALUES (?, ?, ?, ?, ?, ?) RETURNING id"#,
                        params![
                            detail.appeal_number,
                            detail.filing_date,
                            detail.reason_for_appeal,
                            detail.decision_mailing_date,
                            detail.decision_text,
                            detail.decision_details,
                        ],
                        |r| r.get(0),
                    )
                    .with_context(|| format!("insert appeal details for {}", appeal_number))?;
                info!("Created new appeal details for appeal: {}", appeal_number);
                self.stats.details_created += 1;
                detail
            }
            Some(mut detail) => {
                detail.filing_date = DETAIL_FIELD.merge(detail.filing_date, filing_date);
                detail.reason_for_appeal = DETAIL_FIELD.merge(detail.reason_for_appeal, reason);
                detail.decision_mailing_date =
                    DETAIL_FIELD.merge(detail.decision_mailing_date, mailing_date);
                detail.decision_text = DETAIL_FIELD.merge(detail.decision_text, decision_text);
                detail.decision_details =
                    DETAIL_FIELD.merge(detail.decision_details, decision_details);

                self.tx
                    .execute(
                        r#"UPDATE appeal_details SET
                               filing_date = ?, reason_for_appeal = ?, decision_mailing_date = ?,
                               decision_text = ?, decision_details = ?
                           WHERE id = ?"#,
                        params![
                            detail.filing_date,
                            detail.reason_for_appeal,
                            detail.decision_mailing_date,
                            detail.decision_text,
                            detail.decision_details,
                            detail.id,
                        ],
                    )
                    .with_context(|| format!("update appeal details for {}", appeal_number))?;
                debug!("Updated appeal details for appeal: {}", appeal_number);
                self.stats.details_updated += 1;
                detail
            }
        };

        Ok(detail)
    }
}
