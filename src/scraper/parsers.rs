//! HTML extractors for the tribunal's listing and detail pages.
//!
//! Both entry points swallow their own failures and hand back a `Failed`
//! sentinel, so one bad page never aborts a batch.

use crate::models::{
    AppealDetailPage, AppealStub, Cell, DetailOutcome, FieldMap, Link, ListingPage, ParsedPage,
    PropertyHeader,
};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::error;

use super::cleaner::{Section, classify_key, normalize_key};

const APPEALS_TABLE: &str = "#MainContent_GridView1";
const HEARINGS_TABLE: &str = "#MainContent_GVHearing";
const DECISIONS_TABLE: &str = "#MainContent_GVDecision";
const ROLL_NUMBER_ANCHOR: &str = "#MainContent_LinkButton1";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("selector {:?}: {:?}", css, e))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Tables ────────────────────────────────────────────────────────────────────

/// Header cells of the first row, trimmed but otherwise verbatim.
fn table_headers(table: ElementRef<'_>) -> Result<Vec<String>> {
    let th_sel = selector("tr:first-child th")?;
    Ok(table.select(&th_sel).map(text_of).collect())
}

/// Every row but the first, each as its list of `td` cells.
fn table_body<'a>(table: ElementRef<'a>) -> Result<Vec<Vec<ElementRef<'a>>>> {
    let tr_sel = selector("tr:not(:first-child)")?;
    let td_sel = selector("td")?;
    Ok(table
        .select(&tr_sel)
        .map(|tr| tr.select(&td_sel).collect())
        .collect())
}

/// Positional mapping with normalized header keys; cells beyond the header
/// count are dropped, missing cells are simply absent.
fn extract_field_table(table: ElementRef<'_>) -> Result<Vec<FieldMap>> {
    let headers: Vec<String> = table_headers(table)?.iter().map(|h| normalize_key(h)).collect();

    Ok(table_body(table)?
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .map(|(header, td)| (header.clone(), text_of(td)))
                .collect()
        })
        .collect())
}

// ── Listing page ──────────────────────────────────────────────────────────────

pub fn parse_listing_page(html: &str) -> ParsedPage {
    match extract_listing(html) {
        Ok(page) => ParsedPage::Listing(page),
        Err(e) => {
            error!("Error parsing appeal listing: {:#}", e);
            ParsedPage::failed(format!("{:#}", e))
        }
    }
}

fn extract_listing(html: &str) -> Result<ListingPage> {
    let doc = Html::parse_document(html);
    Ok(ListingPage {
        property_info: extract_property_header(&doc)?,
        appeals: extract_appeals(&doc)?,
    })
}

/// The header block has no labels worth matching on: the roll number is the
/// column right after the first `col-md-3`, and the description sits in the
/// second such pair inside a `.row`.
fn extract_property_header(doc: &Html) -> Result<PropertyHeader> {
    let roll_sel = selector(".col-md-3 + .col-md-3")?;
    let desc_sel = selector(".row .col-md-3 + .col-md-3")?;

    Ok(PropertyHeader {
        roll_number: doc.select(&roll_sel).next().map(text_of),
        property_description: doc.select(&desc_sel).nth(1).map(text_of),
        details: None,
    })
}

fn extract_appeals(doc: &Html) -> Result<Vec<AppealStub>> {
    let table_sel = selector(APPEALS_TABLE)?;
    let a_sel = selector("a")?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Ok(vec![]);
    };

    let headers = table_headers(table)?;
    let mut appeals = Vec::new();

    for cells in table_body(table)? {
        let mut stub = AppealStub::default();
        for (header, td) in headers.iter().zip(cells) {
            let cell = match td.select(&a_sel).next() {
                Some(a) => Cell::Link(Link::new(text_of(td), a.value().attr("href").unwrap_or(""))),
                None => Cell::Text(text_of(td)),
            };
            stub.set(header, cell);
        }
        appeals.push(stub);
    }

    Ok(appeals)
}

// ── Detail page ───────────────────────────────────────────────────────────────

pub fn parse_appeal_detail(html: &str) -> DetailOutcome {
    match extract_detail(html) {
        Ok(page) => DetailOutcome::Parsed(page),
        Err(e) => {
            error!("Error parsing appeal detail: {:#}", e);
            DetailOutcome::failed(format!("{:#}", e))
        }
    }
}

fn extract_detail(html: &str) -> Result<AppealDetailPage> {
    let doc = Html::parse_document(html);
    let mut page = AppealDetailPage::default();

    let anchor_sel = selector(ROLL_NUMBER_ANCHOR)?;
    if let Some(anchor) = doc.select(&anchor_sel).next() {
        page.property_information.insert("roll_number".to_string(), text_of(anchor));
    }

    let row_sel = selector(".row")?;
    let col_sel = selector(".col-md-4")?;
    let strong_sel = selector("strong")?;

    for row in doc.select(&row_sel) {
        let mut cols = row.select(&col_sel);
        let (Some(label_col), Some(value_col)) = (cols.next(), cols.next()) else {
            continue;
        };

        let label = match label_col.select(&strong_sel).next() {
            Some(strong) => text_of(strong),
            None => text_of(label_col),
        };
        let label = label.trim_end_matches(':');
        let value = text_of(value_col);

        if value.is_empty() || label.to_lowercase().starts_with("note") {
            continue;
        }

        let key = normalize_key(label);
        match classify_key(&key) {
            Section::Appellant => page.appellant_information.insert(key, value),
            Section::Property => page.property_information.insert(key, value),
        };
    }

    let hearings_sel = selector(HEARINGS_TABLE)?;
    if let Some(table) = doc.select(&hearings_sel).next() {
        page.hearings = Some(extract_field_table(table)?);
    }

    let decisions_sel = selector(DECISIONS_TABLE)?;
    if let Some(table) = doc.select(&decisions_sel).next() {
        page.decisions = Some(extract_field_table(table)?);
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LISTING: &str = r#"
        <html><body>
          <div class="row">
            <div class="col-md-3"><strong>Roll Number</strong></div>
            <div class="col-md-3">1901-123-456-78900</div>
          </div>
          <div class="row">
            <div class="col-md-3"><strong>Property Description</strong></div>
            <div class="col-md-3">  123 MAIN ST  </div>
          </div>
          <table id="MainContent_GridView1">
            <tr><th>AppealNo</th><th>Appellant</th><th>Tax Date</th><th>Hearing No</th></tr>
            <tr>
              <td><a href="/Detail?1">A-100</a></td>
              <td>Jane Doe</td>
              <td>2023-01-01</td>
              <td><a href="/Hearing?9">H-9</a></td>
            </tr>
            <tr><td><a href="/Detail?2">A-200</a></td><td>John Roe</td></tr>
          </table>
        </body></html>
    "#;

    fn listing(html: &str) -> ListingPage {
        match parse_listing_page(html) {
            ParsedPage::Listing(page) => page,
            other => panic!("expected listing, got {:?}", other),
        }
    }

    fn detail(html: &str) -> AppealDetailPage {
        match parse_appeal_detail(html) {
            DetailOutcome::Parsed(page) => page,
            other => panic!("expected detail, got {:?}", other),
        }
    }

    #[test]
    fn listing_minimal_row_maps_by_position() {
        let html = r#"
            <table id="MainContent_GridView1">
              <tr><th>AppealNo</th><th>Appellant</th></tr>
              <tr><td><a href="/Detail?1">A-100</a></td><td>Jane Doe</td></tr>
            </table>
        "#;
        let page = listing(html);
        assert_eq!(
            serde_json::to_value(&page.appeals).unwrap(),
            json!([{"AppealNo": {"text": "A-100", "url": "/Detail?1"}, "Appellant": "Jane Doe"}])
        );
    }

    #[test]
    fn listing_reads_property_header_by_position() {
        let page = listing(LISTING);
        assert_eq!(page.property_info.roll_number.as_deref(), Some("1901-123-456-78900"));
        assert_eq!(page.property_info.property_description.as_deref(), Some("123 MAIN ST"));
    }

    #[test]
    fn listing_keeps_headers_verbatim_and_tolerates_short_rows() {
        let page = listing(LISTING);
        assert_eq!(page.appeals.len(), 2);

        let first = &page.appeals[0];
        assert_eq!(first.appeal_number(), Some("A-100"));
        assert_eq!(first.tax_date, Some(Cell::Text("2023-01-01".into())));
        assert_eq!(first.hearing_no, Some(Cell::Link(Link::new("H-9", "/Hearing?9"))));

        let second = &page.appeals[1];
        assert_eq!(second.appellant.as_ref().map(Cell::text), Some("John Roe"));
        assert!(second.tax_date.is_none());
        assert!(second.hearing_no.is_none());
    }

    #[test]
    fn listing_without_table_has_no_appeals() {
        let page = listing("<html><body><p>No appeals on file</p></body></html>");
        assert!(page.appeals.is_empty());
        assert_eq!(page.property_info, PropertyHeader::default());
    }

    const DETAIL: &str = r#"
        <html><body>
          <a id="MainContent_LinkButton1"> 1901-123-456-78900 </a>
          <div class="row">
            <div class="col-md-4"><strong>Filing Date:</strong></div>
            <div class="col-md-4">2023-01-05</div>
          </div>
          <div class="row">
            <div class="col-md-4">Municipality:</div>
            <div class="col-md-4">Toronto</div>
          </div>
          <div class="row">
            <div class="col-md-4"><strong>Decision Mailing Date</strong></div>
            <div class="col-md-4">2023-06-01</div>
          </div>
          <div class="row">
            <div class="col-md-4"><strong>Note:</strong></div>
            <div class="col-md-4">Ignore me</div>
          </div>
          <div class="row">
            <div class="col-md-4"><strong>Reason for Appeal:</strong></div>
            <div class="col-md-4">   </div>
          </div>
          <div class="row">
            <div class="col-md-4"><strong>Lonely</strong></div>
          </div>
          <table id="MainContent_GVHearing">
            <tr><th>Hearing No.</th><th>Hearing Date</th></tr>
            <tr><td>1</td><td>2023-03-01</td></tr>
            <tr><td>2</td></tr>
          </table>
        </body></html>
    "#;

    #[test]
    fn detail_routes_labels_into_sections() {
        let page = detail(DETAIL);
        assert_eq!(page.appellant_information.get("filing_date").map(String::as_str), Some("2023-01-05"));
        assert_eq!(page.property_information.get("municipality").map(String::as_str), Some("Toronto"));
        assert_eq!(
            page.property_information.get("decision_mailing_date").map(String::as_str),
            Some("2023-06-01")
        );
        assert_eq!(
            page.property_information.get("roll_number").map(String::as_str),
            Some("1901-123-456-78900")
        );
    }

    #[test]
    fn detail_drops_notes_blank_values_and_single_columns() {
        let page = detail(DETAIL);
        assert!(!page.property_information.contains_key("note"));
        assert!(!page.appellant_information.contains_key("reason_for_appeal"));
        assert!(!page.property_information.contains_key("lonely"));
    }

    #[test]
    fn detail_normalizes_hearing_headers() {
        let page = detail(DETAIL);
        let hearings = page.hearings.expect("hearing table");
        assert_eq!(hearings.len(), 2);
        assert_eq!(hearings[0].get("hearing_no").map(String::as_str), Some("1"));
        assert_eq!(hearings[0].get("hearing_date").map(String::as_str), Some("2023-03-01"));
        assert!(!hearings[1].contains_key("hearing_date"));
        assert!(page.decisions.is_none());
    }

    #[test]
    fn detail_reads_decision_table_when_present() {
        let html = r#"
            <table id="MainContent_GVDecision">
              <tr><th>Board Order No</th><th>Decision(s)</th></tr>
              <tr><td>BO-1</td><td>Dismissed</td></tr>
            </table>
        "#;
        let page = detail(html);
        let decisions = page.decisions.expect("decision table");
        assert_eq!(decisions[0].get("board_order_no").map(String::as_str), Some("BO-1"));
        assert_eq!(decisions[0].get("decision_s").map(String::as_str), Some("Dismissed"));
        assert!(page.hearings.is_none());
    }
}
