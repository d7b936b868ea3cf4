use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Listing column headers ────────────────────────────────────────────────────

pub const APPEAL_NO: &str = "AppealNo";
pub const APPELLANT: &str = "Appellant";
pub const SECTION: &str = "Section";
pub const TAX_DATE: &str = "Tax Date";
pub const STATUS: &str = "Status";
pub const BOARD_ORDER_NO: &str = "Board Order No";
pub const REPRESENTATIVE: &str = "Representative";
pub const HEARING_NO: &str = "Hearing No";
pub const HEARING_DATE: &str = "Hearing Date";

/// Normalized label → value pairs from a detail page section.
pub type FieldMap = BTreeMap<String, String>;

/// URL → fetch result, the intermediate JSON checkpoint.
pub type FetchBatch = BTreeMap<String, FetchResult>;

/// URL → parsed payload, the input of the upsert engine.
pub type ParsedBatch = BTreeMap<String, ParsedPage>;

// ── Fetch results ─────────────────────────────────────────────────────────────

/// Outcome of one GET. Serializes as `{success, content}` or `{success, error}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    pub fn ok(content: String) -> Self {
        Self { success: true, content: Some(content), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, content: None, error: Some(error.into()) }
    }

    /// Body on success, error message otherwise.
    pub fn into_result(self) -> Result<String, String> {
        match (self.success, self.content) {
            (true, Some(body)) => Ok(body),
            (true, None) => Ok(String::new()),
            (false, _) => Err(self.error.unwrap_or_else(|| "unknown fetch error".to_string())),
        }
    }
}

// ── Listing page ──────────────────────────────────────────────────────────────

/// A table cell: plain trimmed text, or a hyperlink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Cell {
    Link(Link),
    Text(String),
}

impl Cell {
    pub fn text(&self) -> &str {
        match self {
            Cell::Link(link) => &link.text,
            Cell::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailOutcome>,
}

impl Link {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self { text: text.into(), url: url.into(), details: None }
    }
}

/// One row of the appeals table, keyed by the verbatim column header.
/// Known columns get typed slots; anything else lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppealStub {
    #[serde(rename = "AppealNo", default, skip_serializing_if = "Option::is_none")]
    pub appeal_no: Option<Cell>,
    #[serde(rename = "Appellant", default, skip_serializing_if = "Option::is_none")]
    pub appellant: Option<Cell>,
    #[serde(rename = "Section", default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Cell>,
    #[serde(rename = "Tax Date", default, skip_serializing_if = "Option::is_none")]
    pub tax_date: Option<Cell>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Cell>,
    #[serde(rename = "Board Order No", default, skip_serializing_if = "Option::is_none")]
    pub board_order_no: Option<Cell>,
    #[serde(rename = "Representative", default, skip_serializing_if = "Option::is_none")]
    pub representative: Option<Cell>,
    #[serde(rename = "Hearing No", default, skip_serializing_if = "Option::is_none")]
    pub hearing_no: Option<Cell>,
    #[serde(rename = "Hearing Date", default, skip_serializing_if = "Option::is_none")]
    pub hearing_date: Option<Cell>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Cell>,
}

impl AppealStub {
    /// Store a cell under its column header.
    pub fn set(&mut self, header: &str, cell: Cell) {
        let slot = match header {
            APPEAL_NO => &mut self.appeal_no,
            APPELLANT => &mut self.appellant,
            SECTION => &mut self.section,
            TAX_DATE => &mut self.tax_date,
            STATUS => &mut self.status,
            BOARD_ORDER_NO => &mut self.board_order_no,
            REPRESENTATIVE => &mut self.representative,
            HEARING_NO => &mut self.hearing_no,
            HEARING_DATE => &mut self.hearing_date,
            _ => {
                self.extra.insert(header.to_string(), cell);
                return;
            }
        };
        *slot = Some(cell);
    }

    pub fn get(&self, header: &str) -> Option<&Cell> {
        match header {
            APPEAL_NO => self.appeal_no.as_ref(),
            APPELLANT => self.appellant.as_ref(),
            SECTION => self.section.as_ref(),
            TAX_DATE => self.tax_date.as_ref(),
            STATUS => self.status.as_ref(),
            BOARD_ORDER_NO => self.board_order_no.as_ref(),
            REPRESENTATIVE => self.representative.as_ref(),
            HEARING_NO => self.hearing_no.as_ref(),
            HEARING_DATE => self.hearing_date.as_ref(),
            _ => self.extra.get(header),
        }
    }

    /// The appeal-number link, which carries the detail URL.
    pub fn appeal_link(&self) -> Option<&Link> {
        match &self.appeal_no {
            Some(Cell::Link(link)) => Some(link),
            _ => None,
        }
    }

    pub fn appeal_link_mut(&mut self) -> Option<&mut Link> {
        match &mut self.appeal_no {
            Some(Cell::Link(link)) => Some(link),
            _ => None,
        }
    }

    /// Appeal number text, if non-empty. Only a linked cell counts.
    pub fn appeal_number(&self) -> Option<&str> {
        self.appeal_link().map(|l| l.text.as_str()).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PropertyHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AppealDetailPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingPage {
    pub property_info: PropertyHeader,
    pub appeals: Vec<AppealStub>,
}

// ── Detail page ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppealDetailPage {
    pub property_information: FieldMap,
    pub appellant_information: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hearings: Option<Vec<FieldMap>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decisions: Option<Vec<FieldMap>>,
}

/// Result of parsing (or failing to fetch) a detail page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DetailOutcome {
    Failed { error: String },
    Parsed(AppealDetailPage),
}

impl DetailOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        DetailOutcome::Failed { error: error.into() }
    }

    pub fn parsed(&self) -> Option<&AppealDetailPage> {
        match self {
            DetailOutcome::Parsed(page) => Some(page),
            DetailOutcome::Failed { .. } => None,
        }
    }
}

/// Parsed payload for one fetched URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParsedPage {
    Failed { error: String },
    Listing(ListingPage),
    Detail(AppealDetailPage),
}

impl ParsedPage {
    pub fn failed(error: impl Into<String>) -> Self {
        ParsedPage::Failed { error: error.into() }
    }
}

impl From<DetailOutcome> for ParsedPage {
    fn from(outcome: DetailOutcome) -> Self {
        match outcome {
            DetailOutcome::Failed { error } => ParsedPage::Failed { error },
            DetailOutcome::Parsed(page) => ParsedPage::Detail(page),
        }
    }
}

// ── Persisted entities ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub roll_number: String,
    pub description: Option<String>,
    pub municipality: Option<String>,
    pub classification: Option<String>,
    pub neighborhood: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appeal {
    pub appeal_number: String,
    pub roll_number: String,
    pub appellant: Option<String>,
    pub section: Option<String>,
    pub tax_date: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub board_order_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppealDetail {
    pub id: i64,
    pub appeal_number: String,
    pub filing_date: Option<NaiveDateTime>,
    pub reason_for_appeal: Option<String>,
    pub decision_mailing_date: Option<NaiveDateTime>,
    pub decision_text: Option<String>,
    pub decision_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Representative {
    pub id: i64,
    pub name: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hearing {
    pub id: i64,
    pub appeal_number: String,
    pub hearing_number: Option<String>,
    pub hearing_date: Option<NaiveDateTime>,
}

/// An appeal with its related rows eager-loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppealRecord {
    pub appeal: Appeal,
    pub detail: Option<AppealDetail>,
    pub representatives: Vec<Representative>,
    pub hearings: Vec<Hearing>,
}

// ── Export document ───────────────────────────────────────────────────────────

/// One property with all of its appeals, as written by `export`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyExport {
    pub property_info: ExportedProperty,
    pub appeals: Vec<ExportedAppeal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedProperty {
    pub roll_number: String,
    pub property_description: Option<String>,
    pub municipality: Option<String>,
    pub property_classification: Option<String>,
    pub neighborhood: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedAppeal {
    pub appeal_number: String,
    pub appellant: Option<String>,
    pub section: Option<String>,
    pub tax_date: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub board_order_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ExportedDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedDetail {
    pub filing_date: Option<NaiveDateTime>,
    pub reason_for_appeal: Option<String>,
    pub decision_mailing_date: Option<NaiveDateTime>,
    pub decision_text: Option<String>,
    pub decision_details: Option<String>,
}

impl From<Property> for ExportedProperty {
    fn from(p: Property) -> Self {
        Self {
            roll_number: p.roll_number,
            property_description: p.description,
            municipality: p.municipality,
            property_classification: p.classification,
            neighborhood: p.neighborhood,
        }
    }
}

impl From<AppealRecord> for ExportedAppeal {
    fn from(record: AppealRecord) -> Self {
        let AppealRecord { appeal, detail, .. } = record;
        Self {
            appeal_number: appeal.appeal_number,
            appellant: appeal.appellant,
            section: appeal.section,
            tax_date: appeal.tax_date,
            status: appeal.status,
            board_order_no: appeal.board_order_no,
            details: detail.map(|d| ExportedDetail {
                filing_date: d.filing_date,
                reason_for_appeal: d.reason_for_appeal,
                decision_mailing_date: d.decision_mailing_date,
                decision_text: d.decision_text,
                decision_details: d.decision_details,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stub_routes_known_and_unknown_headers() {
        let mut stub = AppealStub::default();
        stub.set(APPELLANT, Cell::Text("Jane Doe".into()));
        stub.set("Roll No", Cell::Text("1901".into()));

        assert_eq!(stub.appellant, Some(Cell::Text("Jane Doe".into())));
        assert_eq!(stub.get("Roll No").map(Cell::text), Some("1901"));
        assert!(stub.get(SECTION).is_none());
    }

    #[test]
    fn stub_serializes_with_verbatim_headers() {
        let mut stub = AppealStub::default();
        stub.set(APPEAL_NO, Cell::Link(Link::new("A-1", "/Detail?1")));
        stub.set("Extra Col", Cell::Text("x".into()));

        let value = serde_json::to_value(&stub).unwrap();
        assert_eq!(
            value,
            json!({"AppealNo": {"text": "A-1", "url": "/Detail?1"}, "Extra Col": "x"})
        );

        let back: AppealStub = serde_json::from_value(value).unwrap();
        assert_eq!(back, stub);
    }

    #[test]
    fn parsed_page_reads_error_sentinel_and_listing() {
        let failed: ParsedPage = serde_json::from_value(json!({"error": "boom"})).unwrap();
        assert_eq!(failed, ParsedPage::failed("boom"));

        let listing: ParsedPage = serde_json::from_value(json!({
            "property_info": {"roll_number": "19-01"},
            "appeals": [{"AppealNo": {"text": "A", "url": "/d", "details": {"error": "timeout"}}}]
        }))
        .unwrap();
        let ParsedPage::Listing(page) = listing else { panic!("expected listing") };
        let link = page.appeals[0].appeal_link().unwrap();
        assert_eq!(link.details, Some(DetailOutcome::failed("timeout")));

        let detail: ParsedPage = serde_json::from_value(json!({
            "property_information": {"roll_number": "19-01"},
            "appellant_information": {}
        }))
        .unwrap();
        assert!(matches!(detail, ParsedPage::Detail(_)));
    }

    #[test]
    fn fetch_result_shapes() {
        assert_eq!(
            serde_json::to_value(FetchResult::ok("<html/>".into())).unwrap(),
            json!({"success": true, "content": "<html/>"})
        );
        assert_eq!(
            serde_json::to_value(FetchResult::failed("HTTP 500")).unwrap(),
            json!({"success": false, "error": "HTTP 500"})
        );
        assert_eq!(FetchResult::failed("x").into_result(), Err("x".to_string()));
    }

    #[test]
    fn appeal_number_requires_linked_text() {
        let mut stub = AppealStub::default();
        stub.set(APPEAL_NO, Cell::Text("A-1".into()));
        assert_eq!(stub.appeal_number(), None);

        stub.set(APPEAL_NO, Cell::Link(Link::new("", "/d")));
        assert_eq!(stub.appeal_number(), None);

        stub.set(APPEAL_NO, Cell::Link(Link::new("A-1", "/d")));
        assert_eq!(stub.appeal_number(), Some("A-1"));
    }
}
