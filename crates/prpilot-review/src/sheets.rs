//! Google Sheets tracking sheet, one row per pull request.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use prpilot_core::{
    ApprovalSummary, PrPilotError, PrState, PullRequest, Result, Service, SheetRow, SheetsConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collaborators::TrackingSheet;
use crate::rest::RestClient;

/// Column headers written by [`TrackingSheet::setup`].
pub const HEADERS: [&str; 8] = [
    "PR Number",
    "Title",
    "Status",
    "Created Date",
    "Review Status",
    "Approvals",
    "Comments Count",
    "Last Updated",
];

/// Sheets v4 values API client bound to one worksheet.
pub struct SheetsClient {
    rest: RestClient,
    spreadsheet_id: String,
    worksheet: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct AppendReply {
    updates: Option<AppendUpdates>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

impl SheetsClient {
    /// # Errors
    ///
    /// Returns [`PrPilotError::ConfigurationMissing`] when the access token or
    /// spreadsheet id is absent.
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                PrPilotError::ConfigurationMissing("GOOGLE_SHEETS_ACCESS_TOKEN is not set".into())
            })?;
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                PrPilotError::ConfigurationMissing("GOOGLE_SHEETS_SPREADSHEET_ID is not set".into())
            })?;
        let rest = RestClient::new(Service::Sheets, &config.api_url, 30)?.with_bearer(token)?;
        Ok(Self {
            rest,
            spreadsheet_id,
            worksheet: config.worksheet_name.clone(),
        })
    }

    fn range(&self, cells: &str) -> String {
        format!("{}!{cells}", self.worksheet)
    }

    async fn read(&self, cells: &str) -> Result<Vec<Vec<Value>>> {
        let range = self.range(cells);
        let body: ValueRange = self
            .rest
            .get(
                &["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()],
                &[],
            )
            .await?;
        Ok(body.values)
    }

    async fn write(&self, cells: &str, values: Vec<Vec<Value>>) -> Result<()> {
        let range = self.range(cells);
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": values });
        let _: Value = self
            .rest
            .put(
                &["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()],
                &[("valueInputOption", "RAW")],
                &body,
            )
            .await?;
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cell_text(row: &[Value], idx: usize) -> String {
    match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_number(row: &[Value], idx: usize) -> Option<u64> {
    match row.get(idx) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn raw sheet values into rows, skipping the header and any row whose
/// first cell is not a PR number.
pub fn parse_rows(values: &[Vec<Value>]) -> Vec<SheetRow> {
    values
        .iter()
        .skip(1)
        .filter_map(|row| {
            let pr_number = cell_number(row, 0)?;
            Some(SheetRow {
                pr_number,
                title: cell_text(row, 1),
                status: cell_text(row, 2),
                created_date: cell_text(row, 3),
                review_status: cell_text(row, 4),
                approvals: cell_text(row, 5),
                comments_count: cell_number(row, 6).unwrap_or(0),
                last_updated: cell_text(row, 7),
            })
        })
        .collect()
}

#[async_trait]
impl TrackingSheet for SheetsClient {
    async fn setup(&self) -> Result<()> {
        let header = HEADERS.iter().map(|h| Value::from(*h)).collect();
        self.write("A1:H1", vec![header]).await?;
        tracing::info!(worksheet = %self.worksheet, "worksheet header written");
        Ok(())
    }

    async fn add_row(&self, pr: &PullRequest) -> Result<()> {
        let row = vec![
            json!(pr.number),
            json!(pr.title),
            json!(pr.state.to_string()),
            json!(pr.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            json!("pending"),
            json!("0/1"),
            json!(0),
            json!(now()),
        ];
        // The append endpoint picks the first empty row server-side, so
        // concurrent appends never land on the same row.
        let range = self.range("A:H");
        let append = format!("{range}:append");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [row] });
        let reply: AppendReply = self
            .rest
            .post(
                &["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", append.as_str()],
                &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
                &body,
            )
            .await?;
        let written = reply.updates.and_then(|u| u.updated_range).unwrap_or_default();
        tracing::info!(pr = pr.number, range = %written, "added PR to tracking sheet");
        Ok(())
    }

    async fn find_row(&self, number: u64) -> Result<Option<u32>> {
        let column = self.read("A:A").await?;
        Ok(column
            .iter()
            .position(|row| cell_number(row, 0) == Some(number))
            .and_then(|idx| u32::try_from(idx + 1).ok()))
    }

    async fn update_review_status(
        &self,
        number: u64,
        review_status: &str,
        comments_count: u64,
    ) -> Result<bool> {
        let Some(row) = self.find_row(number).await? else {
            tracing::debug!(pr = number, "no sheet row to update");
            return Ok(false);
        };
        self.write(&format!("E{row}"), vec![vec![json!(review_status)]])
            .await?;
        self.write(&format!("G{row}"), vec![vec![json!(comments_count)]])
            .await?;
        self.write(&format!("H{row}"), vec![vec![json!(now())]]).await?;
        tracing::info!(pr = number, %review_status, "updated sheet review status");
        Ok(true)
    }

    async fn update_approvals(
        &self,
        number: u64,
        summary: &ApprovalSummary,
        status: PrState,
    ) -> Result<bool> {
        let Some(row) = self.find_row(number).await? else {
            tracing::debug!(pr = number, "no sheet row to update");
            return Ok(false);
        };
        self.write(&format!("C{row}"), vec![vec![json!(status.to_string())]])
            .await?;
        self.write(&format!("F{row}"), vec![vec![json!(summary.approvals_cell())]])
            .await?;
        self.write(&format!("H{row}"), vec![vec![json!(now())]]).await?;
        tracing::info!(pr = number, approved = summary.approved, "updated sheet approvals");
        Ok(true)
    }

    async fn rows(&self) -> Result<Vec<SheetRow>> {
        Ok(parse_rows(&self.read("A:H").await?))
    }

    async fn clear(&self) -> Result<()> {
        let range = self.range("A2:H");
        let clear = format!("{range}:clear");
        let _: Value = self
            .rest
            .post(
                &["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", clear.as_str()],
                &[],
                &json!({}),
            )
            .await?;
        tracing::info!(worksheet = %self.worksheet, "cleared tracking data");
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.read("A1").await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "sheet connection test failed");
                false
            }
        }
    }
}

/// Aggregate counts over tracking rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetStatistics {
    pub total_prs: u64,
    pub open_prs: u64,
    pub closed_prs: u64,
    pub approved_prs: u64,
    pub pending_reviews: u64,
    /// Percentage of rows approved, `0.0` when there are none.
    pub approval_rate: f64,
}

/// Compute [`SheetStatistics`] over `rows`.
///
/// # Examples
///
/// ```
/// use prpilot_review::sheets::statistics;
///
/// let stats = statistics(&[]);
/// assert_eq!(stats.total_prs, 0);
/// assert_eq!(stats.approval_rate, 0.0);
/// ```
pub fn statistics(rows: &[SheetRow]) -> SheetStatistics {
    let total_prs = rows.len() as u64;
    let approved_prs = count_rows(rows, |r| r.approvals.contains('\u{2705}'));
    SheetStatistics {
        total_prs,
        open_prs: count_rows(rows, |r| r.status == "open"),
        closed_prs: count_rows(rows, |r| r.status == "closed"),
        approved_prs,
        pending_reviews: count_rows(rows, |r| r.review_status == "pending"),
        approval_rate: if total_prs == 0 {
            0.0
        } else {
            approved_prs as f64 / total_prs as f64 * 100.0
        },
    }
}

fn count_rows(rows: &[SheetRow], pred: impl Fn(&SheetRow) -> bool) -> u64 {
    rows.iter().filter(|r| pred(r)).count() as u64
}
