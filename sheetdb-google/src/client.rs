//! Sheets v4 REST client.

use crate::auth::{ServiceAccountAuth, ServiceAccountKey};
use crate::config::GoogleConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sheetdb_backend::{
    BatchUpdateRowsRequest, BatchUpdateRowsResult, InsertRowsResult, QueryRowsResult,
    SheetsBackend, UpdateRowsResult,
};
use sheetdb_core::{BackendError, BackendResult, CellValue, ConfigError, SheetDbError, SheetDbResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

const VALUE_INPUT: &str = "USER_ENTERED";
const VALUE_RENDER: &str = "UNFORMATTED_VALUE";
const QUERY_HANDLER: &str = "sheetdb";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<CellValue>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateValuesResponse {
    #[serde(default)]
    updated_range: String,
    #[serde(default)]
    updated_rows: u64,
    #[serde(default)]
    updated_columns: u64,
    #[serde(default)]
    updated_cells: u64,
    #[serde(default)]
    updated_data: Option<ValueRange>,
}

impl From<UpdateValuesResponse> for UpdateRowsResult {
    fn from(r: UpdateValuesResponse) -> Self {
        UpdateRowsResult {
            updated_range: r.updated_range,
            updated_rows: r.updated_rows,
            updated_columns: r.updated_columns,
            updated_cells: r.updated_cells,
            updated_values: r.updated_data.map(|d| d.values).unwrap_or_default(),
        }
    }
}

impl From<UpdateValuesResponse> for InsertRowsResult {
    fn from(r: UpdateValuesResponse) -> Self {
        InsertRowsResult {
            updated_range: r.updated_range,
            updated_rows: r.updated_rows,
            updated_columns: r.updated_columns,
            updated_cells: r.updated_cells,
            inserted_values: r.updated_data.map(|d| d.values).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppendValuesResponse {
    #[serde(default)]
    updates: Option<UpdateValuesResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateValuesResponse {
    #[serde(default)]
    responses: Vec<UpdateValuesResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchClearResponse {
    #[serde(default)]
    cleared_ranges: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_id: String,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// Visualization query response.

#[derive(Debug, Deserialize)]
struct GvizResponse {
    status: String,
    #[serde(default)]
    errors: Vec<GvizError>,
    #[serde(default)]
    table: Option<GvizTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GvizError {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    detailed_message: String,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: CellValue,
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

/// Map a non-success response to a backend error.
pub(crate) fn api_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth { reason: message },
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Rewrite a duplicate-name failure from `addSheet`.
fn sheet_exists(err: BackendError, name: &str) -> BackendError {
    match err {
        BackendError::Api { message, .. } if message.contains("already exists") => {
            BackendError::SheetExists {
                sheet: name.to_string(),
            }
        }
        other => other,
    }
}

fn not_found(err: BackendError, spreadsheet_id: &str) -> BackendError {
    match err {
        BackendError::Api { status: 404, .. } => BackendError::SpreadsheetNotFound {
            spreadsheet_id: spreadsheet_id.to_string(),
        },
        other => other,
    }
}

/// Values for the wire. An empty cell is sent as `""`, since `null` means
/// "leave unchanged" to the API.
pub(crate) fn wire_rows(rows: Vec<Vec<CellValue>>) -> Vec<Vec<Value>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    CellValue::Null => Value::String(String::new()),
                    CellValue::Bool(b) => Value::Bool(b),
                    CellValue::Number(n) => json!(n),
                    CellValue::Text(s) => Value::String(s),
                })
                .collect()
        })
        .collect()
}

/// Parse a visualization query response wrapped in a JSONP callback.
pub(crate) fn parse_query_response(body: &str) -> BackendResult<QueryRowsResult> {
    let start = body.find('(');
    let end = body.rfind(')');
    let payload = match (start, end) {
        (Some(start), Some(end)) if start < end => &body[start + 1..end],
        _ => {
            return Err(BackendError::UnexpectedResponse {
                reason: "query response is not wrapped in a callback".to_string(),
            })
        }
    };

    let response: GvizResponse =
        serde_json::from_str(payload).map_err(|e| BackendError::UnexpectedResponse {
            reason: format!("malformed query response: {e}"),
        })?;

    if response.status == "error" {
        let message = response
            .errors
            .iter()
            .map(|e| {
                if e.detailed_message.is_empty() {
                    e.reason.clone()
                } else {
                    e.detailed_message.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(BackendError::Api {
            status: 400,
            message: format!("Invalid query: {message}"),
        });
    }

    let rows = response
        .table
        .map(|t| t.rows)
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.c
                .into_iter()
                .map(|cell| cell.map(|c| c.v).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(QueryRowsResult { rows })
}

// ============================================================================
// CLIENT
// ============================================================================

/// [`SheetsBackend`] over the Google Sheets v4 REST API.
pub struct GoogleSheetsClient {
    http: Client,
    auth: Arc<ServiceAccountAuth>,
    sheets_base_url: String,
    query_base_url: String,
}

impl GoogleSheetsClient {
    pub fn new(
        http: Client,
        auth: Arc<ServiceAccountAuth>,
        sheets_base_url: impl Into<String>,
        query_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            sheets_base_url: sheets_base_url.into().trim_end_matches('/').to_string(),
            query_base_url: query_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from validated config, reading the service-account key.
    pub fn from_config(config: &GoogleConfig) -> SheetDbResult<Self> {
        config.validate()?;
        let key = ServiceAccountKey::from_file(&config.credentials_path)?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                SheetDbError::from(ConfigError::InvalidValue {
                    field: "request_timeout".to_string(),
                    value: format!("{:?}", config.request_timeout),
                    reason: format!("failed to build HTTP client: {e}"),
                })
            })?;
        let auth = ServiceAccountAuth::new(key, config.scopes.clone(), http.clone());
        Ok(Self::new(
            http,
            Arc::new(auth),
            config.sheets_base_url.clone(),
            config.query_base_url.clone(),
        ))
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/spreadsheets/{}",
            self.sheets_base_url,
            urlencoding::encode(spreadsheet_id)
        )
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    pub(crate) fn query_url(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        query: &str,
        skip_header: bool,
    ) -> String {
        format!(
            "{}/{}/gviz/tq?tqx=responseHandler:{}&sheet={}&tq={}&headers={}",
            self.query_base_url,
            urlencoding::encode(spreadsheet_id),
            QUERY_HANDLER,
            urlencoding::encode(sheet_name),
            urlencoding::encode(query),
            if skip_header { 1 } else { 0 }
        )
    }

    async fn send_text(&self, request: RequestBuilder) -> BackendResult<String> {
        let bearer = self.auth.bearer().await?;
        let response = request
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            response.text().await.map_err(|e| BackendError::Transport {
                reason: format!("failed to read response: {e}"),
            })
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(api_error(status, &body))
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let body = self.send_text(request).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::UnexpectedResponse {
            reason: format!("failed to parse response: {e}"),
        })
    }

    async fn append(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
        insert_option: &str,
    ) -> BackendResult<InsertRowsResult> {
        let url = format!("{}:append", self.values_url(spreadsheet_id, range));
        let request = self
            .http
            .post(&url)
            .query(&[
                ("valueInputOption", VALUE_INPUT),
                ("insertDataOption", insert_option),
                ("includeValuesInResponse", "true"),
                ("responseValueRenderOption", VALUE_RENDER),
            ])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": wire_rows(rows),
            }));
        let response: AppendValuesResponse = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        let result: InsertRowsResult = response.updates.unwrap_or_default().into();
        trace!(range, insert_option, updated_range = %result.updated_range, "append");
        Ok(result)
    }
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("sheets_base_url", &self.sheets_base_url)
            .field("query_base_url", &self.query_base_url)
            .field("auth", &self.auth)
            .finish()
    }
}

#[async_trait]
impl SheetsBackend for GoogleSheetsClient {
    async fn create_spreadsheet(&self, title: &str) -> BackendResult<String> {
        let url = format!("{}/spreadsheets", self.sheets_base_url);
        let request = self
            .http
            .post(&url)
            .json(&json!({ "properties": { "title": title } }));
        let created: Spreadsheet = self.send(request).await?;
        trace!(spreadsheet_id = %created.spreadsheet_id, title, "create_spreadsheet");
        Ok(created.spreadsheet_id)
    }

    async fn sheet_ids(&self, spreadsheet_id: &str) -> BackendResult<HashMap<String, i64>> {
        let request = self
            .http
            .get(self.spreadsheet_url(spreadsheet_id))
            .query(&[("fields", "spreadsheetId,sheets.properties(sheetId,title)")]);
        let spreadsheet: Spreadsheet = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| (s.properties.title, s.properties.sheet_id))
            .collect())
    }

    async fn create_sheet(&self, spreadsheet_id: &str, name: &str) -> BackendResult<()> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id));
        let request = self.http.post(&url).json(&json!({
            "requests": [{ "addSheet": { "properties": { "title": name } } }]
        }));
        self.send::<Value>(request)
            .await
            .map_err(|e| sheet_exists(not_found(e, spreadsheet_id), name))?;
        trace!(sheet = name, "create_sheet");
        Ok(())
    }

    async fn delete_sheets(&self, spreadsheet_id: &str, sheet_ids: &[i64]) -> BackendResult<()> {
        if sheet_ids.is_empty() {
            return Ok(());
        }
        let requests: Vec<Value> = sheet_ids
            .iter()
            .map(|id| json!({ "deleteSheet": { "sheetId": id } }))
            .collect();
        let url = format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id));
        let request = self.http.post(&url).json(&json!({ "requests": requests }));
        self.send::<Value>(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        trace!(count = sheet_ids.len(), "delete_sheets");
        Ok(())
    }

    async fn insert_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult> {
        self.append(spreadsheet_id, range, rows, "INSERT_ROWS").await
    }

    async fn overwrite_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<InsertRowsResult> {
        self.append(spreadsheet_id, range, rows, "OVERWRITE").await
    }

    async fn update_rows(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<CellValue>>,
    ) -> BackendResult<UpdateRowsResult> {
        let request = self
            .http
            .put(self.values_url(spreadsheet_id, range))
            .query(&[
                ("valueInputOption", VALUE_INPUT),
                ("includeValuesInResponse", "true"),
                ("responseValueRenderOption", VALUE_RENDER),
            ])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": wire_rows(rows),
            }));
        let response: UpdateValuesResponse = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        trace!(range, updated_cells = response.updated_cells, "update_rows");
        Ok(response.into())
    }

    async fn batch_update_rows(
        &self,
        spreadsheet_id: &str,
        requests: Vec<BatchUpdateRowsRequest>,
    ) -> BackendResult<BatchUpdateRowsResult> {
        let data: Vec<Value> = requests
            .into_iter()
            .map(|r| {
                json!({
                    "range": r.range,
                    "majorDimension": "ROWS",
                    "values": wire_rows(r.values),
                })
            })
            .collect();
        let count = data.len();
        let url = format!("{}/values:batchUpdate", self.spreadsheet_url(spreadsheet_id));
        let request = self.http.post(&url).json(&json!({
            "valueInputOption": VALUE_INPUT,
            "includeValuesInResponse": true,
            "responseValueRenderOption": VALUE_RENDER,
            "data": data,
        }));
        let response: BatchUpdateValuesResponse = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        trace!(ranges = count, "batch_update_rows");
        Ok(BatchUpdateRowsResult {
            responses: response.responses.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_rows(&self, spreadsheet_id: &str, range: &str) -> BackendResult<Vec<Vec<CellValue>>> {
        let request = self.http.get(self.values_url(spreadsheet_id, range)).query(&[
            ("majorDimension", "ROWS"),
            ("valueRenderOption", VALUE_RENDER),
        ]);
        let response: ValueRange = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        trace!(range, rows = response.values.len(), "get_rows");
        Ok(response.values)
    }

    async fn query_rows(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        query: &str,
        skip_header: bool,
    ) -> BackendResult<QueryRowsResult> {
        let url = self.query_url(spreadsheet_id, sheet_name, query, skip_header);
        let body = self
            .send_text(self.http.get(&url))
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        let result = parse_query_response(&body)?;
        trace!(sheet = sheet_name, query, rows = result.rows.len(), "query_rows");
        Ok(result)
    }

    async fn clear(&self, spreadsheet_id: &str, ranges: &[String]) -> BackendResult<Vec<String>> {
        let url = format!("{}/values:batchClear", self.spreadsheet_url(spreadsheet_id));
        let request = self.http.post(&url).json(&json!({ "ranges": ranges }));
        let response: BatchClearResponse = self
            .send(request)
            .await
            .map_err(|e| not_found(e, spreadsheet_id))?;
        trace!(ranges = ?response.cleared_ranges, "clear");
        Ok(response.cleared_ranges)
    }
}
