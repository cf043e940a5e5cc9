use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{FlakersError, Result};
use crate::traits::SessionDriver;
use crate::types::{RawQueryResult, SqlValue};

const LOGIN_PATH: &str = "/session/v1/login-request";
const QUERY_PATH: &str = "/queries/v1/query-request";
const SESSION_PATH: &str = "/session";
const ACCEPT_SNOWFLAKE: &str = "application/snowflake";
const RESULT_FORMAT_PARAMETER: &str = "QUERY_RESULT_FORMAT";
const IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];
const POLL_INITIAL_DELAY: Duration = Duration::from_millis(50);
const POLL_MAX_DELAY: Duration = Duration::from_secs(1);
const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";
const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";

/// Driver for the Snowflake REST protocol.
///
/// Logs in with user name and password and deletes the remote session on
/// close. Statements that are still running when the service answers are
/// polled until they finish or `NETWORK_TIMEOUT` elapses.
pub struct SnowflakeRestDriver {
    http: reqwest::Client,
    base: Url,
    token: Mutex<Option<String>>,
    sequence: AtomicU64,
    network_timeout: Duration,
}

impl SnowflakeRestDriver {
    /// Log in and open a remote session.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.network_timeout)
            .timeout(config.network_timeout)
            .gzip(true)
            .build()
            .map_err(|e| FlakersError::ConnectionFailed(e.to_string()))?;

        let account = config.account_name();
        let mut url = endpoint(&config.url, LOGIN_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("request_id", &Uuid::new_v4().to_string());
            if let Some(db) = &config.database {
                query.append_pair("databaseName", db);
            }
            if let Some(schema) = &config.schema {
                query.append_pair("schemaName", schema);
            }
            if let Some(warehouse) = &config.warehouse {
                query.append_pair("warehouse", warehouse);
            }
            if let Some(role) = &config.role {
                query.append_pair("roleName", role);
            }
        }

        let body = LoginRequest {
            data: LoginData {
                client_app_id: env!("CARGO_PKG_NAME"),
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: &account,
                login_name: &config.user,
                password: &config.password,
                session_parameters: session_parameters(&config.parameters),
            },
        };

        let response = http
            .post(url)
            .header(ACCEPT, ACCEPT_SNOWFLAKE)
            .json(&body)
            .send()
            .await
            .map_err(|e| FlakersError::ConnectionFailed(e.to_string()))?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(FlakersError::AuthenticationFailed(format!(
                "login rejected with HTTP {}",
                response.status()
            )));
        }
        let envelope: Envelope<LoginResponseData> = read_envelope(response)
            .await
            .map_err(FlakersError::ConnectionFailed)?;
        let data = envelope
            .into_data()
            .map_err(FlakersError::AuthenticationFailed)?;

        tracing::info!(
            account = %account,
            user = %config.user,
            session_id = ?data.session_id,
            "snowflake session opened"
        );

        Ok(Self {
            http,
            base: config.url.clone(),
            token: Mutex::new(Some(data.token)),
            sequence: AtomicU64::new(0),
            network_timeout: config.network_timeout,
        })
    }

    fn token(&self) -> Result<String> {
        self.token
            .lock()
            .map_err(|_| poisoned())?
            .clone()
            .ok_or(FlakersError::SessionClosed)
    }

    async fn fetch_chunk(
        &self,
        chunk: &Chunk,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<Vec<Value>>> {
        let mut request = self.http.get(&chunk.url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                FlakersError::QueryFailed(format!("result chunk download failed: {}", e))
            })?;
        let body = response
            .text()
            .await
            .map_err(|e| FlakersError::QueryFailed(e.to_string()))?;
        parse_chunk(&body)
    }

    /// Follow `getResultUrl` until the statement leaves the in-progress state.
    async fn wait_for_result(
        &self,
        token: &str,
        mut envelope: Envelope<QueryResponseData>,
    ) -> Result<QueryResponseData> {
        let deadline = Instant::now() + self.network_timeout;
        let mut delay = POLL_INITIAL_DELAY;
        while envelope.in_progress() {
            let result_url = envelope
                .data
                .as_ref()
                .and_then(|data| data.get_result_url.as_deref())
                .ok_or_else(|| {
                    FlakersError::QueryFailed(
                        "query is still running but no result URL was returned".to_string(),
                    )
                })?;
            let url = self.base.join(result_url).map_err(|e| {
                FlakersError::QueryFailed(format!("invalid result URL {:?}: {}", result_url, e))
            })?;
            if Instant::now() + delay > deadline {
                return Err(FlakersError::QueryFailed(format!(
                    "query did not finish within {:?}",
                    self.network_timeout
                )));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX_DELAY);

            tracing::debug!(%url, "query still running, polling for result");
            let response = self
                .http
                .get(url)
                .header(ACCEPT, ACCEPT_SNOWFLAKE)
                .header(AUTHORIZATION, authorization(token))
                .send()
                .await
                .map_err(|e| FlakersError::QueryFailed(e.to_string()))?;
            envelope = read_envelope(response)
                .await
                .map_err(FlakersError::QueryFailed)?;
        }
        envelope.into_data().map_err(FlakersError::QueryFailed)
    }
}

#[async_trait]
impl SessionDriver for SnowflakeRestDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let token = self.token()?;
        let request_id = Uuid::new_v4();
        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let mut url = endpoint(&self.base, QUERY_PATH);
        url.query_pairs_mut()
            .append_pair("requestId", &request_id.to_string());

        let body = QueryRequest {
            sql_text: sql,
            sequence_id,
            async_exec: false,
            describe_only: false,
            bindings: bindings(params),
        };

        tracing::debug!(%request_id, sequence_id, sql, "executing");
        let response = self
            .http
            .post(url)
            .header(ACCEPT, ACCEPT_SNOWFLAKE)
            .header(AUTHORIZATION, authorization(&token))
            .json(&body)
            .send()
            .await
            .map_err(|e| FlakersError::QueryFailed(e.to_string()))?;

        let envelope: Envelope<QueryResponseData> = read_envelope(response)
            .await
            .map_err(FlakersError::QueryFailed)?;
        let data = self.wait_for_result(&token, envelope).await?;

        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(FlakersError::QueryFailed(format!(
                    "unsupported result format {}",
                    format
                )));
            }
        }

        let headers = chunk_headers(&data);
        let mut rowset = data.rowset;
        for chunk in &data.chunks {
            rowset.extend(self.fetch_chunk(chunk, &headers).await?);
        }
        tracing::debug!(query_id = ?data.query_id, rows = rowset.len(), "query finished");

        let columns = data.rowtype.into_iter().map(|t| t.name).collect();
        let rows = rowset
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();
        Ok(RawQueryResult::new(columns, rows))
    }

    async fn close(&self) -> Result<()> {
        let token = self
            .token
            .lock()
            .map_err(|_| poisoned())?
            .take();
        let Some(token) = token else {
            return Ok(());
        };

        let mut url = endpoint(&self.base, SESSION_PATH);
        url.query_pairs_mut()
            .append_pair("delete", "true")
            .append_pair("request_id", &Uuid::new_v4().to_string());

        let response = self
            .http
            .post(url)
            .header(ACCEPT, ACCEPT_SNOWFLAKE)
            .header(AUTHORIZATION, authorization(&token))
            .send()
            .await
            .map_err(|e| FlakersError::ConnectionFailed(e.to_string()))?;
        let envelope: Envelope<Value> = read_envelope(response)
            .await
            .map_err(FlakersError::ConnectionFailed)?;
        if !envelope.success {
            return Err(FlakersError::ConnectionFailed(envelope.failure_message()));
        }
        tracing::info!("snowflake session closed");
        Ok(())
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    data: LoginData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
    session_parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponseData {
    token: String,
    #[serde(default)]
    session_id: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    sequence_id: u64,
    async_exec: bool,
    describe_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bindings: Option<BTreeMap<String, Binding>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Binding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponseData {
    #[serde(default)]
    rowtype: Vec<ColumnType>,
    #[serde(default)]
    rowset: Vec<Vec<Value>>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    get_result_url: Option<String>,
    #[serde(default)]
    qrmk: Option<String>,
}

#[derive(Deserialize)]
struct ColumnType {
    name: String,
}

#[derive(Deserialize)]
struct Chunk {
    url: String,
}

/// Common response wrapper of the REST protocol.
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
    code: Option<Value>,
    success: bool,
}

impl<T> Envelope<T> {
    fn in_progress(&self) -> bool {
        self.success
            && self
                .code
                .clone()
                .and_then(cell_to_string)
                .is_some_and(|code| IN_PROGRESS_CODES.contains(&code.as_str()))
    }

    fn failure_message(&self) -> String {
        let message = self.message.as_deref().unwrap_or("request was not successful");
        match self.code.clone().and_then(cell_to_string) {
            Some(code) => format!("{} (code {})", message, code),
            None => message.to_string(),
        }
    }

    fn into_data(self) -> std::result::Result<T, String> {
        if !self.success {
            return Err(self.failure_message());
        }
        self.data
            .ok_or_else(|| "response carried no data".to_string())
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<Envelope<T>, String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(format!("HTTP {}: {}", status, body));
    }
    serde_json::from_str(&body).map_err(|e| format!("malformed response: {}", e))
}

fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(None);
    url
}

fn poisoned() -> FlakersError {
    FlakersError::ConnectionFailed("session token lock poisoned".to_string())
}

fn authorization(token: &str) -> String {
    format!("Snowflake Token=\"{}\"", token)
}

fn session_parameters(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut parameters = extra.clone();
    if let Some(format) = parameters.get(RESULT_FORMAT_PARAMETER) {
        if !format.eq_ignore_ascii_case("json") {
            tracing::warn!(format = %format, "only JSON results are supported, overriding {}", RESULT_FORMAT_PARAMETER);
        }
    }
    parameters.insert(RESULT_FORMAT_PARAMETER.to_string(), "JSON".to_string());
    parameters
}

fn bindings(params: &[SqlValue]) -> Option<BTreeMap<String, Binding>> {
    if params.is_empty() {
        return None;
    }
    let bindings = params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let (kind, value) = match value {
                SqlValue::Null => ("ANY", None),
                SqlValue::Text(s) => ("TEXT", Some(s.clone())),
                SqlValue::Int32(v) => ("FIXED", Some(v.to_string())),
                SqlValue::Int64(v) => ("FIXED", Some(v.to_string())),
                SqlValue::Float64(v) => ("REAL", Some(v.to_string())),
                SqlValue::Bool(v) => ("BOOLEAN", Some(v.to_string())),
            };
            ((i + 1).to_string(), Binding { kind, value })
        })
        .collect();
    Some(bindings)
}

/// Headers for result chunk downloads. Without explicit `chunkHeaders` the
/// chunks are encrypted with the query result master key (`qrmk`).
fn chunk_headers(data: &QueryResponseData) -> HashMap<String, String> {
    if !data.chunk_headers.is_empty() {
        return data.chunk_headers.clone();
    }
    match &data.qrmk {
        Some(key) => HashMap::from([
            (SSE_C_ALGORITHM_HEADER.to_string(), "AES256".to_string()),
            (SSE_C_KEY_HEADER.to_string(), key.clone()),
        ]),
        None => HashMap::new(),
    }
}

fn cell_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Chunk bodies are comma-separated JSON arrays without the enclosing brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<Value>>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let wrapped = if trimmed.starts_with("[[") || trimmed == "[]" {
        trimmed.to_string()
    } else {
        format!("[{}]", trimmed)
    };
    serde_json::from_str(&wrapped)
        .map_err(|e| FlakersError::QueryFailed(format!("malformed result chunk: {}", e)))
}
