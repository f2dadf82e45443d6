//! Page fetchers for the two remote API dialects.
//!
//! Uses enum dispatch over the dialects, like the rest of the runner's
//! HTTP backends. Both dialects answer with a JSON envelope; the envelope
//! says whether the query succeeded and carries the page of records.
//!
//! | Dialect | Request | Token | Success | Records |
//! |---------|---------|-------|---------|---------|
//! | v1 | `GET events` / `GET alerts`, JSON body | `token` query param | `status == "success"` | `data` |
//! | v2 | `GET events/data/{category}`, query params | `Netskope-Api-Token` header | `ok == 1` | `result` |

use reqwest::Url;
use serde_json::{Value, json};
use tracing::debug;
use vigil_core::config::ApiConfig;
use vigil_core::{FetchError, PageFetcher, PageRequest, PageResult};
use vigil_types::{ApiVersion, EventCategory, EventRecord};

use crate::error::RunnerError;
use crate::transport::Transport;

/// Header carrying the token for the v2 dialect.
const V2_TOKEN_HEADER: &str = "Netskope-Api-Token";

/// A page fetcher speaking the configured API dialect.
#[derive(Debug, Clone)]
pub enum ApiClient {
    /// Legacy dialect: token in the query string, filters in a JSON body.
    V1(V1Client),
    /// Current dialect: token in a header, filters in the query string.
    V2(V2Client),
}

impl ApiClient {
    /// Build the client for `config.version`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Client`] if the URL is unusable or the HTTP
    /// client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, RunnerError> {
        let transport = Transport::new(config)?;
        let base = base_url(&config.url, config.version)?;
        let token = config.token.clone().unwrap_or_default();
        Ok(match config.version {
            ApiVersion::V1 => Self::V1(V1Client {
                transport,
                base,
                token,
            }),
            ApiVersion::V2 => Self::V2(V2Client {
                transport,
                base,
                token,
            }),
        })
    }

    /// Dialect name for logging.
    pub const fn version(&self) -> ApiVersion {
        match self {
            Self::V1(_) => ApiVersion::V1,
            Self::V2(_) => ApiVersion::V2,
        }
    }
}

impl PageFetcher for ApiClient {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        match self {
            Self::V1(client) => client.fetch(request).await,
            Self::V2(client) => client.fetch(request).await,
        }
    }
}

/// `{url}/api/{version}/`, replacing any path already on `url`.
fn base_url(url: &str, version: ApiVersion) -> Result<Url, RunnerError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| RunnerError::Client(format!("invalid api.url {url:?}: {e}")))?;
    parsed
        .join(&format!("/api/{}/", version.as_str()))
        .map_err(|e| RunnerError::Client(format!("invalid api.url {url:?}: {e}")))
}

fn join(base: &Url, path: &str) -> Result<Url, FetchError> {
    base.join(path)
        .map_err(|e| FetchError::Decode(format!("cannot build request URL for {path}: {e}")))
}

fn build_error(e: &reqwest::Error) -> FetchError {
    FetchError::Transport {
        attempts: 0,
        message: format!("cannot build request: {e}"),
    }
}

// ---------------------------------------------------------------------------
// v1
// ---------------------------------------------------------------------------

/// Fetcher for the v1 dialect.
#[derive(Clone)]
pub struct V1Client {
    transport: Transport,
    base: Url,
    token: String,
}

impl std::fmt::Debug for V1Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V1Client")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl V1Client {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        let (path, body) = v1_request(request);
        let url = join(&self.base, path)?;
        debug!(category = %request.category, offset = request.offset, url = %url, "v1 page request");

        let http = self
            .transport
            .client()
            .get(url)
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .build()
            .map_err(|e| build_error(&e))?;

        let response = self.transport.execute(http).await?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        parse_v1(envelope)
    }
}

/// Path and JSON body for a v1 page request. Alerts have their own
/// endpoint and take no `type`.
fn v1_request(request: &PageRequest) -> (&'static str, Value) {
    let mut body = json!({
        "starttime": request.since,
        "endtime": request.until,
        "limit": request.page_size,
        "skip": request.offset,
    });
    if request.category == EventCategory::Alert {
        return ("alerts", body);
    }
    if let Some(map) = body.as_object_mut() {
        map.insert("type".to_owned(), Value::from(request.category.as_str()));
    }
    ("events", body)
}

/// Interpret a v1 envelope.
fn parse_v1(envelope: Value) -> Result<PageResult, FetchError> {
    let status = envelope.get("status").and_then(Value::as_str);
    if status != Some("success") {
        let errors = envelope.get("errors").map(Value::to_string).unwrap_or_default();
        return Ok(PageResult::Rejected {
            reason: format!("status {}: {errors}", status.unwrap_or("missing")),
        });
    }
    records_under(envelope, "data")
}

// ---------------------------------------------------------------------------
// v2
// ---------------------------------------------------------------------------

/// Fetcher for the v2 dialect.
#[derive(Clone)]
pub struct V2Client {
    transport: Transport,
    base: Url,
    token: String,
}

impl std::fmt::Debug for V2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V2Client")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl V2Client {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        let url = join(&self.base, &format!("events/data/{}", request.category))?;
        debug!(category = %request.category, offset = request.offset, url = %url, "v2 page request");

        let http = self
            .transport
            .client()
            .get(url)
            .header(V2_TOKEN_HEADER, self.token.as_str())
            .query(&v2_query(request))
            .build()
            .map_err(|e| build_error(&e))?;

        let response = self.transport.execute(http).await?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        parse_v2(envelope)
    }
}

/// Query parameters for a v2 page request.
fn v2_query(request: &PageRequest) -> Vec<(&'static str, String)> {
    let mut query = Vec::with_capacity(4);
    if let Some(since) = request.since {
        query.push(("starttime", since.to_string()));
    }
    query.push(("endtime", request.until.to_string()));
    query.push(("limit", request.page_size.to_string()));
    query.push(("skip", request.offset.to_string()));
    query
}

/// Interpret a v2 envelope.
fn parse_v2(envelope: Value) -> Result<PageResult, FetchError> {
    if envelope.get("ok").and_then(Value::as_i64) != Some(1) {
        let ok = envelope.get("ok").map_or_else(|| "missing".to_owned(), Value::to_string);
        let message = envelope
            .get("message")
            .or_else(|| envelope.get("error"))
            .map(Value::to_string)
            .unwrap_or_default();
        return Ok(PageResult::Rejected {
            reason: format!("ok {ok}: {message}"),
        });
    }
    records_under(envelope, "result")
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Records of a successful envelope. A missing or null array is an empty
/// page.
fn records_under(mut envelope: Value, key: &str) -> Result<PageResult, FetchError> {
    match envelope.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(PageResult::Page(Vec::new())),
        Some(Value::Array(items)) => Ok(PageResult::Page(
            items.into_iter().map(EventRecord::from_value).collect(),
        )),
        Some(other) => Err(FetchError::Decode(format!(
            "expected an array under {key:?}, got {}",
            type_name(&other)
        ))),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn request(category: EventCategory) -> PageRequest {
        PageRequest {
            category,
            since: Some(1_700_000_000),
            until: 1_700_003_600,
            offset: 20_000,
            page_size: 10_000,
        }
    }

    fn page(result: Result<PageResult, FetchError>) -> Vec<EventRecord> {
        match result.unwrap() {
            PageResult::Page(records) => records,
            PageResult::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn base_url_replaces_path() {
        let url = base_url("https://tenant.goskope.com", ApiVersion::V2).unwrap();
        assert_eq!(url.as_str(), "https://tenant.goskope.com/api/v2/");

        let url = base_url("https://tenant.goskope.com/ui/", ApiVersion::V1).unwrap();
        assert_eq!(url.as_str(), "https://tenant.goskope.com/api/v1/");

        assert!(base_url("tenant without scheme", ApiVersion::V2).is_err());
    }

    #[test]
    fn v1_event_request_carries_type() {
        let (path, body) = v1_request(&request(EventCategory::Network));
        assert_eq!(path, "events");
        assert_eq!(
            body,
            json!({
                "starttime": 1_700_000_000,
                "endtime": 1_700_003_600,
                "limit": 10_000,
                "skip": 20_000,
                "type": "network",
            })
        );
    }

    #[test]
    fn v1_alert_request_uses_alerts_endpoint() {
        let (path, body) = v1_request(&request(EventCategory::Alert));
        assert_eq!(path, "alerts");
        assert!(body.get("type").is_none());
        assert_eq!(body["skip"], 20_000);
    }

    #[test]
    fn v2_query_params() {
        let query = v2_query(&request(EventCategory::Page));
        assert_eq!(
            query,
            vec![
                ("starttime", "1700000000".to_owned()),
                ("endtime", "1700003600".to_owned()),
                ("limit", "10000".to_owned()),
                ("skip", "20000".to_owned()),
            ]
        );

        let mut unseeded = request(EventCategory::Page);
        unseeded.since = None;
        assert_eq!(v2_query(&unseeded).len(), 3);
    }

    #[test]
    fn v1_success_envelope() {
        let records = page(parse_v1(json!({
            "status": "success",
            "data": [
                {"_id": "b", "timestamp": 12, "type": "nspolicy"},
                {"_id": "a", "timestamp": 10},
            ]
        })));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id().map(|id| id.as_str()), Some("b"));
        assert_eq!(records[0].timestamp(), Some(12));
        assert_eq!(records[0].get("type"), Some(&json!("nspolicy")));
    }

    #[test]
    fn v1_error_status_is_rejected() {
        let result = parse_v1(json!({"status": "error", "errors": ["Invalid token"]})).unwrap();
        match result {
            PageResult::Rejected { reason } => assert!(reason.contains("Invalid token")),
            PageResult::Page(_) => panic!("expected rejection"),
        }
        assert!(matches!(
            parse_v1(json!({})).unwrap(),
            PageResult::Rejected { .. }
        ));
    }

    #[test]
    fn v2_success_envelope() {
        let records = page(parse_v2(json!({
            "ok": 1,
            "result": [{"_id": 7, "timestamp": "1700000000"}],
            "wait_time": 0
        })));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id().map(|id| id.as_str()), Some("7"));
        assert_eq!(records[0].timestamp(), Some(1_700_000_000));
    }

    #[test]
    fn v2_not_ok_is_rejected() {
        assert!(matches!(
            parse_v2(json!({"ok": 0, "message": "rate limited"})).unwrap(),
            PageResult::Rejected { .. }
        ));
        assert!(matches!(
            parse_v2(json!({"result": []})).unwrap(),
            PageResult::Rejected { .. }
        ));
    }

    #[test]
    fn missing_records_is_empty_page() {
        assert!(page(parse_v2(json!({"ok": 1}))).is_empty());
        assert!(page(parse_v1(json!({"status": "success", "data": null}))).is_empty());
    }

    #[test]
    fn non_array_records_fail_to_decode() {
        let err = parse_v2(json!({"ok": 1, "result": {"oops": true}})).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn non_object_records_are_kept() {
        let records = page(parse_v2(json!({"ok": 1, "result": ["raw line"]})));
        assert_eq!(records.len(), 1);
        assert!(records[0].is_malformed());
    }

    #[test]
    fn client_matches_configured_version() {
        let config = ApiConfig {
            url: "https://tenant.goskope.com".to_owned(),
            version: ApiVersion::V1,
            token: Some("t".to_owned()),
            ..ApiConfig::default()
        };
        assert_eq!(ApiClient::new(&config).unwrap().version(), ApiVersion::V1);
    }
}
