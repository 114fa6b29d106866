//! REST client for the attendance document store
//!
//! The store exposes each collection as a PostgREST table under
//! `/rest/v1/<collection>`. This crate covers the subset the attendance
//! workspace needs:
//!
//! - Query API (`select`, `insert`, `upsert`, `update`)
//! - Filtering (`eq`)
//! - Ordering and limits
//! - Unique-key violation detection for conditional creates

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// SQLSTATE reported by the store when a primary or unique key already exists.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Structured error body returned by the REST API
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors produced by [`PostgrestClient`]
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// Whether the store refused a write because the key already exists.
    ///
    /// A plain `insert` on an existing primary key answers `409 Conflict`
    /// with SQLSTATE `23505`; either signal is accepted.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            PostgrestError::ApiError { details, status } => {
                details.code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
                    || *status == StatusCode::CONFLICT
            }
            PostgrestError::UnparsedApiError { status, .. } => *status == StatusCode::CONFLICT,
            _ => false,
        }
    }

    /// HTTP status of an API failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(err) => err.status(),
            _ => None,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Client for one collection of the document store
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl PostgrestClient {
    /// Create a client for `table` on the store at `base_url`
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
            timeout: None,
        }
    }

    /// Add a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Send requests with a user access token
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    /// Equality filter
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    /// Order by a column
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let direction = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, direction));
        self
    }

    /// Cap the number of rows returned
    pub fn limit(mut self, count: i32) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    /// Column used to detect duplicates on upsert
    pub fn on_conflict(mut self, column: &str) -> Self {
        self.query_params
            .insert("on_conflict".to_string(), column.to_string());
        self
    }

    /// Fetch the matching rows
    pub async fn execute<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self
            .prepare(self.http_client.get(&url), self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch the first matching row, if any
    pub async fn execute_one<T: for<'de> Deserialize<'de>>(
        self,
    ) -> Result<Option<T>, PostgrestError> {
        let rows = self.limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert rows. Fails with a unique violation if a key already exists.
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("POST {}", url);

        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        let response = self
            .prepare(self.http_client.post(&url), headers)
            .json(&values)
            .send()
            .await?;

        Self::read_body(response).await
    }

    /// Insert rows, overwriting any existing row with the same key
    pub async fn upsert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("POST (upsert) {}", url);

        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation,resolution=merge-duplicates"),
        );

        let response = self
            .prepare(self.http_client.post(&url), headers)
            .json(&values)
            .send()
            .await?;

        Self::read_body(response).await
    }

    /// Patch the matching rows
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("PATCH {}", url);

        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        let response = self
            .prepare(self.http_client.patch(&url), headers)
            .json(&values)
            .send()
            .await?;

        Self::read_body(response).await
    }

    fn prepare(&self, builder: RequestBuilder, headers: HeaderMap) -> RequestBuilder {
        let builder = builder.headers(headers);
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        for (key, value) in &self.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url.to_string())
    }

    async fn read_body(response: Response) -> Result<Value, PostgrestError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(response).await);
        }

        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        // 204 No Content and `return=minimal` both come back empty
        if body_text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&body_text)
                .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
        }
    }

    async fn api_error(response: Response) -> PostgrestError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        warn!("store request failed with {}: {}", status, error_text);

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, Client::new())
    }

    #[tokio::test]
    async fn test_select_with_filter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/Users"))
            .and(query_param("select", "*"))
            .and(query_param("role", "eq.instructor"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "u1", "name": "Dr. Salma", "role": "instructor" }
            ])))
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server, "Users")
            .select("*")
            .eq("role", "instructor")
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Dr. Salma");
    }

    #[tokio::test]
    async fn test_execute_one_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/Courses"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let row = client(&mock_server, "Courses")
            .eq("id", "CS404")
            .execute_one::<Value>()
            .await
            .unwrap();

        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_insert() {
        let mock_server = MockServer::start().await;
        let insert_data = json!({ "id": "CS101", "courseName": "CS101" });

        Mock::given(method("POST"))
            .and(path("/rest/v1/Courses"))
            .and(header("Prefer", "return=representation"))
            .and(body_json(&insert_data))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([insert_data.clone()])))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "Courses").insert(&insert_data).await;

        assert_eq!(result.unwrap(), json!([insert_data]));
    }

    #[tokio::test]
    async fn test_insert_conflict_is_unique_violation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/attendance"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"attendance_pkey\"",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "attendance")
            .insert(json!({ "id": "S1-2024-01-10-CS101" }))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn test_permission_error_is_not_unique_violation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/attendance"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "attendance")
            .insert(json!({ "id": "x" }))
            .await
            .unwrap_err();

        assert!(!err.is_unique_violation());
        match err {
            PostgrestError::UnparsedApiError { message, status } => {
                assert_eq!(message, "forbidden");
                assert_eq!(status, StatusCode::FORBIDDEN);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upsert_merges_duplicates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/Users"))
            .and(query_param("on_conflict", "id"))
            .and(header(
                "Prefer",
                "return=representation,resolution=merge-duplicates",
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "u1" }])))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "Users")
            .on_conflict("id")
            .upsert(json!({ "id": "u1", "role": "student" }))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_update_with_empty_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/Courses"))
            .and(query_param("id", "eq.CS101"))
            .and(body_json(json!({ "instructorId": "u9" })))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "Courses")
            .eq("id", "CS101")
            .update(json!({ "instructorId": "u9" }))
            .await;

        assert_eq!(result.unwrap(), Value::Null);
    }

    #[test]
    fn test_filter_and_order_params() {
        let client = PostgrestClient::new("http://localhost:54321/", "k", "attendance", Client::new())
            .eq("course", "CS101")
            .order("date", SortOrder::Descending);

        let url = client.build_url().unwrap();
        assert!(url.starts_with("http://localhost:54321/rest/v1/attendance?"));
        assert!(url.contains("course=eq.CS101"));
        assert!(url.contains("order=date.desc"));
    }
}
