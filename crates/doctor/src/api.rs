//! Airbyte public API client.
//!
//! Thin wrapper over the local Airbyte REST endpoints the doctor commands
//! consume: connection metadata, job history, and the workspace listing
//! used as a reachability probe.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Default base URL for the local Airbyte deployment.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/public/v1";

/// Request timeout for all API calls.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the Airbyte API.
///
/// The diagnostics runner needs to tell a missing connection (HTTP 404)
/// apart from other HTTP failures, and a transport-level failure apart
/// from both.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The request failed below the HTTP layer or the body did not parse.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// True when the API itself was unreachable (refused, DNS, timeout).
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::NotFound(_) | Self::Status { .. } => false,
        }
    }
}

/// A configured source-to-destination sync pairing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[allow(dead_code)]
    pub connection_id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub schedule: Option<Value>,
    #[serde(default)]
    pub configurations: Configurations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Configurations {
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// One stream enabled on a connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub name: String,
    #[serde(default)]
    pub sync_mode: Option<String>,
}

/// One execution attempt of a connection's sync.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: u64,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub start_time: Option<Value>,
    #[serde(default)]
    pub last_updated_at: Option<String>,
}

impl Job {
    /// Start time parsed from either epoch milliseconds or RFC 3339.
    ///
    /// The API has reported both shapes depending on version, so accept
    /// either and return `None` for anything else.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.start_time.as_ref()? {
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            Value::String(s) => {
                if let Ok(millis) = s.parse::<i64>() {
                    DateTime::from_timestamp_millis(millis)
                } else {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                }
            }
            _ => None,
        }
    }

    /// Raw start time for display, whatever shape it arrived in.
    #[must_use]
    pub fn start_time_display(&self) -> Option<String> {
        match self.start_time.as_ref()? {
            Value::String(s) => Some(s.clone()),
            v => Some(v.to_string()),
        }
    }
}

/// Paginated list envelope used by the jobs and workspaces endpoints.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// Client for the Airbyte public v1 API.
#[derive(Debug, Clone)]
pub struct AirbyteClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl AirbyteClient {
    /// Create a client for the given base URL and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a connection by id. HTTP 404 maps to [`ApiError::NotFound`].
    pub async fn get_connection(&self, connection_id: &str) -> Result<Connection, ApiError> {
        self.get_json(&format!("connections/{connection_id}"), &[])
            .await
    }

    /// Fetch up to `limit` recent jobs for a connection, newest first.
    pub async fn list_jobs(&self, connection_id: &str, limit: u32) -> Result<Vec<Job>, ApiError> {
        let page: Page<Job> = self
            .get_json(
                "jobs",
                &[
                    ("connectionId", connection_id.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(page.data)
    }

    /// List workspaces and return how many there are. Used as a health probe.
    pub async fn workspace_count(&self) -> Result<usize, ApiError> {
        let page: Page<Value> = self.get_json("workspaces", &[]).await?;
        Ok(page.data.len())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_connection_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/connections/conn-1"))
            .and(bearer_token("secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "connectionId": "conn-1",
                "name": "postgres-to-s3",
                "status": "active",
                "schedule": {"scheduleType": "cron"},
                "configurations": {
                    "streams": [{"name": "users", "syncMode": "incremental_append"}]
                }
            })))
            .mount(&server)
            .await;

        let client = AirbyteClient::new(server.uri(), "secret").unwrap();
        let conn = client.get_connection("conn-1").await.unwrap();

        assert_eq!(conn.name, "postgres-to-s3");
        assert_eq!(conn.status, "active");
        assert_eq!(conn.configurations.streams.len(), 1);
        assert_eq!(
            conn.configurations.streams[0].sync_mode.as_deref(),
            Some("incremental_append")
        );
    }

    #[tokio::test]
    async fn missing_connection_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/connections/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = AirbyteClient::new(server.uri(), "secret").unwrap();
        let err = client.get_connection("ghost").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn lists_jobs_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .and(query_param("connectionId", "conn-1"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"jobId": 42, "status": "succeeded", "createdAt": "2026-08-01T00:00:00Z"},
                    {"jobId": 41, "status": "failed"}
                ]
            })))
            .mount(&server)
            .await;

        let client = AirbyteClient::new(server.uri(), "secret").unwrap();
        let jobs = client.list_jobs("conn-1", 10).await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_id, 42);
        assert_eq!(jobs[1].status, "failed");
    }

    #[tokio::test]
    async fn counts_workspaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"workspaceId": "a"}, {"workspaceId": "b"}]
            })))
            .mount(&server)
            .await;

        let client = AirbyteClient::new(server.uri(), "secret").unwrap();
        assert_eq!(client.workspace_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = AirbyteClient::new(server.uri(), "secret").unwrap();
        let err = client.workspace_count().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { .. }));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn start_time_parses_epoch_millis() {
        let job = Job {
            job_id: 1,
            status: "running".to_string(),
            created_at: None,
            start_time: Some(json!(1_722_470_400_000_i64)),
            last_updated_at: None,
        };
        let started = job.started_at().unwrap();
        assert_eq!(started.timestamp(), 1_722_470_400);
    }

    #[test]
    fn start_time_parses_rfc3339() {
        let job = Job {
            job_id: 1,
            status: "running".to_string(),
            created_at: None,
            start_time: Some(json!("2026-08-01T12:00:00Z")),
            last_updated_at: None,
        };
        let started = job.started_at().unwrap();
        assert_eq!(started.to_rfc3339(), "2026-08-01T12:00:00+00:00");
    }

    #[test]
    fn start_time_garbage_is_none() {
        let job = Job {
            job_id: 1,
            status: "running".to_string(),
            created_at: None,
            start_time: Some(json!("not a timestamp")),
            last_updated_at: None,
        };
        assert!(job.started_at().is_none());
    }
}
