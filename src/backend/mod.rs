use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::Record;

/// The user's query parameters. Immutable once submitted; `start`/`end` are
/// opaque client-local strings the server interprets.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FilterCriteria {
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_disposition1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_disposition2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<bool>,
}

/// Server-assigned identity for one progressive query.
#[derive(Clone, Debug)]
pub struct InitData {
    pub query_id: String,
    pub total_pages: u64,
    pub total_records: u64,
}

/// One page worth of rows.
#[derive(Clone, Debug)]
pub struct PageData {
    pub records: Vec<Record>,
    pub is_last_page: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKind {
    Agents,
    Queues,
    Campaigns,
    Dispositions,
}

impl LookupKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "agents" | "agent" => Some(Self::Agents),
            "queues" | "queue" => Some(Self::Queues),
            "campaigns" | "campaign" => Some(Self::Campaigns),
            "dispositions" | "disposition" => Some(Self::Dispositions),
            _ => None,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Queues => "queues",
            Self::Campaigns => "campaigns",
            Self::Dispositions => "dispositions",
        }
    }
}

/// One failed backend call. Categories map one-to-one onto the user-facing
/// messages in [`PageFetchError::user_message`]; a failed page is never
/// retried here.
#[derive(Debug, Error)]
pub enum PageFetchError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("query not found: {message}")]
    NotFound { message: String },

    #[error("server error: {message}")]
    ServerError { message: String },

    #[error("server timed out")]
    Timeout,

    #[error("network unreachable: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },
}

impl PageFetchError {
    /// Actionable message for status display. Timeout is the one category
    /// where the user can do something concrete, so it says what.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message } => {
                format!("the server rejected the request ({message}); check the filter values")
            }
            Self::NotFound { message } => {
                format!("the query is no longer known to the server ({message}); run the search again")
            }
            Self::ServerError { message } => {
                format!("the server failed while building the report ({message}); try again shortly")
            }
            Self::Timeout => {
                "the server took too long to answer; narrow the time range or add filters and try again"
                    .to_string()
            }
            Self::Network { .. } => {
                "could not reach the report server; check the address and your connection".to_string()
            }
        }
    }

    fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest { message },
            404 => Self::NotFound { message },
            408 | 504 => Self::Timeout,
            _ => Self::ServerError { message },
        }
    }

    fn from_transport(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout
        } else {
            Self::Network { source }
        }
    }
}

/// Seam between the load controller and the wire. Production uses
/// [`HttpBackend`]; tests script responses without a socket.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn init_query(&self, criteria: &FilterCriteria) -> Result<InitData, PageFetchError>;

    async fn fetch_page(&self, query_id: &str, page: u64) -> Result<PageData, PageFetchError>;

    async fn fetch_lookup(
        &self,
        kind: LookupKind,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<String>, PageFetchError>;
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "queryId")]
    query_id: Option<String>,
    #[serde(rename = "totalPages")]
    total_pages: Option<u64>,
    #[serde(rename = "totalRecords")]
    total_records: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<Record>,
    #[serde(rename = "isLastPage", default)]
    is_last_page: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<String>,
    error: Option<String>,
}

fn server_message(error: Option<String>) -> String {
    error
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "no error detail".to_string())
}

/// Fetches exactly one page (or the init/lookup calls) for the active
/// query against the progressive report API.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn init_query(&self, criteria: &FilterCriteria) -> Result<InitData, PageFetchError> {
        let resp = self
            .client
            .post(self.endpoint("query/init"))
            .json(criteria)
            .send()
            .await
            .map_err(PageFetchError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PageFetchError::from_status(status, body));
        }

        let parsed: InitResponse = resp.json().await.map_err(|e| PageFetchError::ServerError {
            message: format!("malformed init response: {e}"),
        })?;
        if !parsed.success {
            return Err(PageFetchError::ServerError {
                message: server_message(parsed.error),
            });
        }
        let query_id = parsed
            .query_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PageFetchError::ServerError {
                message: "malformed init response: missing queryId".to_string(),
            })?;
        let total_pages = parsed.total_pages.ok_or_else(|| PageFetchError::ServerError {
            message: "malformed init response: missing totalPages".to_string(),
        })?;
        let total_records = parsed
            .total_records
            .ok_or_else(|| PageFetchError::ServerError {
                message: "malformed init response: missing totalRecords".to_string(),
            })?;

        Ok(InitData {
            query_id,
            total_pages,
            total_records,
        })
    }

    async fn fetch_page(&self, query_id: &str, page: u64) -> Result<PageData, PageFetchError> {
        let page_param = page.to_string();
        let resp = self
            .client
            .get(self.endpoint("query/page"))
            .query(&[("queryId", query_id), ("page", page_param.as_str())])
            .send()
            .await
            .map_err(PageFetchError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PageFetchError::from_status(status, body));
        }

        let parsed: PageResponse = resp.json().await.map_err(|e| PageFetchError::ServerError {
            message: format!("malformed page response: {e}"),
        })?;
        if !parsed.success {
            return Err(PageFetchError::ServerError {
                message: server_message(parsed.error),
            });
        }

        Ok(PageData {
            records: parsed.data,
            is_last_page: parsed.is_last_page,
        })
    }

    async fn fetch_lookup(
        &self,
        kind: LookupKind,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<String>, PageFetchError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("lookup/{}", kind.path())))
            .query(&[("from_ts", from_ts.to_string()), ("to_ts", to_ts.to_string())])
            .send()
            .await
            .map_err(PageFetchError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PageFetchError::from_status(status, body));
        }

        let parsed: LookupResponse =
            resp.json().await.map_err(|e| PageFetchError::ServerError {
                message: format!("malformed lookup response: {e}"),
            })?;
        if !parsed.success {
            return Err(PageFetchError::ServerError {
                message: server_message(parsed.error),
            });
        }
        Ok(parsed.data)
    }
}
