//! Report sources
//!
//! The fetch loop only sees the [`ReportSource`] trait. [`HttpReportSource`]
//! talks to a `reports:batchGet` endpoint, asking its
//! [`AccessTokenProvider`] for a bearer token on every request.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{provider_from_config, AccessTokenProvider};
use crate::config::ConnectorConfig;
use crate::error::SourceError;
use crate::report::Report;
use crate::schema::FIELD_PREFIX;
use crate::window::{PageCursor, ReportWindow};

/// Produces one page of a report for a window and cursor
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self, window: &ReportWindow, cursor: &PageCursor)
        -> Result<Report, SourceError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetRequest<'a> {
    report_requests: Vec<ReportRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportRequest<'a> {
    view_id: &'a str,
    date_ranges: Vec<DateRange<'a>>,
    metrics: Vec<Metric>,
    dimensions: Vec<Dimension>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange<'a> {
    start_date: &'a str,
    end_date: &'a str,
}

#[derive(Debug, Serialize)]
struct Metric {
    expression: String,
    alias: String,
}

#[derive(Debug, Serialize)]
struct Dimension {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    reports: Vec<Report>,
}

// ============================================================================
// HTTP source
// ============================================================================

/// Reporting API client using bearer tokens
pub struct HttpReportSource {
    client: Client,
    url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    view_id: String,
    metrics: Vec<String>,
    dimensions: Vec<String>,
    page_size: u32,
}

impl HttpReportSource {
    /// Build a source with the credentials named by `config`
    pub fn new(config: &ConnectorConfig) -> Result<Self, SourceError> {
        Self::with_token_provider(config, provider_from_config(config)?)
    }

    pub fn with_token_provider(
        config: &ConnectorConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SourceError::Init(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.batch_get_url(),
            tokens,
            view_id: config.view_id.clone(),
            metrics: config.measures.clone(),
            dimensions: config.dimensions.clone(),
            page_size: config.page_size,
        })
    }

    fn request_body<'a>(
        &'a self,
        window: &'a ReportWindow,
        cursor: &'a PageCursor,
    ) -> BatchGetRequest<'a> {
        BatchGetRequest {
            report_requests: vec![ReportRequest {
                view_id: &self.view_id,
                date_ranges: vec![DateRange {
                    start_date: window.start_date(),
                    end_date: window.end_date(),
                }],
                metrics: self
                    .metrics
                    .iter()
                    .map(|m| Metric {
                        expression: format!("{}{}", FIELD_PREFIX, m),
                        alias: m.clone(),
                    })
                    .collect(),
                dimensions: self
                    .dimensions
                    .iter()
                    .map(|d| Dimension {
                        name: format!("{}{}", FIELD_PREFIX, d),
                    })
                    .collect(),
                page_size: self.page_size,
                page_token: cursor.token(),
            }],
        }
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch(
        &self,
        window: &ReportWindow,
        cursor: &PageCursor,
    ) -> Result<Report, SourceError> {
        debug!(window = %window, cursor = %cursor, "Requesting report page");

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(&self.request_body(window, cursor))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: BatchGetResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        decoded
            .reports
            .into_iter()
            .next()
            .ok_or(SourceError::EmptyResponse)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            view_id: "42".to_string(),
            access_token: "token".to_string(),
            ..ConnectorConfig::default()
        }
    }

    #[test]
    fn test_empty_token_is_init_error() {
        let mut config = config();
        config.access_token = "  ".to_string();
        assert!(matches!(
            HttpReportSource::new(&config),
            Err(SourceError::Init(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let source = HttpReportSource::new(&config()).unwrap();
        let window = ReportWindow::new("30DaysAgo", "yesterday");

        let body = serde_json::to_value(source.request_body(&window, &PageCursor::Start)).unwrap();
        let request = &body["reportRequests"][0];
        assert_eq!(request["viewId"], "42");
        assert_eq!(request["dateRanges"][0]["startDate"], "30DaysAgo");
        assert_eq!(request["metrics"][0]["expression"], "ga:pageviews");
        assert_eq!(request["metrics"][0]["alias"], "pageviews");
        assert_eq!(request["dimensions"][1]["name"], "ga:dateHourMinute");
        assert_eq!(request["pageSize"], 10_000);
        assert!(request.get("pageToken").is_none());

        let next = PageCursor::Token("0".to_string());
        let body = serde_json::to_value(source.request_body(&window, &next)).unwrap();
        assert_eq!(body["reportRequests"][0]["pageToken"], "0");
    }
}
