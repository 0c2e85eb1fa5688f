//! HTTP report source tests against a mock reporting API

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use reportsync_ingest::auth::AccessTokenProvider;
use reportsync_ingest::config::ConnectorConfig;
use reportsync_ingest::error::{IngestError, SourceError};
use reportsync_ingest::fetcher::{FetchSettings, IncrementalFetcher};
use reportsync_ingest::sink::{MemorySink, NoResumeState};
use reportsync_ingest::source::{HttpReportSource, ReportSource};
use reportsync_ingest::window::{PageCursor, ReportWindow};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn config(server: &MockServer) -> ConnectorConfig {
    ConnectorConfig {
        view_id: "987654".to_string(),
        access_token: "test-token".to_string(),
        api_url: server.uri(),
        page_size: 500,
        ..ConnectorConfig::default()
    }
}

fn batch_response(next_page_token: Option<&str>) -> serde_json::Value {
    let mut report = serde_json::json!({
        "columnHeader": {
            "dimensions": ["ga:pagePath", "ga:dateHourMinute"],
            "metricHeader": {
                "metricHeaderEntries": [{ "name": "pageviews", "type": "INTEGER" }]
            }
        },
        "data": {
            "rows": [
                { "dimensions": ["/a", "2024010100"], "metrics": [{ "values": ["5"] }] }
            ],
            "rowCount": 1
        }
    });
    if let Some(token) = next_page_token {
        report["nextPageToken"] = serde_json::json!(token);
    }
    serde_json::json!({ "reports": [report] })
}

#[tokio::test]
async fn test_fetch_first_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v4/reports:batchGet"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({
            "reportRequests": [{
                "viewId": "987654",
                "dateRanges": [{ "startDate": "30DaysAgo", "endDate": "yesterday" }],
                "metrics": [{ "expression": "ga:pageviews", "alias": "pageviews" }],
                "dimensions": [{ "name": "ga:pagePath" }, { "name": "ga:dateHourMinute" }],
                "pageSize": 500
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_response(Some("500"))))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let report = source
        .fetch(&ReportWindow::new("30DaysAgo", "yesterday"), &PageCursor::Start)
        .await
        .unwrap();

    assert_eq!(report.column_header.column_count(), 3);
    assert_eq!(report.rows().unwrap().len(), 1);
    assert_eq!(report.next_page_token.as_deref(), Some("500"));
}

#[tokio::test]
async fn test_fetch_sends_page_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v4/reports:batchGet"))
        .and(body_partial_json(serde_json::json!({
            "reportRequests": [{ "pageToken": "500" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_response(None)))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let report = source
        .fetch(
            &ReportWindow::new("1DaysAgo", "yesterday"),
            &PageCursor::Token("500".to_string()),
        )
        .await
        .unwrap();

    assert!(report.next_page_token.is_none());
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v4/reports:batchGet"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let err = source
        .fetch(&ReportWindow::new("30DaysAgo", "yesterday"), &PageCursor::Start)
        .await
        .unwrap_err();

    match err {
        SourceError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "backend unavailable");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_empty_batch_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "reports": [] })),
        )
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let err = source
        .fetch(&ReportWindow::new("30DaysAgo", "yesterday"), &PageCursor::Start)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::EmptyResponse));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let err = source
        .fetch(&ReportWindow::new("30DaysAgo", "yesterday"), &PageCursor::Start)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Decode(_)));
}

#[tokio::test]
async fn test_rejected_credentials_are_not_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
        .mount(&server)
        .await;

    let source = HttpReportSource::new(&config(&server)).unwrap();
    let err = source
        .fetch(&ReportWindow::new("30DaysAgo", "yesterday"), &PageCursor::Start)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Unauthorized { status: 403, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_run_stops_on_rejected_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v4/reports:batchGet"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let settings = FetchSettings {
        poll_interval: Duration::from_millis(10),
        ..FetchSettings::from(&config)
    };
    let mut fetcher = IncrementalFetcher::new(
        settings,
        Arc::new(HttpReportSource::new(&config).unwrap()),
        Box::new(MemorySink::new()),
        Arc::new(NoResumeState),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        fetcher.run(CancellationToken::new()),
    )
    .await
    .expect("run should stop on its own");

    match result {
        Err(IngestError::Source(SourceError::Unauthorized { status, .. })) => {
            assert_eq!(status, 401)
        },
        other => panic!("expected a fatal credentials error, got {other:?}"),
    }
}

/// Hands out a new token on every call
#[derive(Default)]
struct RotatingTokens {
    issued: AtomicU32,
}

#[async_trait]
impl AccessTokenProvider for RotatingTokens {
    async fn access_token(&self) -> Result<String, SourceError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }
}

#[tokio::test]
async fn test_each_request_asks_for_a_token() {
    let server = MockServer::start().await;

    for token in ["Bearer token-1", "Bearer token-2"] {
        Mock::given(method("POST"))
            .and(header("authorization", token))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch_response(None)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = ConnectorConfig {
        access_token: String::new(),
        ..config(&server)
    };
    let source =
        HttpReportSource::with_token_provider(&config, Arc::new(RotatingTokens::default()))
            .unwrap();
    let window = ReportWindow::new("1DaysAgo", "yesterday");

    source.fetch(&window, &PageCursor::Start).await.unwrap();
    source.fetch(&window, &PageCursor::Start).await.unwrap();
}
