#![cfg(test)]

use super::web::*;
use crate::config::AcquisitionMode;
use crate::error::{PowermeterError, Result};
use crate::exporter::Exporter;
use crate::metrics::MeterMetrics;
use crate::serial::{Frame, FrameSource};
use crate::sml;
use axum::http::Request;
use http_body_util::BodyExt as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// Counts reads; fails when no frame is configured
struct CountingSource {
    frame: Option<Frame>,
    reads: AtomicUsize,
}

impl FrameSource for CountingSource {
    fn read_frame(&self) -> Result<Frame> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.frame
            .clone()
            .ok_or_else(|| PowermeterError::device_unavailable("test", "no device"))
    }

    fn describe(&self) -> String {
        "test".to_string()
    }
}

fn test_state(mode: AcquisitionMode, frame: Option<Frame>) -> (AppState, Arc<CountingSource>) {
    let source = Arc::new(CountingSource {
        frame,
        reads: AtomicUsize::new(0),
    });
    let exporter = Arc::new(Exporter::new(
        source.clone(),
        Arc::new(MeterMetrics::new("web")),
    ));
    (AppState { exporter, mode }, source)
}

fn work_frame() -> Frame {
    [sml::WORK_TARIFF1_MARKER, &[0x00, 0x00, 0x01, 0x86, 0xa0][..]].concat()
}

async fn get(state: AppState, uri: &str) -> (axum::http::StatusCode, String) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_ok() {
    let (state, _) = test_state(AcquisitionMode::Background, None);
    let (status, body) = get(state, "/api/health").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn metrics_has_exposition_content_type() {
    let (state, _) = test_state(AcquisitionMode::Background, None);
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    assert!(ct.starts_with("text/plain"));
}

#[tokio::test]
async fn root_acquires_in_on_request_mode() {
    let (state, source) = test_state(AcquisitionMode::OnRequest, Some(work_frame()));
    let (status, body) = get(state.clone(), "/").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    assert!(body.contains("meter_id=\"1.8.1\""));

    // /metrics never triggers a read
    let _ = get(state, "/metrics").await;
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn root_does_not_acquire_in_background_mode() {
    let (state, source) = test_state(AcquisitionMode::Background, Some(work_frame()));
    let (status, body) = get(state, "/").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(source.reads.load(Ordering::SeqCst), 0);
    assert!(!body.contains("powermeter_work{"));
}

#[tokio::test]
async fn failed_on_request_cycle_still_serves() {
    let (state, source) = test_state(AcquisitionMode::OnRequest, None);
    let (status, _) = get(state, "/").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (state, _) = test_state(AcquisitionMode::Background, None);
    let (status, _) = get(state, "/nope").await;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}
