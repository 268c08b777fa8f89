//! Update client tests with HTTP mocking.

use super::{DynUpdateClient, StatusCode, UpdateApi, UpdateOutcome};
use crate::error::{DdnsError, ProtocolError};
use crate::http::HttpClient;
use crate::metrics::testing::{Event, RecordingMetrics};
use crate::metrics::Op;
use crate::updater::UpdaterState;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOMAIN: &str = "home.example.com";

fn client(metrics: Arc<RecordingMetrics>) -> DynUpdateClient {
    let http = HttpClient::new(Duration::from_secs(5), crate::metrics::noop()).unwrap();
    DynUpdateClient::new(http, metrics)
}

fn state(mock_server: &MockServer, last_known: Option<&str>) -> UpdaterState {
    UpdaterState::new(
        DOMAIN.to_string(),
        "secret123".to_string(),
        format!("{}/nic/update", mock_server.uri()),
    )
    .with_ip(last_known.map(|ip| ip.parse().unwrap()))
}

async fn respond_with(mock_server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/nic/update"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_update_good() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nic/update"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("hostname=home.example.com&password=secret123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("good 203.0.113.5"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let metrics = Arc::new(RecordingMetrics::default());
    let outcome = client(metrics.clone())
        .update(&state(&mock_server, None))
        .await
        .unwrap();

    let ip: IpAddr = "203.0.113.5".parse().unwrap();
    assert_eq!(outcome, UpdateOutcome::Good(ip));

    let events = metrics.events();
    assert!(events.contains(&Event::LastUpdated {
        domain: DOMAIN.to_string()
    }));
    assert!(events.contains(&Event::CurrentIp {
        domain: DOMAIN.to_string(),
        ip
    }));
    assert!(events.contains(&Event::Succeeded {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        status: Some("good".to_string()),
    }));
}

#[tokio::test]
async fn test_update_sends_last_known_ip() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nic/update"))
        .and(body_string_contains("myip=203.0.113.9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nochg 203.0.113.9"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let metrics = Arc::new(RecordingMetrics::default());
    let outcome = client(metrics.clone())
        .update(&state(&mock_server, Some("203.0.113.9")))
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::NoChange("203.0.113.9".parse().unwrap()));
    // Only a real change counts as "last updated".
    assert!(!metrics
        .events()
        .iter()
        .any(|e| matches!(e, Event::LastUpdated { .. })));
}

#[tokio::test]
async fn test_update_nochg_with_unexpected_ip() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "nochg 203.0.113.5").await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = client(metrics.clone())
        .update(&state(&mock_server, Some("203.0.113.9")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DdnsError::Protocol(ProtocolError::UnexpectedIp { .. })
    ));
    assert!(err.to_string().contains("unexpected IP on remote end"));
    assert!(metrics.events().contains(&Event::Failed {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        reason: "protocol_unexpected_ip".to_string(),
    }));
}

#[tokio::test]
async fn test_update_nochg_without_known_ip() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "nochg 203.0.113.5").await;

    let outcome = client(Arc::new(RecordingMetrics::default()))
        .update(&state(&mock_server, None))
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::NoChange("203.0.113.5".parse().unwrap()));
}

#[tokio::test]
async fn test_update_badauth_is_client_failure() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "badauth").await;

    let metrics = Arc::new(RecordingMetrics::default());
    let outcome = client(metrics.clone())
        .update(&state(&mock_server, None))
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::ClientFailure(StatusCode::BadAuth));
    assert!(metrics.events().contains(&Event::Failed {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        reason: "badauth".to_string(),
    }));
    assert!(metrics.events().contains(&Event::Observed {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        success: false,
    }));
}

#[tokio::test]
async fn test_update_dnserr_is_server_failure() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "dnserr").await;

    let outcome = client(Arc::new(RecordingMetrics::default()))
        .update(&state(&mock_server, None))
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::ServerFailure(StatusCode::DnsErr));
}

#[tokio::test]
async fn test_update_good_without_ip_is_rejected() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "good").await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = client(metrics.clone())
        .update(&state(&mock_server, None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DdnsError::Protocol(ProtocolError::MissingIp(StatusCode::Good))
    ));
    assert!(metrics.events().contains(&Event::Failed {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        reason: "protocol_missing_ip".to_string(),
    }));
}

#[tokio::test]
async fn test_update_unknown_status() {
    let mock_server = MockServer::start().await;
    respond_with(&mock_server, "!yours").await;

    let err = client(Arc::new(RecordingMetrics::default()))
        .update(&state(&mock_server, None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DdnsError::Protocol(ProtocolError::UnknownStatus(ref token)) if token == "!yours"
    ));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_update_http_error_is_not_classified() {
    let mock_server = MockServer::start().await;

    // Even a recognisable token in an error page is not a provider answer.
    Mock::given(method("POST"))
        .and(path("/nic/update"))
        .respond_with(ResponseTemplate::new(401).set_body_string("badauth"))
        .mount(&mock_server)
        .await;

    let metrics = Arc::new(RecordingMetrics::default());
    let err = client(metrics.clone())
        .update(&state(&mock_server, None))
        .await
        .unwrap_err();

    assert!(matches!(err, DdnsError::HttpStatus { status: 401, .. }));
    assert!(!err.is_fatal());
    assert!(metrics.events().contains(&Event::Failed {
        op: Op::Update,
        domain: DOMAIN.to_string(),
        reason: "401".to_string(),
    }));
}
