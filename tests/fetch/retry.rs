use std::time::Duration;

use cnyfix::{FetchRequest, FetchSession, FxError, RequestConfig, TlsPolicy};
use url::Url;

use crate::common::{
    CannedProbe, ScriptedTransport, mismatch, ok, refused, scripted_client, status, timed_out,
};

fn target() -> Url {
    Url::parse("https://127.0.0.1/notice").unwrap()
}

#[tokio::test]
async fn first_attempt_success_counts_once() {
    let transport = ScriptedTransport::new([ok("body")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let resp = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap();
    assert_eq!(resp.body, "body");

    let m = session.metrics();
    assert_eq!((m.attempts, m.successes, m.failures), (1, 1, 0));
    assert_eq!(m.dns_a_count, 1);
    assert_eq!(m.dns_aaaa_count, 0);
}

#[tokio::test]
async fn timeouts_are_retried_until_success() {
    let transport = ScriptedTransport::new([timed_out(), timed_out(), ok("third time")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let resp = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap();
    assert_eq!(resp.body, "third time");

    let m = session.metrics();
    assert_eq!(m.attempts, 3);
    assert_eq!(m.failures, 2);
    assert_eq!(m.successes, 1);
    assert_eq!(m.deadline_exceeded, 0);
}

#[tokio::test]
async fn exhausted_timeouts_surface_as_timeout() {
    let transport = ScriptedTransport::new([timed_out(), timed_out(), timed_out(), ok("never")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    match err {
        FxError::Timeout { url, .. } => assert!(url.contains("/notice")),
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(session.metrics().attempts, 3);
    assert_eq!(transport.remaining(), 1, "fourth response must not be requested");
}

#[tokio::test]
async fn error_status_is_not_retried() {
    let transport = ScriptedTransport::new([status(503), ok("unused")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    match &err {
        FxError::Status { status, .. } => assert_eq!(*status, 503),
        other => panic!("expected Status, got {other:?}"),
    }
    assert!(err.is_lookup_miss());
    let m = session.metrics();
    assert_eq!((m.attempts, m.failures), (1, 1));
}

#[tokio::test]
async fn connect_failure_is_not_retried() {
    let transport = ScriptedTransport::new([refused(), ok("unused")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::Transport { .. }), "got {err:?}");
    assert_eq!(session.metrics().attempts, 1);
}

#[tokio::test]
async fn mismatch_is_never_retried_as_a_timeout() {
    let transport = ScriptedTransport::new([mismatch(), ok("unused")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::TlsHostnameMismatch(_)), "got {err:?}");
    assert_eq!(transport.seen().len(), 1);
}

#[test]
fn backoff_doubles_and_is_capped_by_remaining_budget() {
    let cfg = RequestConfig {
        backoff_base: Duration::from_millis(100),
        jitter: Duration::ZERO,
        ..RequestConfig::default()
    };
    assert_eq!(cfg.backoff_delay(1, None), Duration::from_millis(100));
    assert_eq!(cfg.backoff_delay(2, None), Duration::from_millis(200));
    assert_eq!(cfg.backoff_delay(3, None), Duration::from_millis(400));
    assert_eq!(
        cfg.backoff_delay(3, Some(Duration::from_millis(50))),
        Duration::from_millis(50)
    );
}

#[test]
fn jitter_stays_within_its_ceiling() {
    let cfg = RequestConfig {
        backoff_base: Duration::from_millis(100),
        jitter: Duration::from_millis(40),
        ..RequestConfig::default()
    };
    for _ in 0..50 {
        let d = cfg.backoff_delay(1, None);
        assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(140), "{d:?}");
    }
}
