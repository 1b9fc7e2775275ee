use std::time::{Duration, Instant};

use cnyfix::{FetchRequest, FetchSession, FxError, RequestConfig, RequestOverrides, TlsPolicy};
use url::Url;

use crate::common::{CannedProbe, ScriptedTransport, ok, scripted_client, timed_out};

fn target() -> Url {
    Url::parse("https://127.0.0.1/page").unwrap()
}

#[tokio::test]
async fn spent_budget_refuses_before_any_attempt() {
    let transport = ScriptedTransport::new([ok("unused")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();
    client
        .begin_request_cycle(&mut session, Some(Duration::ZERO))
        .unwrap();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::Timeout { .. }), "got {err:?}");

    let m = session.metrics();
    assert_eq!(m.attempts, 0);
    assert_eq!(m.deadline_exceeded, 1);
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn attempt_timeouts_never_exceed_the_remaining_budget() {
    let transport = ScriptedTransport::new([ok("fine")]);
    let client = scripted_client(transport.clone(), CannedProbe::failing(), TlsPolicy::strict());
    let mut session = FetchSession::new();
    client
        .begin_request_cycle(&mut session, Some(Duration::from_millis(500)))
        .unwrap();

    client.fetch(&mut session, FetchRequest::get(target())).await.unwrap();

    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].connect_timeout <= Duration::from_millis(500));
    assert!(seen[0].read_timeout <= Duration::from_millis(500));
    assert!(seen[0].total_timeout.unwrap() <= Duration::from_millis(500));
}

#[tokio::test]
async fn backoff_sleeps_are_cut_short_by_the_deadline() {
    let transport = ScriptedTransport::new([timed_out(), timed_out(), timed_out()]);
    let client = cnyfix::FxClient::builder()
        .transport(transport.clone())
        .cert_probe(CannedProbe::failing())
        .tls_policy(TlsPolicy::strict())
        .request_config(RequestConfig {
            backoff_base: Duration::from_secs(5),
            jitter: Duration::ZERO,
            ..crate::common::fast_config()
        })
        .build()
        .unwrap();
    let mut session = FetchSession::new();
    client
        .begin_request_cycle(&mut session, Some(Duration::from_millis(200)))
        .unwrap();

    let started = Instant::now();
    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::Timeout { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());

    let m = session.metrics();
    assert_eq!(m.attempts, 1);
    assert_eq!(m.deadline_exceeded, 1);
}

#[tokio::test]
async fn only_one_cycle_at_a_time() {
    let client = crate::common::offline_client();
    let mut session = FetchSession::new();
    client.begin_request_cycle(&mut session, None).unwrap();
    assert!(session.cycle_active());
    assert!(session.cycle_deadline().is_some(), "configured deadline applies");

    let err = client.begin_request_cycle(&mut session, None).unwrap_err();
    assert!(matches!(err, FxError::Config(_)));

    client.end_request_cycle(&mut session);
    assert!(!session.cycle_active());
    assert!(session.cycle_deadline().is_none());
    client.end_request_cycle(&mut session);
}

#[tokio::test]
async fn overrides_apply_until_reset() {
    let client = crate::common::offline_client();
    let built = client.request_config();

    client.configure_requests(RequestOverrides {
        connect_timeout: Some(Duration::from_millis(750)),
        total_deadline: Some(Duration::from_secs(3)),
        ..RequestOverrides::default()
    });
    let shared = client.clone();
    assert_eq!(shared.request_config().connect_timeout, Duration::from_millis(750));
    assert_eq!(shared.request_config().total_deadline, Some(Duration::from_secs(3)));
    assert_eq!(shared.request_config().read_timeout, built.read_timeout);

    client.reset_request_config();
    assert_eq!(shared.request_config(), built);
}

#[test]
fn zero_attempts_is_rejected_at_build() {
    let err = cnyfix::FxClient::builder()
        .request_config(RequestConfig {
            attempts: 0,
            ..RequestConfig::default()
        })
        .tls_policy(TlsPolicy::strict())
        .build()
        .unwrap_err();
    assert!(matches!(err, FxError::Config(_)));
}
