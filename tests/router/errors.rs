use cnyfix::{FallbackTier, FetchSession, FxError, PreferSource, RateOrigin, SourceKind};

use crate::common::{StubSource, day, quote, stub_router, tls_error};

#[tokio::test]
async fn pbc_tls_failure_falls_back_to_cfets() {
    let pbc = StubSource::new(SourceKind::Pbc, |_| Err(tls_error("www.pbc.gov.cn")));
    let cfets = StubSource::new(SourceKind::Cfets, |d| Ok(quote("7.1879", d, RateOrigin::CfetsNotice)));
    let safe = StubSource::empty(SourceKind::Safe);
    let router = stub_router([&pbc, &cfets, &safe]);
    let mut session = FetchSession::new();

    let routed = router
        .fetch_with_fallback(&mut session, day(2025, 1, 2), PreferSource::Auto)
        .await
        .unwrap();
    assert_eq!(routed.fallback_used, FallbackTier::Source(SourceKind::Cfets));
}

#[tokio::test]
async fn pbc_tls_failure_resurfaces_when_nothing_answers() {
    let pbc = StubSource::new(SourceKind::Pbc, |_| Err(tls_error("www.pbc.gov.cn")));
    let cfets = StubSource::empty(SourceKind::Cfets);
    let safe = StubSource::empty(SourceKind::Safe);
    let router = stub_router([&pbc, &cfets, &safe]);
    let mut session = FetchSession::new();

    let err = router
        .fetch_with_fallback(&mut session, day(2025, 1, 2), PreferSource::Auto)
        .await
        .unwrap_err();

    let diag = err.tls_diagnostic().expect("tls error kept");
    assert_eq!(diag.host, "www.pbc.gov.cn");
    assert_eq!(safe.calls().len(), 1, "every source is tried first");
    assert!(!session.cycle_active());
}

#[tokio::test]
async fn tls_outside_a_pbc_route_is_just_unavailable() {
    let pbc = StubSource::empty(SourceKind::Pbc);
    let cfets = StubSource::new(SourceKind::Cfets, |_| Err(tls_error("www.chinamoney.org.cn")));
    let safe = StubSource::empty(SourceKind::Safe);
    let router = stub_router([&pbc, &cfets, &safe]);
    let mut session = FetchSession::new();

    let err = router
        .fetch_with_fallback(&mut session, day(2025, 1, 2), PreferSource::Cfets)
        .await
        .unwrap_err();
    assert!(matches!(err, FxError::RateUnavailable { date } if date == day(2025, 1, 2)), "got {err:?}");
}

#[tokio::test]
async fn all_misses_are_unavailable() {
    let pbc = StubSource::empty(SourceKind::Pbc);
    let cfets = StubSource::empty(SourceKind::Cfets);
    let safe = StubSource::empty(SourceKind::Safe);
    let router = stub_router([&pbc, &cfets, &safe]);
    let mut session = FetchSession::new();

    let err = router
        .fetch_with_fallback(&mut session, day(2025, 1, 2), PreferSource::Auto)
        .await
        .unwrap_err();

    assert!(matches!(err, FxError::RateUnavailable { .. }), "got {err:?}");
    assert!(err.is_lookup_miss());
    let m = session.metrics();
    assert_eq!(m.rate_source, None);
    assert_eq!(m.fallback_used, None);
}

#[tokio::test]
async fn hard_errors_stop_the_cascade() {
    let pbc = StubSource::new(SourceKind::Pbc, |_| Err(FxError::Config("broken".into())));
    let cfets = StubSource::empty(SourceKind::Cfets);
    let safe = StubSource::empty(SourceKind::Safe);
    let router = stub_router([&pbc, &cfets, &safe]);
    let mut session = FetchSession::new();

    let err = router
        .fetch_with_fallback(&mut session, day(2025, 1, 2), PreferSource::Auto)
        .await
        .unwrap_err();

    assert!(matches!(err, FxError::Config(_)), "got {err:?}");
    assert!(cfets.calls().is_empty());
    assert!(!session.cycle_active(), "cycle closed on error too");
}
