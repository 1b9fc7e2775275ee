use cnyfix::tls::{CERT_HOSTNAME_MISMATCH, summarize_certificate};
use cnyfix::{FetchRequest, FetchSession, FxError, IpFamily, TlsPolicy};
use url::Url;

use crate::common::{CannedProbe, ScriptedTransport, mismatch, ok, scripted_client, self_signed};

fn target() -> Url {
    Url::parse("https://127.0.0.1/17105/index.html").unwrap()
}

fn fingerprint_of(der: &[u8]) -> String {
    summarize_certificate("127.0.0.1", der).unwrap().sha256
}

#[tokio::test]
async fn strict_mismatch_carries_a_full_diagnostic() {
    let der = self_signed(&["default.example"]);
    let probe = CannedProbe::with_cert(der.clone());
    let transport = ScriptedTransport::new([mismatch(), ok("unused")]);
    let client = scripted_client(transport.clone(), probe.clone(), TlsPolicy::strict());
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    let diag = err.tls_diagnostic().expect("diagnostic attached").clone();

    assert_eq!(diag.host, "127.0.0.1");
    assert_eq!(diag.error_code, CERT_HOSTNAME_MISMATCH);
    assert_eq!(diag.resolved_ipv4, vec!["127.0.0.1".to_string()]);
    assert!(diag.resolved_ipv6.is_empty());
    assert_eq!(diag.ip_family_used, IpFamily::Auto);
    assert_eq!(diag.connected_ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(diag.cert_san, vec!["DNS:default.example".to_string()]);
    assert!(!diag.san_contains_host);
    assert_eq!(diag.cert_sha256.as_deref(), Some(fingerprint_of(&der).as_str()));
    assert!(diag.diag_error.is_none());

    let json = diag.to_json();
    assert!(json.contains("\"error_code\":\"CERT_HOSTNAME_MISMATCH\""), "{json}");

    assert_eq!(probe.calls(), 1);
    assert_eq!(session.metrics().tls_hostname_mismatch, 1);
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test]
async fn strict_ignores_an_allow_list() {
    let der = self_signed(&["default.example"]);
    let fp = fingerprint_of(&der);
    let policy = TlsPolicy::from_vars(Some("1"), Some(&fp), None);
    assert!(policy.is_strict());

    let transport = ScriptedTransport::new([mismatch(), ok("unused")]);
    let client = scripted_client(transport.clone(), CannedProbe::with_cert(der), policy);
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::TlsHostnameMismatch(_)), "got {err:?}");
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test]
async fn lenient_pins_an_allow_listed_certificate() {
    let der = self_signed(&["default.example"]);
    let fp = fingerprint_of(&der);
    let transport = ScriptedTransport::new([mismatch(), ok("pinned body")]);
    let client = scripted_client(
        transport.clone(),
        CannedProbe::with_cert(der),
        TlsPolicy::lenient([fp.to_ascii_lowercase()]),
    );
    let mut session = FetchSession::new();

    let resp = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap();
    assert_eq!(resp.body, "pinned body");

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].pinned_fingerprint, None);
    assert_eq!(seen[1].pinned_fingerprint.as_deref(), Some(fp.as_str()));
    assert_eq!(seen[1].url, seen[0].url);

    let m = session.metrics();
    assert_eq!(m.tls_hostname_mismatch, 1);
    assert_eq!(m.successes, 1);
}

#[tokio::test]
async fn lenient_rejects_an_unlisted_certificate() {
    let der = self_signed(&["default.example"]);
    let transport = ScriptedTransport::new([mismatch(), ok("unused")]);
    let client = scripted_client(
        transport.clone(),
        CannedProbe::with_cert(der),
        TlsPolicy::lenient(["AB".repeat(32)]),
    );
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    assert!(matches!(err, FxError::TlsHostnameMismatch(_)), "got {err:?}");
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test]
async fn fallback_host_is_tried_after_a_mismatch() {
    let der = self_signed(&["default.example"]);
    let probe = CannedProbe::with_cert(der);
    let transport = ScriptedTransport::new([mismatch(), ok("from alternate")]);
    let client = scripted_client(
        transport.clone(),
        probe.clone(),
        TlsPolicy::strict().with_fallback_hosts(["127.0.0.2"]),
    );
    let mut session = FetchSession::new();

    let resp = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap();
    assert_eq!(resp.body, "from alternate");

    let seen = transport.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].url.starts_with("https://127.0.0.1/"));
    assert_eq!(seen[1].url, "https://127.0.0.2/17105/index.html");
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn exhausted_fallback_hosts_report_the_last_host() {
    let transport = ScriptedTransport::new([mismatch(), mismatch(), ok("unused")]);
    let client = scripted_client(
        transport.clone(),
        CannedProbe::with_cert(self_signed(&["default.example"])),
        TlsPolicy::strict().with_fallback_hosts(["127.0.0.2"]),
    );
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    let diag = err.tls_diagnostic().expect("diagnostic attached");
    assert_eq!(diag.host, "127.0.0.2");
    assert_eq!(transport.seen().len(), 2);
}

#[tokio::test]
async fn probe_failure_is_recorded_not_raised() {
    let transport = ScriptedTransport::new([mismatch()]);
    let client = scripted_client(
        transport.clone(),
        CannedProbe::failing(),
        TlsPolicy::lenient(["AB".repeat(32)]),
    );
    let mut session = FetchSession::new();

    let err = client.fetch(&mut session, FetchRequest::get(target())).await.unwrap_err();
    let diag = err.tls_diagnostic().expect("diagnostic attached");
    assert!(diag.cert_sha256.is_none());
    assert!(
        diag.diag_error.as_deref().unwrap_or_default().contains("connection reset"),
        "{diag:?}"
    );
}
