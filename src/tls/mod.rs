//! TLS failure analysis: DNS family resolution, a raw certificate probe and the
//! strict/lenient acceptance policy.
//!
//! A [`TlsDiagnostic`] is only assembled when a server presents a certificate that does not
//! cover the requested host. It travels inside [`crate::FxError::TlsHostnameMismatch`] and is
//! never cached beyond the failing fetch.

mod policy;
mod probe;
mod resolve;
mod verify;

pub use policy::{TlsPolicy, normalize_fingerprint};
pub use probe::{CertProbe, CertSummary, RustlsProbe, dns_name_matches, summarize_certificate};
pub use resolve::{ResolvedHost, resolve_ips};
pub(crate) use verify::pinned_client_config;

use serde::Serialize;

use crate::core::client::IpFamily;

/// Error code stamped on every hostname-mismatch diagnostic.
pub const CERT_HOSTNAME_MISMATCH: &str = "CERT_HOSTNAME_MISMATCH";

/// Structured report of a hostname mismatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsDiagnostic {
    pub host: String,
    pub resolved_ipv4: Vec<String>,
    pub resolved_ipv6: Vec<String>,
    pub ip_family_used: IpFamily,
    pub error_code: String,
    pub connected_ip: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
    pub cert_san: Vec<String>,
    pub san_contains_host: bool,
    /// 64 upper-case hex characters.
    pub cert_sha256: Option<String>,
    pub proxy_env_detected: bool,
    /// Why the certificate probe itself failed, if it did.
    pub diag_error: Option<String>,
}

impl TlsDiagnostic {
    /// A diagnostic holding only what is known without probing the server.
    pub fn basic(host: &str, resolved: &ResolvedHost, family: IpFamily) -> Self {
        Self {
            host: host.to_string(),
            resolved_ipv4: resolved.ipv4.iter().map(ToString::to_string).collect(),
            resolved_ipv6: resolved.ipv6.iter().map(ToString::to_string).collect(),
            ip_family_used: family,
            error_code: CERT_HOSTNAME_MISMATCH.to_string(),
            connected_ip: None,
            cert_subject: None,
            cert_issuer: None,
            cert_san: Vec::new(),
            san_contains_host: false,
            cert_sha256: None,
            proxy_env_detected: proxy_env_detected(),
            diag_error: None,
        }
    }

    pub(crate) fn with_certificate(mut self, connected_ip: String, summary: CertSummary) -> Self {
        self.connected_ip = Some(connected_ip);
        self.cert_subject = Some(summary.subject);
        self.cert_issuer = Some(summary.issuer);
        self.cert_san = summary.san;
        self.san_contains_host = summary.san_contains_host;
        self.cert_sha256 = normalize_fingerprint(&summary.sha256);
        self
    }

    /// Single-line JSON for logs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

fn proxy_env_detected() -> bool {
    ["http_proxy", "https_proxy", "HTTP_PROXY", "HTTPS_PROXY"]
        .iter()
        .any(|key| std::env::var_os(key).is_some())
}
