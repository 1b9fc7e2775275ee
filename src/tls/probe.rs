use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::extensions::GeneralName;

use crate::core::FxError;
use crate::tls::verify::capturing_client_config;

/// Fetches the end-entity certificate a server presents for `host`.
///
/// Implemented by [`RustlsProbe`]; tests substitute canned certificates.
pub trait CertProbe: Send + Sync {
    /// DER bytes of the leaf certificate.
    fn peer_certificate<'a>(
        &'a self,
        host: &'a str,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FxError>> + Send + 'a>>;
}

/// Opens a raw TLS connection, accepting any certificate, and keeps what was presented.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustlsProbe;

impl CertProbe for RustlsProbe {
    fn peer_certificate<'a>(
        &'a self,
        host: &'a str,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FxError>> + Send + 'a>> {
        Box::pin(async move {
            let (config, verifier) = capturing_client_config()?;
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|e| FxError::Config(format!("invalid server name {host}: {e}")))?;

            let handshake = async {
                let tcp = TcpStream::connect(addr).await?;
                connector.connect(server_name, tcp).await
            };
            let outcome = tokio::time::timeout(timeout, handshake).await;

            if let Some(der) = verifier.take() {
                return Ok(der);
            }
            match outcome {
                Err(_) => Err(FxError::Timeout {
                    url: format!("{host} ({addr})"),
                    reason: "certificate probe timed out".into(),
                }),
                Ok(Err(e)) => Err(FxError::Transport {
                    url: format!("{host} ({addr})"),
                    message: format!("certificate probe failed: {e}"),
                }),
                Ok(Ok(_)) => Err(FxError::Data(format!(
                    "handshake with {host} completed without a certificate"
                ))),
            }
        })
    }
}

/// Human-readable facts about a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    pub subject: String,
    pub issuer: String,
    /// Entries like `DNS:www.example.com` or `IP Address:1.2.3.4`.
    pub san: Vec<String>,
    pub san_contains_host: bool,
    pub sha256: String,
}

/// Parse a DER certificate and check whether its DNS SANs cover `host`.
pub fn summarize_certificate(host: &str, der: &[u8]) -> Result<CertSummary, FxError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| FxError::Data(format!("certificate parse: {e}")))?;

    let mut san = Vec::new();
    let mut san_contains_host = false;
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for name in &ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => {
                    san_contains_host |= dns_name_matches(dns, host);
                    san.push(format!("DNS:{dns}"));
                }
                GeneralName::IPAddress(bytes) => san.push(format!("IP Address:{}", ip_text(bytes))),
                other => san.push(format!("{other:?}")),
            }
        }
    }
    debug!(host, entries = san.len(), san_contains_host, "certificate summarized");

    Ok(CertSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        san,
        san_contains_host,
        sha256: fingerprint_sha256(der),
    })
}

/// Case-insensitive SAN match; `*.example.com` covers exactly one extra label.
pub fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if pattern == host {
        return true;
    }
    match (pattern.strip_prefix("*."), host.split_once('.')) {
        (Some(suffix), Some((label, rest))) => !label.is_empty() && rest == suffix,
        _ => false,
    }
}

pub(crate) fn fingerprint_sha256(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}

fn ip_text(bytes: &[u8]) -> String {
    match bytes.len() {
        4 => std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            std::net::Ipv6Addr::from(octets).to_string()
        }
        _ => hex::encode(bytes),
    }
}
