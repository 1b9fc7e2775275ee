//! One HTTP exchange per call. Retrying, deadlines and TLS analysis live in `core::fetch`.

use std::error::Error as _;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use url::Url;

use crate::tls::pinned_client_config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Everything a transport needs to issue a single attempt.
#[derive(Clone, Debug)]
pub struct AttemptRequest<'a> {
    pub method: HttpMethod,
    pub url: &'a Url,
    pub query: &'a [(String, String)],
    /// URL-encoded form body; only sent with `POST`.
    pub form: Option<&'a [(String, String)]>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Whole-exchange bound, set from the remaining cycle budget.
    pub total_timeout: Option<Duration>,
    /// Connect only to these addresses. Empty lets the resolver decide.
    pub pinned_addrs: &'a [SocketAddr],
    /// Accept exactly the certificate with this SHA-256 fingerprint, ignoring its names.
    pub pinned_fingerprint: Option<&'a str>,
}

/// A fully-read response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The certificate chain is fine but does not name the requested host.
    HostnameMismatch,
    /// Any other handshake or certificate failure.
    Tls,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn hostname_mismatch(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::HostnameMismatch, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Issues one HTTP attempt.
///
/// [`ReqwestTransport`] is the production implementation; tests inject scripted ones.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        req: AttemptRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;
}

/// `reqwest` over `rustls`. A client is built per attempt because connect/read timeouts,
/// address pinning and certificate pinning are all client-level settings.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    fn client_for(&self, req: &AttemptRequest<'_>) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .no_proxy()
            .connect_timeout(req.connect_timeout)
            .read_timeout(req.read_timeout);
        if let Some(total) = req.total_timeout {
            builder = builder.timeout(total);
        }
        if let Some(host) = req.url.host_str()
            && !req.pinned_addrs.is_empty()
        {
            builder = builder.resolve_to_addrs(host, req.pinned_addrs);
        }
        if let Some(fp) = req.pinned_fingerprint {
            let tls = pinned_client_config(fp)
                .map_err(|e| TransportError::new(TransportErrorKind::Tls, e.to_string()))?;
            builder = builder.use_preconfigured_tls(tls);
        }
        builder
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(crate::core::client::USER_AGENT)
    }
}

impl Transport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        req: AttemptRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for(&req)?;
            let mut builder = match req.method {
                HttpMethod::Get => client.get(req.url.clone()),
                HttpMethod::Post => client.post(req.url.clone()),
            };
            if !req.query.is_empty() {
                builder = builder.query(req.query);
            }
            if let (HttpMethod::Post, Some(form)) = (req.method, req.form) {
                builder = builder.form(form);
            }

            let resp = builder.send().await.map_err(classify)?;
            let status = resp.status().as_u16();
            let url = resp.url().to_string();
            let body = resp.text().await.map_err(classify)?;
            Ok(HttpResponse { status, url, body })
        })
    }
}

/// Map a `reqwest` failure onto the kinds the fetch engine reacts to.
pub(crate) fn classify(err: reqwest::Error) -> TransportError {
    let chain = error_chain_text(&err);
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_hostname_mismatch_text(&chain) {
        TransportErrorKind::HostnameMismatch
    } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        TransportErrorKind::Tls
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, chain)
}

fn error_chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_ascii_lowercase()
}

/// Matches the wording rustls and OpenSSL-style stacks use for a name mismatch.
pub(crate) fn is_hostname_mismatch_text(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("notvalidforname")
        || text.contains("not valid for name")
        || text.contains("hostnamemismatch")
        || (text.contains("hostname") && text.contains("match"))
}
