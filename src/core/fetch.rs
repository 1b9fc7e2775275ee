//! The fetch engine: deadline-capped attempts, timeout retries with backoff, and TLS
//! hostname-mismatch handling (diagnose once, then pin, switch host or fail).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use url::Url;

use crate::core::client::FxClient;
use crate::core::session::{FetchSession, remaining};
use crate::core::transport::{AttemptRequest, HttpMethod, HttpResponse, TransportErrorKind};
use crate::core::FxError;
use crate::tls::{ResolvedHost, TlsDiagnostic, resolve_ips, summarize_certificate};

/// One logical request; the engine may turn it into several attempts.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    method: HttpMethod,
    url: Url,
    query: Vec<(String, String)>,
    form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            query: Vec::new(),
            form: None,
        }
    }

    /// `POST` with an `application/x-www-form-urlencoded` body.
    pub fn post_form<I, K, V>(url: Url, form: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: HttpMethod::Post,
            url,
            query: Vec::new(),
            form: Some(form.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FxClient {
    /// Issue `req`, honouring the session's cycle deadline.
    ///
    /// Without an active cycle the configured total deadline bounds this single fetch.
    /// Only timeouts are retried. Any non-2xx status fails at once with [`FxError::Status`].
    #[tracing::instrument(skip(self, session, req), fields(method = req.method.as_str(), url = %req.url))]
    pub async fn fetch(
        &self,
        session: &mut FetchSession,
        req: FetchRequest,
    ) -> Result<HttpResponse, FxError> {
        let cfg = self.request_config();
        let end = session
            .cycle_deadline()
            .or_else(|| cfg.total_deadline.map(|d| Instant::now() + d));

        let mut url = req.url.clone();
        let port = url.port_or_known_default().unwrap_or(443);
        let mut host = host_of(&url)?;
        let mut resolved = self.resolve_host(session, &host, port).await?;
        let mut tried_hosts = vec![host.clone()];
        let mut diagnostic: Option<TlsDiagnostic> = None;
        let mut pinned_fingerprint: Option<String> = None;
        let mut last_err: Option<FxError> = None;
        let attempts = cfg.attempts.max(1);

        for attempt in 1..=attempts {
            let left = remaining(end);
            if left.is_some_and(|d| d.is_zero()) {
                session.metrics_mut().deadline_exceeded += 1;
                warn!(attempt, "deadline exhausted before request");
                return Err(FxError::Timeout {
                    url: url.to_string(),
                    reason: "deadline exceeded before request".into(),
                });
            }
            let connect_timeout = cap(cfg.connect_timeout, left);
            let read_timeout = cap(cfg.read_timeout, left);
            let pinned_addrs = resolved.pinned(cfg.ip_family, port);

            session.metrics_mut().attempts += 1;
            debug!(
                attempt,
                connect = ?connect_timeout,
                read = ?read_timeout,
                remaining = ?left,
                "attempt"
            );
            let started = Instant::now();
            let outcome = self
                .transport()
                .execute(AttemptRequest {
                    method: req.method,
                    url: &url,
                    query: &req.query,
                    form: req.form.as_deref(),
                    connect_timeout,
                    read_timeout,
                    total_timeout: left,
                    pinned_addrs: &pinned_addrs,
                    pinned_fingerprint: pinned_fingerprint.as_deref(),
                })
                .await;

            let err = match outcome {
                Ok(resp) if resp.is_success() => {
                    session.metrics_mut().successes += 1;
                    debug!(attempt, elapsed = ?started.elapsed(), status = resp.status, "attempt succeeded");
                    return Ok(resp);
                }
                Ok(resp) => {
                    session.metrics_mut().failures += 1;
                    warn!(status = resp.status, "unexpected status");
                    return Err(FxError::Status {
                        status: resp.status,
                        url: url.to_string(),
                    });
                }
                Err(err) => {
                    session.metrics_mut().failures += 1;
                    err
                }
            };

            match err.kind {
                TransportErrorKind::Timeout => {
                    debug!(attempt, elapsed = ?started.elapsed(), "attempt timed out");
                    last_err = Some(FxError::Timeout {
                        url: url.to_string(),
                        reason: err.message,
                    });
                }
                TransportErrorKind::HostnameMismatch => {
                    warn!(host = %host, error = %err.message, "tls hostname mismatch");
                    if diagnostic.is_none() {
                        let diag = self.diagnose(session, &host, &resolved, port, end).await;
                        if pinned_fingerprint.is_none()
                            && self.tls_policy().accepts(diag.cert_sha256.as_deref())
                        {
                            warn!(host = %host, fp = ?diag.cert_sha256, "lenient accept");
                            pinned_fingerprint = diag.cert_sha256.clone();
                            diagnostic = Some(diag);
                            continue;
                        }
                        diagnostic = Some(diag);
                    }
                    if let Some(alt) = self.tls_policy().next_fallback_host(&tried_hosts) {
                        warn!(from = %host, to = alt, "retrying with fallback host");
                        url.set_host(Some(alt))?;
                        host = alt.to_string();
                        tried_hosts.push(host.clone());
                        resolved = self.resolve_host(session, &host, port).await?;
                        pinned_fingerprint = None;
                        continue;
                    }
                    let diag = match diagnostic.take() {
                        Some(d) if d.host == host => d,
                        _ => TlsDiagnostic::basic(&host, &resolved, cfg.ip_family),
                    };
                    return Err(FxError::TlsHostnameMismatch(Box::new(diag)));
                }
                TransportErrorKind::Connect | TransportErrorKind::Tls | TransportErrorKind::Other => {
                    warn!(kind = ?err.kind, error = %err.message, "request failed");
                    return Err(FxError::Transport {
                        url: url.to_string(),
                        message: err.message,
                    });
                }
            }

            if attempt < attempts {
                let delay = cfg.backoff_delay(attempt, remaining(end));
                if !delay.is_zero() {
                    debug!(attempt, delay = ?delay, "backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| FxError::Transport {
            url: url.to_string(),
            message: "attempts exhausted".into(),
        }))
    }

    async fn resolve_host(
        &self,
        session: &mut FetchSession,
        host: &str,
        port: u16,
    ) -> Result<ResolvedHost, FxError> {
        let family = self.request_config().ip_family;
        let resolved = resolve_ips(host, port, family).await?;
        let metrics = session.metrics_mut();
        metrics.dns_a_count = resolved.ipv4.len();
        metrics.dns_aaaa_count = resolved.ipv6.len();
        metrics.ip_family_used = family;
        Ok(resolved)
    }

    /// Build the mismatch diagnostic, probing the certificate if time allows.
    async fn diagnose(
        &self,
        session: &mut FetchSession,
        host: &str,
        resolved: &ResolvedHost,
        port: u16,
        end: Option<Instant>,
    ) -> TlsDiagnostic {
        session.metrics_mut().tls_hostname_mismatch += 1;
        let cfg = self.request_config();
        let mut diag = TlsDiagnostic::basic(host, resolved, cfg.ip_family);

        let budget = cap(cfg.connect_timeout, remaining(end));
        match resolved.probe_target(cfg.ip_family) {
            _ if budget.is_zero() => diag.diag_error = Some("deadline exhausted before probe".into()),
            None => diag.diag_error = Some("no address to probe".into()),
            Some(ip) => {
                let probed = self
                    .cert_probe()
                    .peer_certificate(host, SocketAddr::new(ip, port), budget)
                    .await
                    .and_then(|der| summarize_certificate(host, &der));
                match probed {
                    Ok(summary) => diag = diag.with_certificate(ip.to_string(), summary),
                    Err(e) => diag.diag_error = Some(e.to_string()),
                }
            }
        }
        info!(tls_diag = %diag.to_json(), "tls diagnostic");
        diag
    }
}

fn host_of(url: &Url) -> Result<String, FxError> {
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| FxError::Config(format!("URL has no host: {url}")))
}

fn cap(configured: Duration, left: Option<Duration>) -> Duration {
    match left {
        Some(l) => configured.min(l),
        None => configured,
    }
}
