//! Public client surface + builder.
//! Internals are split into `retry` (request settings + backoff) and `constants` (UA + defaults).

mod constants;
mod retry;

pub(crate) use constants::USER_AGENT;
pub use retry::{IpFamily, RequestConfig, RequestOverrides};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use constants::{
    DEFAULT_CFETS_NOTICE, DEFAULT_PBC_INDEX, DEFAULT_PBC_KEYCHART, DEFAULT_SAFE_PORTAL,
    SNAPSHOT_DIR_ENV,
};
use tracing::debug;
use url::Url;

use crate::core::session::FetchSession;
use crate::core::transport::{ReqwestTransport, Transport};
use crate::core::FxError;
use crate::tls::{CertProbe, RustlsProbe, TlsPolicy};

/// Shared handle to the fetch engine and the source endpoints.
///
/// Cloning is cheap; clones share the request configuration, so
/// [`FxClient::configure_requests`] on one is seen by all.
#[derive(Clone)]
pub struct FxClient {
    transport: Arc<dyn Transport>,
    cert_probe: Arc<dyn CertProbe>,
    request_config: Arc<RwLock<RequestConfig>>,
    default_config: RequestConfig,
    tls_policy: TlsPolicy,

    pbc_index: Url,
    pbc_keychart: Url,
    cfets_notice: Url,
    safe_portal: Url,

    snapshot_dir: Option<PathBuf>,
}

impl fmt::Debug for FxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FxClient")
            .field("request_config", &self.request_config())
            .field("tls_policy", &self.tls_policy)
            .field("pbc_index", &self.pbc_index.as_str())
            .field("cfets_notice", &self.cfets_notice.as_str())
            .field("safe_portal", &self.safe_portal.as_str())
            .field("snapshot_dir", &self.snapshot_dir)
            .finish_non_exhaustive()
    }
}

impl FxClient {
    /// Create a new builder.
    pub fn builder() -> FxClientBuilder {
        FxClientBuilder::default()
    }

    /* -------- request configuration -------- */

    /// Snapshot of the settings the next attempt will use.
    pub fn request_config(&self) -> RequestConfig {
        match self.request_config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Override parts of the request configuration for subsequent cycles.
    pub fn configure_requests(&self, overrides: RequestOverrides) {
        let mut guard = match self.request_config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.apply(&overrides);
        debug!(config = ?*guard, "request config updated");
    }

    /// Restore the configuration the client was built with.
    pub fn reset_request_config(&self) {
        let mut guard = match self.request_config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = self.default_config.clone();
    }

    /// Start a request cycle on `session`. `None` uses the configured total deadline.
    pub fn begin_request_cycle(
        &self,
        session: &mut FetchSession,
        total_deadline: Option<Duration>,
    ) -> Result<(), FxError> {
        session.begin_cycle(total_deadline.or(self.request_config().total_deadline))
    }

    pub fn end_request_cycle(&self, session: &mut FetchSession) {
        session.end_cycle();
    }

    /* -------- internal getters used by other modules -------- */

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
    pub(crate) fn cert_probe(&self) -> &dyn CertProbe {
        self.cert_probe.as_ref()
    }
    pub fn tls_policy(&self) -> &TlsPolicy {
        &self.tls_policy
    }
    pub(crate) fn pbc_index(&self) -> &Url {
        &self.pbc_index
    }
    pub(crate) fn pbc_keychart(&self) -> &Url {
        &self.pbc_keychart
    }
    pub(crate) fn cfets_notice(&self) -> &Url {
        &self.cfets_notice
    }
    pub(crate) fn safe_portal(&self) -> &Url {
        &self.safe_portal
    }

    /// Where raw portal snapshots go, if anywhere.
    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot_dir.as_deref()
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct FxClientBuilder {
    user_agent: Option<String>,
    pbc_index: Option<Url>,
    pbc_keychart: Option<Url>,
    cfets_notice: Option<Url>,
    safe_portal: Option<Url>,

    request_config: Option<RequestConfig>,
    tls_policy: Option<TlsPolicy>,
    snapshot_dir: Option<PathBuf>,

    transport: Option<Arc<dyn Transport>>,
    cert_probe: Option<Arc<dyn CertProbe>>,
}

impl FxClientBuilder {
    /// Override the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Override the PBOC announcement directory (page files are joined onto it).
    pub fn pbc_index(mut self, url: Url) -> Self {
        self.pbc_index = Some(url);
        self
    }

    /// Override the PBOC key chart page.
    pub fn pbc_keychart(mut self, url: Url) -> Self {
        self.pbc_keychart = Some(url);
        self
    }

    /// Override the CFETS daily notice page.
    pub fn cfets_notice(mut self, url: Url) -> Self {
        self.cfets_notice = Some(url);
        self
    }

    /// Override the SAFE query endpoint.
    pub fn safe_portal(mut self, url: Url) -> Self {
        self.safe_portal = Some(url);
        self
    }

    /// Replace the default request configuration; [`FxClient::reset_request_config`]
    /// returns to this value.
    pub fn request_config(mut self, cfg: RequestConfig) -> Self {
        self.request_config = Some(cfg);
        self
    }

    /// TLS mismatch policy. Default: read from the environment.
    pub fn tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = Some(policy);
        self
    }

    /// Directory for raw SAFE snapshots. Default: `SAFE_SNAPSHOT_DIR`, else none.
    pub fn snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Swap the HTTP layer.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Swap the certificate probe used for diagnostics.
    pub fn cert_probe(mut self, probe: Arc<dyn CertProbe>) -> Self {
        self.cert_probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<FxClient, FxError> {
        let pbc_index = self.pbc_index.map_or_else(|| Url::parse(DEFAULT_PBC_INDEX), Ok)?;
        let pbc_keychart = self
            .pbc_keychart
            .map_or_else(|| Url::parse(DEFAULT_PBC_KEYCHART), Ok)?;
        let cfets_notice = self
            .cfets_notice
            .map_or_else(|| Url::parse(DEFAULT_CFETS_NOTICE), Ok)?;
        let safe_portal = self
            .safe_portal
            .map_or_else(|| Url::parse(DEFAULT_SAFE_PORTAL), Ok)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(
                self.user_agent.as_deref().unwrap_or(USER_AGENT),
            )),
        };
        let cert_probe: Arc<dyn CertProbe> = match self.cert_probe {
            Some(p) => p,
            None => Arc::new(RustlsProbe),
        };

        let default_config = self.request_config.unwrap_or_default();
        if default_config.attempts == 0 {
            return Err(FxError::Config("attempts must be at least 1".into()));
        }

        let snapshot_dir = self.snapshot_dir.or_else(|| {
            std::env::var_os(SNAPSHOT_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });

        Ok(FxClient {
            transport,
            cert_probe,
            request_config: Arc::new(RwLock::new(default_config.clone())),
            default_config,
            tls_policy: self.tls_policy.unwrap_or_else(TlsPolicy::from_env),
            pbc_index,
            pbc_keychart,
            cfets_notice,
            safe_portal,
            snapshot_dir,
        })
    }
}
