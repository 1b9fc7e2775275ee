use std::collections::BTreeSet;
use std::env;

use tracing::warn;

const STRICT_ENV: &str = "PBC_STRICT_TLS";
const FINGERPRINTS_ENV: &str = "PBC_ALLOWED_CERT_FINGERPRINTS";
const FALLBACK_HOSTS_ENV: &str = "PBC_FALLBACK_HOSTS";

/// How the fetch engine answers a certificate that does not cover the requested host.
///
/// Strict (the default) always fails. Lenient accepts only certificates whose SHA-256
/// fingerprint was allow-listed by the operator; an empty allow-list accepts nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    strict: bool,
    allowed_fingerprints: BTreeSet<String>,
    fallback_hosts: Vec<String>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl TlsPolicy {
    pub fn strict() -> Self {
        Self {
            strict: true,
            allowed_fingerprints: BTreeSet::new(),
            fallback_hosts: Vec::new(),
        }
    }

    /// Lenient mode with an allow-list. Tokens that are not SHA-256 fingerprints are ignored.
    pub fn lenient<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            strict: false,
            allowed_fingerprints: fingerprints
                .into_iter()
                .filter_map(|fp| normalize_fingerprint(fp.as_ref()))
                .collect(),
            fallback_hosts: Vec::new(),
        }
    }

    /// Hosts substituted, in order, for one that presented a mismatching certificate.
    pub fn with_fallback_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_hosts = hosts
            .into_iter()
            .map(Into::into)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    /// Read `PBC_STRICT_TLS`, `PBC_ALLOWED_CERT_FINGERPRINTS` and `PBC_FALLBACK_HOSTS`.
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var(STRICT_ENV).ok().as_deref(),
            env::var(FINGERPRINTS_ENV).ok().as_deref(),
            env::var(FALLBACK_HOSTS_ENV).ok().as_deref(),
        )
    }

    /// Same parsing as [`TlsPolicy::from_env`] over explicit values.
    pub fn from_vars(strict: Option<&str>, fingerprints: Option<&str>, fallback_hosts: Option<&str>) -> Self {
        let strict = strict.map(str::trim).unwrap_or("1") != "0";
        let mut allowed_fingerprints = BTreeSet::new();
        for token in fingerprints.unwrap_or_default().split(',') {
            if token.trim().is_empty() {
                continue;
            }
            match normalize_fingerprint(token) {
                Some(fp) => {
                    allowed_fingerprints.insert(fp);
                }
                None => warn!(token = token.trim(), "ignoring malformed certificate fingerprint"),
            }
        }
        let policy = Self {
            strict,
            allowed_fingerprints,
            fallback_hosts: Vec::new(),
        };
        policy.with_fallback_hosts(fallback_hosts.unwrap_or_default().split(','))
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn allowed_fingerprints(&self) -> &BTreeSet<String> {
        &self.allowed_fingerprints
    }

    pub fn fallback_hosts(&self) -> &[String] {
        &self.fallback_hosts
    }

    /// Whether a mismatching certificate with this fingerprint may be used anyway.
    pub fn accepts(&self, fingerprint: Option<&str>) -> bool {
        if self.strict {
            return false;
        }
        fingerprint
            .and_then(normalize_fingerprint)
            .is_some_and(|fp| self.allowed_fingerprints.contains(&fp))
    }

    /// First configured fallback host not yet tried.
    pub fn next_fallback_host(&self, tried: &[String]) -> Option<&str> {
        self.fallback_hosts
            .iter()
            .find(|h| !tried.iter().any(|t| t.eq_ignore_ascii_case(h)))
            .map(String::as_str)
    }
}

/// Strip everything but hex digits and upper-case the rest; `None` unless 64 digits remain.
pub fn normalize_fingerprint(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (hex.len() == 64).then_some(hex)
}
