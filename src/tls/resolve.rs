use std::net::{IpAddr, SocketAddr};

use tracing::debug;

use crate::core::FxError;
use crate::core::client::IpFamily;

/// Addresses a host resolved to, split by family and de-duplicated in resolver order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedHost {
    pub ipv4: Vec<IpAddr>,
    pub ipv6: Vec<IpAddr>,
}

impl ResolvedHost {
    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut out = Self::default();
        for addr in addrs {
            let bucket = if addr.is_ipv4() { &mut out.ipv4 } else { &mut out.ipv6 };
            if !bucket.contains(&addr) {
                bucket.push(addr);
            }
        }
        out
    }

    /// Fails when the preferred family has no address at all.
    pub fn require_family(&self, host: &str, family: IpFamily) -> Result<(), FxError> {
        match family {
            IpFamily::V4 if self.ipv4.is_empty() => Err(FxError::Config(format!(
                "no IPv4 address resolved for {host}"
            ))),
            IpFamily::V6 if self.ipv6.is_empty() => Err(FxError::Config(format!(
                "no IPv6 address resolved for {host}"
            ))),
            _ => Ok(()),
        }
    }

    /// Addresses connections must be pinned to; empty under `auto`.
    pub fn pinned(&self, family: IpFamily, port: u16) -> Vec<SocketAddr> {
        let addrs = match family {
            IpFamily::Auto => return Vec::new(),
            IpFamily::V4 => &self.ipv4,
            IpFamily::V6 => &self.ipv6,
        };
        addrs.iter().map(|ip| SocketAddr::new(*ip, port)).collect()
    }

    /// Address the certificate probe connects to.
    pub fn probe_target(&self, family: IpFamily) -> Option<IpAddr> {
        match family {
            IpFamily::V6 => self.ipv6.first().copied(),
            IpFamily::V4 => self.ipv4.first().copied(),
            IpFamily::Auto => self.ipv4.first().or_else(|| self.ipv6.first()).copied(),
        }
    }
}

/// Resolve `host` and check the result against the family preference.
///
/// IP literals are returned as-is without touching the resolver.
pub async fn resolve_ips(host: &str, port: u16, family: IpFamily) -> Result<ResolvedHost, FxError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let resolved = if let Ok(ip) = bare.parse::<IpAddr>() {
        ResolvedHost::from_addrs([ip])
    } else {
        let addrs = tokio::net::lookup_host((bare, port))
            .await
            .map_err(|e| FxError::Transport {
                url: host.to_string(),
                message: format!("dns resolution failed: {e}"),
            })?;
        ResolvedHost::from_addrs(addrs.map(|sa| sa.ip()))
    };
    debug!(
        host,
        a = resolved.ipv4.len(),
        aaaa = resolved.ipv6.len(),
        family = %family,
        "resolved host"
    );
    resolved.require_family(host, family)?;
    Ok(resolved)
}
