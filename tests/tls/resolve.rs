use std::net::{IpAddr, SocketAddr};

use cnyfix::IpFamily;
use cnyfix::tls::{ResolvedHost, resolve_ips};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn addresses_split_by_family_without_repeats() {
    let resolved = ResolvedHost::from_addrs([ip("10.0.0.1"), ip("::1"), ip("10.0.0.1"), ip("10.0.0.2")]);
    assert_eq!(resolved.ipv4, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
    assert_eq!(resolved.ipv6, vec![ip("::1")]);
}

#[test]
fn pinning_follows_the_family() {
    let resolved = ResolvedHost::from_addrs([ip("10.0.0.1"), ip("::1")]);
    assert!(resolved.pinned(IpFamily::Auto, 443).is_empty());
    assert_eq!(
        resolved.pinned(IpFamily::V4, 443),
        vec![SocketAddr::new(ip("10.0.0.1"), 443)]
    );
    assert_eq!(
        resolved.pinned(IpFamily::V6, 443),
        vec![SocketAddr::new(ip("::1"), 443)]
    );
    assert_eq!(resolved.probe_target(IpFamily::Auto), Some(ip("10.0.0.1")));
    assert_eq!(resolved.probe_target(IpFamily::V6), Some(ip("::1")));
}

#[tokio::test]
async fn literals_skip_the_resolver_and_respect_the_family() {
    let resolved = resolve_ips("127.0.0.1", 443, IpFamily::V4).await.unwrap();
    assert_eq!(resolved.ipv4, vec![ip("127.0.0.1")]);

    let err = resolve_ips("127.0.0.1", 443, IpFamily::V6).await.unwrap_err();
    assert!(matches!(err, cnyfix::FxError::Config(_)), "got {err:?}");
}

#[test]
fn family_parses_from_cli_style_values() {
    assert_eq!("4".parse::<IpFamily>().unwrap(), IpFamily::V4);
    assert_eq!("IPv6".parse::<IpFamily>().unwrap(), IpFamily::V6);
    assert_eq!("auto".parse::<IpFamily>().unwrap(), IpFamily::Auto);
    assert!("5".parse::<IpFamily>().is_err());
}
