use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::core::FxError;

/// Which address family outbound connections may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum IpFamily {
    /// Whatever the resolver returns.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// IPv4 only.
    #[serde(rename = "4")]
    V4,
    /// IPv6 only.
    #[serde(rename = "6")]
    V6,
}

impl IpFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            IpFamily::Auto => "auto",
            IpFamily::V4 => "4",
            IpFamily::V6 => "6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpFamily {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(IpFamily::Auto),
            "4" | "ipv4" => Ok(IpFamily::V4),
            "6" | "ipv6" => Ok(IpFamily::V6),
            other => Err(FxError::Config(format!("invalid ip-family: {other}"))),
        }
    }
}

/// Settings applied to every HTTP attempt of a request cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestConfig {
    /// Upper bound for establishing a connection.
    pub connect_timeout: Duration,
    /// Upper bound for each read on an established connection.
    pub read_timeout: Duration,
    /// Total attempts per logical fetch (not retries).
    pub attempts: u32,
    /// First backoff delay; doubles on every further attempt.
    pub backoff_base: Duration,
    /// Ceiling of the uniform random jitter added to each backoff.
    pub jitter: Duration,
    /// Budget shared by a whole cycle. `None` means unbounded.
    pub total_deadline: Option<Duration>,
    pub ip_family: IpFamily,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(8),
            attempts: 3,
            backoff_base: Duration::from_millis(800),
            jitter: Duration::from_millis(250),
            total_deadline: Some(Duration::from_secs(30)),
            ip_family: IpFamily::Auto,
        }
    }
}

impl RequestConfig {
    /// Delay before the attempt following `attempt` (1-based):
    /// `backoff_base * 2^(attempt-1) + uniform(0, jitter)`, capped by `remaining`.
    pub fn backoff_delay(&self, attempt: u32, remaining: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self.backoff_base.as_secs_f64() * f64::from(1u32 << exponent);
        let jitter = self.jitter.as_secs_f64() * fastrand::f64();
        let delay = Duration::from_secs_f64(scaled + jitter);
        match remaining {
            Some(left) => delay.min(left),
            None => delay,
        }
    }

    pub(crate) fn apply(&mut self, overrides: &RequestOverrides) {
        if let Some(t) = overrides.connect_timeout {
            self.connect_timeout = t;
        }
        if let Some(t) = overrides.read_timeout {
            self.read_timeout = t;
        }
        if let Some(d) = overrides.total_deadline {
            self.total_deadline = Some(d);
        }
        if let Some(f) = overrides.ip_family {
            self.ip_family = f;
        }
    }
}

/// Partial update for [`RequestConfig`]; unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct RequestOverrides {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub total_deadline: Option<Duration>,
    pub ip_family: Option<IpFamily>,
}
