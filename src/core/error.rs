use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::tls::TlsDiagnostic;

/// The primary error type for all fallible operations in this crate.
#[derive(Debug, Error)]
pub enum FxError {
    /// Invalid settings: unknown source preference, unresolvable IP family, a cycle that is
    /// already running, or a calendar without any business day.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request cycle deadline ran out before or during an attempt.
    #[error("fetch timeout for {url}: {reason}")]
    Timeout {
        /// The URL being fetched.
        url: String,
        /// What ran out.
        reason: String,
    },

    /// The server presented a certificate that does not cover the requested host.
    #[error("tls hostname mismatch for {}", .0.host)]
    TlsHostnameMismatch(Box<TlsDiagnostic>),

    /// A connection or protocol failure that is not a timeout.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// The underlying failure.
        message: String,
    },

    /// The server returned an unexpected or unsuccessful HTTP status code.
    #[error("Unexpected response status: {status} at {url}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
    },

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The source was reachable but has no quote for the date.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Every source in the cascade failed for the date.
    #[error("USD/CNY midpoint unavailable for {date}")]
    RateUnavailable {
        /// The requested date.
        date: NaiveDate,
    },

    /// Every candidate date of the month failed.
    #[error("USD/CNY rate unavailable for {year}-{month:02}")]
    MonthUnavailable {
        /// Calendar year.
        year: i32,
        /// Calendar month (1-12).
        month: u32,
    },

    /// Another writer holds the store.
    #[error("store is locked: {}", .0.display())]
    StoreLocked(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The holiday/workday override file could not be read.
    #[error("calendar error: {0}")]
    Calendar(String),

    /// The data received was in an unexpected format or violated an invariant.
    #[error("Data format unexpected or missing field: {0}")]
    Data(String),
}

impl FxError {
    /// True for failures that mean "this source/date has nothing", which the router and the
    /// monthly aggregator answer by moving on to the next source or candidate.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            FxError::Timeout { .. }
                | FxError::Transport { .. }
                | FxError::Status { .. }
                | FxError::Lookup(_)
                | FxError::RateUnavailable { .. }
                | FxError::Data(_)
        )
    }

    /// The TLS diagnostic carried by a hostname mismatch, if any.
    pub fn tls_diagnostic(&self) -> Option<&TlsDiagnostic> {
        match self {
            FxError::TlsHostnameMismatch(diag) => Some(diag),
            _ => None,
        }
    }
}
