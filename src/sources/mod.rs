//! The three USD/CNY central parity scrapers.
//!
//! Each source reads one public site and nothing else; they share no state and reach the
//! network only through [`FxClient::fetch`](crate::FxClient::fetch).

use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDate;

use crate::core::{FetchSession, FxError, RateQuote, SourceKind};

pub mod cfets;
pub(crate) mod html;
pub mod pbc;
pub mod safe;

pub use cfets::CfetsSource;
pub use pbc::PbcSource;
pub use safe::SafeSource;

/// A source that can quote the USD/CNY mid-rate for one date.
///
/// Errors follow one convention: [`FxError::TlsHostnameMismatch`] for certificate trouble,
/// [`FxError::Timeout`] when the budget ran out, and lookup misses
/// ([`FxError::is_lookup_miss`]) when the source simply has nothing.
pub trait RateLookup: Send + Sync {
    /// Which scraper this is.
    fn kind(&self) -> SourceKind;

    /// Quote for `date`. The returned source date may differ from `date`.
    fn lookup<'a>(
        &'a self,
        session: &'a mut FetchSession,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<RateQuote, FxError>> + Send + 'a>>;
}
