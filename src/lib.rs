//! cnyfix: USD/CNY central parity lookups that survive unreliable sources.
//!
//! A lookup for one date cascades over three public sites (PBOC announcements, the CFETS
//! daily notice, the SAFE query portal) through a single fetch engine with a shared deadline,
//! timeout retries and TLS hostname-mismatch diagnostics. Monthly rates are probed around
//! each month's first business day and merged into an idempotent CSV cache.
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use cnyfix::{FetchSession, FxClient, PreferSource, SourceRouter};
//!
//! # async fn run() -> Result<(), cnyfix::FxError> {
//! let client = FxClient::builder().build()?;
//! let router = SourceRouter::new(client);
//! let mut session = FetchSession::new();
//! let date = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
//! let routed = router
//!     .fetch_with_fallback(&mut session, date, PreferSource::Auto)
//!     .await?;
//! println!("{} via {}", routed.quote.mid_rate(), routed.fallback_used);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod monthly;
pub mod router;
pub mod sources;
pub mod store;
pub mod tls;

pub use crate::core::{
    FallbackTier, FetchMetrics, FetchRequest, FetchSession, FxClient, FxClientBuilder, FxError,
    HttpResponse, IpFamily, MonthlyRateResult, PreferSource, RateOrigin, RateQuote,
    RequestConfig, RequestOverrides, RoutedQuote, SourceKind, Transport,
};
pub use monthly::{BusinessCalendar, fetch_month_rate, first_business_day};
pub use router::SourceRouter;
pub use sources::{CfetsSource, PbcSource, RateLookup, SafeSource};
pub use store::{RateStore, UpsertReport, plan_missing_months, upsert_csv};
pub use tls::{TlsDiagnostic, TlsPolicy};

/// Install a `fmt` subscriber honouring `RUST_LOG`. Repeated calls are no-ops.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
