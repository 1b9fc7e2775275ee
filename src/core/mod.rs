//! Core components of the `cnyfix` client.
//!
//! This module contains the foundational building blocks of the library, including:
//! - The main [`FxClient`] and its builder.
//! - The primary [`FxError`] type.
//! - Shared data models like [`RateQuote`] and [`MonthlyRateResult`].
//! - The fetch engine, its transport seam and the per-lookup [`FetchSession`].

/// The main client (`FxClient`), builder, and request configuration.
pub mod client;
/// The primary error type (`FxError`) for the crate.
pub mod error;
/// The fetch engine (`FxClient::fetch`).
pub mod fetch;
/// Shared data models used across sources, router and aggregator.
pub mod models;
/// Request cycle and metrics.
pub mod session;
/// The HTTP seam (`Transport`) and its `reqwest` implementation.
pub mod transport;

pub(crate) mod net;

// convenient re-exports so most code can just `use crate::core::FxClient`
pub use client::{FxClient, FxClientBuilder, IpFamily, RequestConfig, RequestOverrides};
pub use error::FxError;
pub use fetch::FetchRequest;
pub use models::{
    FallbackTier, MonthlyRateResult, PreferSource, RateOrigin, RateQuote, RoutedQuote,
    SourceKind, format_rate, quantize_rate,
};
pub use session::{FetchMetrics, FetchSession};
pub use transport::{
    AttemptRequest, HttpMethod, HttpResponse, ReqwestTransport, Transport, TransportError,
    TransportErrorKind,
};
