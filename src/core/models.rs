use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::core::FxError;

/* ----- SOURCES ----- */

/// The three independent scrapers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pbc,
    Cfets,
    Safe,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Pbc => "pbc",
            SourceKind::Cfets => "cfets",
            SourceKind::Safe => "safe",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The page a quote was actually read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    PbcNotice,
    PbcKeychart,
    CfetsNotice,
    SafePortal,
}

impl RateOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            RateOrigin::PbcNotice => "pbc_notice",
            RateOrigin::PbcKeychart => "pbc_keychart",
            RateOrigin::CfetsNotice => "cfets_notice",
            RateOrigin::SafePortal => "safe_portal",
        }
    }
}

impl fmt::Display for RateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller preference that decides the cascade order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreferSource {
    #[default]
    Auto,
    Pbc,
    Cfets,
    Safe,
}

impl PreferSource {
    /// Sources in the order they are tried.
    pub fn order(self) -> &'static [SourceKind] {
        match self {
            PreferSource::Auto | PreferSource::Pbc => {
                &[SourceKind::Pbc, SourceKind::Cfets, SourceKind::Safe]
            }
            PreferSource::Cfets => &[SourceKind::Cfets, SourceKind::Safe],
            PreferSource::Safe => &[SourceKind::Safe],
        }
    }

    /// Whether the route starts at PBOC.
    pub fn includes_pbc(self) -> bool {
        matches!(self, PreferSource::Auto | PreferSource::Pbc)
    }
}

impl FromStr for PreferSource {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(PreferSource::Auto),
            "pbc" => Ok(PreferSource::Pbc),
            "cfets" => Ok(PreferSource::Cfets),
            "safe" => Ok(PreferSource::Safe),
            _ => Err(FxError::Config(format!("Unsupported prefer-source: {s}"))),
        }
    }
}

/// Which route produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackTier {
    /// The first source tried, for the date asked.
    None,
    /// A later date than the one asked for.
    Forward,
    /// An earlier date than the one asked for.
    Backward,
    /// A later source in the cascade.
    Source(SourceKind),
}

impl FallbackTier {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackTier::None => "none",
            FallbackTier::Forward => "forward",
            FallbackTier::Backward => "backward",
            FallbackTier::Source(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FallbackTier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/* ----- QUOTES ----- */

/// A single USD/CNY mid-rate read from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateQuote {
    mid_rate: Decimal,
    source_date: NaiveDate,
    origin: RateOrigin,
}

impl RateQuote {
    /// Rounds `mid_rate` half-up to four decimals and rejects non-positive values.
    pub fn new(mid_rate: Decimal, source_date: NaiveDate, origin: RateOrigin) -> Result<Self, FxError> {
        let mid_rate = quantize_rate(mid_rate);
        if mid_rate <= Decimal::ZERO {
            return Err(FxError::Data(format!("non-positive mid rate {mid_rate} from {origin}")));
        }
        Ok(Self {
            mid_rate,
            source_date,
            origin,
        })
    }

    pub fn mid_rate(&self) -> Decimal {
        self.mid_rate
    }

    /// Date the quote was published for; may differ from the date requested.
    pub fn source_date(&self) -> NaiveDate {
        self.source_date
    }

    pub fn origin(&self) -> RateOrigin {
        self.origin
    }
}

/// A quote plus the cascade tier that satisfied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedQuote {
    pub quote: RateQuote,
    pub fallback_used: FallbackTier,
}

/// The monthly cache entry computed for `(year, month)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRateResult {
    pub year: i32,
    pub month: u32,
    /// First business day of the month.
    pub query_date: NaiveDate,
    /// Candidate date that produced the quote.
    pub request_date: NaiveDate,
    pub mid_rate: Decimal,
    pub source_date: NaiveDate,
    pub rate_source: RateOrigin,
    pub fallback_used: FallbackTier,
}

impl MonthlyRateResult {
    /// Canonical field/value pairs ready for [`crate::store::RateStore::upsert`].
    pub fn to_csv_row(&self) -> Vec<(&'static str, String)> {
        vec![
            ("year", self.year.to_string()),
            ("month", format!("{:02}", self.month)),
            ("mid_rate", format_rate(self.mid_rate)),
            ("query_date", self.query_date.to_string()),
            ("source_date", self.source_date.to_string()),
            ("rate_source", self.rate_source.to_string()),
            ("fallback_used", self.fallback_used.to_string()),
        ]
    }
}

/// Half-up rounding to the four decimals central parity is quoted in.
pub fn quantize_rate(rate: Decimal) -> Decimal {
    let mut rounded = rate.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(4);
    rounded
}

/// Fixed four-decimal text, e.g. `7.1234`.
pub fn format_rate(rate: Decimal) -> String {
    quantize_rate(rate).to_string()
}
