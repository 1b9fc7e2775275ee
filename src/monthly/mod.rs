//! Monthly aggregation: one USD/CNY rate per `(year, month)`, taken at the month's first
//! business day and probed forward, then backward, when that day has no quote.

mod calendar;

pub use calendar::{BusinessCalendar, iter_months, month_bounds};

use chrono::{Duration as Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{FallbackTier, FetchSession, FxError, MonthlyRateResult, PreferSource};
use crate::router::SourceRouter;
use crate::store::{RateStore, UpsertReport};

/// Forward probes after the first business day.
pub const FORWARD_PROBES: usize = 3;

/// Shorthand for [`BusinessCalendar::first_business_day`].
pub fn first_business_day(
    calendar: &BusinessCalendar,
    year: i32,
    month: u32,
) -> Result<NaiveDate, FxError> {
    calendar.first_business_day(year, month)
}

/// Dates tried for a month, in order and without repeats.
///
/// The first business day, then up to [`FORWARD_PROBES`] further business days of the same
/// month, then every earlier day of the month walking back towards the 1st.
pub fn candidate_dates(
    calendar: &BusinessCalendar,
    year: i32,
    month: u32,
) -> Result<Vec<NaiveDate>, FxError> {
    let (month_start, month_end) = month_bounds(year, month)?;
    let first = calendar.first_business_day(year, month)?;

    let mut dates = vec![first];
    dates.extend(
        first
            .iter_days()
            .skip(1)
            .take_while(|d| *d <= month_end)
            .filter(|d| calendar.is_business_day(*d))
            .take(FORWARD_PROBES),
    );
    let mut cursor = first - Days::days(1);
    while cursor >= month_start {
        dates.push(cursor);
        cursor -= Days::days(1);
    }

    let mut seen = std::collections::HashSet::new();
    dates.retain(|d| seen.insert(*d));
    Ok(dates)
}

/// Resolve the rate for `(year, month)` through `router`.
///
/// Lookup misses move on to the next candidate; a TLS hostname mismatch or any other hard
/// error is returned at once.
#[tracing::instrument(skip(router, session, calendar))]
pub async fn fetch_month_rate(
    router: &SourceRouter,
    session: &mut FetchSession,
    year: i32,
    month: u32,
    calendar: &BusinessCalendar,
    prefer: PreferSource,
) -> Result<MonthlyRateResult, FxError> {
    let query_date = calendar.first_business_day(year, month)?;
    let candidates = candidate_dates(calendar, year, month)?;
    if candidates.len() > 1 {
        info!(
            sequence = %candidates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            "candidate sequence"
        );
    }

    for request_date in candidates {
        debug!(%request_date, "attempting rate lookup");
        let routed = match router.fetch_with_fallback(session, request_date, prefer).await {
            Ok(routed) => routed,
            Err(e @ FxError::TlsHostnameMismatch(_)) => return Err(e),
            Err(e) if e.is_lookup_miss() => {
                debug!(%request_date, error = %e, "rate unavailable");
                continue;
            }
            Err(e) => return Err(e),
        };

        let fallback_used = match routed.fallback_used {
            FallbackTier::None if request_date > query_date => FallbackTier::Forward,
            FallbackTier::None if request_date < query_date => FallbackTier::Backward,
            tier => tier,
        };
        let quote = routed.quote;
        info!(
            %query_date,
            %request_date,
            source_date = %quote.source_date(),
            source = %quote.origin(),
            fallback = %fallback_used,
            "monthly fetch success"
        );
        return Ok(MonthlyRateResult {
            year,
            month,
            query_date,
            request_date,
            mid_rate: quote.mid_rate(),
            source_date: quote.source_date(),
            rate_source: quote.origin(),
            fallback_used,
        });
    }

    Err(FxError::MonthUnavailable { year, month })
}

/// A month [`backfill`] could not resolve this time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMonth {
    pub year: i32,
    pub month: u32,
    pub reason: String,
    /// Set when the month is pending on a TLS hostname mismatch.
    pub tls: bool,
}

/// Outcome of [`backfill`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub fetched: Vec<MonthlyRateResult>,
    pub pending: Vec<PendingMonth>,
    /// Present when at least one row was merged.
    pub upsert: Option<UpsertReport>,
}

/// Fetch every month between `start` and `end` missing from `store` and merge the results.
///
/// Months that fail on TLS or have no quote anywhere are reported as pending rather than
/// aborting the run.
#[tracing::instrument(skip(router, session, store, calendar), fields(store = %store.path().display()))]
pub async fn backfill(
    router: &SourceRouter,
    session: &mut FetchSession,
    store: &RateStore,
    start: NaiveDate,
    end: NaiveDate,
    calendar: &BusinessCalendar,
    prefer: PreferSource,
) -> Result<BackfillReport, FxError> {
    let missing = store.plan_missing_months(start, end)?;
    info!(missing = missing.len(), "months to fetch");

    let mut report = BackfillReport::default();
    for (year, month) in missing {
        match fetch_month_rate(router, session, year, month, calendar, prefer).await {
            Ok(result) => report.fetched.push(result),
            Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::MonthUnavailable { .. })) => {
                let tls = e.tls_diagnostic().is_some();
                if let Some(diag) = e.tls_diagnostic() {
                    warn!(year, month, tls_diag = %diag.to_json(), "month pending on tls");
                } else {
                    warn!(year, month, "month pending: no quote");
                }
                report.pending.push(PendingMonth {
                    year,
                    month,
                    reason: e.to_string(),
                    tls,
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !report.fetched.is_empty() {
        let rows: Vec<_> = report.fetched.iter().map(MonthlyRateResult::to_csv_row).collect();
        let store = store.clone();
        // the store lock is polled with blocking sleeps
        let merged = tokio::task::spawn_blocking(move || store.upsert(rows))
            .await
            .map_err(|e| FxError::Io(std::io::Error::other(format!("store upsert task: {e}"))))?;
        report.upsert = Some(merged?);
    }
    Ok(report)
}
