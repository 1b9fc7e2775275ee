//! Cascading fallback across the three sources.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::core::{
    FallbackTier, FetchSession, FxClient, FxError, PreferSource, RoutedQuote, SourceKind,
};
use crate::monthly::BusinessCalendar;
use crate::sources::{CfetsSource, PbcSource, RateLookup, SafeSource};

/// Tries sources in preference order and reports which tier answered.
#[derive(Clone)]
pub struct SourceRouter {
    client: FxClient,
    sources: HashMap<SourceKind, Arc<dyn RateLookup>>,
}

impl std::fmt::Debug for SourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRouter")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SourceRouter {
    /// The three production scrapers sharing `client`.
    pub fn new(client: FxClient) -> Self {
        Self::with_calendar(client, BusinessCalendar::default())
    }

    /// Like [`SourceRouter::new`], with the SAFE window anchored on `calendar`.
    pub fn with_calendar(client: FxClient, calendar: BusinessCalendar) -> Self {
        let pbc: Arc<dyn RateLookup> = Arc::new(PbcSource::new(client.clone()));
        let cfets: Arc<dyn RateLookup> = Arc::new(CfetsSource::new(client.clone()));
        let safe: Arc<dyn RateLookup> =
            Arc::new(SafeSource::new(client.clone()).with_calendar(calendar));
        Self::with_sources(client, [pbc, cfets, safe])
    }

    /// Use arbitrary lookups; each is registered under its own [`RateLookup::kind`].
    pub fn with_sources<I>(client: FxClient, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RateLookup>>,
    {
        Self {
            client,
            sources: sources.into_iter().map(|s| (s.kind(), s)).collect(),
        }
    }

    pub fn client(&self) -> &FxClient {
        &self.client
    }

    /// Resolve the mid-rate for `date`.
    ///
    /// Runs inside one request cycle: started here unless the caller already started one,
    /// and in that case left for the caller to end.
    #[tracing::instrument(skip(self, session), fields(prefer = ?prefer))]
    pub async fn fetch_with_fallback(
        &self,
        session: &mut FetchSession,
        date: NaiveDate,
        prefer: PreferSource,
    ) -> Result<RoutedQuote, FxError> {
        let order = prefer.order();
        debug!(%date, order = ?order, "fetch order");

        let owns_cycle = !session.cycle_active();
        if owns_cycle {
            self.client.begin_request_cycle(session, None)?;
        }
        {
            let metrics = session.metrics_mut();
            metrics.rate_source = None;
            metrics.fallback_used = None;
        }

        let outcome = self.cascade(session, date, prefer, order).await;

        if owns_cycle {
            self.client.end_request_cycle(session);
        }
        outcome
    }

    async fn cascade(
        &self,
        session: &mut FetchSession,
        date: NaiveDate,
        prefer: PreferSource,
        order: &[SourceKind],
    ) -> Result<RoutedQuote, FxError> {
        let mut last_tls: Option<FxError> = None;

        for (idx, kind) in order.iter().enumerate() {
            let Some(source) = self.sources.get(kind) else {
                debug!(source = %kind, "source not registered");
                continue;
            };
            let quote = match source.lookup(session, date).await {
                Ok(quote) => quote,
                Err(e @ FxError::TlsHostnameMismatch(_)) => {
                    warn!(source = %kind, error = %e, "tls mismatch; trying next source");
                    last_tls = Some(e);
                    continue;
                }
                Err(e) if e.is_lookup_miss() => {
                    debug!(source = %kind, error = %e, "lookup failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut fallback_used = if idx == 0 {
                FallbackTier::None
            } else {
                FallbackTier::Source(*kind)
            };
            if quote.source_date() != date {
                fallback_used = FallbackTier::Forward;
            }
            info!(
                source = %kind,
                rate = %quote.mid_rate(),
                source_date = %quote.source_date(),
                fallback = %fallback_used,
                "rate resolved"
            );
            let metrics = session.metrics_mut();
            metrics.rate_source = Some(quote.origin());
            metrics.fallback_used = Some(fallback_used);
            return Ok(RoutedQuote {
                quote,
                fallback_used,
            });
        }

        match last_tls {
            Some(tls) if prefer.includes_pbc() => Err(tls),
            _ => Err(FxError::RateUnavailable { date }),
        }
    }
}
