//! SAFE (State Administration of Foreign Exchange) RMB central parity query portal.

use std::future::Future;
use std::pin::Pin;

use chrono::{Datelike, Duration as Days, NaiveDate};
use rust_decimal::Decimal;
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use crate::core::net::write_snapshot;
use crate::core::{FetchRequest, FetchSession, FxClient, FxError, RateOrigin, RateQuote, SourceKind};
use crate::monthly::{BusinessCalendar, month_bounds};
use crate::sources::RateLookup;
use crate::sources::html::{document_text, element_text, parse_cell_date, parse_decimal, selector};

/// Calendar days the query window extends past its anchor.
pub const WINDOW_DAYS: i64 = 10;

/// Values at or above this are taken as quoted per 100 USD.
const PER_100_THRESHOLD: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

#[derive(Debug, Clone)]
pub struct SafeSource {
    client: FxClient,
    calendar: BusinessCalendar,
}

impl SafeSource {
    pub fn new(client: FxClient) -> Self {
        Self {
            client,
            calendar: BusinessCalendar::default(),
        }
    }

    /// Holiday/workday overrides used to anchor the query window.
    pub fn with_calendar(mut self, calendar: BusinessCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    #[tracing::instrument(skip(self, session), fields(source = "safe"))]
    async fn fetch_quote(&self, session: &mut FetchSession, date: NaiveDate) -> Result<RateQuote, FxError> {
        let (start, end) = query_window(&self.calendar, date)?;
        if date > end {
            debug!(%date, %end, "date past the portal query window");
            return Err(FxError::Lookup(format!("{date} is outside the SAFE query window")));
        }
        let window = [
            ("startDate", start.to_string()),
            ("endDate", end.to_string()),
        ];
        let portal = self.client.safe_portal().clone();

        let body = match self
            .client
            .fetch(session, FetchRequest::post_form(portal.clone(), window.clone()))
            .await
        {
            Ok(resp) => resp.body,
            Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::Timeout { .. })) => return Err(e),
            Err(e) => {
                warn!(error = %e, "portal rejected POST, retrying as GET");
                let get = window
                    .iter()
                    .fold(FetchRequest::get(portal), |req, (k, v)| req.query(*k, v.clone()));
                match self.client.fetch(session, get).await {
                    Ok(resp) => resp.body,
                    Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::Timeout { .. })) => {
                        return Err(e);
                    }
                    Err(e) => {
                        debug!(error = %e, "portal GET failed");
                        return Err(FxError::Lookup(format!("SAFE portal unavailable for {date}")));
                    }
                }
            }
        };
        if body.trim().is_empty() {
            return Err(FxError::Lookup(format!("SAFE portal empty for {date}")));
        }
        self.snapshot(date, &body);

        let rows = parse_portal(&body)?;
        let (source_date, rate) = select_rate(&rows, date, start, end)
            .ok_or_else(|| FxError::Lookup(format!("SAFE portal missing rate for {date}")))?;
        if source_date != date {
            info!(%date, %source_date, "forward fill within query window");
        }
        RateQuote::new(rate, source_date, RateOrigin::SafePortal)
    }

    fn snapshot(&self, date: NaiveDate, body: &str) {
        let Some(dir) = self.client.snapshot_dir() else {
            return;
        };
        let name = format!("safe_portal_{}.html", date.format("%Y-%m"));
        if let Err(e) = write_snapshot(dir, &name, body) {
            warn!(dir = %dir.display(), error = %e, "failed to write SAFE snapshot");
        }
    }
}

impl RateLookup for SafeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Safe
    }

    fn lookup<'a>(
        &'a self,
        session: &'a mut FetchSession,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<RateQuote, FxError>> + Send + 'a>> {
        Box::pin(self.fetch_quote(session, date))
    }
}

/// `[start, end]` sent to the portal for `date`.
///
/// Anchored at the first business day of the month and at most [`WINDOW_DAYS`] long, never
/// crossing month end. Dates after the window cannot be answered from it.
pub fn query_window(
    calendar: &BusinessCalendar,
    date: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), FxError> {
    let (_, month_end) = month_bounds(date.year(), date.month())?;
    let anchor = calendar.first_business_day(date.year(), date.month())?;
    Ok((anchor, (anchor + Days::days(WINDOW_DAYS)).min(month_end)))
}

/// Dated USD rates from the portal table, already scaled to one USD.
pub fn parse_portal(html: &str) -> Result<Vec<(NaiveDate, Decimal)>, FxError> {
    let doc = Html::parse_document(html);
    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    let table = match doc.select(&selector("table#InfoTable")?).next() {
        Some(t) => t,
        None => doc
            .select(&selector("table")?)
            .find(|t| {
                t.select(&row_sel)
                    .next()
                    .is_some_and(|r| header_cells(r, &th_sel, &td_sel).iter().any(|h| h.contains("美元")))
            })
            .ok_or_else(|| FxError::Lookup("SAFE portal has no rate table".into()))?,
    };

    let mut rows = table.select(&row_sel);
    let header = rows
        .next()
        .map(|r| header_cells(r, &th_sel, &td_sel))
        .ok_or_else(|| FxError::Lookup("SAFE portal table missing header".into()))?;
    let usd_idx = header
        .iter()
        .position(|h| h == "美元")
        .or_else(|| header.iter().position(|h| h.contains("美元")))
        .ok_or_else(|| FxError::Lookup("SAFE portal header lacks USD column".into()))?;
    let date_idx = header.iter().position(|h| h.contains("日期")).unwrap_or(0);

    let mut parsed = Vec::new();
    for row in rows {
        let cells: Vec<String> = row.select(&td_sel).map(|c| element_text(c, "")).collect();
        let (Some(day), Some(raw)) = (cells.get(date_idx), cells.get(usd_idx)) else {
            continue;
        };
        let Some(day) = parse_cell_date(day) else {
            continue;
        };
        match parse_decimal(raw) {
            Some(value) => parsed.push((day, value)),
            None => debug!(raw = raw.as_str(), "skipping row with invalid USD value"),
        }
    }
    if parsed.is_empty() {
        return Err(FxError::Lookup("SAFE portal contained no USD rows".into()));
    }

    let doc_text = document_text(&doc, " ");
    let hinted = header[usd_idx].contains("100") || doc_text.contains("每100") || doc_text.contains("100美元");
    let per_100 = hinted || parsed.iter().any(|(_, v)| *v >= PER_100_THRESHOLD);
    if per_100 {
        let hundred = Decimal::ONE_HUNDRED;
        for (_, value) in &mut parsed {
            *value /= hundred;
        }
    }
    debug!(rows = parsed.len(), per_100, "parsed SAFE table");
    Ok(parsed)
}

/// The exact date if quoted, otherwise the earliest in-window date after `target`.
///
/// Never returns a date before `target`.
pub fn select_rate(
    rows: &[(NaiveDate, Decimal)],
    target: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<(NaiveDate, Decimal)> {
    if let Some(hit) = rows.iter().find(|(d, _)| *d == target) {
        return Some(*hit);
    }
    rows.iter()
        .filter(|(d, _)| *d >= start && *d <= end && *d > target)
        .min_by_key(|(d, _)| *d)
        .copied()
}

fn header_cells(
    row: ElementRef<'_>,
    th: &scraper::Selector,
    td: &scraper::Selector,
) -> Vec<String> {
    let cells: Vec<String> = row.select(th).map(|c| element_text(c, "")).collect();
    if !cells.is_empty() {
        return cells;
    }
    row.select(td).map(|c| element_text(c, "")).collect()
}
