//! CFETS (chinamoney.org.cn) per-date central parity notice.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::Html;
use tracing::debug;

use crate::core::{FetchRequest, FetchSession, FxClient, FxError, RateOrigin, RateQuote, SourceKind};
use crate::sources::RateLookup;
use crate::sources::html::{document_text, find_cn_date, pattern};

static RATE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"1美元对人民币(\d+\.\d{4})元"));

#[derive(Debug, Clone)]
pub struct CfetsSource {
    client: FxClient,
}

impl CfetsSource {
    pub fn new(client: FxClient) -> Self {
        Self { client }
    }

    #[tracing::instrument(skip(self, session), fields(source = "cfets"))]
    async fn fetch_quote(&self, session: &mut FetchSession, date: NaiveDate) -> Result<RateQuote, FxError> {
        let req = FetchRequest::get(self.client.cfets_notice().clone()).query("searchDate", date.to_string());
        let resp = match self.client.fetch(session, req).await {
            Ok(resp) => resp,
            Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::Timeout { .. })) => return Err(e),
            Err(e) => {
                debug!(error = %e, "notice fetch failed");
                return Err(FxError::Lookup(format!("CFETS notice unavailable for {date}")));
            }
        };
        if resp.body.trim().is_empty() {
            return Err(FxError::Lookup(format!("CFETS notice empty for {date}")));
        }
        parse_notice(&resp.body, date)
    }
}

impl RateLookup for CfetsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Cfets
    }

    fn lookup<'a>(
        &'a self,
        session: &'a mut FetchSession,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<RateQuote, FxError>> + Send + 'a>> {
        Box::pin(self.fetch_quote(session, date))
    }
}

/// Read the four-decimal USD rate and the notice date; the date falls back to `requested`.
pub fn parse_notice(html: &str, requested: NaiveDate) -> Result<RateQuote, FxError> {
    let text = document_text(&Html::parse_document(html), " ");
    let rate = pattern(&RATE)?
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
        .ok_or_else(|| FxError::Lookup(format!("USD/CNY midpoint not present for {requested}")))?;

    let source_date = match find_cn_date(&text)? {
        Some(d) => d,
        None => {
            debug!(%requested, "notice lacked explicit date; using requested date");
            requested
        }
    };
    RateQuote::new(rate, source_date, RateOrigin::CfetsNotice)
}
