//! PBOC announcements: a paginated directory of daily notices, with the key chart page as
//! a second chance.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::session::remaining;
use crate::core::{FetchRequest, FetchSession, FxClient, FxError, RateOrigin, RateQuote, SourceKind};
use crate::sources::RateLookup;
use crate::sources::html::{document_text, element_text, find_cn_date, parse_cell_date, pattern, selector};

/// Anchor text that marks a central parity announcement.
pub const TITLE_MARKER: &str = "人民币汇率中间价";

const DEFAULT_MAX_PAGES: usize = 15;
const FAILURE_STOP_THRESHOLD: usize = 2;
const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

static RATE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"1美元对人民币(\d+(?:\.\d+)?)元"));

/// Scraper for the People's Bank of China site.
#[derive(Debug, Clone)]
pub struct PbcSource {
    client: FxClient,
    max_pages: usize,
    page_delay: Duration,
}

impl PbcSource {
    pub fn new(client: FxClient) -> Self {
        Self {
            client,
            max_pages: DEFAULT_MAX_PAGES,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Directory pages to scan at most. Default 15.
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    /// Pause between directory pages, always capped by the remaining cycle budget.
    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    #[tracing::instrument(skip(self, session), fields(source = "pbc"))]
    async fn fetch_quote(&self, session: &mut FetchSession, date: NaiveDate) -> Result<RateQuote, FxError> {
        match self.scan_announcements(session, date).await {
            Ok(Some(rate)) => return RateQuote::new(rate, date, RateOrigin::PbcNotice),
            Ok(None) => {}
            Err(FxError::Timeout { reason, .. }) => {
                warn!(%date, %reason, "directory scan timed out");
            }
            Err(e) => return Err(e),
        }

        warn!(%date, "announcement not found, probing key chart");
        match self.probe_keychart(session, date).await {
            Ok(Some(rate)) => {
                info!(%date, "using key chart value");
                RateQuote::new(rate, date, RateOrigin::PbcKeychart)
            }
            Ok(None) => Err(FxError::Lookup(format!("PBOC has no USD/CNY midpoint for {date}"))),
            Err(e @ FxError::TlsHostnameMismatch(_)) => Err(e),
            Err(e) => {
                debug!(error = %e, "key chart unavailable");
                Err(FxError::Lookup(format!("PBOC key chart unavailable for {date}")))
            }
        }
    }

    /// Walk the directory and visit matching announcements until one is for `date`.
    async fn scan_announcements(
        &self,
        session: &mut FetchSession,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        let mut seen: HashSet<Url> = HashSet::new();
        let mut consecutive_failures = 0usize;

        for page in 0..self.max_pages {
            let Some((page_url, body)) = self.fetch_directory_page(session, page).await? else {
                consecutive_failures += 1;
                warn!(page, "directory page unavailable");
                if consecutive_failures >= FAILURE_STOP_THRESHOLD {
                    warn!(consecutive_failures, "stopping directory scan");
                    session.metrics_mut().early_stop = true;
                    break;
                }
                continue;
            };
            consecutive_failures = 0;

            for article in announcement_links(&page_url, &body)? {
                if !seen.insert(article.clone()) {
                    continue;
                }
                let resp = match self.client.fetch(session, FetchRequest::get(article.clone())).await {
                    Ok(resp) => resp,
                    Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::Timeout { .. })) => return Err(e),
                    Err(e) => {
                        debug!(url = %article, error = %e, "skipping unreadable announcement");
                        continue;
                    }
                };
                let (article_date, rate) = parse_announcement(&resp.body)?;
                if article_date != Some(date) {
                    continue;
                }
                match rate {
                    Some(rate) => {
                        info!(url = %article, "matched announcement");
                        return Ok(Some(rate));
                    }
                    None => debug!(url = %article, "announcement lacks USD/CNY quote"),
                }
            }

            let delay = match remaining(session.cycle_deadline()) {
                Some(left) => self.page_delay.min(left),
                None => self.page_delay,
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(None)
    }

    /// First readable file among the page's candidate names.
    async fn fetch_directory_page(
        &self,
        session: &mut FetchSession,
        page: usize,
    ) -> Result<Option<(Url, String)>, FxError> {
        for name in page_candidates(page) {
            let url = self.client.pbc_index().join(&name)?;
            match self.client.fetch(session, FetchRequest::get(url.clone())).await {
                Ok(resp) => return Ok(Some((url, resp.body))),
                Err(e @ (FxError::TlsHostnameMismatch(_) | FxError::Timeout { .. })) => return Err(e),
                Err(e) => debug!(%url, error = %e, "directory candidate failed"),
            }
        }
        Ok(None)
    }

    async fn probe_keychart(
        &self,
        session: &mut FetchSession,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        let url = self.client.pbc_keychart().clone();
        let resp = self.client.fetch(session, FetchRequest::get(url)).await?;
        parse_keychart(&resp.body, date)
    }
}

impl RateLookup for PbcSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pbc
    }

    fn lookup<'a>(
        &'a self,
        session: &'a mut FetchSession,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<RateQuote, FxError>> + Send + 'a>> {
        Box::pin(self.fetch_quote(session, date))
    }
}

/// File names tried for directory page `page` (0-based).
pub fn page_candidates(page: usize) -> Vec<String> {
    if page == 0 {
        return vec!["index.html".into(), "index1.html".into(), "index_1.html".into()];
    }
    let number = page + 1;
    vec![format!("index{number}.html"), format!("index_{number}.html")]
}

/// Absolute URLs of anchors whose text names a central parity announcement, in page order.
pub fn announcement_links(page_url: &Url, html: &str) -> Result<Vec<Url>, FxError> {
    let doc = Html::parse_document(html);
    let anchors = selector("a")?;
    let mut links = Vec::new();
    for a in doc.select(&anchors) {
        let text = element_text(a, "");
        if !text.contains(TITLE_MARKER) {
            continue;
        }
        let Some(href) = a.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        match page_url.join(href) {
            Ok(url) if !links.contains(&url) => links.push(url),
            Ok(_) => {}
            Err(e) => debug!(href, error = %e, "unusable announcement link"),
        }
    }
    Ok(links)
}

/// Publication date and USD/CNY rate of an announcement, as far as the text reveals them.
pub fn parse_announcement(html: &str) -> Result<(Option<NaiveDate>, Option<Decimal>), FxError> {
    let text = document_text(&Html::parse_document(html), "，");
    let date = find_cn_date(&text)?;
    let rate = pattern(&RATE)?
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok());
    Ok((date, rate))
}

/// Rate from the first key chart table row whose first cell starts with `date`.
pub fn parse_keychart(html: &str, date: NaiveDate) -> Result<Option<Decimal>, FxError> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&selector("table")?).next() else {
        return Ok(None);
    };
    let rows = selector("tr")?;
    let cells = selector("td, th")?;
    let iso = date.to_string();
    let rate_re = pattern(&RATE)?;

    for row in table.select(&rows) {
        let texts: Vec<String> = row.select(&cells).map(|c| element_text(c, "")).collect();
        let Some(first) = texts.first() else {
            continue;
        };
        if !first.starts_with(&iso) && parse_cell_date(first) != Some(date) {
            continue;
        }
        for cell in &texts[1..] {
            if let Some(m) = rate_re.captures(cell).and_then(|caps| caps.get(1))
                && let Ok(rate) = Decimal::from_str(m.as_str())
            {
                return Ok(Some(rate));
            }
        }
    }
    Ok(None)
}
