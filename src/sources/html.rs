//! Text, number and date helpers shared by the scrapers.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::core::FxError;

static CN_DATE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日"));

static NUMERIC_DATE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/.]?(\d{1,2})[-/.]?(\d{1,2})$"));

/// Borrow a lazily compiled pattern, surfacing a compile failure as a data error.
pub(crate) fn pattern(
    cell: &'static LazyLock<Result<Regex, regex::Error>>,
) -> Result<&'static Regex, FxError> {
    cell.as_ref()
        .map_err(|e| FxError::Data(format!("pattern compile: {e}")))
}

pub(crate) fn selector(css: &str) -> Result<Selector, FxError> {
    Selector::parse(css).map_err(|e| FxError::Data(format!("selector `{css}`: {e}")))
}

/// Visible text of an element, each text node trimmed, empty ones dropped.
pub(crate) fn element_text(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Visible text of a whole document.
pub(crate) fn document_text(doc: &Html, sep: &str) -> String {
    element_text(doc.root_element(), sep)
}

/// First `YYYY年M月D日` in `text`.
pub(crate) fn find_cn_date(text: &str) -> Result<Option<NaiveDate>, FxError> {
    let re = pattern(&CN_DATE)?;
    Ok(re.captures_iter(text).find_map(|caps| {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }))
}

/// A table cell date in any of `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD` or `YYYY年M月D日`.
pub(crate) fn parse_cell_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    if let Ok(Some(date)) = find_cn_date(cell) {
        return Some(date);
    }
    let re = pattern(&NUMERIC_DATE).ok()?;
    let caps = re.captures(cell)?;
    NaiveDate::from_ymd_opt(
        caps.get(1)?.as_str().parse().ok()?,
        caps.get(2)?.as_str().parse().ok()?,
        caps.get(3)?.as_str().parse().ok()?,
    )
}

/// Decimal with thousands separators and surrounding whitespace removed.
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '，') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}
