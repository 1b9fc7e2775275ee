//! The canonical monthly rate CSV: one row per `(year, month)`, sorted, rewritten atomically.

mod lock;

pub use lock::{DEFAULT_LOCK_WAIT, StoreLock, lock_path};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{FxError, format_rate};
use crate::monthly::iter_months;

/// Field names in on-disk column order.
pub const CANONICAL_FIELDS: [&str; 7] = [
    "year",
    "month",
    "mid_rate",
    "query_date",
    "source_date",
    "rate_source",
    "fallback_used",
];

/// Column labels written by [`HeaderStyle::Chinese`], aligned with [`CANONICAL_FIELDS`].
pub const CHINESE_LABELS: [&str; 7] = [
    "年份",
    "月份",
    "中间价",
    "查询日期",
    "来源日期",
    "数据源",
    "回退策略",
];

const FIELD_ALIASES: [(&str, &[&str]); 7] = [
    ("year", &["year", "年份"]),
    ("month", &["month", "月份"]),
    ("mid_rate", &["mid_rate", "中间价", "中间价(1美元)"]),
    ("query_date", &["query_date", "查询日期", "目标日期", "首个工作日"]),
    ("source_date", &["source_date", "来源日期", "公告日期"]),
    ("rate_source", &["rate_source", "数据源", "来源渠道"]),
    ("fallback_used", &["fallback_used", "回退策略", "fallback"]),
];

/// Map a header cell or input key onto its canonical field name.
pub fn canonical_field(raw: &str) -> Option<&'static str> {
    let token = raw.trim().trim_start_matches('\u{feff}');
    FIELD_ALIASES.iter().find_map(|(canonical, aliases)| {
        aliases
            .iter()
            .any(|a| *a == token || a.eq_ignore_ascii_case(token))
            .then_some(*canonical)
    })
}

/// Which header row the store writes. Both are accepted on read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `年份,月份,中间价,...`, the labels existing cache files use.
    #[default]
    Chinese,
    /// `year,month,mid_rate,...`
    Canonical,
}

impl HeaderStyle {
    pub fn labels(self) -> [&'static str; 7] {
        match self {
            HeaderStyle::Chinese => CHINESE_LABELS,
            HeaderStyle::Canonical => CANONICAL_FIELDS,
        }
    }
}

/// One persisted month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRateRow {
    pub year: i32,
    pub month: u32,
    pub mid_rate: String,
    pub query_date: String,
    pub source_date: String,
    pub rate_source: String,
    pub fallback_used: String,
}

impl CanonicalRateRow {
    pub fn key(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    /// Cells in [`CANONICAL_FIELDS`] order.
    pub fn cells(&self) -> [String; 7] {
        [
            self.year.to_string(),
            format!("{:02}", self.month),
            self.mid_rate.clone(),
            self.query_date.clone(),
            self.source_date.clone(),
            self.rate_source.clone(),
            self.fallback_used.clone(),
        ]
    }

    /// Build from canonical fields; `query_date` defaults to `source_date`, `fallback_used`
    /// to `none`.
    fn from_fields(year: i32, month: u32, mut fields: HashMap<&'static str, String>) -> Self {
        let mut take = |name: &str| fields.remove(name).unwrap_or_default();
        let mid_rate = take("mid_rate");
        let source_date = take("source_date");
        let mut query_date = take("query_date");
        let rate_source = take("rate_source");
        let mut fallback_used = take("fallback_used");
        if query_date.is_empty() {
            query_date = source_date.clone();
        }
        if fallback_used.is_empty() {
            fallback_used = "none".into();
        }
        Self {
            year,
            month,
            mid_rate,
            query_date,
            source_date,
            rate_source,
            fallback_used,
        }
    }
}

/// Counts reported by [`RateStore::upsert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    /// Input rows read.
    pub consumed: usize,
    /// Rows that were new or differed from what was stored.
    pub changed: usize,
    /// Rows in the file afterwards.
    pub total_rows: usize,
}

/// Handle to one monthly rate CSV file.
#[derive(Debug, Clone)]
pub struct RateStore {
    path: PathBuf,
    header: HeaderStyle,
    lock_wait: Duration,
}

impl RateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: HeaderStyle::default(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn header_style(mut self, header: HeaderStyle) -> Self {
        self.header = header;
        self
    }

    /// How long a writer waits for another writer, in this process or another.
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable row keyed by `(year, month)`. A missing file is an empty store.
    ///
    /// Canonical, Chinese and headerless (positional) files are all accepted; rows without
    /// a numeric year and month are skipped with a warning.
    pub fn load(&self) -> Result<BTreeMap<(i32, u32), CanonicalRateRow>, FxError> {
        let mut records = BTreeMap::new();
        if !self.path.exists() {
            return Ok(records);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let rows = reader
            .records()
            .collect::<Result<Vec<csv::StringRecord>, _>>()?;
        let Some(first) = rows.first() else {
            return Ok(records);
        };

        let mut columns: Vec<(usize, &'static str)> = Vec::new();
        for (idx, cell) in first.iter().enumerate() {
            if let Some(field) = canonical_field(cell)
                && !columns.iter().any(|(_, f)| *f == field)
            {
                columns.push((idx, field));
            }
        }
        let data = if columns.is_empty() {
            columns = CANONICAL_FIELDS.iter().copied().enumerate().collect();
            &rows[..]
        } else {
            &rows[1..]
        };

        for raw in data {
            if raw.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let mut fields: HashMap<&'static str, String> = HashMap::new();
            for &(idx, field) in &columns {
                if let Some(value) = raw.get(idx).map(str::trim).filter(|v| !v.is_empty()) {
                    fields.insert(field, value.to_string());
                }
            }
            let key = fields
                .get("year")
                .and_then(|y| y.parse::<i32>().ok())
                .zip(fields.get("month").and_then(|m| m.parse::<u32>().ok()))
                .filter(|(_, m)| (1..=12).contains(m));
            let Some((year, month)) = key else {
                warn!(row = ?raw, "skipping CSV row without a usable year/month");
                continue;
            };
            records.insert((year, month), CanonicalRateRow::from_fields(year, month, fields));
        }
        Ok(records)
    }

    /// Merge `rows` into the store, replacing rows with the same `(year, month)`.
    ///
    /// Each row is a set of `(field, value)` pairs keyed by canonical names or any known
    /// alias; unknown keys are ignored. Merging the same rows again changes nothing.
    ///
    /// Blocks the calling thread while waiting for the store lock; async callers should run
    /// it on a blocking thread.
    pub fn upsert<R, K, V>(&self, rows: impl IntoIterator<Item = R>) -> Result<UpsertReport, FxError>
    where
        R: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let _lock = StoreLock::acquire(&self.path, self.lock_wait)?;
        let mut existing = self.load()?;
        let mut report = UpsertReport::default();

        for row in rows {
            report.consumed += 1;
            let record = normalize_input(row)?;
            let key = record.key();
            if existing.get(&key) != Some(&record) {
                existing.insert(key, record);
                report.changed += 1;
            }
        }

        self.write_atomic(&existing)?;
        report.total_rows = existing.len();
        info!(
            path = %self.path.display(),
            consumed = report.consumed,
            changed = report.changed,
            total_rows = report.total_rows,
            "CSV upsert done"
        );
        Ok(report)
    }

    /// Months between `start` and `end` (inclusive, by month) without a stored row.
    pub fn plan_missing_months(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(i32, u32)>, FxError> {
        let existing = self.load()?;
        Ok(iter_months(start, end)
            .filter(|key| !existing.contains_key(key))
            .collect())
    }

    fn write_atomic(&self, rows: &BTreeMap<(i32, u32), CanonicalRateRow>) -> Result<(), FxError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(self.header.labels())?;
            for row in rows.values() {
                writer.write_record(row.cells())?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// [`RateStore::upsert`] on the file at `path` with default settings.
pub fn upsert_csv<R, K, V>(
    path: impl Into<PathBuf>,
    rows: impl IntoIterator<Item = R>,
) -> Result<UpsertReport, FxError>
where
    R: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    RateStore::new(path).upsert(rows)
}

/// [`RateStore::plan_missing_months`] on the file at `path`.
pub fn plan_missing_months(
    path: impl Into<PathBuf>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(i32, u32)>, FxError> {
    RateStore::new(path).plan_missing_months(start, end)
}

fn normalize_input<R, K, V>(row: R) -> Result<CanonicalRateRow, FxError>
where
    R: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    for (key, value) in row {
        let Some(field) = canonical_field(key.as_ref()) else {
            continue;
        };
        let value = value.as_ref().trim();
        if !value.is_empty() {
            fields.insert(field, value.to_string());
        }
    }

    let year = match fields.get("year") {
        Some(y) => y
            .parse::<i32>()
            .map_err(|_| FxError::Data(format!("Invalid year value: {y:?}")))?,
        None => return Err(FxError::Data("CSV rows must include year and month".into())),
    };
    let month = match fields.get("month") {
        Some(m) => m
            .parse::<u32>()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| FxError::Data(format!("Invalid month value: {m:?}")))?,
        None => return Err(FxError::Data("CSV rows must include year and month".into())),
    };
    if let Some(rate) = fields.get_mut("mid_rate")
        && let Ok(parsed) = Decimal::from_str(rate)
    {
        *rate = format_rate(parsed);
    }
    Ok(CanonicalRateRow::from_fields(year, month, fields))
}
