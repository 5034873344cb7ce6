//! Market data providers and the per-evaluator prefetch.
//!
//! A provider exposes the price series of a code plus the optional side
//! data signals may require. [`PrefetchedData::load`] pulls everything a
//! research session needs once; evaluations then share it read-only.
//!
//! CSV layout under a data directory:
//! - `{code}.csv`             date,open,high,low,close,volume
//! - `benchmark/{code}.csv`   same columns
//! - `sector/{code}.csv`      same columns
//! - `statements/{code}.csv`  date plus one numeric column per item (EPS, ...)
//! - `margin/{code}.csv`      date plus one numeric column per item (margin_ratio, ...)

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use stratlab_core::domain::{Bar, DataSources, DatedTable, PriceSeries};

use crate::settings::SharedSettings;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no instrument code configured")]
    NoCode,

    #[error("no price data for '{code}'")]
    NotFound { code: String },

    #[error("price data for '{code}' has no valid close in the requested range")]
    Empty { code: String },

    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: {reason}", path.display())]
    InvalidRow { path: PathBuf, reason: String },
}

/// Inclusive date window; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    fn of(settings: &SharedSettings) -> Self {
        Self {
            start: settings.start_date,
            end: settings.end_date,
        }
    }
}

/// Source of market data by code and date range.
///
/// Side data is optional: `Ok(None)` means the provider has nothing for
/// that code, which only disables the signals depending on it.
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    fn prices(&self, code: &str, range: DateRange) -> Result<PriceSeries, DataError>;

    fn benchmark(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError>;

    fn sector(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError>;

    fn statements(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError>;

    fn margin(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError>;
}

// ─── Prefetch ────────────────────────────────────────────────────────

/// Everything one research session evaluates against, loaded once.
#[derive(Debug, Clone)]
pub struct PrefetchedData {
    pub prices: PriceSeries,
    pub sources: DataSources,
    /// BLAKE3 over all loaded values, for provenance.
    pub dataset_hash: String,
}

impl PrefetchedData {
    pub fn new(prices: PriceSeries, sources: DataSources) -> Self {
        let dataset_hash = dataset_hash(&prices, &sources);
        Self {
            prices,
            sources,
            dataset_hash,
        }
    }

    pub fn load(
        provider: &dyn MarketDataProvider,
        settings: &SharedSettings,
    ) -> Result<Self, DataError> {
        if settings.code.is_empty() {
            return Err(DataError::NoCode);
        }
        let range = DateRange::of(settings);
        let prices = provider.prices(&settings.code, range)?;
        if !prices.has_valid_close() {
            return Err(DataError::Empty {
                code: settings.code.clone(),
            });
        }

        let benchmark = match &settings.benchmark_code {
            Some(code) => provider.benchmark(code, range)?,
            None => None,
        };
        let sector = match &settings.sector_code {
            Some(code) => provider.sector(code, range)?,
            None => None,
        };
        let sources = DataSources {
            benchmark,
            sector,
            statements: provider.statements(&settings.code, range)?,
            margin: provider.margin(&settings.code, range)?,
        };

        info!(
            provider = provider.name(),
            code = %settings.code,
            bars = prices.len(),
            benchmark = sources.benchmark.is_some(),
            sector = sources.sector.is_some(),
            statements = sources.statements.is_some(),
            margin = sources.margin.is_some(),
            "market data prefetched"
        );
        Ok(Self::new(prices, sources))
    }
}

/// Deterministic hash over dates and values of every loaded series.
fn dataset_hash(prices: &PriceSeries, sources: &DataSources) -> String {
    fn series(hasher: &mut blake3::Hasher, s: &PriceSeries) {
        hasher.update(s.code.as_bytes());
        for bar in &s.bars {
            hasher.update(bar.date.to_string().as_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    fn table(hasher: &mut blake3::Hasher, t: &DatedTable) {
        for d in &t.dates {
            hasher.update(d.to_string().as_bytes());
        }
        for (name, values) in &t.columns {
            hasher.update(name.as_bytes());
            for v in values {
                hasher.update(&v.to_le_bytes());
            }
        }
    }

    let mut hasher = blake3::Hasher::new();
    series(&mut hasher, prices);
    if let Some(b) = &sources.benchmark {
        hasher.update(b"benchmark");
        series(&mut hasher, b);
    }
    if let Some(s) = &sources.sector {
        hasher.update(b"sector");
        series(&mut hasher, s);
    }
    if let Some(t) = &sources.statements {
        hasher.update(b"statements");
        table(&mut hasher, t);
    }
    if let Some(t) = &sources.margin {
        hasher.update(b"margin");
        table(&mut hasher, t);
    }
    hasher.finalize().to_hex().to_string()
}

// ─── CSV directory provider ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        let nan = f64::NAN;
        Bar {
            date: row.date,
            open: row.open.unwrap_or(nan),
            high: row.high.unwrap_or(nan),
            low: row.low.unwrap_or(nan),
            close: row.close.unwrap_or(nan),
            volume: row.volume.unwrap_or(nan),
        }
    }
}

/// Reads CSV files from a data directory.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    root: PathBuf,
}

impl CsvDataProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, subdir: Option<&str>, code: &str) -> PathBuf {
        let file = format!("{code}.csv");
        match subdir {
            Some(dir) => self.root.join(dir).join(file),
            None => self.root.join(file),
        }
    }

    fn read_series(
        &self,
        subdir: Option<&str>,
        code: &str,
        range: DateRange,
    ) -> Result<Option<PriceSeries>, DataError> {
        let path = self.path(subdir, code);
        if !path.exists() {
            debug!(path = %path.display(), "no price file");
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_err(&path, e))?;
        let mut bars = Vec::new();
        for row in reader.deserialize::<BarRow>() {
            let row = row.map_err(|e| csv_err(&path, e))?;
            if range.contains(row.date) {
                bars.push(Bar::from(row));
            }
        }
        Ok(Some(PriceSeries::new(code, bars)))
    }

    fn read_table(
        &self,
        subdir: &str,
        code: &str,
        range: DateRange,
    ) -> Result<Option<DatedTable>, DataError> {
        let path = self.path(Some(subdir), code);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_err(&path, e))?;
        let headers = reader.headers().map_err(|e| csv_err(&path, e))?.clone();
        if headers.get(0) != Some("date") {
            return Err(DataError::InvalidRow {
                path,
                reason: "first column must be 'date'".into(),
            });
        }

        // Table rows may end well after the price window; keep a lookback
        // row before the start so forward-fill has a value on day one.
        let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_err(&path, e))?;
            let raw_date = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
                DataError::InvalidRow {
                    path: path.clone(),
                    reason: format!("bad date '{raw_date}': {e}"),
                }
            })?;
            if range.end.is_some_and(|end| date > end) {
                continue;
            }
            let values = (1..headers.len())
                .map(|i| {
                    record
                        .get(i)
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            rows.push((date, values));
        }
        rows.sort_by_key(|(d, _)| *d);
        if let Some(start) = range.start {
            let first_inside = rows.iter().position(|(d, _)| *d >= start).unwrap_or(rows.len());
            rows.drain(..first_inside.saturating_sub(1));
        }

        let mut table = DatedTable::new(rows.iter().map(|(d, _)| *d).collect());
        for (i, name) in headers.iter().enumerate().skip(1) {
            let column = rows.iter().map(|(_, v)| v[i - 1]).collect();
            table = table.with_column(name, column);
        }
        Ok(Some(table))
    }
}

fn csv_err(path: &Path, source: csv::Error) -> DataError {
    DataError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

impl MarketDataProvider for CsvDataProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn prices(&self, code: &str, range: DateRange) -> Result<PriceSeries, DataError> {
        self.read_series(None, code, range)?
            .ok_or_else(|| DataError::NotFound {
                code: code.to_string(),
            })
    }

    fn benchmark(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError> {
        self.read_series(Some("benchmark"), code, range)
    }

    fn sector(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError> {
        self.read_series(Some("sector"), code, range)
    }

    fn statements(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError> {
        self.read_table("statements", code, range)
    }

    fn margin(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError> {
        self.read_table("margin", code, range)
    }
}

// ─── Synthetic provider ──────────────────────────────────────────────

/// Deterministic random-walk data for demos and tests.
///
/// Every series is seeded from the provider seed and the code, so the same
/// code always yields the same bars. Statements are quarterly EPS and the
/// margin table is a weekly `margin_ratio`.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    start: NaiveDate,
    days: usize,
}

impl SyntheticProvider {
    pub fn new(seed: u64, start: NaiveDate, days: usize) -> Self {
        Self { seed, start, days }
    }

    fn rng(&self, stream: &str, code: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(code.as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Weekday calendar of `days` sessions from `start`.
    fn calendar(&self) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(self.days);
        let mut current = self.start;
        while out.len() < self.days {
            let wd = current.weekday();
            if wd != chrono::Weekday::Sat && wd != chrono::Weekday::Sun {
                out.push(current);
            }
            current += chrono::Duration::days(1);
        }
        out
    }

    fn walk(&self, stream: &str, code: &str, range: DateRange) -> PriceSeries {
        let mut rng = self.rng(stream, code);
        let drift: f64 = rng.gen_range(-0.0003f64..0.0006);
        let mut price = 100.0_f64;
        let mut bars = Vec::with_capacity(self.days);
        for date in self.calendar() {
            let ret: f64 = drift + rng.gen_range(-0.02f64..0.02);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0f64..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0f64..0.01));
            let volume: f64 = rng.gen_range(500_000.0..5_000_000.0);
            price = close;
            if range.contains(date) {
                bars.push(Bar {
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
        }
        PriceSeries::new(code, bars)
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn prices(&self, code: &str, range: DateRange) -> Result<PriceSeries, DataError> {
        Ok(self.walk("prices", code, range))
    }

    fn benchmark(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError> {
        Ok(Some(self.walk("benchmark", code, range)))
    }

    fn sector(&self, code: &str, range: DateRange) -> Result<Option<PriceSeries>, DataError> {
        Ok(Some(self.walk("sector", code, range)))
    }

    fn statements(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError> {
        let mut rng = self.rng("statements", code);
        let mut eps: f64 = rng.gen_range(2.0..12.0);
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for date in self.calendar().into_iter().step_by(63) {
            eps *= 1.0 + rng.gen_range(-0.15f64..0.2);
            if range.end.map_or(true, |e| date <= e) {
                dates.push(date);
                values.push(eps);
            }
        }
        Ok(Some(DatedTable::new(dates).with_column("EPS", values)))
    }

    fn margin(&self, code: &str, range: DateRange) -> Result<Option<DatedTable>, DataError> {
        let mut rng = self.rng("margin", code);
        let mut ratio: f64 = rng.gen_range(1.0..4.0);
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for date in self.calendar().into_iter().step_by(5) {
            ratio = (ratio + rng.gen_range(-0.3f64..0.3)).clamp(0.2, 10.0);
            if range.end.map_or(true, |e| date <= e) {
                dates.push(date);
                values.push(ratio);
            }
        }
        Ok(Some(DatedTable::new(dates).with_column("margin_ratio", values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn synthetic_is_deterministic_per_code() {
        let p = SyntheticProvider::new(7, day(2022, 1, 3), 100);
        let a = p.prices("7203", DateRange::default()).unwrap();
        let b = p.prices("7203", DateRange::default()).unwrap();
        let c = p.prices("6758", DateRange::default()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.closes(), c.closes());
        assert_eq!(a.len(), 100);
    }

    #[test]
    fn synthetic_skips_weekends() {
        let p = SyntheticProvider::new(1, day(2024, 1, 1), 20);
        let s = p.prices("X", DateRange::default()).unwrap();
        assert!(s.bars.iter().all(|b| {
            let wd = b.date.weekday();
            wd != chrono::Weekday::Sat && wd != chrono::Weekday::Sun
        }));
    }

    #[test]
    fn prefetch_requires_code() {
        let p = SyntheticProvider::new(1, day(2024, 1, 1), 20);
        let err = PrefetchedData::load(&p, &SharedSettings::default()).unwrap_err();
        assert!(matches!(err, DataError::NoCode));
    }

    #[test]
    fn prefetch_loads_optional_sources_only_when_configured() {
        let p = SyntheticProvider::new(1, day(2024, 1, 1), 60);
        let settings = SharedSettings {
            code: "7203".into(),
            benchmark_code: Some("TOPIX".into()),
            ..SharedSettings::default()
        };
        let data = PrefetchedData::load(&p, &settings).unwrap();
        assert!(data.sources.benchmark.is_some());
        assert!(data.sources.sector.is_none());
        assert!(data.sources.statements.is_some());
        assert_eq!(data.dataset_hash.len(), 64);
    }

    #[test]
    fn csv_provider_reads_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("7203.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-04,10,11,9,10.5,1000\n\
             2024-01-05,10.5,12,10,11.5,1200\n\
             2024-01-09,11.5,12,,,\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join("statements")).unwrap();
        fs::write(
            dir.path().join("statements").join("7203.csv"),
            "date,EPS,BPS\n2023-11-01,5.0,40\n2023-12-01,5.5,41\n2024-02-01,6.0,42\n",
        )
        .unwrap();

        let provider = CsvDataProvider::new(dir.path());
        let range = DateRange {
            start: Some(day(2024, 1, 1)),
            end: Some(day(2024, 1, 31)),
        };
        let prices = provider.prices("7203", range).unwrap();
        assert_eq!(prices.len(), 3);
        assert!(prices.bars[2].close.is_nan());
        assert_eq!(prices.last_valid_index(), Some(1));

        let statements = provider.statements("7203", range).unwrap().unwrap();
        // one row before the window is kept for forward-fill, February dropped
        assert_eq!(statements.dates, vec![day(2023, 12, 1)]);
        assert_eq!(statements.column("EPS"), Some(&[5.5][..]));

        assert!(provider.margin("7203", range).unwrap().is_none());
        assert!(matches!(
            provider.prices("9999", range),
            Err(DataError::NotFound { .. })
        ));
    }
}
