//! Yahoo Finance close series for tickers, plus the ETF proxy source.
//!
//! Downloads go through `yahoo_finance_api` (blocking build), which handles the
//! chart endpoint and its cookie/crumb handshake. Bars without a finite close are
//! dropped.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;
use yahoo_finance_api as yahoo;

use crate::config::ProxyConfig;
use crate::domain::{BondQuerySpec, ChartRange, HistoryPoint, RawObservation, SourceKind};
use crate::error::{AppError, FetchError};
use crate::resolver::SourceStrategy;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeriesError {
    /// The request itself failed (network, HTTP status, API error).
    #[error("chart request for {symbol} failed: {message}")]
    Unavailable { symbol: String, message: String },

    #[error("no data for {symbol}: {message}")]
    NoData { symbol: String, message: String },
}

/// `range` + `interval` pair understood by the chart API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesWindow {
    pub range: String,
    pub interval: String,
}

impl From<ChartRange> for SeriesWindow {
    fn from(range: ChartRange) -> Self {
        Self {
            range: range.range_param().to_string(),
            interval: range.interval_param().to_string(),
        }
    }
}

/// "Give me recent closes for symbol X."
pub trait CloseSeries: Send + Sync {
    /// Ascending close series for one symbol.
    fn closes(&self, symbol: &str, window: &SeriesWindow) -> Result<Vec<HistoryPoint>, SeriesError>;

    /// One batched download for many symbols; fetched in parallel.
    fn bulk_closes(
        &self,
        symbols: &[String],
        window: &SeriesWindow,
    ) -> Vec<(String, Result<Vec<HistoryPoint>, SeriesError>)> {
        symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), self.closes(symbol, window)))
            .collect()
    }
}

pub struct YahooSeries {
    connector: yahoo::YahooConnector,
}

impl YahooSeries {
    pub fn new() -> Result<Self, AppError> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| AppError::config(format!("Failed to initialize Yahoo connector: {e}")))?;
        Ok(Self { connector })
    }
}

impl CloseSeries for YahooSeries {
    fn closes(&self, symbol: &str, window: &SeriesWindow) -> Result<Vec<HistoryPoint>, SeriesError> {
        let response = self
            .connector
            .get_quote_range(symbol, &window.interval, &window.range)
            .map_err(|e| match e {
                yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult => SeriesError::NoData {
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                },
                other => SeriesError::Unavailable {
                    symbol: symbol.to_string(),
                    message: other.to_string(),
                },
            })?;

        let quotes = response.quotes().map_err(|e| SeriesError::NoData {
            symbol: symbol.to_string(),
            message: e.to_string(),
        })?;

        let points = to_points(quotes.iter().map(|q| (q.timestamp as i64, q.close)));
        debug!(symbol, bars = points.len(), "chart series downloaded");
        Ok(points)
    }
}

/// Ascending series from `(unix_secs, close)` bars, skipping non-finite closes.
fn to_points(bars: impl Iterator<Item = (i64, f64)>) -> Vec<HistoryPoint> {
    let mut points: Vec<HistoryPoint> = bars
        .filter(|(_, close)| close.is_finite())
        .filter_map(|(ts, close)| {
            let timestamp: DateTime<Utc> = Utc.timestamp_opt(ts, 0).single()?;
            Some(HistoryPoint::new(timestamp, close))
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

/// Last-resort source: the close-to-close move of an ETF tracking the bond.
///
/// The quote's value is a price level, so the resolver marks it degraded.
pub struct ProxySource {
    series: Arc<dyn CloseSeries>,
    window: SeriesWindow,
}

impl ProxySource {
    pub fn new(series: Arc<dyn CloseSeries>, config: &ProxyConfig) -> Self {
        Self {
            series,
            window: SeriesWindow {
                range: config.range.clone(),
                interval: config.interval.clone(),
            },
        }
    }
}

impl SourceStrategy for ProxySource {
    fn kind(&self) -> SourceKind {
        SourceKind::ProxyFallback
    }

    fn fetch(&self, spec: &BondQuerySpec) -> Result<RawObservation, FetchError> {
        let points = self
            .series
            .closes(spec.proxy_ticker(), &self.window)
            .map_err(|e| match e {
                SeriesError::Unavailable { .. } => FetchError::unavailable(SourceKind::ProxyFallback, e.to_string()),
                SeriesError::NoData { .. } => FetchError::malformed(SourceKind::ProxyFallback, e.to_string()),
            })?;
        RawObservation::from_series(SourceKind::ProxyFallback, points)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory close series. Unknown symbols answer `NoData`.
    #[derive(Default)]
    pub struct FakeSeries {
        series: HashMap<String, Vec<HistoryPoint>>,
        failures: HashMap<String, SeriesError>,
        requested: Mutex<Vec<(String, SeriesWindow)>>,
        bulk_calls: Mutex<usize>,
    }

    /// Daily bars starting 2025-03-03.
    pub fn daily(closes: &[f64]) -> Vec<HistoryPoint> {
        let start = 1_740_960_000;
        to_points(closes.iter().enumerate().map(|(i, c)| (start + i as i64 * 86_400, *c)))
    }

    impl FakeSeries {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, symbol: &str, points: Vec<HistoryPoint>) -> Self {
            self.series.insert(symbol.to_string(), points);
            self
        }

        pub fn fail(mut self, symbol: &str) -> Self {
            self.failures.insert(
                symbol.to_string(),
                SeriesError::Unavailable {
                    symbol: symbol.to_string(),
                    message: "HTTP 503".to_string(),
                },
            );
            self
        }

        pub fn requested(&self) -> Vec<(String, SeriesWindow)> {
            self.requested.lock().map(|r| r.clone()).unwrap_or_default()
        }

        pub fn bulk_calls(&self) -> usize {
            self.bulk_calls.lock().map(|n| *n).unwrap_or_default()
        }
    }

    impl CloseSeries for FakeSeries {
        fn closes(&self, symbol: &str, window: &SeriesWindow) -> Result<Vec<HistoryPoint>, SeriesError> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push((symbol.to_string(), window.clone()));
            }
            if let Some(err) = self.failures.get(symbol) {
                return Err(err.clone());
            }
            self.series.get(symbol).cloned().ok_or_else(|| SeriesError::NoData {
                symbol: symbol.to_string(),
                message: "unknown symbol".to_string(),
            })
        }

        fn bulk_closes(
            &self,
            symbols: &[String],
            window: &SeriesWindow,
        ) -> Vec<(String, Result<Vec<HistoryPoint>, SeriesError>)> {
            if let Ok(mut n) = self.bulk_calls.lock() {
                *n += 1;
            }
            symbols.iter().map(|s| (s.clone(), self.closes(s, window))).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeSeries, daily};
    use super::*;

    fn spec() -> BondQuerySpec {
        BondQuerySpec::new("KR", 10, "148070.KS").unwrap()
    }

    #[test]
    fn bars_without_finite_close_are_dropped_and_sorted() {
        let points = to_points([(1_741_046_400, 14300.0), (1_740_960_000, 14250.0), (1_741_132_800, f64::NAN)].into_iter());
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 14250.0);
        assert_eq!(points[1].value, 14300.0);
    }

    #[test]
    fn window_follows_chart_range() {
        let five = SeriesWindow::from(ChartRange::FiveDays);
        assert_eq!((five.range.as_str(), five.interval.as_str()), ("5d", "30m"));
        let year = SeriesWindow::from(ChartRange::OneYear);
        assert_eq!((year.range.as_str(), year.interval.as_str()), ("1y", "1d"));
    }

    #[test]
    fn proxy_source_uses_last_two_closes_of_configured_window() {
        let series = Arc::new(FakeSeries::new().with("148070.KS", daily(&[14200.0, 14250.0, 14300.0])));
        let proxy = ProxySource::new(series.clone(), &ProxyConfig::default());

        let obs = proxy.fetch(&spec()).unwrap();
        assert_eq!(obs.value, 14300.0);
        assert_eq!(obs.previous_value, 14250.0);

        let (symbol, window) = &series.requested()[0];
        assert_eq!(symbol, "148070.KS");
        assert_eq!((window.range.as_str(), window.interval.as_str()), ("5d", "1d"));
    }

    #[test]
    fn proxy_request_failure_is_unavailable() {
        let proxy = ProxySource::new(Arc::new(FakeSeries::new().fail("148070.KS")), &ProxyConfig::default());
        let err = proxy.fetch(&spec()).unwrap_err();
        assert!(matches!(err, FetchError::SourceUnavailable { .. }));
    }

    #[test]
    fn proxy_with_one_bar_is_malformed() {
        let series = Arc::new(FakeSeries::new().with("148070.KS", daily(&[14300.0])));
        let err = ProxySource::new(series, &ProxyConfig::default()).fetch(&spec()).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    /// Exercises the trait's default rayon-backed `bulk_closes`.
    struct PerSymbol;

    impl CloseSeries for PerSymbol {
        fn closes(&self, symbol: &str, _window: &SeriesWindow) -> Result<Vec<HistoryPoint>, SeriesError> {
            match symbol {
                "KRW=X" => Ok(daily(&[1400.0, 1450.0])),
                _ => Err(SeriesError::NoData {
                    symbol: symbol.to_string(),
                    message: "delisted".to_string(),
                }),
            }
        }
    }

    #[test]
    fn default_bulk_keeps_per_symbol_results_in_order() {
        let symbols = vec!["KRW=X".to_string(), "MISSING".to_string()];
        let results = PerSymbol.bulk_closes(&symbols, &SeriesWindow::from(ChartRange::OneMonth));
        assert_eq!(results[0].0, "KRW=X");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "MISSING");
        assert!(results[1].1.is_err());
    }
}
