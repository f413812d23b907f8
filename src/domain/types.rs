//! Shared domain types.
//!
//! Everything a source produces is normalized into these shapes before it leaves
//! the data layer, so the resolver and the report code never see provider JSON,
//! CSV or HTML.

use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FetchError};

/// Which provider produced a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Third-party financial data aggregator (daily yield series).
    #[serde(rename = "aggregator")]
    Aggregator,
    /// Central-bank statistics API.
    #[serde(rename = "statistics")]
    OfficialStatistics,
    /// Finance-portal HTML page.
    #[serde(rename = "scrape")]
    Scrape,
    /// Close-to-close change of a tradable ETF.
    #[serde(rename = "proxy")]
    ProxyFallback,
}

impl SourceKind {
    /// Default priority order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Aggregator,
        SourceKind::OfficialStatistics,
        SourceKind::Scrape,
        SourceKind::ProxyFallback,
    ];

    /// Name used in config files and JSON output.
    pub fn config_name(self) -> &'static str {
        match self {
            SourceKind::Aggregator => "aggregator",
            SourceKind::OfficialStatistics => "statistics",
            SourceKind::Scrape => "scrape",
            SourceKind::ProxyFallback => "proxy",
        }
    }

    /// A degraded quote carries a price level, not a yield.
    pub fn is_degraded(self) -> bool {
        self == SourceKind::ProxyFallback
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// One point of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl HistoryPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Percent change with the divide-by-zero guard: `0` when `previous == 0`.
pub fn change_percent(delta: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    delta / previous * 100.0
}

/// A strategy's normalized output, before it is tagged with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub value: f64,
    pub previous_value: f64,
    pub history: Option<Vec<HistoryPoint>>,
}

impl RawObservation {
    /// Observation without a series (scraped pages).
    pub fn from_change(provider: SourceKind, value: f64, previous_value: f64) -> Result<Self, FetchError> {
        if !(value.is_finite() && previous_value.is_finite()) {
            return Err(FetchError::malformed(
                provider,
                format!("non-finite observation: value={value}, previous={previous_value}"),
            ));
        }
        Ok(Self {
            value,
            previous_value,
            history: None,
        })
    }

    /// Latest vs second-latest of an ascending series; the series becomes the history.
    pub fn from_series(provider: SourceKind, points: Vec<HistoryPoint>) -> Result<Self, FetchError> {
        if points.len() < 2 {
            return Err(FetchError::malformed(
                provider,
                format!("need at least 2 observations, got {}", points.len()),
            ));
        }
        let latest = points[points.len() - 1].value;
        let previous = points[points.len() - 2].value;
        let mut obs = Self::from_change(provider, latest, previous)?;
        obs.history = Some(points);
        Ok(obs)
    }
}

/// A resolved bond yield (or its proxy). Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldQuote {
    value: f64,
    previous_value: f64,
    delta: f64,
    delta_percent: f64,
    source: SourceKind,
    is_degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<Vec<HistoryPoint>>,
}

impl YieldQuote {
    /// Tag a strategy's observation with the source that produced it.
    pub fn from_observation(source: SourceKind, obs: RawObservation) -> Self {
        let delta = obs.value - obs.previous_value;
        Self {
            value: obs.value,
            previous_value: obs.previous_value,
            delta,
            delta_percent: change_percent(delta, obs.previous_value),
            source,
            is_degraded: source.is_degraded(),
            history: obs.history,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn previous_value(&self) -> f64 {
        self.previous_value
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn delta_percent(&self) -> f64 {
        self.delta_percent
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn is_degraded(&self) -> bool {
        self.is_degraded
    }

    pub fn history(&self) -> Option<&[HistoryPoint]> {
        self.history.as_deref()
    }
}

/// ECOS statistic table + item code pair identifying one daily series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSeries {
    pub stat_code: String,
    pub item_code: String,
}

/// What to resolve, plus the lookup key each source needs.
///
/// The proxy ticker is mandatory because the proxy source is the chain's last
/// resort; every other key is optional and its absence skips that source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondQuerySpec {
    key: String,
    label: String,
    country: String,
    maturity_years: u16,
    aggregator_symbol: Option<String>,
    statistics_series: Option<StatisticsSeries>,
    scrape_code: Option<String>,
    proxy_ticker: String,
}

impl BondQuerySpec {
    pub fn new(country: &str, maturity_years: u16, proxy_ticker: &str) -> Result<Self, AppError> {
        let country = country.trim().to_uppercase();
        if country.is_empty() {
            return Err(AppError::config("Bond spec needs a country code."));
        }
        if maturity_years == 0 {
            return Err(AppError::config(format!("Bond spec for {country} needs a maturity > 0.")));
        }
        let proxy_ticker = proxy_ticker.trim();
        if proxy_ticker.is_empty() {
            return Err(AppError::config(format!(
                "Bond spec {country}{maturity_years}Y needs a proxy ticker."
            )));
        }
        Ok(Self {
            key: format!("{country}{maturity_years}Y"),
            label: format!("{country} {maturity_years}Y government bond"),
            country,
            maturity_years,
            aggregator_symbol: None,
            statistics_series: None,
            scrape_code: None,
            proxy_ticker: proxy_ticker.to_string(),
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_aggregator_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.aggregator_symbol = Some(symbol.into());
        self
    }

    pub fn with_statistics_series(mut self, series: StatisticsSeries) -> Self {
        self.statistics_series = Some(series);
        self
    }

    pub fn with_scrape_code(mut self, code: impl Into<String>) -> Self {
        self.scrape_code = Some(code.into());
        self
    }

    /// Stable instrument key, e.g. `KR10Y`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn maturity_years(&self) -> u16 {
        self.maturity_years
    }

    pub fn aggregator_symbol(&self) -> Option<&str> {
        self.aggregator_symbol.as_deref()
    }

    pub fn statistics_series(&self) -> Option<&StatisticsSeries> {
        self.statistics_series.as_ref()
    }

    pub fn scrape_code(&self) -> Option<&str> {
        self.scrape_code.as_deref()
    }

    pub fn proxy_ticker(&self) -> &str {
        &self.proxy_ticker
    }
}

/// Latest price move for a non-bond instrument (index, FX, commodity).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub label: String,
    pub value: f64,
    pub previous_value: f64,
    pub delta: f64,
    pub delta_percent: f64,
    pub history: Vec<HistoryPoint>,
}

impl PriceQuote {
    /// Build from an ascending series; `None` when fewer than two finite points remain.
    pub fn from_series(symbol: &str, label: &str, points: Vec<HistoryPoint>) -> Option<Self> {
        let points: Vec<HistoryPoint> = points.into_iter().filter(|p| p.value.is_finite()).collect();
        if points.len() < 2 {
            return None;
        }
        let value = points[points.len() - 1].value;
        let previous_value = points[points.len() - 2].value;
        let delta = value - previous_value;
        Some(Self {
            symbol: symbol.to_string(),
            label: label.to_string(),
            value,
            previous_value,
            delta,
            delta_percent: change_percent(delta, previous_value),
            history: points,
        })
    }
}

/// Chart window for market quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ChartRange {
    /// Five days of 30-minute bars.
    #[serde(rename = "5d")]
    #[value(name = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    #[value(name = "1mo")]
    OneMonth,
    #[serde(rename = "6mo")]
    #[value(name = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    #[value(name = "1y")]
    OneYear,
}

impl ChartRange {
    pub fn range_param(self) -> &'static str {
        match self {
            ChartRange::FiveDays => "5d",
            ChartRange::OneMonth => "1mo",
            ChartRange::SixMonths => "6mo",
            ChartRange::OneYear => "1y",
        }
    }

    pub fn interval_param(self) -> &'static str {
        match self {
            ChartRange::FiveDays => "30m",
            _ => "1d",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn zero_previous_value_gives_zero_percent() {
        let obs = RawObservation::from_change(SourceKind::Scrape, 3.1, 0.0).unwrap();
        let quote = YieldQuote::from_observation(SourceKind::Scrape, obs);
        assert_eq!(quote.delta_percent(), 0.0);
        assert!(quote.delta_percent().is_finite());
        assert!((quote.delta() - 3.1).abs() < 1e-12);
    }

    #[test]
    fn degraded_flag_follows_source_only() {
        for kind in SourceKind::ALL {
            let obs = RawObservation::from_change(kind, 2.0, 1.0).unwrap();
            let quote = YieldQuote::from_observation(kind, obs);
            assert_eq!(quote.is_degraded(), kind == SourceKind::ProxyFallback);
        }
    }

    #[test]
    fn series_needs_two_points() {
        let err = RawObservation::from_series(SourceKind::OfficialStatistics, vec![HistoryPoint::new(ts(1), 3.2)])
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn series_uses_last_two_points() {
        let points = vec![
            HistoryPoint::new(ts(1), 3.10),
            HistoryPoint::new(ts(2), 3.21),
            HistoryPoint::new(ts(3), 3.24),
        ];
        let obs = RawObservation::from_series(SourceKind::Aggregator, points).unwrap();
        assert_eq!(obs.value, 3.24);
        assert_eq!(obs.previous_value, 3.21);
        assert_eq!(obs.history.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn non_finite_values_are_malformed() {
        assert!(RawObservation::from_change(SourceKind::Scrape, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn bond_spec_requires_proxy_ticker() {
        assert!(BondQuerySpec::new("kr", 10, "  ").is_err());
        let spec = BondQuerySpec::new("kr", 10, "148070.KS").unwrap();
        assert_eq!(spec.key(), "KR10Y");
        assert_eq!(spec.proxy_ticker(), "148070.KS");
        assert!(spec.aggregator_symbol().is_none());
    }

    #[test]
    fn config_names_match_serialized_names() {
        for kind in SourceKind::ALL {
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind.config_name()));
        }
    }

    #[test]
    fn price_quote_drops_non_finite_points() {
        let points = vec![
            HistoryPoint::new(ts(1), 100.0),
            HistoryPoint::new(ts(2), f64::NAN),
            HistoryPoint::new(ts(3), 110.0),
        ];
        let quote = PriceQuote::from_series("^KS11", "KOSPI", points).unwrap();
        assert_eq!(quote.previous_value, 100.0);
        assert!((quote.delta_percent - 10.0).abs() < 1e-9);
        assert_eq!(quote.history.len(), 2);
    }
}
