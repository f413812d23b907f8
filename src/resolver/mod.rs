//! Tiered bond-yield resolution.
//!
//! A `YieldResolver` owns an ordered list of `SourceStrategy` values and walks it
//! once per request: the first strategy that returns an observation wins and its
//! `SourceKind` is stamped on the quote. A failing strategy is logged and skipped;
//! only "every source failed" reaches the caller.
//!
//! The order comes from configuration (`[resolver] order`), so adding, removing or
//! reordering a source is a config change.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::data::aggregator::AggregatorSource;
use crate::data::ecos::StatisticsSource;
use crate::data::http::{BrowserProfile, HttpGateway};
use crate::data::naver::ScrapeSource;
use crate::data::yahoo::{CloseSeries, ProxySource};
use crate::domain::{BondQuerySpec, RawObservation, SourceKind, YieldQuote};
use crate::error::{AppError, FetchError, ResolutionFailure};

/// One way of obtaining a bond observation.
pub trait SourceStrategy: Send + Sync {
    /// Which provider this strategy talks to; stamped on every quote it produces.
    fn kind(&self) -> SourceKind;

    /// Fetch and normalize. Must not retry internally.
    fn fetch(&self, spec: &BondQuerySpec) -> Result<RawObservation, FetchError>;
}

pub struct YieldResolver {
    strategies: Vec<Box<dyn SourceStrategy>>,
}

impl YieldResolver {
    /// Strategies are tried in the order given.
    pub fn new(strategies: Vec<Box<dyn SourceStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the chain named by `config.resolver.order`.
    pub fn from_config(
        config: &AppConfig,
        gateway: Arc<dyn HttpGateway>,
        series: Arc<dyn CloseSeries>,
    ) -> Result<Self, AppError> {
        let browser = BrowserProfile::from_config(&config.http);
        let mut strategies: Vec<Box<dyn SourceStrategy>> = Vec::with_capacity(config.resolver.order.len());
        for kind in &config.resolver.order {
            let strategy: Box<dyn SourceStrategy> = match kind {
                SourceKind::Aggregator => Box::new(AggregatorSource::new(gateway.clone(), &config.aggregator)),
                SourceKind::OfficialStatistics => {
                    Box::new(StatisticsSource::new(gateway.clone(), &config.statistics))
                }
                SourceKind::Scrape => Box::new(ScrapeSource::new(gateway.clone(), &config.scrape, browser.clone())?),
                SourceKind::ProxyFallback => Box::new(ProxySource::new(series.clone(), &config.proxy)),
            };
            strategies.push(strategy);
        }
        Ok(Self::new(strategies))
    }

    /// Source kinds in the order they will be tried.
    pub fn sources(&self) -> Vec<SourceKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Resolve one instrument: first successful source wins.
    pub fn resolve(&self, spec: &BondQuerySpec) -> Result<YieldQuote, ResolutionFailure> {
        let instrument = spec.key();

        for (idx, strategy) in self.strategies.iter().enumerate() {
            let source = strategy.kind();
            debug!(instrument, %source, attempt = idx + 1, "trying source");

            match strategy.fetch(spec) {
                Ok(observation) => {
                    let quote = YieldQuote::from_observation(source, observation);
                    info!(
                        instrument,
                        %source,
                        value = quote.value(),
                        delta = quote.delta(),
                        degraded = quote.is_degraded(),
                        "resolved"
                    );
                    return Ok(quote);
                }
                Err(err @ FetchError::NotConfigured { .. }) => {
                    debug!(instrument, %source, error = %err, "source skipped");
                }
                Err(err) => {
                    warn!(instrument, %source, error = %err, "source failed, trying next");
                }
            }
        }

        warn!(instrument, attempted = self.strategies.len(), "all sources failed");
        Err(ResolutionFailure {
            instrument: instrument.to_string(),
            attempted: self.strategies.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Credential;
    use crate::data::http::fake::FakeGateway;
    use crate::data::yahoo::fake::{FakeSeries, daily};
    use crate::domain::HistoryPoint;

    /// Scripted strategy that counts how often it was asked.
    struct Scripted {
        kind: SourceKind,
        outcome: Result<RawObservation, FetchError>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn ok(kind: SourceKind, values: &[f64]) -> (Box<dyn SourceStrategy>, Arc<AtomicUsize>) {
            let points = values
                .iter()
                .enumerate()
                .map(|(i, v)| HistoryPoint::new(Utc.timestamp_opt(1_740_960_000 + i as i64 * 86_400, 0).unwrap(), *v))
                .collect();
            Self::boxed(kind, RawObservation::from_series(kind, points))
        }

        fn fail(kind: SourceKind) -> (Box<dyn SourceStrategy>, Arc<AtomicUsize>) {
            Self::boxed(kind, Err(FetchError::unavailable(kind, "connection refused")))
        }

        fn boxed(
            kind: SourceKind,
            outcome: Result<RawObservation, FetchError>,
        ) -> (Box<dyn SourceStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Box::new(Self {
                kind,
                outcome,
                calls: calls.clone(),
            });
            (strategy, calls)
        }
    }

    impl SourceStrategy for Scripted {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn fetch(&self, _spec: &BondQuerySpec) -> Result<RawObservation, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn spec() -> BondQuerySpec {
        BondQuerySpec::new("KR", 10, "148070.KS").unwrap()
    }

    #[test]
    fn falls_through_to_proxy_when_first_three_fail() {
        let (a, _) = Scripted::fail(SourceKind::Aggregator);
        let (b, _) = Scripted::fail(SourceKind::OfficialStatistics);
        let (c, _) = Scripted::fail(SourceKind::Scrape);
        let (d, _) = Scripted::ok(SourceKind::ProxyFallback, &[14250.0, 14300.0]);
        let resolver = YieldResolver::new(vec![a, b, c, d]);

        let quote = resolver.resolve(&spec()).unwrap();
        assert_eq!(quote.source(), SourceKind::ProxyFallback);
        assert!(quote.is_degraded());
        assert_eq!(quote.value(), 14300.0);
        assert_eq!(quote.previous_value(), 14250.0);
        assert_eq!(quote.delta(), 50.0);
        assert!((quote.delta_percent() - 0.350877).abs() < 1e-5);
    }

    #[test]
    fn first_success_stops_the_chain() {
        let (a, a_calls) = Scripted::ok(SourceKind::Aggregator, &[3.21, 3.24]);
        let (b, b_calls) = Scripted::ok(SourceKind::OfficialStatistics, &[1.0, 2.0]);
        let (c, c_calls) = Scripted::ok(SourceKind::Scrape, &[1.0, 2.0]);
        let (d, d_calls) = Scripted::ok(SourceKind::ProxyFallback, &[1.0, 2.0]);
        let resolver = YieldResolver::new(vec![a, b, c, d]);

        let quote = resolver.resolve(&spec()).unwrap();
        assert_eq!(quote.source(), SourceKind::Aggregator);
        assert!(!quote.is_degraded());
        assert!((quote.delta() - 0.03).abs() < 1e-12);
        assert!((quote.delta_percent() - 0.934579).abs() < 1e-5);

        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhaustion_is_a_failure_not_a_zero_quote() {
        let strategies = SourceKind::ALL.iter().map(|k| Scripted::fail(*k).0).collect();
        let resolver = YieldResolver::new(strategies);

        let failure = resolver.resolve(&spec()).unwrap_err();
        assert_eq!(failure.instrument, "KR10Y");
        assert_eq!(failure.attempted, 4);
    }

    #[test]
    fn every_strategy_is_tried_once_in_order_on_exhaustion() {
        let (a, a_calls) = Scripted::fail(SourceKind::Aggregator);
        let (b, b_calls) = Scripted::fail(SourceKind::ProxyFallback);
        let resolver = YieldResolver::new(vec![a, b]);
        assert!(resolver.resolve(&spec()).is_err());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quote_is_attributed_to_the_winning_source_only() {
        let (a, _) = Scripted::fail(SourceKind::Aggregator);
        let (b, _) = Scripted::ok(SourceKind::OfficialStatistics, &[2.50, 2.60, 2.55]);
        let (d, _) = Scripted::ok(SourceKind::ProxyFallback, &[14250.0, 14300.0]);
        let resolver = YieldResolver::new(vec![a, b, d]);

        let quote = resolver.resolve(&spec()).unwrap();
        assert_eq!(quote.source(), SourceKind::OfficialStatistics);
        assert_eq!(quote.value(), 2.55);
        assert_eq!(quote.previous_value(), 2.60);
        let history: Vec<f64> = quote.history().unwrap().iter().map(|p| p.value).collect();
        assert_eq!(history, vec![2.50, 2.60, 2.55]);
    }

    const ONE_ROW: &str = r#"{"StatisticSearch":{"list_total_count":1,"row":[{"TIME":"20250304","DATA_VALUE":"2.650"}]}}"#;

    const SCRAPE_PAGE: &str = r#"<p class="no_today"><span class="blind">3.250</span></p>
        <p class="no_exday"><em><span class="ico down">하락</span><span class="blind">0.020</span></em></p>"#;

    fn chain_with(gateway: FakeGateway, config: &AppConfig) -> YieldResolver {
        YieldResolver::from_config(config, Arc::new(gateway), Arc::new(FakeSeries::new())).unwrap()
    }

    fn default_kr3y() -> BondQuerySpec {
        AppConfig::default().bond_specs().unwrap().remove(0)
    }

    #[test]
    fn statistics_with_one_row_falls_through_to_scrape() {
        let mut config = AppConfig::default();
        config.statistics.api_key = Credential::Present("KEY1".to_string());
        let gateway = FakeGateway::new()
            .route("s=3kry.b", "No data")
            .route("/StatisticSearch/", ONE_ROW)
            .route("marketindexCd=IRR_GOVT03Y", SCRAPE_PAGE);
        let resolver = chain_with(gateway, &config);

        let quote = resolver.resolve(&default_kr3y()).unwrap();
        assert_eq!(quote.source(), SourceKind::Scrape);
        assert!(!quote.is_degraded());
        assert!((quote.value() - 3.25).abs() < 1e-12);
        assert!((quote.previous_value() - 3.27).abs() < 1e-12);
        assert!((quote.delta() + 0.02).abs() < 1e-12);
        assert!((quote.delta_percent() + 0.611621).abs() < 1e-5);
        assert!(quote.history().is_none());
    }

    #[test]
    fn configured_order_is_respected() {
        let mut config = AppConfig::default();
        config.resolver.order = vec![SourceKind::Scrape, SourceKind::ProxyFallback];
        let gateway = FakeGateway::new().route("marketindexCd=IRR_GOVT03Y", SCRAPE_PAGE);
        let resolver = chain_with(gateway, &config);

        assert_eq!(resolver.sources(), vec![SourceKind::Scrape, SourceKind::ProxyFallback]);
        assert_eq!(resolver.resolve(&default_kr3y()).unwrap().source(), SourceKind::Scrape);
    }

    #[test]
    fn missing_statistics_key_never_hits_the_network() {
        let gateway = Arc::new(FakeGateway::new());
        let series = Arc::new(FakeSeries::new());
        let resolver = YieldResolver::from_config(&AppConfig::default(), gateway.clone(), series.clone()).unwrap();

        let failure = resolver.resolve(&default_kr3y()).unwrap_err();
        assert_eq!(failure.attempted, 4);
        let urls: Vec<String> = gateway.requests().iter().map(|r| r.display_url()).collect();
        assert_eq!(urls.len(), 2, "{urls:?}");
        assert!(urls.iter().all(|u| !u.contains("StatisticSearch")));
        assert_eq!(series.requested().len(), 1);
    }

    #[test]
    fn failing_proxy_ends_the_chain() {
        let mut config = AppConfig::default();
        config.resolver.order = vec![SourceKind::Scrape, SourceKind::ProxyFallback];
        let gateway = Arc::new(FakeGateway::new());
        let series = Arc::new(FakeSeries::new().fail("114260.KS"));
        let resolver = YieldResolver::from_config(&config, gateway, series).unwrap();

        let failure = resolver.resolve(&default_kr3y()).unwrap_err();
        assert_eq!(failure.instrument, "KR3Y");
        assert_eq!(failure.attempted, 2);
    }

    #[test]
    fn proxy_fallback_through_configured_chain() {
        let series = Arc::new(FakeSeries::new().with("114260.KS", daily(&[105_000.0, 105_200.0])));
        let resolver = YieldResolver::from_config(&AppConfig::default(), Arc::new(FakeGateway::new()), series).unwrap();

        let quote = resolver.resolve(&default_kr3y()).unwrap();
        assert_eq!(quote.source(), SourceKind::ProxyFallback);
        assert!(quote.is_degraded());
        assert_eq!(quote.value(), 105_200.0);
    }
}
