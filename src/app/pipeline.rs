//! Shared snapshot logic used by the `bonds`, `quotes` and `dashboard` commands.
//!
//! configured bonds -> tiered resolution (cached) -> bulk market quotes -> snapshot
//!
//! The commands then only decide how to print the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CachedResolver;
use crate::config::{AppConfig, GroupEntry};
use crate::data::{CloseSeries, HttpGateway, ReqwestGateway, YahooSeries};
use crate::domain::{BondQuerySpec, ChartRange, SourceKind, YieldQuote};
use crate::error::{AppError, ResolutionFailure};
use crate::market::{MarketGroup, fetch_market_groups};
use crate::resolver::YieldResolver;

/// Outcome of resolving one bond.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BondStatus {
    Resolved { quote: YieldQuote },
    Unavailable { failure: ResolutionFailure },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BondCard {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub status: BondStatus,
}

impl BondCard {
    pub fn quote(&self) -> Option<&YieldQuote> {
        match &self.status {
            BondStatus::Resolved { quote } => Some(quote),
            BondStatus::Unavailable { .. } => None,
        }
    }
}

/// Everything one dashboard refresh produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub range: ChartRange,
    pub bonds: Vec<BondCard>,
    pub markets: Vec<MarketGroup>,
}

/// Long-lived clients built once from config and reused across refreshes.
pub struct Services {
    pub resolver: CachedResolver,
    pub series: Arc<dyn CloseSeries>,
    pub bonds: Vec<BondQuerySpec>,
    pub groups: Vec<GroupEntry>,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let gateway: Arc<dyn HttpGateway> = Arc::new(ReqwestGateway::new(&config.http)?);
        let series: Arc<dyn CloseSeries> = Arc::new(YahooSeries::new()?);
        Self::with_clients(config, gateway, series)
    }

    /// Build on caller-supplied HTTP and chart clients.
    pub fn with_clients(
        config: &AppConfig,
        gateway: Arc<dyn HttpGateway>,
        series: Arc<dyn CloseSeries>,
    ) -> Result<Self, AppError> {
        let resolver = YieldResolver::from_config(config, gateway, series.clone())?;
        Ok(Self {
            resolver: CachedResolver::new(resolver, Duration::from_secs(config.cache.ttl_secs)),
            series,
            bonds: config.bond_specs()?,
            groups: config.groups.clone(),
        })
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.resolver.sources()
    }

    /// Bonds whose key is in `only` (case-insensitive); all bonds when `only` is empty.
    pub fn select_bonds(&self, only: &[String]) -> Result<Vec<BondQuerySpec>, AppError> {
        if only.is_empty() {
            return Ok(self.bonds.clone());
        }
        only.iter()
            .map(|key| {
                self.bonds
                    .iter()
                    .find(|spec| spec.key().eq_ignore_ascii_case(key.trim()))
                    .cloned()
                    .ok_or_else(|| {
                        let known: Vec<&str> = self.bonds.iter().map(BondQuerySpec::key).collect();
                        AppError::config(format!("Unknown bond '{key}'. Known: {}", known.join(", ")))
                    })
            })
            .collect()
    }

    /// Groups named in `only`; all groups when `only` is `None`.
    pub fn select_groups(&self, only: Option<&str>) -> Result<Vec<GroupEntry>, AppError> {
        let Some(name) = only else {
            return Ok(self.groups.clone());
        };
        let groups: Vec<GroupEntry> = self
            .groups
            .iter()
            .filter(|g| g.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect();
        if groups.is_empty() {
            let known: Vec<&str> = self.groups.iter().map(|g| g.name.as_str()).collect();
            return Err(AppError::config(format!("Unknown group '{name}'. Known: {}", known.join(", "))));
        }
        Ok(groups)
    }
}

/// Resolve bonds one after another; a failure becomes an `Unavailable` card.
pub fn resolve_bonds(resolver: &CachedResolver, specs: &[BondQuerySpec]) -> Vec<BondCard> {
    specs
        .iter()
        .map(|spec| BondCard {
            key: spec.key().to_string(),
            label: spec.label().to_string(),
            status: match resolver.resolve(spec) {
                Ok(quote) => BondStatus::Resolved { quote },
                Err(failure) => BondStatus::Unavailable { failure },
            },
        })
        .collect()
}

/// One full refresh: every configured bond plus every configured market group.
pub fn run_snapshot(services: &Services, range: ChartRange) -> DashboardSnapshot {
    let bonds = resolve_bonds(&services.resolver, &services.bonds);
    let markets = fetch_market_groups(services.series.as_ref(), &services.groups, range);
    DashboardSnapshot {
        generated_at: Utc::now(),
        range,
        bonds,
        markets,
    }
}
