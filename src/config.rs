//! Runtime configuration.
//!
//! Configuration is an explicit value handed to the resolver at construction
//! time. It comes from three layers, later ones winning:
//!
//! 1. built-in defaults (`Default` impls below)
//! 2. an optional TOML file (`--config`)
//! 3. secrets from the environment / `.env` (`ECOS_API_KEY`, `AGGREGATOR_API_KEY`)

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{BondQuerySpec, SourceKind, StatisticsSeries};
use crate::error::AppError;
use crate::logging::LogFormat;

pub const ENV_STATISTICS_KEY: &str = "ECOS_API_KEY";
pub const ENV_AGGREGATOR_KEY: &str = "AGGREGATOR_API_KEY";

const PLACEHOLDER_KEYS: &[&str] = &["YOUR_API_KEY", "API_KEY", "CHANGEME", "CHANGE_ME", "TODO", "XXX", "SAMPLE"];

/// An API key, classified once when configuration is loaded.
///
/// Sources check `secret()` and skip themselves without touching the network
/// when it is `None`.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum Credential {
    #[default]
    Absent,
    /// A value that was clearly never filled in (e.g. `YOUR_API_KEY`).
    Placeholder,
    Present(String),
}

impl Credential {
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Credential::Absent;
        };
        let upper = raw.to_ascii_uppercase();
        let looks_placeholder = PLACEHOLDER_KEYS.contains(&upper.as_str())
            || upper.starts_with("YOUR_")
            || upper.starts_with("YOUR-")
            || (raw.starts_with('<') && raw.ends_with('>'));
        if looks_placeholder {
            Credential::Placeholder
        } else {
            Credential::Present(raw.to_string())
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            Credential::Present(key) => Some(key),
            Credential::Absent | Credential::Placeholder => None,
        }
    }

    pub fn state_label(&self) -> &'static str {
        match self {
            Credential::Absent => "absent",
            Credential::Placeholder => "placeholder",
            Credential::Present(_) => "configured",
        }
    }
}

impl From<Option<String>> for Credential {
    fn from(value: Option<String>) -> Self {
        Credential::classify(value.as_deref())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Present(_) => f.write_str("Credential(<redacted>)"),
            other => write!(f, "Credential({})", other.state_label()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Source priority, first entry tried first.
    pub order: Vec<SourceKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            order: SourceKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    pub base_url: String,
    /// How many trailing rows to keep as history.
    pub history_rows: usize,
    pub api_key: Credential,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://stooq.com/q/d/l/".to_string(),
            history_rows: 30,
            api_key: Credential::Absent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticsConfig {
    pub base_url: String,
    /// Calendar days requested ending today; must cover weekends and holidays.
    pub lookback_days: u32,
    pub max_rows: u32,
    pub api_key: Credential,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ecos.bok.or.kr/api".to_string(),
            lookback_days: 14,
            max_rows: 100,
            api_key: Credential::Absent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub value_selector: String,
    pub change_selector: String,
    pub direction_selector: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finance.naver.com/marketindex/interestDetail.naver".to_string(),
            value_selector: "p.no_today".to_string(),
            change_selector: "p.no_exday em".to_string(),
            direction_selector: "p.no_exday .ico".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub range: String,
    pub interval: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            range: "5d".to_string(),
            interval: "1d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// One bond instrument as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BondEntry {
    pub country: String,
    pub maturity_years: u16,
    pub label: Option<String>,
    pub aggregator_symbol: Option<String>,
    pub statistics: Option<StatisticsSeries>,
    pub scrape_code: Option<String>,
    pub proxy_ticker: String,
}

impl BondEntry {
    pub fn to_spec(&self) -> Result<BondQuerySpec, AppError> {
        let mut spec = BondQuerySpec::new(&self.country, self.maturity_years, &self.proxy_ticker)?;
        if let Some(label) = &self.label {
            spec = spec.with_label(label.clone());
        }
        if let Some(symbol) = non_empty(&self.aggregator_symbol) {
            spec = spec.with_aggregator_symbol(symbol);
        }
        if let Some(series) = &self.statistics {
            spec = spec.with_statistics_series(series.clone());
        }
        if let Some(code) = non_empty(&self.scrape_code) {
            spec = spec.with_scrape_code(code);
        }
        Ok(spec)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Where a market instrument's series comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InstrumentSource {
    Ticker { symbol: String },
    /// `numerator / denominator`, aligned on shared timestamps.
    Ratio { numerator: String, denominator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstrumentEntry {
    pub label: String,
    #[serde(flatten)]
    pub source: InstrumentSource,
}

impl InstrumentEntry {
    pub fn ticker(label: &str, symbol: &str) -> Self {
        Self {
            label: label.to_string(),
            source: InstrumentSource::Ticker {
                symbol: symbol.to_string(),
            },
        }
    }

    pub fn ratio(label: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            label: label.to_string(),
            source: InstrumentSource::Ratio {
                numerator: numerator.to_string(),
                denominator: denominator.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupEntry {
    pub name: String,
    pub title: String,
    pub instruments: Vec<InstrumentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub resolver: ResolverConfig,
    pub aggregator: AggregatorConfig,
    pub statistics: StatisticsConfig,
    pub scrape: ScrapeConfig,
    pub proxy: ProxyConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub bonds: Vec<BondEntry>,
    pub groups: Vec<GroupEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            resolver: ResolverConfig::default(),
            aggregator: AggregatorConfig::default(),
            statistics: StatisticsConfig::default(),
            scrape: ScrapeConfig::default(),
            proxy: ProxyConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            bonds: default_bonds(),
            groups: default_groups(),
        }
    }
}

impl AppConfig {
    /// Load defaults, overlay the TOML file if given, then overlay environment secrets.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::config(format!("Failed to read config '{}': {e}", path.display()))
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::config(format!("Invalid config: {e}")))
    }

    /// Environment variables win over keys written in the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_STATISTICS_KEY) {
            self.statistics.api_key = Credential::classify(Some(&raw));
        }
        if let Some(raw) = lookup(ENV_AGGREGATOR_KEY) {
            self.aggregator.api_key = Credential::classify(Some(&raw));
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let order = &self.resolver.order;
        if order.last() != Some(&SourceKind::ProxyFallback) {
            return Err(AppError::config(
                "resolver.order must end with \"proxy\": it is the last-resort source.",
            ));
        }
        for (i, kind) in order.iter().enumerate() {
            if order[..i].contains(kind) {
                return Err(AppError::config(format!("resolver.order lists \"{kind}\" twice.")));
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0."));
        }
        if self.statistics.max_rows < self.statistics.lookback_days {
            // Rows come back oldest first; a short page would stop before the latest day.
            return Err(AppError::config(format!(
                "statistics.max_rows ({}) must be >= statistics.lookback_days ({}).",
                self.statistics.max_rows, self.statistics.lookback_days
            )));
        }
        if self.cache.ttl_secs == 0 {
            return Err(AppError::config("cache.ttl_secs must be > 0."));
        }
        let mut keys: Vec<String> = Vec::new();
        for entry in &self.bonds {
            let spec = entry.to_spec()?;
            if keys.iter().any(|k| k == spec.key()) {
                return Err(AppError::config(format!("Duplicate bond instrument {}.", spec.key())));
            }
            keys.push(spec.key().to_string());
        }
        for group in &self.groups {
            if group.instruments.is_empty() {
                return Err(AppError::config(format!("Group '{}' has no instruments.", group.name)));
            }
        }
        Ok(())
    }

    pub fn bond_specs(&self) -> Result<Vec<BondQuerySpec>, AppError> {
        self.bonds.iter().map(BondEntry::to_spec).collect()
    }
}

fn default_bonds() -> Vec<BondEntry> {
    vec![
        BondEntry {
            country: "KR".to_string(),
            maturity_years: 3,
            label: Some("Korea 3Y Treasury".to_string()),
            aggregator_symbol: Some("3kry.b".to_string()),
            statistics: Some(StatisticsSeries {
                stat_code: "817Y002".to_string(),
                item_code: "010200000".to_string(),
            }),
            scrape_code: Some("IRR_GOVT03Y".to_string()),
            proxy_ticker: "114260.KS".to_string(),
        },
        BondEntry {
            country: "KR".to_string(),
            maturity_years: 10,
            label: Some("Korea 10Y Treasury".to_string()),
            aggregator_symbol: Some("10kry.b".to_string()),
            statistics: Some(StatisticsSeries {
                stat_code: "817Y002".to_string(),
                item_code: "010210000".to_string(),
            }),
            scrape_code: Some("IRR_GOVT10Y".to_string()),
            proxy_ticker: "148070.KS".to_string(),
        },
    ]
}

fn default_groups() -> Vec<GroupEntry> {
    vec![
        GroupEntry {
            name: "indices".to_string(),
            title: "Equity indices".to_string(),
            instruments: vec![
                InstrumentEntry::ticker("KOSPI", "^KS11"),
                InstrumentEntry::ticker("Dow Jones", "^DJI"),
                InstrumentEntry::ticker("S&P 500", "^GSPC"),
                InstrumentEntry::ticker("Nasdaq", "^IXIC"),
            ],
        },
        GroupEntry {
            name: "macro".to_string(),
            title: "Leading indicators".to_string(),
            instruments: vec![
                InstrumentEntry::ticker("WTI crude", "CL=F"),
                InstrumentEntry::ticker("Gold", "GC=F"),
                InstrumentEntry::ticker("VIX", "^VIX"),
                InstrumentEntry::ticker("Copper", "HG=F"),
            ],
        },
        GroupEntry {
            name: "bonds_short".to_string(),
            title: "Short rates (2-3y)".to_string(),
            instruments: vec![
                InstrumentEntry::ticker("US 2Y note future", "ZT=F"),
                InstrumentEntry::ticker("KR 3Y bond ETF", "114260.KS"),
            ],
        },
        GroupEntry {
            name: "bonds_long".to_string(),
            title: "Long rates (10y)".to_string(),
            instruments: vec![
                InstrumentEntry::ticker("US 10Y yield", "^TNX"),
                InstrumentEntry::ticker("KR 10Y bond ETF", "148070.KS"),
            ],
        },
        GroupEntry {
            name: "forex".to_string(),
            title: "FX".to_string(),
            instruments: vec![
                InstrumentEntry::ticker("USD/KRW", "KRW=X"),
                InstrumentEntry::ratio("CNY/KRW (derived)", "KRW=X", "CNY=X"),
                InstrumentEntry::ticker("JPY/KRW", "JPYKRW=X"),
                InstrumentEntry::ticker("Dollar index", "DX-Y.NYB"),
            ],
        },
    ]
}
