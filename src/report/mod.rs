//! Reporting utilities: plain-text terminal output for quotes and snapshots.
//!
//! Formatting lives in one place so the resolver and market code stay free of
//! presentation concerns.

pub mod format;

pub use format::{
    format_bond_line, format_bonds, format_market_groups, format_price_line, format_snapshot, format_sources,
    group_thousands,
};

use crate::domain::SourceKind;

/// Movement arrow shown next to a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Unchanged,
}

impl Trend {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Trend::Up
        } else if delta < 0.0 {
            Trend::Down
        } else {
            Trend::Unchanged
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Unchanged => "-",
        }
    }
}

/// Human-readable provenance tag for a bond quote.
pub fn source_label(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Aggregator => "aggregator",
        SourceKind::OfficialStatistics => "BOK ECOS",
        SourceKind::Scrape => "Naver Finance",
        SourceKind::ProxyFallback => "ETF proxy",
    }
}
