//! Market quote groups (indices, FX, commodities, bond ETFs).
//!
//! All tickers across all groups are downloaded with one bulk call; derived
//! instruments (ratios) are computed from the downloaded series. A ticker that
//! fails or has fewer than two points becomes an entry without a quote.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::config::{GroupEntry, InstrumentSource};
use crate::data::yahoo::{CloseSeries, SeriesWindow};
use crate::domain::{ChartRange, HistoryPoint, PriceQuote};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketEntry {
    pub label: String,
    /// Ticker, or `A/B` for a derived ratio.
    pub instrument: String,
    pub quote: Option<PriceQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketGroup {
    pub name: String,
    pub title: String,
    pub entries: Vec<MarketEntry>,
}

/// Distinct tickers needed by `groups`, in first-seen order.
pub fn collect_symbols(groups: &[GroupEntry]) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    let mut push = |symbol: &str| {
        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
    };
    for group in groups {
        for instrument in &group.instruments {
            match &instrument.source {
                InstrumentSource::Ticker { symbol } => push(symbol),
                InstrumentSource::Ratio { numerator, denominator } => {
                    push(numerator);
                    push(denominator);
                }
            }
        }
    }
    symbols
}

/// `numerator / denominator` on the timestamps both series share.
///
/// Points with a zero denominator are skipped.
pub fn ratio_series(numerator: &[HistoryPoint], denominator: &[HistoryPoint]) -> Vec<HistoryPoint> {
    let by_time: HashMap<_, f64> = denominator.iter().map(|p| (p.timestamp, p.value)).collect();
    numerator
        .iter()
        .filter_map(|n| {
            let d = *by_time.get(&n.timestamp)?;
            (d != 0.0).then(|| HistoryPoint::new(n.timestamp, n.value / d))
        })
        .collect()
}

/// Download every group's tickers in one bulk call and build the quotes.
pub fn fetch_market_groups(series: &dyn CloseSeries, groups: &[GroupEntry], range: ChartRange) -> Vec<MarketGroup> {
    let symbols = collect_symbols(groups);
    let window = SeriesWindow::from(range);

    let mut downloaded: BTreeMap<String, Vec<HistoryPoint>> = BTreeMap::new();
    for (symbol, result) in series.bulk_closes(&symbols, &window) {
        match result {
            Ok(points) => {
                downloaded.insert(symbol, points);
            }
            Err(err) => warn!(%symbol, error = %err, "market series unavailable"),
        }
    }

    groups
        .iter()
        .map(|group| MarketGroup {
            name: group.name.clone(),
            title: group.title.clone(),
            entries: group
                .instruments
                .iter()
                .map(|instrument| {
                    let (name, points) = match &instrument.source {
                        InstrumentSource::Ticker { symbol } => {
                            (symbol.clone(), downloaded.get(symbol).cloned())
                        }
                        InstrumentSource::Ratio { numerator, denominator } => (
                            format!("{numerator}/{denominator}"),
                            downloaded
                                .get(numerator)
                                .zip(downloaded.get(denominator))
                                .map(|(n, d)| ratio_series(n, d)),
                        ),
                    };
                    let quote = points.and_then(|p| PriceQuote::from_series(&name, &instrument.label, p));
                    MarketEntry {
                        label: instrument.label.clone(),
                        instrument: name,
                        quote,
                    }
                })
                .collect(),
        })
        .collect()
}
