//! Plain-text formatting for bonds, market groups and the source chain.

use crate::app::pipeline::{BondCard, BondStatus, DashboardSnapshot};
use crate::config::AppConfig;
use crate::domain::{SourceKind, YieldQuote};
use crate::market::{MarketEntry, MarketGroup};
use crate::report::{Trend, source_label};

const LABEL_WIDTH: usize = 22;

/// Format with a fixed number of decimals and `,` thousands separators.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let is_zero = text.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

fn signed_percent(percent: f64) -> String {
    if percent > 0.0 {
        format!("+{percent:.2}%")
    } else {
        format!("{percent:.2}%")
    }
}

fn quote_body(quote: &YieldQuote) -> String {
    let trend = Trend::of(quote.delta());
    if quote.is_degraded() {
        // Price level of the ETF: percent of a price is not a yield move.
        format!(
            "{:>10}  {} {}  [{} · price proxy]",
            group_thousands(quote.value(), 0),
            trend.arrow(),
            group_thousands(quote.delta().abs(), 0),
            source_label(quote.source()),
        )
    } else {
        format!(
            "{:>9}%  {} {:.3}  ({})  [{}]",
            format!("{:.3}", quote.value()),
            trend.arrow(),
            quote.delta().abs(),
            signed_percent(quote.delta_percent()),
            source_label(quote.source()),
        )
    }
}

pub fn format_bond_line(card: &BondCard) -> String {
    match &card.status {
        BondStatus::Resolved { quote } => format!("{:<LABEL_WIDTH$} {}", card.label, quote_body(quote)),
        BondStatus::Unavailable { .. } => format!("{:<LABEL_WIDTH$} {:>10}  unavailable", card.label, "-"),
    }
}

pub fn format_bonds(cards: &[BondCard]) -> String {
    let mut out = String::from("Korean government bonds:\n");
    if cards.is_empty() {
        out.push_str("  (no bonds configured)\n");
    }
    for card in cards {
        out.push_str("  ");
        out.push_str(&format_bond_line(card));
        out.push('\n');
    }
    out
}

pub fn format_price_line(entry: &MarketEntry) -> String {
    let Some(quote) = &entry.quote else {
        return format!("{:<LABEL_WIDTH$} {:>12}  unavailable", entry.label, "-");
    };
    format!(
        "{:<LABEL_WIDTH$} {:>12}  {} {}  ({})",
        entry.label,
        group_thousands(quote.value, 2),
        Trend::of(quote.delta).arrow(),
        group_thousands(quote.delta.abs(), 2),
        signed_percent(quote.delta_percent),
    )
}

pub fn format_market_groups(groups: &[MarketGroup]) -> String {
    let mut out = String::new();
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{}:\n", group.title));
        for entry in &group.entries {
            out.push_str("  ");
            out.push_str(&format_price_line(entry));
            out.push('\n');
        }
    }
    out
}

pub fn format_snapshot(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    out.push_str("=== yq - market snapshot ===\n");
    out.push_str(&format!(
        "As-of: {} | range: {}\n\n",
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.range.range_param(),
    ));
    out.push_str(&format_bonds(&snapshot.bonds));
    if !snapshot.markets.is_empty() {
        out.push('\n');
        out.push_str(&format_market_groups(&snapshot.markets));
    }
    out
}

fn credential_note(kind: SourceKind, config: &AppConfig) -> String {
    match kind {
        SourceKind::Aggregator => format!("key {} (optional)", config.aggregator.api_key.state_label()),
        SourceKind::OfficialStatistics => {
            let key = &config.statistics.api_key;
            if key.secret().is_some() {
                "key configured".to_string()
            } else {
                format!("key {} -> skipped", key.state_label())
            }
        }
        SourceKind::Scrape | SourceKind::ProxyFallback => "no key needed".to_string(),
    }
}

/// Chain order with per-source credential state.
pub fn format_sources(order: &[SourceKind], config: &AppConfig) -> String {
    let mut out = String::from("Resolution order:\n");
    for (i, kind) in order.iter().enumerate() {
        let degraded = if kind.is_degraded() { " (degraded: price level)" } else { "" };
        out.push_str(&format!(
            "  {}. {:<11} {:<14} {}{degraded}\n",
            i + 1,
            kind.config_name(),
            source_label(*kind),
            credential_note(*kind, config),
        ));
    }
    out
}
