//! Aggregator source: daily CSV table for a synthetic yield symbol (Stooq style).
//!
//! `GET {base}?s=10kry.b&i=d` returns
//!
//! ```text
//! Date,Open,High,Low,Close
//! 2025-03-03,2.801,2.83,2.78,2.822
//! ```
//!
//! Unknown symbols come back as a bare `No data` body with status 200.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::{AggregatorConfig, Credential};
use crate::data::http::{HttpGateway, HttpRequest};
use crate::domain::{BondQuerySpec, HistoryPoint, RawObservation, SourceKind};
use crate::error::FetchError;
use crate::resolver::SourceStrategy;

const KIND: SourceKind = SourceKind::Aggregator;

pub struct AggregatorSource {
    gateway: Arc<dyn HttpGateway>,
    base_url: String,
    history_rows: usize,
    api_key: Credential,
}

impl AggregatorSource {
    pub fn new(gateway: Arc<dyn HttpGateway>, config: &AggregatorConfig) -> Self {
        Self {
            gateway,
            base_url: config.base_url.clone(),
            history_rows: config.history_rows.max(2),
            api_key: config.api_key.clone(),
        }
    }
}

impl SourceStrategy for AggregatorSource {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn fetch(&self, spec: &BondQuerySpec) -> Result<RawObservation, FetchError> {
        let symbol = spec
            .aggregator_symbol()
            .ok_or_else(|| FetchError::not_configured(KIND, format!("no aggregator symbol for {}", spec.key())))?;

        let mut request = HttpRequest::get(&self.base_url).query("s", symbol).query("i", "d");
        if let Some(key) = self.api_key.secret() {
            request = request.query("apikey", key);
        }

        let body = self
            .gateway
            .get_text(&request)
            .map_err(|e| FetchError::from_gateway(KIND, e))?;

        let mut points = parse_daily_csv(&body)?;
        if points.len() > self.history_rows {
            points.drain(..points.len() - self.history_rows);
        }
        RawObservation::from_series(KIND, points)
    }
}

/// Parse a `Date,...,Close` table into an ascending close series.
///
/// Rows with an unparsable close are skipped; a missing `Date` or `Close`
/// column is a malformed response.
pub fn parse_daily_csv(body: &str) -> Result<Vec<HistoryPoint>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::malformed(KIND, format!("unreadable CSV header: {e}")))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(date_col), Some(close_col)) = (column("Date"), column("Close")) else {
        let first_line = body.lines().next().unwrap_or("").trim();
        return Err(FetchError::malformed(
            KIND,
            format!("expected Date and Close columns, got '{first_line}'"),
        ));
    };

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FetchError::malformed(KIND, format!("bad CSV row: {e}")))?;
        let (Some(date), Some(close)) = (record.get(date_col), record.get(close_col)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            continue;
        };
        let Ok(close) = close.parse::<f64>() else {
            continue;
        };
        if !close.is_finite() {
            continue;
        }
        let Some(timestamp) = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()) else {
            continue;
        };
        points.push(HistoryPoint::new(timestamp, close));
    }

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}
