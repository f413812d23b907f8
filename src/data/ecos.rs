//! Official statistics source: Bank of Korea ECOS `StatisticSearch` API.
//!
//! Request shape (all path segments):
//!
//! `{base}/StatisticSearch/{key}/json/kr/{from}/{to}/{stat_code}/D/{start}/{end}/{item_code}`
//!
//! A successful response wraps rows in `StatisticSearch.row`; errors and empty
//! ranges come back as `{"RESULT": {"CODE": "INFO-200", "MESSAGE": ...}}`.

use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use serde::Deserialize;

use crate::config::{Credential, StatisticsConfig};
use crate::data::http::{HttpGateway, HttpRequest};
use crate::domain::{BondQuerySpec, HistoryPoint, RawObservation, SourceKind};
use crate::error::FetchError;
use crate::resolver::SourceStrategy;

const KIND: SourceKind = SourceKind::OfficialStatistics;

#[derive(Debug, Deserialize)]
struct EcosEnvelope {
    #[serde(rename = "StatisticSearch")]
    statistic_search: Option<EcosTable>,
    #[serde(rename = "RESULT")]
    result: Option<EcosResult>,
}

#[derive(Debug, Deserialize)]
struct EcosTable {
    #[serde(rename = "row", default)]
    rows: Vec<EcosRow>,
}

#[derive(Debug, Deserialize)]
struct EcosRow {
    #[serde(rename = "TIME")]
    time: String,
    #[serde(rename = "DATA_VALUE")]
    data_value: String,
}

#[derive(Debug, Deserialize)]
struct EcosResult {
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "MESSAGE", default)]
    message: String,
}

pub struct StatisticsSource {
    gateway: Arc<dyn HttpGateway>,
    base_url: String,
    lookback_days: u32,
    max_rows: u32,
    api_key: Credential,
    /// Fixed end date; `None` means "today" in local time.
    as_of: Option<NaiveDate>,
}

impl StatisticsSource {
    pub fn new(gateway: Arc<dyn HttpGateway>, config: &StatisticsConfig) -> Self {
        Self {
            gateway,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lookback_days: config.lookback_days.max(1),
            max_rows: config.max_rows.max(2),
            api_key: config.api_key.clone(),
            as_of: None,
        }
    }

    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    fn date_window(&self) -> (NaiveDate, NaiveDate) {
        let end = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let start = end
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(end);
        (start, end)
    }
}

impl SourceStrategy for StatisticsSource {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn fetch(&self, spec: &BondQuerySpec) -> Result<RawObservation, FetchError> {
        let Some(key) = self.api_key.secret() else {
            return Err(FetchError::not_configured(
                KIND,
                format!("API key is {}", self.api_key.state_label()),
            ));
        };
        let series = spec
            .statistics_series()
            .ok_or_else(|| FetchError::not_configured(KIND, format!("no series code for {}", spec.key())))?;

        let (start, end) = self.date_window();
        let url = format!(
            "{}/StatisticSearch/{}/json/kr/1/{}/{}/D/{}/{}/{}",
            self.base_url,
            key,
            self.max_rows,
            series.stat_code,
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
            series.item_code,
        );

        // The key is part of the path; keep it out of error messages and logs.
        let body = self.gateway.get_text(&HttpRequest::get(url)).map_err(|e| {
            FetchError::unavailable(KIND, e.to_string().replace(key, "***"))
        })?;

        let points = parse_ecos_body(&body)?;
        RawObservation::from_series(KIND, points)
    }
}

/// Parse an ECOS response into an ascending series.
pub fn parse_ecos_body(body: &str) -> Result<Vec<HistoryPoint>, FetchError> {
    let envelope: EcosEnvelope = serde_json::from_str(body)
        .map_err(|e| FetchError::malformed(KIND, format!("invalid ECOS JSON: {e}")))?;

    let Some(table) = envelope.statistic_search else {
        return Err(match envelope.result {
            Some(result) => FetchError::malformed(KIND, format!("{}: {}", result.code, result.message)),
            None => FetchError::malformed(KIND, "response has neither StatisticSearch nor RESULT"),
        });
    };

    let mut points = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        let Ok(date) = NaiveDate::parse_from_str(row.time.trim(), "%Y%m%d") else {
            continue;
        };
        let Ok(value) = row.data_value.trim().parse::<f64>() else {
            continue;
        };
        if !value.is_finite() {
            continue;
        }
        let Some(timestamp) = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()) else {
            continue;
        };
        points.push(HistoryPoint::new(timestamp, value));
    }

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::http::fake::FakeGateway;
    use crate::domain::StatisticsSeries;
    use crate::error::GatewayError;

    fn spec() -> BondQuerySpec {
        BondQuerySpec::new("KR", 3, "114260.KS")
            .unwrap()
            .with_statistics_series(StatisticsSeries {
                stat_code: "817Y002".to_string(),
                item_code: "010200000".to_string(),
            })
    }

    fn config(key: Credential) -> StatisticsConfig {
        StatisticsConfig {
            api_key: key,
            ..StatisticsConfig::default()
        }
    }

    const TWO_ROWS: &str = r#"{"StatisticSearch":{"list_total_count":2,"row":[
        {"STAT_CODE":"817Y002","ITEM_NAME1":"국고채(3년)","TIME":"20250304","DATA_VALUE":"2.650"},
        {"STAT_CODE":"817Y002","ITEM_NAME1":"국고채(3년)","TIME":"20250303","DATA_VALUE":"2.612"}
    ]}}"#;

    #[test]
    fn builds_path_with_date_window_and_uses_last_two_by_date() {
        let gateway = Arc::new(FakeGateway::new().route("/StatisticSearch/", TWO_ROWS));
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let source = StatisticsSource::new(gateway.clone(), &config(Credential::Present("KEY1".into()))).with_as_of(as_of);

        let obs = source.fetch(&spec()).unwrap();
        assert_eq!(obs.value, 2.650);
        assert_eq!(obs.previous_value, 2.612);

        let url = gateway.requests()[0].url.clone();
        assert_eq!(
            url,
            "https://ecos.bok.or.kr/api/StatisticSearch/KEY1/json/kr/1/100/817Y002/D/20250219/20250305/010200000"
        );
    }

    #[test]
    fn single_row_is_malformed() {
        let body = r#"{"StatisticSearch":{"list_total_count":1,"row":[{"TIME":"20250304","DATA_VALUE":"2.650"}]}}"#;
        let gateway = Arc::new(FakeGateway::new().route("/StatisticSearch/", body));
        let source = StatisticsSource::new(gateway, &config(Credential::Present("KEY1".into())));
        let err = source.fetch(&spec()).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn non_finite_rows_are_skipped() {
        let body = r#"{"StatisticSearch":{"list_total_count":4,"row":[
            {"TIME":"20250303","DATA_VALUE":"2.612"},
            {"TIME":"20250304","DATA_VALUE":"NaN"},
            {"TIME":"20250305","DATA_VALUE":"inf"},
            {"TIME":"20250306","DATA_VALUE":"2.650"}
        ]}}"#;
        let points = parse_ecos_body(body).unwrap();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.612, 2.650]);
    }

    #[test]
    fn result_envelope_is_malformed() {
        let body = r#"{"RESULT":{"CODE":"INFO-200","MESSAGE":"해당하는 데이터가 없습니다."}}"#;
        let err = parse_ecos_body(body).unwrap_err();
        assert!(err.to_string().contains("INFO-200"));
    }

    #[test]
    fn absent_or_placeholder_key_short_circuits() {
        for key in [Credential::Absent, Credential::Placeholder] {
            let gateway = Arc::new(FakeGateway::new().route("/StatisticSearch/", TWO_ROWS));
            let source = StatisticsSource::new(gateway.clone(), &config(key));
            let err = source.fetch(&spec()).unwrap_err();
            assert!(matches!(err, FetchError::NotConfigured { .. }));
            assert!(gateway.requests().is_empty());
        }
    }

    #[test]
    fn key_is_redacted_from_gateway_errors() {
        let gateway = Arc::new(FakeGateway::new().fail(
            "/StatisticSearch/",
            GatewayError::Timeout {
                url: "https://ecos.bok.or.kr/api/StatisticSearch/SECRET9/json".to_string(),
            },
        ));
        let source = StatisticsSource::new(gateway, &config(Credential::Present("SECRET9".into())));
        let err = source.fetch(&spec()).unwrap_err();
        assert!(matches!(err, FetchError::SourceUnavailable { .. }));
        assert!(!err.to_string().contains("SECRET9"));
    }
}
