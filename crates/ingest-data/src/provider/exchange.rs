//! 거래소 일반 정보 소스 (min API `/data/exchanges/general`).

use async_trait::async_trait;
use chrono::Utc;
use ingest_core::transform::{clean_int, clean_numeric, clean_string, has_required_fields};
use ingest_core::{
    ColumnType, IngestionRequest, RawRecord, Record, RecordSource, SourceKind, TableSchema,
};
use serde_json::Value as Json;

use super::client::DataApiClient;
use crate::error::DataError;

const EXCHANGES_PATH: &str = "/data/exchanges/general";

/// 거래소 메타데이터 소스.
///
/// 응답의 `Data`는 거래소 ID를 키로 하는 객체이며 값만 사용합니다.
#[derive(Debug, Clone)]
pub struct ExchangeMetadataSource {
    client: DataApiClient,
    quote_symbol: String,
}

impl ExchangeMetadataSource {
    pub fn new(client: DataApiClient) -> Self {
        Self {
            client,
            quote_symbol: "USD".to_string(),
        }
    }

    /// 거래량 환산 통화 (기본 USD).
    pub fn with_quote_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.quote_symbol = symbol.into();
        self
    }
}

fn flag(raw: &Json, key: &str, default: bool) -> bool {
    match raw.get(key) {
        Some(Json::Bool(b)) => *b,
        Some(Json::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        Some(Json::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

/// 등급 세부 점수는 JSON 문자열로 저장합니다.
fn grade_breakdown(raw: &Json) -> Option<String> {
    match raw.get("GradePointsBreakdown") {
        None | Some(Json::Null) => None,
        Some(Json::Object(map)) if map.is_empty() => None,
        Some(other) => Some(other.to_string()),
    }
}

#[async_trait]
impl RecordSource for ExchangeMetadataSource {
    fn name(&self) -> &str {
        "exchanges_general"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Metadata
    }

    async fn fetch_raw(&self, _request: &IngestionRequest) -> ingest_core::Result<Vec<RawRecord>> {
        tracing::info!(tsym = %self.quote_symbol, "거래소 일반 정보 조회");

        let body = self
            .client
            .get_json(EXCHANGES_PATH, &[("tsym", self.quote_symbol.clone())])
            .await?;

        let exchanges = match body.get("Data") {
            Some(Json::Object(map)) => map.values().cloned().collect::<Vec<_>>(),
            Some(Json::Null) | None => {
                tracing::warn!("거래소 응답에 Data 없음");
                Vec::new()
            }
            Some(other) => {
                return Err(DataError::ParseError(format!(
                    "거래소 Data 형식 오류: {}",
                    other
                ))
                .into())
            }
        };

        tracing::info!(count = exchanges.len(), "거래소 수신");
        Ok(exchanges)
    }

    fn transform(&self, raw: RawRecord) -> ingest_core::Result<Record> {
        let name = clean_string(raw.get("Name"))
            .ok_or_else(|| DataError::InvalidData("거래소 Name 누락".to_string()))?;
        let now = Utc::now();

        Ok(Record::new()
            .with("exchange_name", name)
            .with("display_name", clean_string(raw.get("DisplayName")))
            .with("logo_url", clean_string(raw.get("LogoUrl")))
            .with("affiliate_url", clean_string(raw.get("AffiliateURL")))
            .with("url", clean_string(raw.get("Url")))
            .with("country", clean_string(raw.get("Country")))
            .with("order_book", flag(&raw, "OrderBook", false))
            .with("trades", flag(&raw, "Trades", false))
            .with("is_active", flag(&raw, "IsActive", true))
            .with("total_volume_24h", clean_numeric(raw.get("TotalVolume24H")))
            .with("total_volume_24h_to", clean_numeric(raw.get("TotalVolume24HTo")))
            .with(
                "total_top_tier_volume_24h",
                clean_numeric(raw.get("TotalTopTierVolume24H")),
            )
            .with(
                "total_top_tier_volume_24h_to",
                clean_numeric(raw.get("TotalTopTierVolume24HTo")),
            )
            .with("internal_name", clean_string(raw.get("InternalName")))
            .with("centralization_type", clean_string(raw.get("CentralizationType")))
            .with("grade", clean_string(raw.get("Grade")))
            .with("grade_points", clean_int(raw.get("GradePoints")))
            .with("grade_points_breakdown", grade_breakdown(&raw))
            .with("sponsored", flag(&raw, "Sponsored", false))
            .with("recommended", flag(&raw, "Recommended", false))
            .with("created_at", now)
            .with("updated_at", now))
    }

    fn table(&self) -> String {
        "market.cc_exchanges_general".to_string()
    }

    fn schema(&self) -> TableSchema {
        TableSchema::new()
            .column("exchange_name", ColumnType::Text)
            .column("display_name", ColumnType::Text)
            .column("logo_url", ColumnType::Text)
            .column("affiliate_url", ColumnType::Text)
            .column("url", ColumnType::Text)
            .column("country", ColumnType::Text)
            .column("order_book", ColumnType::Bool)
            .column("trades", ColumnType::Bool)
            .column("is_active", ColumnType::Bool)
            .column("total_volume_24h", ColumnType::Float)
            .column("total_volume_24h_to", ColumnType::Float)
            .column("total_top_tier_volume_24h", ColumnType::Float)
            .column("total_top_tier_volume_24h_to", ColumnType::Float)
            .column("internal_name", ColumnType::Text)
            .column("centralization_type", ColumnType::Text)
            .column("grade", ColumnType::Text)
            .column("grade_points", ColumnType::Int)
            .column("grade_points_breakdown", ColumnType::Text)
            .column("sponsored", ColumnType::Bool)
            .column("recommended", ColumnType::Bool)
            .column("created_at", ColumnType::Timestamp)
            .column("updated_at", ColumnType::Timestamp)
    }

    fn conflict_columns(&self) -> Vec<String> {
        vec!["exchange_name".to_string()]
    }

    fn validate_record(&self, record: &Record) -> bool {
        has_required_fields(record, &["exchange_name"])
    }

    fn supports_watermark(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::Value;
    use serde_json::json;
    use std::time::Duration;

    fn offline_source() -> ExchangeMetadataSource {
        let client = DataApiClient::new("http://localhost", Duration::from_secs(1)).unwrap();
        ExchangeMetadataSource::new(client)
    }

    #[test]
    fn test_transform_exchange() {
        let source = offline_source();
        let raw = json!({
            "Name": "Coinbase",
            "InternalName": "Coinbase",
            "Country": "USA",
            "OrderBook": true,
            "IsActive": "false",
            "TotalVolume24H": "1,200.5",
            "GradePoints": "87",
            "Grade": "AA",
            "GradePointsBreakdown": { "Legal": 12.5 }
        });

        let record = source.transform(raw).unwrap();
        assert_eq!(record.get("exchange_name"), Some(&Value::Text("Coinbase".into())));
        assert_eq!(record.get("order_book"), Some(&Value::Bool(true)));
        assert_eq!(record.get("trades"), Some(&Value::Bool(false)));
        assert_eq!(record.get("is_active"), Some(&Value::Bool(false)));
        assert_eq!(record.get("total_volume_24h"), Some(&Value::Float(1200.5)));
        assert_eq!(record.get("grade_points"), Some(&Value::Int(87)));
        assert_eq!(
            record.get("grade_points_breakdown"),
            Some(&Value::Text(r#"{"Legal":12.5}"#.into()))
        );
        assert_eq!(record.get("affiliate_url"), Some(&Value::Null));
        assert!(source.validate_record(&record));
    }

    #[test]
    fn test_transform_requires_name() {
        let source = offline_source();
        assert!(source.transform(json!({ "Name": "" })).is_err());
        assert!(source.transform(json!({ "Country": "KR" })).is_err());
        assert!(!source.supports_watermark());
        assert_eq!(source.conflict_columns(), vec!["exchange_name"]);
    }

    #[tokio::test]
    async fn test_fetch_flattens_data_map() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", EXCHANGES_PATH)
            .match_query(mockito::Matcher::UrlEncoded("tsym".into(), "USD".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "Response": "Success",
                    "Data": {
                        "1": { "Name": "Kraken" },
                        "2": { "Name": "Bitstamp" }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = DataApiClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let source = ExchangeMetadataSource::new(client);

        let raws = source.fetch_raw(&IngestionRequest::default()).await.unwrap();
        let mut names: Vec<&str> = raws.iter().filter_map(|r| r["Name"].as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Bitstamp", "Kraken"]);
        mock.assert_async().await;
    }
}
