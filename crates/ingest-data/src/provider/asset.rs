//! 자산 목록 소스 (`/asset/v1/top/list`).
//!
//! 자산 하나가 네 테이블에 나뉘어 저장됩니다.
//!
//! | 테이블 | 방식 | 충돌 키 |
//! |--------|------|---------|
//! | `market.cc_assets` | upsert | asset_id |
//! | `market.cc_asset_alternative_ids` | upsert | asset_id |
//! | `market.cc_asset_industries_map` | upsert | asset_id, industry_name |
//! | `market.cc_asset_market_data` | append | - |
//!
//! `transform`은 하위 테이블 원본을 JSON 컬럼으로 들고 있다가
//! `plan_batches`에서 테이블별 레코드로 분리합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_core::datetime::parse_datetime;
use ingest_core::transform::{
    clean_decimal, clean_int, clean_string, has_required_fields,
};
use ingest_core::{
    ColumnType, IngestionRequest, RawRecord, Record, RecordSource, SourceKind, TableBatch,
    TableSchema, Value, WriteMode,
};
use serde_json::Value as Json;

use super::client::DataApiClient;
use crate::error::DataError;

const TOP_LIST_PATH: &str = "/asset/v1/top/list";
const ASSETS_TABLE: &str = "market.cc_assets";
const ALT_IDS_TABLE: &str = "market.cc_asset_alternative_ids";
const INDUSTRIES_TABLE: &str = "market.cc_asset_industries_map";
const MARKET_DATA_TABLE: &str = "market.cc_asset_market_data";

/// 응답 그룹.
const GROUPS: &[&str] = &[
    "ID",
    "BASIC",
    "CLASSIFICATION",
    "DESCRIPTION_SUMMARY",
    "PRICE",
    "MKT_CAP",
    "VOLUME",
];

/// 대체 ID 출처 (API NAME 소문자 + `_id` 컬럼).
const ALT_ID_SOURCES: &[&str] = &["cmc", "cg", "isin", "valor", "dti", "chain"];

/// 시장 스냅샷 수치 컬럼 (컬럼명, API 필드).
const MARKET_FIELDS: &[(&str, &str)] = &[
    ("price_usd", "PRICE_USD"),
    ("mkt_cap_penalty", "MKT_CAP_PENALTY"),
    ("circulating_mkt_cap_usd", "CIRCULATING_MKT_CAP_USD"),
    ("total_mkt_cap_usd", "TOTAL_MKT_CAP_USD"),
    (
        "spot_moving_24_hour_quote_volume_top_tier_usd",
        "SPOT_MOVING_24_HOUR_QUOTE_VOLUME_TOP_TIER_USD",
    ),
    (
        "spot_moving_24_hour_quote_volume_usd",
        "SPOT_MOVING_24_HOUR_QUOTE_VOLUME_USD",
    ),
    (
        "spot_moving_7_day_quote_volume_top_tier_usd",
        "SPOT_MOVING_7_DAY_QUOTE_VOLUME_TOP_TIER_USD",
    ),
    (
        "spot_moving_7_day_quote_volume_usd",
        "SPOT_MOVING_7_DAY_QUOTE_VOLUME_USD",
    ),
    (
        "spot_moving_30_day_quote_volume_top_tier_usd",
        "SPOT_MOVING_30_DAY_QUOTE_VOLUME_TOP_TIER_USD",
    ),
    (
        "spot_moving_30_day_quote_volume_usd",
        "SPOT_MOVING_30_DAY_QUOTE_VOLUME_USD",
    ),
];

/// 자산 메타데이터 소스.
#[derive(Debug, Clone)]
pub struct AssetMetadataSource {
    client: DataApiClient,
    page_size: u32,
    max_pages: Option<u32>,
}

impl AssetMetadataSource {
    pub fn new(client: DataApiClient) -> Self {
        Self {
            client,
            page_size: 100,
            max_pages: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<(Vec<Json>, Option<u64>), DataError> {
        let params = [
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
            ("groups", GROUPS.join(",")),
        ];
        let body = self.client.get_json(TOP_LIST_PATH, &params).await?;

        let data = match body.get("Data") {
            Some(data) if data.is_object() => data,
            _ => {
                tracing::warn!(page, "자산 응답에 Data 없음");
                return Ok((Vec::new(), None));
            }
        };

        let list = match data.get("LIST") {
            Some(Json::Array(items)) => items.clone(),
            Some(Json::Null) | None => Vec::new(),
            Some(other) => {
                return Err(DataError::ParseError(format!(
                    "자산 LIST 형식 오류: {}",
                    other
                )))
            }
        };
        let total = data
            .get("STATS")
            .and_then(|s| s.get("TOTAL_ASSETS"))
            .and_then(Json::as_u64);

        Ok((list, total))
    }
}

/// 유닉스 초 또는 날짜 문자열을 UTC로 변환합니다.
fn epoch(raw: &Json, key: &str) -> Option<DateTime<Utc>> {
    match raw.get(key)? {
        Json::String(s) => clean_int(raw.get(key))
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| parse_datetime(s)),
        _ => clean_int(raw.get(key)).and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

fn asset_id_of(record: &Record) -> Option<i64> {
    match record.get("asset_id") {
        Some(Value::Int(id)) => Some(*id),
        _ => None,
    }
}

fn assets_schema() -> TableSchema {
    TableSchema::new()
        .column("asset_id", ColumnType::Int)
        .column("symbol", ColumnType::Text)
        .column("name", ColumnType::Text)
        .column("uri", ColumnType::Text)
        .column("asset_type", ColumnType::Text)
        .column("cc_internal_type", ColumnType::Text)
        .column("id_legacy", ColumnType::Int)
        .column("id_parent_asset", ColumnType::Int)
        .column("id_asset_issuer", ColumnType::Int)
        .column("asset_issuer_name", ColumnType::Text)
        .column("parent_asset_symbol", ColumnType::Text)
        .column("cc_created_on", ColumnType::Timestamp)
        .column("cc_updated_on", ColumnType::Timestamp)
        .column("public_notice", ColumnType::Text)
        .column("logo_url", ColumnType::Text)
        .column("launch_date", ColumnType::Timestamp)
        .column("description_summary", ColumnType::Text)
        .column("decimal_points", ColumnType::Int)
        .column("symbol_glyph", ColumnType::Text)
        .column("created_at", ColumnType::Timestamp)
        .column("updated_at", ColumnType::Timestamp)
}

fn alt_ids_schema() -> TableSchema {
    let schema = TableSchema::new().column("asset_id", ColumnType::Int);
    ALT_ID_SOURCES
        .iter()
        .fold(schema, |s, src| s.column(format!("{}_id", src), ColumnType::Text))
        .column("created_at", ColumnType::Timestamp)
        .column("updated_at", ColumnType::Timestamp)
}

fn industries_schema() -> TableSchema {
    TableSchema::new()
        .column("asset_id", ColumnType::Int)
        .column("industry_name", ColumnType::Text)
        .column("justification", ColumnType::Text)
        .column("created_at", ColumnType::Timestamp)
        .column("updated_at", ColumnType::Timestamp)
}

fn market_data_schema() -> TableSchema {
    let schema = TableSchema::new()
        .column("asset_id", ColumnType::Int)
        .column("snapshot_ts", ColumnType::Timestamp)
        .column("price_usd_source", ColumnType::Text);
    MARKET_FIELDS
        .iter()
        .fold(schema, |s, (col, _)| s.column(*col, ColumnType::Decimal))
        .column("created_at", ColumnType::Timestamp)
}

/// 하위 테이블 레코드 분리 결과.
#[derive(Default)]
struct AssetRows {
    assets: Vec<Record>,
    alt_ids: Vec<Record>,
    industries: Vec<Record>,
    market_data: Vec<Record>,
}

impl AssetRows {
    fn push(&mut self, mut asset: Record) {
        let alt_ids = asset.remove("alternative_ids");
        let industries = asset.remove("industries");
        let market = asset.remove("market_data");

        let Some(asset_id) = asset_id_of(&asset) else {
            return;
        };
        let now = Utc::now();

        if let Some(Value::Json(Json::Object(ids))) = alt_ids {
            if !ids.is_empty() {
                let mut row = Record::new()
                    .with("asset_id", asset_id)
                    .with("created_at", now)
                    .with("updated_at", now);
                for (column, id) in ids {
                    row.insert(column, clean_string(Some(&id)));
                }
                self.alt_ids.push(row);
            }
        }

        if let Some(Value::Json(Json::Array(items))) = industries {
            for item in items {
                let Some(industry) = clean_string(item.get("ASSET_INDUSTRY")) else {
                    continue;
                };
                self.industries.push(
                    Record::new()
                        .with("asset_id", asset_id)
                        .with("industry_name", industry)
                        .with("justification", clean_string(item.get("JUSTIFICATION")))
                        .with("created_at", now)
                        .with("updated_at", now),
                );
            }
        }

        if let Some(Value::Json(raw)) = market {
            let mut row = Record::new()
                .with("asset_id", asset_id)
                .with("snapshot_ts", epoch(&raw, "PRICE_USD_LAST_UPDATE_TS"))
                .with("price_usd_source", clean_string(raw.get("PRICE_USD_SOURCE")))
                .with("created_at", now);
            for (column, field) in MARKET_FIELDS {
                row.insert(*column, clean_decimal(raw.get(*field)));
            }
            self.market_data.push(row);
        }

        self.assets.push(asset);
    }
}

#[async_trait]
impl RecordSource for AssetMetadataSource {
    fn name(&self) -> &str {
        "asset_top_list"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Metadata
    }

    /// 페이지를 순회합니다.
    ///
    /// 빈 페이지, `max_pages` 도달, `page * page_size >= TOTAL_ASSETS` 중
    /// 하나라도 만족하면 멈춥니다. 요청 파라미터 `page_size`/`max_pages`가
    /// 소스 기본값보다 우선합니다.
    async fn fetch_raw(&self, request: &IngestionRequest) -> ingest_core::Result<Vec<RawRecord>> {
        let page_size = request
            .param::<u32>("page_size")
            .unwrap_or(self.page_size)
            .max(1);
        let max_pages = request.param::<u32>("max_pages").or(self.max_pages);

        tracing::info!(page_size, max_pages = ?max_pages, "자산 목록 조회");

        let mut assets = Vec::new();
        let mut total: Option<u64> = None;
        let mut page = 1u32;

        loop {
            let (list, page_total) = self.fetch_page(page, page_size).await?;
            if list.is_empty() {
                tracing::debug!(page, "빈 페이지, 조회 종료");
                break;
            }
            let received = list.len() as u64;
            assets.extend(list);

            let known_total = *total.get_or_insert_with(|| {
                let t = page_total.unwrap_or(received);
                tracing::info!(total = t, "전체 자산 수");
                t
            });

            if max_pages.is_some_and(|max| page >= max) {
                tracing::info!(page, "max_pages 도달");
                break;
            }
            if u64::from(page) * u64::from(page_size) >= known_total {
                break;
            }
            page += 1;
        }

        tracing::info!(count = assets.len(), pages = page, "자산 수신");
        Ok(assets)
    }

    fn transform(&self, raw: RawRecord) -> ingest_core::Result<Record> {
        let asset_id = clean_int(raw.get("ID"))
            .ok_or_else(|| DataError::InvalidData("자산 ID 누락".to_string()))?;
        let now = Utc::now();

        let mut alt_ids = serde_json::Map::new();
        if let Some(Json::Array(items)) = raw.get("ASSET_ALTERNATIVE_IDS") {
            for item in items {
                let (Some(name), Some(id)) = (
                    item.get("NAME").and_then(Json::as_str),
                    item.get("ID").filter(|v| !v.is_null()),
                ) else {
                    continue;
                };
                let column = format!("{}_id", name.to_ascii_lowercase());
                if ALT_ID_SOURCES.iter().any(|s| format!("{}_id", s) == column) {
                    alt_ids.insert(column, id.clone());
                }
            }
        }

        let mut market = serde_json::Map::new();
        for key in MARKET_FIELDS
            .iter()
            .map(|(_, field)| *field)
            .chain(["PRICE_USD_LAST_UPDATE_TS", "PRICE_USD_SOURCE"])
        {
            if let Some(v) = raw.get(key) {
                market.insert(key.to_string(), v.clone());
            }
        }

        Ok(Record::new()
            .with("asset_id", asset_id)
            .with("symbol", clean_string(raw.get("SYMBOL")))
            .with("name", clean_string(raw.get("NAME")))
            .with("uri", clean_string(raw.get("URI")))
            .with("asset_type", clean_string(raw.get("ASSET_TYPE")))
            .with("cc_internal_type", clean_string(raw.get("TYPE")))
            .with("id_legacy", clean_int(raw.get("ID_LEGACY")))
            .with("id_parent_asset", clean_int(raw.get("ID_PARENT_ASSET")))
            .with("id_asset_issuer", clean_int(raw.get("ID_ASSET_ISSUER")))
            .with("asset_issuer_name", clean_string(raw.get("ASSET_ISSUER_NAME")))
            .with("parent_asset_symbol", clean_string(raw.get("PARENT_ASSET_SYMBOL")))
            .with("cc_created_on", epoch(&raw, "CREATED_ON"))
            .with("cc_updated_on", epoch(&raw, "UPDATED_ON"))
            .with("public_notice", clean_string(raw.get("PUBLIC_NOTICE")))
            .with("logo_url", clean_string(raw.get("LOGO_URL")))
            .with("launch_date", epoch(&raw, "LAUNCH_DATE"))
            .with(
                "description_summary",
                clean_string(raw.get("ASSET_DESCRIPTION_SUMMARY")),
            )
            .with("decimal_points", clean_int(raw.get("ASSET_DECIMAL_POINTS")))
            .with("symbol_glyph", clean_string(raw.get("ASSET_SYMBOL_GLYPH")))
            .with("created_at", now)
            .with("updated_at", now)
            .with("alternative_ids", Json::Object(alt_ids))
            .with(
                "industries",
                raw.get("ASSET_INDUSTRIES").cloned().unwrap_or(Json::Null),
            )
            .with("market_data", Json::Object(market)))
    }

    fn table(&self) -> String {
        ASSETS_TABLE.to_string()
    }

    fn schema(&self) -> TableSchema {
        assets_schema()
    }

    fn conflict_columns(&self) -> Vec<String> {
        vec!["asset_id".to_string()]
    }

    fn validate_record(&self, record: &Record) -> bool {
        has_required_fields(record, &["asset_id"])
    }

    fn plan_batches(&self, records: Vec<Record>) -> Vec<TableBatch> {
        let mut rows = AssetRows::default();
        for record in records {
            rows.push(record);
        }

        vec![
            TableBatch {
                table: ASSETS_TABLE.to_string(),
                schema: assets_schema(),
                conflict_columns: self.conflict_columns(),
                mode: WriteMode::Upsert,
                records: rows.assets,
            },
            TableBatch {
                table: ALT_IDS_TABLE.to_string(),
                schema: alt_ids_schema(),
                conflict_columns: vec!["asset_id".to_string()],
                mode: WriteMode::Upsert,
                records: rows.alt_ids,
            },
            TableBatch {
                table: INDUSTRIES_TABLE.to_string(),
                schema: industries_schema(),
                conflict_columns: vec!["asset_id".to_string(), "industry_name".to_string()],
                mode: WriteMode::Upsert,
                records: rows.industries,
            },
            TableBatch {
                table: MARKET_DATA_TABLE.to_string(),
                schema: market_data_schema(),
                conflict_columns: Vec::new(),
                mode: WriteMode::Append,
                records: rows.market_data,
            },
        ]
    }

    fn supports_watermark(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn offline_source() -> AssetMetadataSource {
        let client = DataApiClient::new("http://localhost", Duration::from_secs(1)).unwrap();
        AssetMetadataSource::new(client)
    }

    fn btc() -> Json {
        json!({
            "ID": 1,
            "SYMBOL": "BTC",
            "NAME": "Bitcoin",
            "TYPE": "162",
            "CREATED_ON": 1_704_067_200,
            "LAUNCH_DATE": "2009-01-03",
            "ASSET_ALTERNATIVE_IDS": [
                { "NAME": "CMC", "ID": 1 },
                { "NAME": "CG", "ID": "bitcoin" },
                { "NAME": "UNKNOWN", "ID": "x" }
            ],
            "ASSET_INDUSTRIES": [
                { "ASSET_INDUSTRY": "PAYMENT", "JUSTIFICATION": "p2p cash" },
                { "ASSET_INDUSTRY": null }
            ],
            "PRICE_USD": 42000.5,
            "PRICE_USD_SOURCE": "cadli",
            "PRICE_USD_LAST_UPDATE_TS": 1_704_067_260,
            "TOTAL_MKT_CAP_USD": "820,000,000,000"
        })
    }

    #[test]
    fn test_transform_asset() {
        let source = offline_source();
        let record = source.transform(btc()).unwrap();

        assert_eq!(record.get("asset_id"), Some(&Value::Int(1)));
        assert_eq!(record.get("cc_internal_type"), Some(&Value::Text("162".into())));
        assert_eq!(
            record.get("cc_created_on"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(
            record.get("launch_date"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2009, 1, 3, 0, 0, 0).unwrap()))
        );
        assert!(source.validate_record(&record));
        assert!(source.transform(json!({ "SYMBOL": "X" })).is_err());
    }

    #[test]
    fn test_plan_batches_splits_tables() {
        let source = offline_source();
        let records = vec![
            source.transform(btc()).unwrap(),
            source.transform(json!({ "ID": 2, "SYMBOL": "ETH" })).unwrap(),
        ];

        let batches = source.plan_batches(records);
        let tables: Vec<&str> = batches.iter().map(|b| b.table.as_str()).collect();
        assert_eq!(
            tables,
            vec![ASSETS_TABLE, ALT_IDS_TABLE, INDUSTRIES_TABLE, MARKET_DATA_TABLE]
        );

        let assets = &batches[0];
        assert_eq!(assets.len(), 2);
        assert!(assets.records.iter().all(|r| !r.contains("industries")));

        let alt = &batches[1];
        assert_eq!(alt.len(), 1);
        assert_eq!(alt.records[0].get("cmc_id"), Some(&Value::Text("1".into())));
        assert_eq!(alt.records[0].get("cg_id"), Some(&Value::Text("bitcoin".into())));
        assert!(!alt.records[0].contains("unknown_id"));

        let industries = &batches[2];
        assert_eq!(industries.len(), 1);
        assert_eq!(
            industries.records[0].get("industry_name"),
            Some(&Value::Text("PAYMENT".into()))
        );
        assert_eq!(industries.conflict_columns, vec!["asset_id", "industry_name"]);

        let market = &batches[3];
        assert_eq!(market.mode, WriteMode::Append);
        assert_eq!(market.len(), 2);
        assert_eq!(
            market.records[0].get("total_mkt_cap_usd"),
            Some(&Value::Decimal(dec!(820000000000)))
        );
        assert_eq!(
            market.records[0].get("snapshot_ts"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()))
        );
        assert_eq!(market.records[1].get("price_usd"), Some(&Value::Null));
    }

    fn page_body(ids: &[i64], total: u64) -> String {
        let list: Vec<Json> = ids.iter().map(|id| json!({ "ID": id })).collect();
        json!({ "Data": { "STATS": { "TOTAL_ASSETS": total }, "LIST": list } }).to_string()
    }

    #[tokio::test]
    async fn test_fetch_stops_at_total() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", TOP_LIST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("page_size".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(page_body(&[1, 2], 3))
            .create_async()
            .await;
        let second = server
            .mock("GET", TOP_LIST_PATH)
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(page_body(&[3], 3))
            .create_async()
            .await;

        let client = DataApiClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let source = AssetMetadataSource::new(client).with_page_size(2);

        let raws = source.fetch_raw(&IngestionRequest::default()).await.unwrap();
        assert_eq!(raws.len(), 3);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_respects_max_pages_param() {
        let mut server = mockito::Server::new_async().await;
        let only = server
            .mock("GET", TOP_LIST_PATH)
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(page_body(&[1, 2, 3], 100))
            .expect(1)
            .create_async()
            .await;

        let client = DataApiClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let source = AssetMetadataSource::new(client);
        let request = IngestionRequest::default()
            .with_param("page_size", 3)
            .with_param("max_pages", 1);

        let raws = source.fetch_raw(&request).await.unwrap();
        assert_eq!(raws.len(), 3);
        only.assert_async().await;
    }
}
