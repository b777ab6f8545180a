//! 현물 OHLCV 캔들 소스.
//!
//! `GET /spot/v1/historical/{days|hours|minutes}` 엔드포인트는 `to_ts` 이전의
//! 최근 `limit`개 캔들을 반환합니다. 조회 구간이 한 번의 호출 한도를 넘으면
//! `to_ts`를 과거로 옮기며 여러 페이지를 가져옵니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_core::transform::{clean_decimal, clean_int, clean_string, has_required_fields};
use ingest_core::{
    ColumnType, IngestionRequest, Interval, RawRecord, Record, RecordSource, SourceKind,
    TableSchema, DATETIME_FIELD,
};

use super::client::DataApiClient;
use crate::error::DataError;

/// 현물 OHLCV 소스.
#[derive(Debug, Clone)]
pub struct SpotOhlcvSource {
    client: DataApiClient,
    interval: Interval,
    max_api_limit: u32,
}

impl SpotOhlcvSource {
    pub fn new(client: DataApiClient, interval: Interval, max_api_limit: u32) -> Self {
        Self {
            client,
            interval,
            max_api_limit: max_api_limit.max(1),
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// 조회 구간을 덮는 데 필요한 캔들 수.
    fn expected_count(
        &self,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
        limit: Option<u32>,
    ) -> u64 {
        if let Some(limit) = limit {
            return u64::from(limit.max(1));
        }
        match start {
            Some(start) => {
                let span = (end - start).num_seconds().max(0) as u64;
                let step = self.interval.duration().num_seconds().max(1) as u64;
                span.div_ceil(step) + 1
            }
            None => u64::from(self.max_api_limit),
        }
    }

    async fn fetch_page(
        &self,
        market: &str,
        instrument: &str,
        limit: u32,
        to_ts: i64,
    ) -> Result<Vec<RawRecord>, DataError> {
        let path = format!("/spot/v1/historical/{}", self.interval.api_path());
        let params = [
            ("market", market.to_string()),
            ("instrument", instrument.to_string()),
            ("limit", limit.to_string()),
            ("to_ts", to_ts.to_string()),
        ];

        let body = self.client.get_json(&path, &params).await?;
        match body.get("Data") {
            Some(serde_json::Value::Array(items)) => Ok(items.clone()),
            Some(serde_json::Value::Null) | None => {
                tracing::warn!(market, instrument, "응답에 Data 없음");
                Ok(Vec::new())
            }
            Some(other) => Err(DataError::ParseError(format!(
                "Data 형식 오류: 배열이 아님 ({})",
                other
            ))),
        }
    }
}

#[async_trait]
impl RecordSource for SpotOhlcvSource {
    fn name(&self) -> &str {
        "spot_ohlcv"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::TimeSeries
    }

    async fn fetch_raw(&self, request: &IngestionRequest) -> ingest_core::Result<Vec<RawRecord>> {
        let (market, instrument) = match (
            request.series.get("market"),
            request.series.get("instrument"),
        ) {
            (Some(m), Some(i)) => (m, i),
            _ => {
                return Err(DataError::FetchError(format!(
                    "market/instrument 필요: {}",
                    request.series
                ))
                .into())
            }
        };

        let end = request.end.unwrap_or_else(Utc::now);
        if request.start.is_some_and(|start| start > end) {
            tracing::debug!(start = ?request.start, end = %end, "조회 구간 없음");
            return Ok(Vec::new());
        }

        let step = self.interval.duration().num_seconds();
        let mut remaining = self.expected_count(request.start, end, request.limit);
        let mut to_ts = end.timestamp();
        let mut pages: Vec<Vec<RawRecord>> = Vec::new();

        tracing::info!(
            market,
            instrument,
            interval = %self.interval,
            start = ?request.start,
            expected = remaining,
            "현물 OHLCV 조회"
        );

        while remaining > 0 {
            let limit = remaining.min(u64::from(self.max_api_limit)) as u32;
            let page = self.fetch_page(market, instrument, limit, to_ts).await?;
            if page.is_empty() {
                break;
            }

            let received = page.len();
            let earliest = page.iter().filter_map(|r| r["TIMESTAMP"].as_i64()).min();
            pages.push(page);
            remaining = remaining.saturating_sub(received as u64);

            let more_before_start = match (request.start, earliest) {
                (Some(start), Some(earliest)) => earliest > start.timestamp(),
                _ => false,
            };
            if received < limit as usize || !more_before_start {
                break;
            }
            if let Some(earliest) = earliest {
                to_ts = earliest - step;
            }
        }

        // 과거 페이지가 먼저 오도록 뒤집어서 시간 순서를 맞춥니다.
        let records: Vec<RawRecord> = pages.into_iter().rev().flatten().collect();
        tracing::debug!(market, instrument, count = records.len(), "OHLCV 수신");
        Ok(records)
    }

    fn transform(&self, raw: RawRecord) -> ingest_core::Result<Record> {
        let ts = clean_int(raw.get("TIMESTAMP"))
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| DataError::InvalidData("TIMESTAMP 누락".to_string()))?;
        let now = Utc::now();

        Ok(Record::new()
            .with(DATETIME_FIELD, ts)
            .with("market", clean_string(raw.get("MARKET")))
            .with("instrument", clean_string(raw.get("INSTRUMENT")))
            .with("interval_name", self.interval.as_str())
            .with("open", clean_decimal(raw.get("OPEN")))
            .with("high", clean_decimal(raw.get("HIGH")))
            .with("low", clean_decimal(raw.get("LOW")))
            .with("close", clean_decimal(raw.get("CLOSE")))
            .with("volume_from", clean_decimal(raw.get("VOLUMEFROM")))
            .with("volume_to", clean_decimal(raw.get("VOLUMETO")))
            .with("total_trades", clean_int(raw.get("TOTAL_TRADES")))
            .with("created_at", now)
            .with("updated_at", now))
    }

    fn table(&self) -> String {
        format!("market.ohlcv_spot_{}_raw", self.interval.as_str())
    }

    fn schema(&self) -> TableSchema {
        TableSchema::new()
            .column(DATETIME_FIELD, ColumnType::Timestamp)
            .column("market", ColumnType::Text)
            .column("instrument", ColumnType::Text)
            .column("interval_name", ColumnType::Text)
            .column("open", ColumnType::Decimal)
            .column("high", ColumnType::Decimal)
            .column("low", ColumnType::Decimal)
            .column("close", ColumnType::Decimal)
            .column("volume_from", ColumnType::Decimal)
            .column("volume_to", ColumnType::Decimal)
            .column("total_trades", ColumnType::Int)
            .column("created_at", ColumnType::Timestamp)
            .column("updated_at", ColumnType::Timestamp)
    }

    fn validate_record(&self, record: &Record) -> bool {
        has_required_fields(record, &["market", "instrument", "close"])
    }
}
