//! 인메모리 소스/저장소로 파이프라인 전체 동작을 검증합니다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ingest_core::datetime::parse_datetime;
use ingest_core::{
    BackfillWindow, ChangeDetector, ColumnType, IngestError, IngestionRequest, IngestionSettings,
    Ingestor, Interval, MemoryStore, MetadataIngestor, RawRecord, Record, RecordSource,
    RecordStore, Result, RunStage, RunStatus, SourceKind, TableBatch, TableSchema,
    TimeSeriesIngestor, Value, WriteMode, DATETIME_FIELD,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

const CANDLE_TABLE: &str = "market.ohlcv_spot_1h_raw";

fn utc(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
}

fn raw_candle(hour: u32, close: f64) -> RawRecord {
    json!({ "ts": utc(hour).timestamp(), "close": close })
}

/// 시리즈별 고정 응답을 돌려주는 캔들 소스.
#[derive(Default)]
struct CandleSource {
    raws: Vec<RawRecord>,
    fail_instrument: Option<String>,
    panic_instrument: Option<String>,
    seen_starts: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl CandleSource {
    fn with_raws(raws: Vec<RawRecord>) -> Self {
        Self {
            raws,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RecordSource for CandleSource {
    fn name(&self) -> &str {
        "candles"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::TimeSeries
    }

    async fn fetch_raw(&self, request: &IngestionRequest) -> Result<Vec<RawRecord>> {
        self.seen_starts.lock().unwrap().push(request.start);
        let instrument = request.series.get("instrument").unwrap_or_default();

        if self.fail_instrument.as_deref() == Some(instrument) {
            return Err(IngestError::Fetch("upstream 503".into()));
        }
        if self.panic_instrument.as_deref() == Some(instrument) {
            panic!("connector bug");
        }

        let market = request.series.get("market").unwrap_or_default();
        Ok(self
            .raws
            .iter()
            .cloned()
            .map(|mut raw| {
                raw["market"] = json!(market);
                raw["instrument"] = json!(instrument);
                raw
            })
            .collect())
    }

    fn transform(&self, raw: RawRecord) -> Result<Record> {
        let ts = raw["ts"]
            .as_i64()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .or_else(|| raw["ts"].as_str().and_then(parse_datetime))
            .ok_or_else(|| IngestError::Transform(format!("bad ts: {}", raw["ts"])))?;

        Ok(Record::new()
            .with(DATETIME_FIELD, ts)
            .with("market", raw["market"].as_str().unwrap_or_default())
            .with("instrument", raw["instrument"].as_str().unwrap_or_default())
            .with("close", raw["close"].as_f64()))
    }

    fn table(&self) -> String {
        CANDLE_TABLE.to_string()
    }

    fn schema(&self) -> TableSchema {
        TableSchema::new()
            .column(DATETIME_FIELD, ColumnType::Timestamp)
            .column("market", ColumnType::Text)
            .column("instrument", ColumnType::Text)
            .column("close", ColumnType::Float)
    }
}

/// 설정에 따라 실패하는 저장소.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_watermark: bool,
    fail_tables: Vec<String>,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn read_watermark(
        &self,
        table: &str,
        filters: &[(String, Value)],
    ) -> Result<Option<DateTime<Utc>>> {
        if self.fail_watermark {
            return Err(IngestError::Watermark("connection reset".into()));
        }
        self.inner.read_watermark(table, filters).await
    }

    async fn insert_batch(&self, batch: &TableBatch) -> Result<u64> {
        if self.fail_tables.iter().any(|t| t == &batch.table) {
            return Err(IngestError::Insert(format!("{} unavailable", batch.table)));
        }
        self.inner.insert_batch(batch).await
    }
}

fn series_ingestor(
    source: Arc<CandleSource>,
    store: Arc<dyn RecordStore>,
    settings: IngestionSettings,
) -> TimeSeriesIngestor {
    TimeSeriesIngestor::new(source, store, settings, Interval::Hour).unwrap()
}

#[tokio::test]
async fn test_unparsable_timestamp_is_skipped() {
    let source = Arc::new(CandleSource::with_raws(vec![
        raw_candle(1, 10.0),
        json!({ "ts": "garbage", "close": 11.0 }),
        raw_candle(3, 12.0),
    ]));
    let store = Arc::new(MemoryStore::new());
    let ingestor = series_ingestor(source, store.clone(), IngestionSettings::default());

    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.records_processed, 2);
    assert_eq!(result.records_inserted, 2);
    assert_eq!(result.stage, RunStage::Done);
    assert_eq!(store.row_count(CANDLE_TABLE).await, 2);
}

#[tokio::test]
async fn test_insert_failure_is_partial() {
    let raws = (1..=5).map(|h| raw_candle(h, h as f64)).collect();
    let source = Arc::new(CandleSource::with_raws(raws));
    let store = Arc::new(FlakyStore {
        fail_tables: vec![CANDLE_TABLE.to_string()],
        ..Default::default()
    });
    let ingestor = series_ingestor(source, store, IngestionSettings::default());

    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.records_processed, 5);
    assert_eq!(result.records_inserted, 0);
    assert!(result.error.is_none());
    assert!(result.counts_consistent());
}

#[tokio::test]
async fn test_rerun_inserts_nothing() {
    let raws = (1..=4).map(|h| raw_candle(h, 1.0)).collect();
    let source = Arc::new(CandleSource::with_raws(raws));
    let store = Arc::new(MemoryStore::new());
    let ingestor = series_ingestor(source, store.clone(), IngestionSettings::default());
    let request = IngestionRequest::for_pair("kraken", "ETH-USD");

    let first = ingestor.run_with_backfill(request.clone()).await;
    assert_eq!(first.records_inserted, 4);

    let second = ingestor.run_with_backfill(request).await;
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.records_processed, 4);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(store.row_count(CANDLE_TABLE).await, 4);
}

#[tokio::test]
async fn test_fetch_failure_and_empty_fetch() {
    let failing = Arc::new(CandleSource {
        fail_instrument: Some("BTC-USD".into()),
        ..CandleSource::with_raws(vec![raw_candle(1, 1.0)])
    });
    let ingestor = series_ingestor(failing, Arc::new(MemoryStore::new()), IngestionSettings::default());
    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;
    assert_eq!(result.status, RunStatus::Failure);
    assert_eq!(result.stage, RunStage::Failed);
    assert_eq!(result.records_processed, 0);
    assert!(result.error.unwrap().contains("upstream 503"));

    let empty = Arc::new(CandleSource::default());
    let ingestor = series_ingestor(empty, Arc::new(MemoryStore::new()), IngestionSettings::default());
    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.records_processed, 0);
}

#[tokio::test]
async fn test_all_transforms_failing_is_empty_success() {
    let source = Arc::new(CandleSource::with_raws(vec![
        json!({ "ts": "x" }),
        json!({ "ts": null }),
    ]));
    let store = Arc::new(MemoryStore::new());
    let ingestor = series_ingestor(source, store.clone(), IngestionSettings::default());

    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.stage, RunStage::Done);
    assert_eq!(result.records_processed, 0);
    assert_eq!(result.records_inserted, 0);
    assert!(result.error.is_none());
    assert!(store.tables().await.is_empty());
}

#[tokio::test]
async fn test_watermark_read_failure_is_fail_open() {
    let source = Arc::new(CandleSource::with_raws(vec![raw_candle(1, 1.0)]));
    let store = Arc::new(FlakyStore {
        fail_watermark: true,
        ..Default::default()
    });
    let ingestor = series_ingestor(source, store, IngestionSettings::default());

    let result = ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.records_inserted, 1);
}

#[tokio::test]
async fn test_fetch_start_uses_watermark_and_explicit_start_wins() {
    let source = Arc::new(CandleSource::default());
    let store = Arc::new(MemoryStore::new());
    store
        .seed(
            CANDLE_TABLE,
            vec![Record::new()
                .with(DATETIME_FIELD, utc(12))
                .with("market", "coinbase")
                .with("instrument", "BTC-USD")],
        )
        .await;
    let ingestor = series_ingestor(source.clone(), store, IngestionSettings::default());

    ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;
    ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD").with_start(utc(2)))
        .await;

    let starts = source.seen_starts.lock().unwrap().clone();
    assert_eq!(starts, vec![Some(utc(13)), Some(utc(2))]);
}

#[tokio::test]
async fn test_no_backfill_starts_now() {
    let source = Arc::new(CandleSource::default());
    let settings = IngestionSettings {
        backfill_enabled: false,
        ..Default::default()
    };
    let ingestor = series_ingestor(source.clone(), Arc::new(MemoryStore::new()), settings);

    ingestor
        .run_with_backfill(IngestionRequest::for_pair("coinbase", "BTC-USD"))
        .await;

    let start = source.seen_starts.lock().unwrap()[0].unwrap();
    assert!((Utc::now() - start).num_milliseconds().abs() < 1000);
}

#[tokio::test]
async fn test_fan_out_with_one_failing_series() {
    let source = Arc::new(CandleSource {
        fail_instrument: Some("ETH-USD".into()),
        ..CandleSource::with_raws(vec![raw_candle(1, 1.0), raw_candle(2, 2.0)])
    });
    let ingestor = series_ingestor(source, Arc::new(MemoryStore::new()), IngestionSettings::default());

    let summary = ingestor
        .run_for_many(vec![
            IngestionRequest::for_pair("coinbase", "BTC-USD"),
            IngestionRequest::for_pair("coinbase", "ETH-USD"),
            IngestionRequest::for_pair("coinbase", "SOL-USD"),
        ])
        .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, RunStatus::PartialFailure);
    assert_eq!(summary.records_inserted, 4);
    let order: Vec<_> = summary.outcomes.iter().map(|o| o.series.as_str()).collect();
    assert_eq!(order, vec!["coinbase:BTC-USD", "coinbase:ETH-USD", "coinbase:SOL-USD"]);
    assert_eq!(summary.failed_series(), vec!["coinbase:ETH-USD"]);
}

#[tokio::test]
async fn test_fan_out_captures_panic() {
    let source = Arc::new(CandleSource {
        panic_instrument: Some("DOGE-USD".into()),
        ..CandleSource::with_raws(vec![raw_candle(1, 1.0)])
    });
    let ingestor = series_ingestor(source, Arc::new(MemoryStore::new()), IngestionSettings::default());

    let summary = ingestor
        .run_for_many(vec![
            IngestionRequest::for_pair("coinbase", "DOGE-USD"),
            IngestionRequest::for_pair("coinbase", "BTC-USD"),
        ])
        .await;

    assert_eq!(summary.failed, 1);
    let panicked = &summary.outcomes[0].result;
    assert_eq!(panicked.status, RunStatus::Failure);
    assert!(panicked.error.as_deref().unwrap().contains("connector bug"));
}

/// 하나의 엔터티를 두 테이블로 나누는 메타데이터 소스.
struct SplitSource;

#[async_trait]
impl RecordSource for SplitSource {
    fn name(&self) -> &str {
        "split"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Metadata
    }

    async fn fetch_raw(&self, _request: &IngestionRequest) -> Result<Vec<RawRecord>> {
        Ok(vec![
            json!({ "id": 1, "name": "a", "price": 1.5 }),
            json!({ "id": 2, "name": "b", "price": 2.5 }),
        ])
    }

    fn transform(&self, raw: RawRecord) -> Result<Record> {
        Ok(Record::new()
            .with("id", raw["id"].as_i64())
            .with("name", raw["name"].as_str().unwrap_or_default())
            .with("price", raw["price"].as_f64()))
    }

    fn table(&self) -> String {
        "meta.entities".to_string()
    }

    fn schema(&self) -> TableSchema {
        TableSchema::new()
            .column("id", ColumnType::Int)
            .column("name", ColumnType::Text)
    }

    fn conflict_columns(&self) -> Vec<String> {
        vec!["id".to_string()]
    }

    fn plan_batches(&self, records: Vec<Record>) -> Vec<TableBatch> {
        let prices = records
            .iter()
            .map(|r| {
                Record::new()
                    .with("id", r.get("id").cloned().unwrap_or(Value::Null))
                    .with("price", r.get("price").cloned().unwrap_or(Value::Null))
            })
            .collect();
        let entities = records
            .into_iter()
            .map(|mut r| {
                r.remove("price");
                r
            })
            .collect();

        vec![
            TableBatch {
                table: self.table(),
                schema: self.schema(),
                conflict_columns: self.conflict_columns(),
                mode: WriteMode::Upsert,
                records: entities,
            },
            TableBatch {
                table: "meta.prices".to_string(),
                schema: TableSchema::new()
                    .column("id", ColumnType::Int)
                    .column("price", ColumnType::Float),
                conflict_columns: vec![],
                mode: WriteMode::Append,
                records: prices,
            },
        ]
    }
}

#[tokio::test]
async fn test_multi_table_stops_at_first_failure() {
    let store = Arc::new(FlakyStore {
        fail_tables: vec!["meta.prices".to_string()],
        ..Default::default()
    });
    let ingestor =
        MetadataIngestor::new(Arc::new(SplitSource), store.clone(), IngestionSettings::default())
            .unwrap();

    let result = ingestor.run(IngestionRequest::default()).await;
    assert_eq!(result.run.status, RunStatus::PartialFailure);
    assert_eq!(result.run.records_processed, 2);
    assert_eq!(result.run.records_inserted, 0);
    assert_eq!(store.inner.row_count("meta.entities").await, 2);
    assert_eq!(store.inner.row_count("meta.prices").await, 0);
}

#[tokio::test]
async fn test_multi_table_success_counts_logical_records() {
    let store = Arc::new(MemoryStore::new());
    let ingestor =
        MetadataIngestor::new(Arc::new(SplitSource), store.clone(), IngestionSettings::default())
            .unwrap();

    let result = ingestor.run(IngestionRequest::default()).await;
    assert_eq!(result.run.status, RunStatus::Success);
    assert_eq!(result.run.records_inserted, 2);
    assert_eq!(store.tables().await, vec!["meta.entities", "meta.prices"]);

    // 두 번째 실행: 엔터티는 upsert, 가격 이력은 누적
    ingestor.run(IngestionRequest::default()).await;
    assert_eq!(store.row_count("meta.entities").await, 2);
    assert_eq!(store.row_count("meta.prices").await, 4);
}

/// 갱신 시각을 가진 메타데이터 소스.
struct StampedSource;

#[async_trait]
impl RecordSource for StampedSource {
    fn name(&self) -> &str {
        "stamped"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Metadata
    }

    async fn fetch_raw(&self, _request: &IngestionRequest) -> Result<Vec<RawRecord>> {
        Ok(vec![
            json!({ "id": 1, "updated": 1 }),
            json!({ "id": 2, "updated": 5 }),
            json!({ "id": 3 }),
        ])
    }

    fn transform(&self, raw: RawRecord) -> Result<Record> {
        let mut record = Record::new().with("id", raw["id"].as_i64());
        if let Some(h) = raw["updated"].as_u64() {
            record.insert(DATETIME_FIELD, utc(h as u32));
        }
        Ok(record)
    }

    fn table(&self) -> String {
        "meta.stamped".to_string()
    }

    fn schema(&self) -> TableSchema {
        TableSchema::new().column("id", ColumnType::Int)
    }

    fn conflict_columns(&self) -> Vec<String> {
        vec!["id".to_string()]
    }
}

async fn stamped_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .seed(
            "meta.stamped",
            vec![Record::new().with("id", 9i64).with(DATETIME_FIELD, utc(3))],
        )
        .await;
    store
}

#[tokio::test]
async fn test_metadata_incremental_filters_only_stamped_records() {
    let store = stamped_store().await;
    let ingestor =
        MetadataIngestor::new(Arc::new(StampedSource), store, IngestionSettings::default()).unwrap();

    let result = ingestor.run(IngestionRequest::default()).await;
    assert!(!result.full_refresh);
    assert!(result.change_detection_enabled);
    assert_eq!(result.run.records_processed, 3);
    // id=1 (01:00) 은 워터마크(03:00) 이하
    assert_eq!(result.run.records_inserted, 2);
}

#[tokio::test]
async fn test_metadata_full_refresh_ignores_watermark() {
    let store = stamped_store().await;
    let ingestor =
        MetadataIngestor::new(Arc::new(StampedSource), store, IngestionSettings::default())
            .unwrap()
            .with_full_refresh(true);

    let result = ingestor.run(IngestionRequest::default()).await;
    assert!(result.full_refresh);
    assert_eq!(result.run.records_inserted, 3);
}

struct FirstOnly;

#[async_trait]
impl ChangeDetector for FirstOnly {
    fn name(&self) -> &str {
        "first_only"
    }

    async fn detect_changes(&self, _table: &str, records: &[Record]) -> Result<Vec<Record>> {
        Ok(records.iter().take(1).cloned().collect())
    }
}

struct BrokenDetector;

#[async_trait]
impl ChangeDetector for BrokenDetector {
    fn name(&self) -> &str {
        "broken"
    }

    async fn detect_changes(&self, _table: &str, _records: &[Record]) -> Result<Vec<Record>> {
        Err(IngestError::ChangeDetection("snapshot missing".into()))
    }
}

#[tokio::test]
async fn test_change_detector_applied_and_fail_open() {
    let narrowing = MetadataIngestor::new(
        Arc::new(SplitSource),
        Arc::new(MemoryStore::new()),
        IngestionSettings::default(),
    )
    .unwrap()
    .with_change_detector(Arc::new(FirstOnly));
    assert_eq!(narrowing.run(IngestionRequest::default()).await.run.records_inserted, 1);

    let broken = MetadataIngestor::new(
        Arc::new(SplitSource),
        Arc::new(MemoryStore::new()),
        IngestionSettings::default(),
    )
    .unwrap()
    .with_change_detector(Arc::new(BrokenDetector));
    let result = broken.run(IngestionRequest::default()).await;
    assert_eq!(result.run.status, RunStatus::Success);
    assert_eq!(result.run.records_inserted, 2);

    // 전체 갱신에서는 감지기를 건너뜀
    let refreshed = MetadataIngestor::new(
        Arc::new(SplitSource),
        Arc::new(MemoryStore::new()),
        IngestionSettings::default(),
    )
    .unwrap()
    .with_change_detector(Arc::new(FirstOnly))
    .with_full_refresh(true);
    assert_eq!(refreshed.run(IngestionRequest::default()).await.run.records_inserted, 2);
}

#[test]
fn test_invalid_settings_rejected_at_construction() {
    let settings = IngestionSettings {
        parallel_workers: 0,
        ..Default::default()
    };
    let result = Ingestor::new(
        Arc::new(CandleSource::default()),
        Arc::new(MemoryStore::new()),
        settings,
    );
    assert!(matches!(result, Err(IngestError::Config(_))));
}

fn any_interval() -> impl Strategy<Value = Interval> {
    prop_oneof![
        Just(Interval::Minute),
        Just(Interval::Hour),
        Just(Interval::Day)
    ]
}

proptest! {
    #[test]
    fn prop_fetch_start_follows_watermark(
        secs in 0i64..4_000_000_000,
        interval in any_interval(),
        enabled in any::<bool>(),
        horizon_days in 1i64..2000,
    ) {
        let window = BackfillWindow::new(interval, enabled, Duration::days(horizon_days));
        let wm = DateTime::from_timestamp(secs, 0).unwrap();

        let start = window.compute_fetch_start(Some(wm));
        prop_assert_eq!(start, wm + interval.duration());
        prop_assert!(start > wm);
    }

    #[test]
    fn prop_backfill_start_is_day_aligned(
        now_secs in 1_000_000_000i64..4_000_000_000,
        horizon_days in 1i64..2000,
        interval in any_interval(),
    ) {
        let window = BackfillWindow::new(interval, true, Duration::days(horizon_days));
        let now = DateTime::from_timestamp(now_secs, 0).unwrap();

        let start = window.compute_fetch_start_at(None, now);
        prop_assert_eq!(start.timestamp() % 86_400, 0);
        prop_assert!(start <= now - Duration::days(horizon_days));
    }
}
