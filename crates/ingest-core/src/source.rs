//! 코어와 외부 협력자(데이터 소스, 저장소) 사이의 계약.
//!
//! 구체 커넥터는 `RecordSource`를, 웨어하우스 어댑터는 `RecordStore`를
//! 구현합니다. 코어는 이 두 trait만 알고 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{IngestionRequest, Record, TableSchema, Value, DATETIME_FIELD};

/// 소스가 반환하는 원시 레코드 (소스 정의 JSON).
pub type RawRecord = serde_json::Value;

/// 소스 종류. 기본 충돌 키와 검증 규칙이 달라집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    TimeSeries,
    Metadata,
}

impl SourceKind {
    /// 종류별 기본 충돌 키.
    pub fn default_conflict_columns(&self) -> Vec<String> {
        let cols: &[&str] = match self {
            SourceKind::TimeSeries => &[DATETIME_FIELD, "market", "instrument"],
            SourceKind::Metadata => &["id", "symbol", "name"],
        };
        cols.iter().map(|c| c.to_string()).collect()
    }
}

/// 삽입 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// 충돌 키 기준 교체
    #[default]
    Upsert,
    /// 이력 테이블용 추가 전용
    Append,
}

/// 저장소로 보내는 테이블 단위 배치.
#[derive(Debug, Clone)]
pub struct TableBatch {
    pub table: String,
    pub schema: TableSchema,
    pub conflict_columns: Vec<String>,
    pub mode: WriteMode,
    pub records: Vec<Record>,
}

impl TableBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 데이터 소스 계약.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// 로그용 소스 이름.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// 원천 API에서 원시 레코드를 가져옵니다.
    ///
    /// 페이지네이션이 필요하면 이 안에서 처리합니다. 실패 시 실행 전체가 중단됩니다.
    async fn fetch_raw(&self, request: &IngestionRequest) -> Result<Vec<RawRecord>>;

    /// 원시 레코드 하나를 정규화합니다. 실패한 레코드는 건너뜁니다.
    fn transform(&self, raw: RawRecord) -> Result<Record>;

    /// 삽입 대상 테이블.
    fn table(&self) -> String;

    fn schema(&self) -> TableSchema;

    fn conflict_columns(&self) -> Vec<String> {
        self.kind().default_conflict_columns()
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Upsert
    }

    /// 소스별 추가 검증. false면 레코드를 버립니다.
    fn validate_record(&self, _record: &Record) -> bool {
        true
    }

    /// 검증된 레코드를 테이블 배치로 나눕니다.
    ///
    /// 기본은 단일 테이블입니다. 하나의 엔터티가 여러 테이블에 걸치는
    /// 소스는 이 메서드를 재정의합니다.
    fn plan_batches(&self, records: Vec<Record>) -> Vec<TableBatch> {
        vec![TableBatch {
            table: self.table(),
            schema: self.schema(),
            conflict_columns: self.conflict_columns(),
            mode: self.write_mode(),
            records,
        }]
    }

    /// 대상 테이블에 `datetime` 컬럼이 있어 워터마크를 조회할 수 있는지 여부.
    fn supports_watermark(&self) -> bool {
        true
    }

    /// 워터마크 조회 필터.
    fn watermark_filters(&self, request: &IngestionRequest) -> Vec<(String, Value)> {
        request.series.to_filters()
    }
}

/// 웨어하우스 저장소 계약. 여러 워커가 동시에 호출할 수 있어야 합니다.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 필터 조건의 `MAX(datetime)`. 데이터가 없으면 None.
    async fn read_watermark(
        &self,
        table: &str,
        filters: &[(String, Value)],
    ) -> Result<Option<DateTime<Utc>>>;

    /// 배치를 하나의 논리적 작업으로 반영하고 반영된 행 수를 반환합니다.
    async fn insert_batch(&self, batch: &TableBatch) -> Result<u64>;
}
