//! fetch → transform → validate → insert 파이프라인 드라이버.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::metadata::ChangeDetector;
use super::validate::{validate_and_filter, RecordRequirement};
use crate::config::IngestionSettings;
use crate::error::Result;
use crate::source::{RecordSource, RecordStore, SourceKind};
use crate::types::{IngestionRequest, Record, RunResult, RunStage, RunStatus};

/// 단일 실행 중 누적되는 상태.
struct RunState {
    run_id: Uuid,
    table: String,
    started: Instant,
    stage: RunStage,
    processed: usize,
}

impl RunState {
    fn advance(&mut self, stage: RunStage) {
        tracing::debug!(from = self.stage.as_str(), to = stage.as_str(), "단계 전환");
        self.stage = stage;
    }

    fn finish(self, status: RunStatus, inserted: usize, error: Option<String>) -> RunResult {
        let stage = match status {
            RunStatus::Failure => RunStage::Failed,
            RunStatus::Success => RunStage::Done,
            RunStatus::PartialFailure => self.stage,
        };
        RunResult {
            run_id: self.run_id,
            table: self.table,
            status,
            records_processed: self.processed,
            records_inserted: inserted,
            duration: self.started.elapsed(),
            error,
            stage,
        }
    }
}

/// 수집 오케스트레이터.
///
/// 소스와 저장소는 `Arc`로 공유되므로 여러 시리즈를 동시에 실행할 수 있습니다.
#[derive(Clone)]
pub struct Ingestor {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn RecordStore>,
    settings: IngestionSettings,
    requirement: RecordRequirement,
}

impl Ingestor {
    /// 새 오케스트레이터 생성. 설정은 여기서 한 번 검증합니다.
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn RecordStore>,
        settings: IngestionSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let requirement = match source.kind() {
            SourceKind::TimeSeries => RecordRequirement::Timestamped,
            SourceKind::Metadata => RecordRequirement::NonEmpty,
        };
        Ok(Self {
            source,
            store,
            settings,
            requirement,
        })
    }

    pub fn with_requirement(mut self, requirement: RecordRequirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.settings
    }

    pub fn requirement(&self) -> RecordRequirement {
        self.requirement
    }

    /// 워터마크를 조회합니다.
    ///
    /// `ignore_watermark` 요청이거나 소스가 워터마크를 지원하지 않으면 None.
    /// 조회 실패도 None으로 취급합니다.
    pub async fn read_watermark(&self, request: &IngestionRequest) -> Option<DateTime<Utc>> {
        if request.ignore_watermark || !self.source.supports_watermark() {
            return None;
        }

        let table = self.source.table();
        let filters = self.source.watermark_filters(request);
        match self.store.read_watermark(&table, &filters).await {
            Ok(watermark) => watermark,
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    series = %request.series,
                    error = %e,
                    "워터마크 조회 실패, 워터마크 없이 진행"
                );
                None
            }
        }
    }

    /// 단일 실행. 워터마크 조회부터 삽입까지 수행합니다.
    ///
    /// 어떤 에러도 이 경계를 넘지 않고 `RunResult`에 기록됩니다.
    pub async fn run(&self, request: &IngestionRequest) -> RunResult {
        let watermark = self.read_watermark(request).await;
        self.run_with_watermark(request, watermark).await
    }

    /// 이미 조회한 워터마크로 실행합니다.
    pub async fn run_with_watermark(
        &self,
        request: &IngestionRequest,
        watermark: Option<DateTime<Utc>>,
    ) -> RunResult {
        self.run_pipeline(request, watermark, None).await
    }

    pub(crate) async fn run_pipeline(
        &self,
        request: &IngestionRequest,
        watermark: Option<DateTime<Utc>>,
        detector: Option<&dyn ChangeDetector>,
    ) -> RunResult {
        let run_id = Uuid::new_v4();
        let table = self.source.table();
        let span = tracing::info_span!(
            "ingest_run",
            %run_id,
            table = %table,
            source = self.source.name(),
            series = %request.series,
        );

        let state = RunState {
            run_id,
            table,
            started: Instant::now(),
            stage: RunStage::Started,
            processed: 0,
        };

        let result = self
            .execute(state, request, watermark, detector)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match result.status {
            RunStatus::Failure => tracing::error!(
                error = result.error.as_deref().unwrap_or("-"),
                elapsed_ms = result.duration.as_millis() as u64,
                "수집 실패"
            ),
            RunStatus::PartialFailure => tracing::warn!(
                processed = result.records_processed,
                elapsed_ms = result.duration.as_millis() as u64,
                "수집 부분 실패"
            ),
            RunStatus::Success => tracing::info!(
                processed = result.records_processed,
                inserted = result.records_inserted,
                elapsed_ms = result.duration.as_millis() as u64,
                "수집 완료"
            ),
        });
        result
    }

    async fn execute(
        &self,
        mut state: RunState,
        request: &IngestionRequest,
        watermark: Option<DateTime<Utc>>,
        detector: Option<&dyn ChangeDetector>,
    ) -> RunResult {
        tracing::debug!(
            watermark = ?watermark,
            start = ?request.start,
            end = ?request.end,
            "수집 시작"
        );

        // 1. 조회 (치명적)
        let raw = match self.source.fetch_raw(request).await {
            Ok(raw) => raw,
            Err(e) => return state.finish(RunStatus::Failure, 0, Some(e.to_string())),
        };
        state.advance(RunStage::Fetched);

        if raw.is_empty() {
            tracing::info!("조회된 데이터 없음");
            return state.finish(RunStatus::Success, 0, None);
        }
        let raw_count = raw.len();

        // 2. 변환 (레코드 단위로 흡수)
        let mut records: Vec<Record> = Vec::with_capacity(raw_count);
        for (idx, item) in raw.into_iter().enumerate() {
            match self.source.transform(item) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(index = idx, error = %e, "레코드 변환 실패, 건너뜀"),
            }
        }
        state.processed = records.len();
        state.advance(RunStage::Transformed);

        if records.is_empty() {
            tracing::warn!(raw = raw_count, "모든 레코드 변환 실패, 반영할 데이터 없음");
            return state.finish(RunStatus::Success, 0, None);
        }

        // 3. 검증 및 증분 필터
        let source = &self.source;
        let outcome = validate_and_filter(records, watermark, self.requirement, |r| {
            source.validate_record(r)
        });
        state.advance(RunStage::Validated);

        let mut kept = outcome.kept;

        // 4. 변경 감지 (실패 시 전체 통과)
        if let Some(detector) = detector {
            if !kept.is_empty() {
                match detector.detect_changes(&state.table, &kept).await {
                    Ok(changed) => {
                        tracing::debug!(
                            before = kept.len(),
                            after = changed.len(),
                            "변경 감지 완료"
                        );
                        kept = changed;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "변경 감지 실패, 전체 레코드 반영");
                    }
                }
            }
        }

        if kept.is_empty() {
            tracing::info!(processed = state.processed, "신규 레코드 없음");
            return state.finish(RunStatus::Success, 0, None);
        }

        // 5. 삽입 (테이블 배치 순서대로, 첫 실패에서 중단)
        let inserted = kept.len();
        let batches = self.source.plan_batches(kept);
        let mut applied: Vec<String> = Vec::new();

        for batch in batches.iter().filter(|b| !b.is_empty()) {
            match self.store.insert_batch(batch).await {
                Ok(rows) => {
                    tracing::debug!(table = %batch.table, rows, "배치 반영");
                    applied.push(batch.table.clone());
                }
                Err(e) => {
                    tracing::error!(
                        table = %batch.table,
                        applied_tables = ?applied,
                        error = %e,
                        "배치 삽입 실패"
                    );
                    return state.finish(RunStatus::PartialFailure, 0, None);
                }
            }
        }
        state.advance(RunStage::Inserted);

        state.finish(RunStatus::Success, inserted, None)
    }
}
