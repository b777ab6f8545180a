//! 메타데이터 수집: 전체 갱신과 변경 감지 훅.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use super::orchestrator::Ingestor;
use super::validate::RecordRequirement;
use crate::config::IngestionSettings;
use crate::error::Result;
use crate::source::{RecordSource, RecordStore};
use crate::types::{IngestionRequest, Record, RunResult};

/// 검증과 삽입 사이에서 실제로 바뀐 레코드만 골라내는 전략.
///
/// 에러를 반환하면 오케스트레이터는 모든 레코드를 그대로 삽입합니다.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect_changes(&self, table: &str, records: &[Record]) -> Result<Vec<Record>>;
}

/// 모든 레코드를 변경된 것으로 취급하는 기본 감지기.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl ChangeDetector for PassThrough {
    fn name(&self) -> &str {
        "pass_through"
    }

    async fn detect_changes(&self, _table: &str, records: &[Record]) -> Result<Vec<Record>> {
        Ok(records.to_vec())
    }
}

/// 메타데이터 실행 결과.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRunResult {
    #[serde(flatten)]
    pub run: RunResult,
    pub full_refresh: bool,
    pub change_detection_enabled: bool,
}

/// 메타데이터 수집기.
#[derive(Clone)]
pub struct MetadataIngestor {
    ingestor: Ingestor,
    detector: Arc<dyn ChangeDetector>,
    full_refresh: bool,
    change_detection_enabled: bool,
}

impl MetadataIngestor {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn RecordStore>,
        settings: IngestionSettings,
    ) -> Result<Self> {
        let full_refresh = settings.metadata_full_refresh;
        let change_detection_enabled = settings.metadata_change_detection;
        let ingestor =
            Ingestor::new(source, store, settings)?.with_requirement(RecordRequirement::NonEmpty);
        Ok(Self {
            ingestor,
            detector: Arc::new(PassThrough),
            full_refresh,
            change_detection_enabled,
        })
    }

    pub fn with_full_refresh(mut self, full_refresh: bool) -> Self {
        self.full_refresh = full_refresh;
        self
    }

    pub fn with_change_detection(mut self, enabled: bool) -> Self {
        self.change_detection_enabled = enabled;
        self
    }

    pub fn with_change_detector(mut self, detector: Arc<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn full_refresh(&self) -> bool {
        self.full_refresh
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// 메타데이터 수집을 실행합니다.
    ///
    /// 전체 갱신이면 워터마크를 무시하고 전체 데이터셋을 다시 반영합니다.
    /// 증분이면 `datetime`을 가진 레코드에만 워터마크 필터가 적용됩니다.
    pub async fn run(&self, mut request: IngestionRequest) -> MetadataRunResult {
        if self.full_refresh {
            request.ignore_watermark = true;
        }

        tracing::info!(
            source = self.ingestor.source().name(),
            full_refresh = self.full_refresh,
            change_detection = self.change_detection_enabled,
            "메타데이터 수집 시작"
        );

        let watermark = self.ingestor.read_watermark(&request).await;
        let detector = (self.change_detection_enabled && !self.full_refresh)
            .then_some(self.detector.as_ref());

        let run = self
            .ingestor
            .run_pipeline(&request, watermark, detector)
            .await;

        MetadataRunResult {
            run,
            full_refresh: self.full_refresh,
            change_detection_enabled: self.change_detection_enabled,
        }
    }
}
