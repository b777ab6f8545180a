//! # Ingest Core
//!
//! 시장 데이터 수집 파이프라인의 핵심 오케스트레이션 프레임워크를 제공합니다.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - fetch → transform → validate → insert 파이프라인 (`Ingestor`)
//! - 워터마크 기반 증분 수집과 백필 (`TimeSeriesIngestor`)
//! - 전체/증분 메타데이터 갱신 (`MetadataIngestor`)
//! - 데이터 소스/저장소 계약 (`RecordSource`, `RecordStore`)
//! - 날짜/인터벌 유틸리티, 정제 헬퍼, 실행 메트릭
//! - 설정 관리 및 로깅 인프라

pub mod config;
pub mod datetime;
pub mod error;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod transform;
pub mod types;

pub use config::{
    ApiSettings, AppConfig, DaemonSettings, DatabaseSettings, IngestionSettings, LoggingSettings,
};
pub use error::{IngestError, Result};
pub use logging::{init_logging, init_logging_from_env, LogConfig, LogFormat};
pub use memory::MemoryStore;
pub use metrics::{IngestionMetrics, MetricsSummary};
pub use pipeline::{
    BackfillWindow, ChangeDetector, FanOutSummary, Ingestor, MetadataIngestor, MetadataRunResult,
    PassThrough, RecordRequirement, SeriesOutcome, TimeSeriesIngestor,
};
pub use source::{RawRecord, RecordSource, RecordStore, SourceKind, TableBatch, WriteMode};
pub use types::*;
