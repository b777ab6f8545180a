//! 수집 파이프라인.
//!
//! - `orchestrator`: 단일 실행 드라이버
//! - `timeseries`: 백필 구간 계산과 다중 시리즈 팬아웃
//! - `metadata`: 전체 갱신과 변경 감지
//! - `validate`: 레코드 검증과 증분 필터

pub mod metadata;
pub mod orchestrator;
pub mod timeseries;
pub mod validate;

pub use metadata::{ChangeDetector, MetadataIngestor, MetadataRunResult, PassThrough};
pub use orchestrator::Ingestor;
pub use timeseries::{BackfillWindow, FanOutSummary, SeriesOutcome, TimeSeriesIngestor};
pub use validate::{validate_and_filter, FilterOutcome, RecordRequirement};
