//! 에러 타입 정의.

use ingest_core::IngestError;
use ingest_data::DataError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 CLI 인자
    #[error("잘못된 인자: {0}")]
    InvalidArgument(String),

    /// 파이프라인 에러
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// 저장소/API 에러
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
