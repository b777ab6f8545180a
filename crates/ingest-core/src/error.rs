//! 수집 파이프라인의 에러 타입.
//!
//! 파이프라인 단계별 실패 종류를 구분합니다. 단계마다 처리 정책이 다르므로
//! (fetch는 치명적, 나머지는 흡수) 호출자는 variant로 분기합니다.

use thiserror::Error;

/// 수집 에러.
#[derive(Debug, Error)]
pub enum IngestError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 지원하지 않는 인터벌
    #[error("지원하지 않는 인터벌: {0}")]
    InvalidInterval(String),

    /// 원천 데이터 조회 실패 (실행 중단)
    #[error("조회 에러: {0}")]
    Fetch(String),

    /// 개별 레코드 변환 실패
    #[error("변환 에러: {0}")]
    Transform(String),

    /// 워터마크 조회 실패
    #[error("워터마크 조회 에러: {0}")]
    Watermark(String),

    /// 저장소 삽입 실패
    #[error("삽입 에러: {0}")]
    Insert(String),

    /// 변경 감지 실패
    #[error("변경 감지 에러: {0}")]
    ChangeDetection(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 수집 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// 실행 전체를 중단시키는 에러인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Fetch(_) | IngestError::Config(_))
    }

    /// 메트릭 히스토그램에 사용할 짧은 분류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Config(_) => "config",
            IngestError::InvalidInterval(_) => "invalid_interval",
            IngestError::Fetch(_) => "fetch",
            IngestError::Transform(_) => "transform",
            IngestError::Watermark(_) => "watermark",
            IngestError::Insert(_) => "insert",
            IngestError::ChangeDetection(_) => "change_detection",
            IngestError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Transform(err.to_string())
    }
}

impl From<config::ConfigError> for IngestError {
    fn from(err: config::ConfigError) -> Self {
        IngestError::Config(err.to_string())
    }
}
