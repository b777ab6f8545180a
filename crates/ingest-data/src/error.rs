//! 데이터 모듈 오류 타입.

use ingest_core::IngestError;
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 허용되지 않는 SQL 식별자
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// 데이터 삽입 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 데이터 가져오기 오류 (외부 소스)
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// 파싱 오류
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            sqlx::Error::Io(e) => DataError::ConnectionError(e.to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DataError::ParseError(err.to_string())
        } else {
            DataError::FetchError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<DataError> for IngestError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::FetchError(_) | DataError::ParseError(_) => IngestError::Fetch(err.to_string()),
            DataError::SerializationError(_) | DataError::InvalidData(_) => {
                IngestError::Transform(err.to_string())
            }
            DataError::ConfigError(_) => IngestError::Config(err.to_string()),
            DataError::ConnectionError(_)
            | DataError::QueryError(_)
            | DataError::PoolExhausted
            | DataError::InvalidIdentifier(_)
            | DataError::InsertError(_) => IngestError::Insert(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
