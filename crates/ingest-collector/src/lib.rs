//! 시장 데이터 수집기.
//!
//! `ingest-core` 파이프라인과 `ingest-data` 소스/저장소를 조립해서
//! 실행하는 바이너리를 제공합니다:
//! - 현물 OHLCV 수집 (단일/다중 시리즈)
//! - 거래소, 자산 메타데이터 수집
//! - 데몬 모드 주기 실행

pub mod config;
pub mod error;
pub mod modules;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
