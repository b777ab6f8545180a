//! 웨어하우스 저장소와 시장 데이터 API 소스.
//!
//! 이 crate는 다음을 제공합니다:
//! - PostgreSQL 웨어하우스 저장소 (`PgWarehouse`)
//! - 시장 데이터 API JSON 클라이언트 (`DataApiClient`)
//! - 현물 OHLCV, 거래소 메타데이터, 자산 메타데이터 소스

pub mod error;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result};

pub use provider::{AssetMetadataSource, DataApiClient, ExchangeMetadataSource, SpotOhlcvSource};
pub use storage::postgres::{Database, PgWarehouse};
