//! 시장 데이터 API 소스.
//!
//! 각 소스는 `ingest_core::RecordSource`를 구현합니다.
//!
//! - `SpotOhlcvSource`: 현물 OHLCV 캔들 (시계열)
//! - `ExchangeMetadataSource`: 거래소 일반 정보 (메타데이터)
//! - `AssetMetadataSource`: 자산 목록, 산업 분류, 시장 스냅샷 (다중 테이블 메타데이터)

pub mod asset;
pub mod client;
pub mod exchange;
pub mod spot_ohlcv;

pub use asset::AssetMetadataSource;
pub use client::DataApiClient;
pub use exchange::ExchangeMetadataSource;
pub use spot_ohlcv::SpotOhlcvSource;
