//! 실행 환경: 저장소와 API 클라이언트 조립.

use std::sync::Arc;

use ingest_core::{IngestionSettings, MemoryStore, RecordStore};
use ingest_data::{DataApiClient, Database, PgWarehouse};

use crate::config::CollectorConfig;
use crate::error::Result;

/// 저장소 백엔드.
#[derive(Clone)]
pub enum StoreBackend {
    /// dry-run 및 테스트용
    Memory(Arc<MemoryStore>),
    Postgres(Arc<PgWarehouse>),
}

/// 명령 실행에 필요한 공유 자원.
#[derive(Clone)]
pub struct Runtime {
    config: CollectorConfig,
    backend: StoreBackend,
    data_api: DataApiClient,
    min_api: DataApiClient,
}

impl Runtime {
    /// 설정에 따라 저장소에 연결합니다. dry-run이면 DB에 연결하지 않습니다.
    pub async fn connect(config: CollectorConfig) -> Result<Self> {
        let backend = if config.dry_run {
            tracing::warn!("dry-run 모드: 메모리 저장소 사용, DB에 쓰지 않습니다");
            StoreBackend::Memory(Arc::new(MemoryStore::new()))
        } else {
            let db = Database::connect(&config.app.database).await?;
            let warehouse = PgWarehouse::new(db, config.app.ingestion.batch_size);
            StoreBackend::Postgres(Arc::new(warehouse))
        };

        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: CollectorConfig, backend: StoreBackend) -> Result<Self> {
        let api = &config.app.api;
        let data_api = DataApiClient::new(&api.data_api_base_url, api.request_timeout())?;
        let min_api = DataApiClient::new(&api.min_api_base_url, api.request_timeout())?;

        Ok(Self {
            config,
            backend,
            data_api,
            min_api,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.config.app.ingestion
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        match &self.backend {
            StoreBackend::Memory(store) => store.clone() as Arc<dyn RecordStore>,
            StoreBackend::Postgres(store) => store.clone() as Arc<dyn RecordStore>,
        }
    }

    /// 메모리 저장소 (dry-run일 때만).
    pub fn memory(&self) -> Option<&Arc<MemoryStore>> {
        match &self.backend {
            StoreBackend::Memory(store) => Some(store),
            StoreBackend::Postgres(_) => None,
        }
    }

    /// Data API 클라이언트 (OHLCV, 자산).
    pub fn data_api(&self) -> &DataApiClient {
        &self.data_api
    }

    /// Min API 클라이언트 (거래소).
    pub fn min_api(&self) -> &DataApiClient {
        &self.min_api
    }

    /// 연결 풀을 닫습니다.
    pub async fn close(&self) {
        match &self.backend {
            StoreBackend::Postgres(store) => store.database().pool().close().await,
            StoreBackend::Memory(store) => {
                for table in store.tables().await {
                    tracing::info!(table = %table, rows = store.row_count(&table).await, "dry-run 결과");
                }
            }
        }
    }
}
