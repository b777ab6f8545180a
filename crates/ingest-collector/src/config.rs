//! Collector 설정.
//!
//! `.env`를 먼저 읽은 뒤 `AppConfig::load`로 파일과 `INGEST__*` 환경 변수를
//! 겹쳐 로드합니다. CLI 플래그는 그 위에 덮어씁니다.

use std::path::Path;

use ingest_core::{AppConfig, LogConfig, LogFormat};

use crate::error::{CollectorError, Result};

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 파이프라인/DB/API/로깅/데몬 설정
    pub app: AppConfig,
    /// true면 Postgres 대신 메모리 저장소 사용
    pub dry_run: bool,
}

impl CollectorConfig {
    /// `.env`와 설정 파일, 환경 변수에서 설정을 로드합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = AppConfig::load(path)?;
        Ok(Self::from_app(app))
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self {
            app,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// CLI 로그 플래그를 반영합니다. 잘못된 형식이면 에러.
    pub fn with_log_overrides(mut self, level: Option<String>, format: Option<String>) -> Result<Self> {
        if let Some(level) = level {
            self.app.logging.level = level;
        }
        if let Some(format) = format {
            format
                .parse::<LogFormat>()
                .map_err(CollectorError::Config)?;
            self.app.logging.format = format;
        }
        Ok(self)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::from(&self.app.logging)
    }
}
