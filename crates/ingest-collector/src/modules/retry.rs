//! 실행 단위 재시도.
//!
//! 코어 파이프라인은 재시도하지 않습니다. `failure`로 끝난 실행만
//! `max_retries`회까지 `retry_delay` 간격으로 다시 실행합니다.
//! `partial_failure`는 이미 일부가 반영되었으므로 재시도하지 않습니다.

use std::future::Future;

use ingest_core::{IngestionSettings, MetadataRunResult, RunResult, RunStatus};

/// 재시도 판단에 필요한 실행 결과 정보.
pub trait RunOutcome {
    fn status(&self) -> RunStatus;
    fn error(&self) -> Option<&str>;
}

impl RunOutcome for RunResult {
    fn status(&self) -> RunStatus {
        self.status
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl RunOutcome for MetadataRunResult {
    fn status(&self) -> RunStatus {
        self.run.status
    }

    fn error(&self) -> Option<&str> {
        self.run.error.as_deref()
    }
}

/// `run`을 실행하고 `failure`면 재시도합니다. 마지막 결과를 반환합니다.
pub async fn run_with_retry<T, F, Fut>(settings: &IngestionSettings, label: &str, mut run: F) -> T
where
    T: RunOutcome,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = run().await;
        if outcome.status() != RunStatus::Failure {
            return outcome;
        }
        if attempt >= settings.max_retries {
            tracing::error!(
                label,
                attempts = attempt + 1,
                error = outcome.error().unwrap_or("-"),
                "재시도 소진"
            );
            return outcome;
        }

        attempt += 1;
        tracing::warn!(
            label,
            attempt,
            max_retries = settings.max_retries,
            error = outcome.error().unwrap_or("-"),
            "실행 실패, 재시도 대기"
        );
        tokio::time::sleep(settings.retry_delay()).await;
    }
}
