//! 시계열 수집: 워터마크 기반 조회 구간 계산과 다중 시리즈 병렬 실행.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::orchestrator::Ingestor;
use crate::config::IngestionSettings;
use crate::datetime::truncate_to_day;
use crate::error::Result;
use crate::source::{RecordSource, RecordStore};
use crate::types::{Interval, IngestionRequest, RunResult, RunStage, RunStatus, SeriesKey};

/// 백필 구간 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    pub interval: Interval,
    pub enabled: bool,
    pub horizon: Duration,
}

impl BackfillWindow {
    pub fn new(interval: Interval, enabled: bool, horizon: Duration) -> Self {
        Self {
            interval,
            enabled,
            horizon,
        }
    }

    pub fn from_settings(interval: Interval, settings: &IngestionSettings) -> Self {
        Self::new(
            interval,
            settings.backfill_enabled,
            settings.max_backfill_horizon(),
        )
    }

    /// 다음 조회 시작 시각.
    pub fn compute_fetch_start(&self, watermark: Option<DateTime<Utc>>) -> DateTime<Utc> {
        self.compute_fetch_start_at(watermark, Utc::now())
    }

    /// 기준 시각 `now`를 지정해서 계산합니다.
    ///
    /// - 워터마크가 있으면 `watermark + interval`
    /// - 없고 백필이 켜져 있으면 `now - horizon`을 UTC 자정으로 내림
    /// - 둘 다 아니면 `now`
    ///
    /// 표현 범위를 벗어나면 경계값으로 포화시킵니다.
    pub fn compute_fetch_start_at(
        &self,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match watermark {
            Some(wm) => wm
                .checked_add_signed(self.interval.duration())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None if self.enabled => truncate_to_day(
                now.checked_sub_signed(self.horizon)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            None => now,
        }
    }
}

/// 팬아웃 내 시리즈 하나의 결과.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesOutcome {
    /// 시리즈 표시 이름 (예: `coinbase:BTC-USD`)
    pub series: String,
    pub result: RunResult,
}

/// 다중 시리즈 실행 요약.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub records_processed: usize,
    pub records_inserted: usize,
    /// 입력 순서와 동일
    pub outcomes: Vec<SeriesOutcome>,
    #[serde(rename = "duration_seconds", serialize_with = "serialize_secs")]
    pub duration: std::time::Duration,
    pub status: RunStatus,
}

fn serialize_secs<S: serde::Serializer>(
    d: &std::time::Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl FanOutSummary {
    /// 시리즈 결과 목록으로 요약을 만듭니다. 순서는 그대로 유지합니다.
    pub fn from_outcomes(outcomes: Vec<SeriesOutcome>, duration: std::time::Duration) -> Self {
        let successful = outcomes
            .iter()
            .filter(|o| o.result.status.is_success())
            .count();
        let failed = outcomes.len() - successful;
        Self {
            total: outcomes.len(),
            successful,
            failed,
            records_processed: outcomes.iter().map(|o| o.result.records_processed).sum(),
            records_inserted: outcomes.iter().map(|o| o.result.records_inserted).sum(),
            outcomes,
            duration,
            status: if failed > 0 {
                RunStatus::PartialFailure
            } else {
                RunStatus::Success
            },
        }
    }

    /// 실패한 시리즈 이름 목록.
    pub fn failed_series(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.result.status.is_success())
            .map(|o| o.series.as_str())
            .collect()
    }
}

/// 시계열 수집기.
#[derive(Clone)]
pub struct TimeSeriesIngestor {
    ingestor: Ingestor,
    window: BackfillWindow,
}

impl TimeSeriesIngestor {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn RecordStore>,
        settings: IngestionSettings,
        interval: Interval,
    ) -> Result<Self> {
        let window = BackfillWindow::from_settings(interval, &settings);
        let ingestor = Ingestor::new(source, store, settings)?;
        Ok(Self { ingestor, window })
    }

    pub fn with_window(mut self, window: BackfillWindow) -> Self {
        self.window = window;
        self
    }

    pub fn interval(&self) -> Interval {
        self.window.interval
    }

    pub fn window(&self) -> &BackfillWindow {
        &self.window
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// 워터마크를 한 번 읽고 조회 시작 시각을 계산해서 실행합니다.
    ///
    /// 호출자가 `start`를 지정했다면 그대로 사용합니다.
    pub async fn run_with_backfill(&self, mut request: IngestionRequest) -> RunResult {
        let watermark = self.ingestor.read_watermark(&request).await;
        let start = self.window.compute_fetch_start(watermark);

        if request.start.is_none() {
            request.start = Some(start);
        }
        request.interval = Some(self.window.interval);

        tracing::debug!(
            series = %request.series,
            interval = %self.window.interval,
            watermark = ?watermark,
            start = ?request.start,
            "조회 구간 계산"
        );

        self.ingestor.run_with_watermark(&request, watermark).await
    }

    /// 여러 시리즈를 `parallel_workers` 동시성으로 실행합니다.
    ///
    /// 개별 시리즈의 패닉은 실패 결과로 기록합니다.
    pub async fn run_for_many(&self, requests: Vec<IngestionRequest>) -> FanOutSummary {
        let started = Instant::now();
        let workers = self.ingestor.settings().parallel_workers.max(1);
        let table = self.ingestor.source().table();

        tracing::info!(
            series = requests.len(),
            workers,
            interval = %self.window.interval,
            "다중 시리즈 수집 시작"
        );

        let mut indexed: Vec<(usize, SeriesOutcome)> = stream::iter(requests.into_iter().enumerate())
            .map(|(idx, request)| {
                let series = request.series.clone();
                let table = table.clone();
                async move {
                    let result = match AssertUnwindSafe(self.run_with_backfill(request))
                        .catch_unwind()
                        .await
                    {
                        Ok(result) => result,
                        Err(panic) => panic_result(table, &series, panic_message(&*panic)),
                    };
                    (
                        idx,
                        SeriesOutcome {
                            series: series.to_string(),
                            result,
                        },
                    )
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        indexed.sort_by_key(|(idx, _)| *idx);
        let outcomes = indexed.into_iter().map(|(_, o)| o).collect();
        let summary = FanOutSummary::from_outcomes(outcomes, started.elapsed());

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            processed = summary.records_processed,
            inserted = summary.records_inserted,
            elapsed = format!("{:.1}s", summary.duration.as_secs_f64()),
            "다중 시리즈 수집 완료"
        );
        if summary.failed > 0 {
            tracing::warn!(failed = ?summary.failed_series(), "실패한 시리즈");
        }

        summary
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "알 수 없는 패닉".to_string()
    }
}

fn panic_result(table: String, series: &SeriesKey, message: String) -> RunResult {
    tracing::error!(series = %series, panic = %message, "시리즈 수집 중 패닉");
    RunResult {
        run_id: Uuid::new_v4(),
        table,
        status: RunStatus::Failure,
        records_processed: 0,
        records_inserted: 0,
        duration: std::time::Duration::ZERO,
        error: Some(format!("패닉: {}", message)),
        stage: RunStage::Failed,
    }
}
