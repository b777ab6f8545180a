//! 프로세스 수명 동안의 수집 실행 통계.
//!
//! 전역 인스턴스는 없습니다. 호출자가 소유하고 명시적으로 전달합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::pipeline::FanOutSummary;
use crate::types::RunResult;

/// 누적 실행 통계.
#[derive(Debug, Clone, Default)]
pub struct IngestionMetrics {
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    total_records_processed: u64,
    total_records_inserted: u64,
    total_execution_time: Duration,
    last_run_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    /// 에러 메시지(없으면 상태 이름)별 발생 횟수
    error_counts: BTreeMap<String, u64>,
}

/// 직렬화 가능한 통계 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub total_records_processed: u64,
    pub total_records_inserted: u64,
    pub total_execution_time_seconds: f64,
    pub average_execution_time_seconds: f64,
    pub success_rate_percent: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub error_counts: BTreeMap<String, u64>,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 결과 하나를 반영합니다.
    pub fn record_run(&mut self, result: &RunResult) {
        let now = Utc::now();
        self.total_runs += 1;
        self.last_run_at = Some(now);

        if result.status.is_success() {
            self.successful_runs += 1;
            self.last_success_at = Some(now);
        } else {
            self.failed_runs += 1;
            let key = result
                .error
                .clone()
                .unwrap_or_else(|| result.status.as_str().to_string());
            *self.error_counts.entry(key).or_insert(0) += 1;
        }

        self.total_records_processed += result.records_processed as u64;
        self.total_records_inserted += result.records_inserted as u64;
        self.total_execution_time += result.duration;
    }

    /// 팬아웃의 시리즈별 결과를 모두 반영합니다.
    pub fn record_fan_out(&mut self, summary: &FanOutSummary) {
        for outcome in &summary.outcomes {
            self.record_run(&outcome.result);
        }
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    pub fn successful_runs(&self) -> u64 {
        self.successful_runs
    }

    pub fn failed_runs(&self) -> u64 {
        self.failed_runs
    }

    pub fn error_counts(&self) -> &BTreeMap<String, u64> {
        &self.error_counts
    }

    /// 성공률 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            (self.successful_runs as f64 / self.total_runs as f64) * 100.0
        }
    }

    /// 평균 실행 시간.
    pub fn average_execution_time(&self) -> Duration {
        if self.total_runs == 0 {
            Duration::ZERO
        } else {
            self.total_execution_time.div_f64(self.total_runs as f64)
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_runs: self.total_runs,
            successful_runs: self.successful_runs,
            failed_runs: self.failed_runs,
            total_records_processed: self.total_records_processed,
            total_records_inserted: self.total_records_inserted,
            total_execution_time_seconds: self.total_execution_time.as_secs_f64(),
            average_execution_time_seconds: self.average_execution_time().as_secs_f64(),
            success_rate_percent: self.success_rate(),
            last_run_at: self.last_run_at,
            last_success_at: self.last_success_at,
            error_counts: self.error_counts.clone(),
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total_runs = self.total_runs,
            successful = self.successful_runs,
            failed = self.failed_runs,
            records_processed = self.total_records_processed,
            records_inserted = self.total_records_inserted,
            success_rate = format!("{:.1}%", self.success_rate()),
            avg_elapsed = format!("{:.2}s", self.average_execution_time().as_secs_f64()),
            distinct_errors = self.error_counts.len(),
            "수집 통계"
        );
    }

    /// 모든 통계를 초기화합니다.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunStage, RunStatus};
    use uuid::Uuid;

    fn result(status: RunStatus, processed: usize, inserted: usize, error: Option<&str>) -> RunResult {
        RunResult {
            run_id: Uuid::new_v4(),
            table: "t".to_string(),
            status,
            records_processed: processed,
            records_inserted: inserted,
            duration: Duration::from_secs(2),
            error: error.map(str::to_string),
            stage: RunStage::Done,
        }
    }

    #[test]
    fn test_record_run_aggregates() {
        let mut metrics = IngestionMetrics::new();
        metrics.record_run(&result(RunStatus::Success, 10, 10, None));
        metrics.record_run(&result(RunStatus::PartialFailure, 5, 0, None));
        metrics.record_run(&result(RunStatus::Failure, 0, 0, Some("timeout")));
        metrics.record_run(&result(RunStatus::Failure, 0, 0, Some("timeout")));

        let summary = metrics.summary();
        assert_eq!(summary.total_runs, 4);
        assert_eq!(summary.successful_runs, 1);
        assert_eq!(summary.failed_runs, 3);
        assert_eq!(summary.total_records_processed, 15);
        assert_eq!(summary.total_records_inserted, 10);
        assert_eq!(summary.success_rate_percent, 25.0);
        assert_eq!(summary.average_execution_time_seconds, 2.0);
        assert_eq!(summary.error_counts.get("timeout"), Some(&2));
        assert_eq!(summary.error_counts.get("partial_failure"), Some(&1));
        assert!(summary.last_success_at.is_some());
    }

    #[test]
    fn test_empty_and_reset() {
        let mut metrics = IngestionMetrics::new();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.average_execution_time(), Duration::ZERO);

        metrics.record_run(&result(RunStatus::Success, 1, 1, None));
        metrics.reset();
        assert_eq!(metrics.total_runs(), 0);
        assert!(metrics.summary().last_run_at.is_none());
    }
}
