//! 수집 실행 결과.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 실행 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 성공 (데이터 없음 포함)
    Success,
    /// 변환은 되었으나 삽입 실패 또는 일부만 반영
    PartialFailure,
    /// 조회 실패 등으로 처리된 레코드 없음
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 파이프라인 단계.
///
/// `Started → Fetched → Transformed → Validated → Inserted → Done`,
/// 조회 실패 시 `Failed`로 종료합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Started,
    Fetched,
    Transformed,
    Validated,
    Inserted,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Started => "started",
            RunStage::Fetched => "fetched",
            RunStage::Transformed => "transformed",
            RunStage::Validated => "validated",
            RunStage::Inserted => "inserted",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }
}

/// 단일 실행 결과. 실행 종료 시 생성되며 이후 변경되지 않습니다.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    /// 대상 테이블
    pub table: String,
    pub status: RunStatus,
    /// 변환에 성공한 레코드 수
    pub records_processed: usize,
    /// 저장소에 반영된 레코드 수
    pub records_inserted: usize,
    #[serde(rename = "duration_seconds", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// 조회 실패 등 치명적 에러 메시지
    pub error: Option<String>,
    /// 종료 단계
    pub stage: RunStage,
}

impl RunResult {
    /// 처리/삽입 카운트가 불변식을 만족하는지 확인합니다.
    pub fn counts_consistent(&self) -> bool {
        self.records_inserted <= self.records_processed
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
