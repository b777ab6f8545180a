//! 레코드 구조 검증과 워터마크 기준 증분 필터.

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{Record, Value, DATETIME_FIELD};

/// 레코드 유효성 요구 수준.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordRequirement {
    /// 비어 있지 않으면 유효 (메타데이터)
    #[default]
    NonEmpty,
    /// `datetime` 컬럼 필수 (시계열)
    Timestamped,
}

/// 필터 결과와 사유별 제외 건수.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// 통과한 레코드 (조회 순서 유지)
    pub kept: Vec<Record>,
    /// `datetime` 누락
    pub missing: usize,
    /// 워터마크 이하
    pub stale: usize,
    /// 빈 레코드 또는 타임스탬프가 아닌 `datetime`
    pub invalid: usize,
    /// 소스 검증 훅이 거부
    pub rejected: usize,
}

impl FilterOutcome {
    pub fn dropped(&self) -> usize {
        self.missing + self.stale + self.invalid + self.rejected
    }
}

/// 레코드를 검증하고 워터마크 이후 레코드만 남깁니다.
///
/// 순서: 빈 레코드 → 소스 훅 → `datetime` 필수 여부 → UTC 강제 → 워터마크 비교.
/// 통과한 레코드의 `datetime`은 항상 `Value::Timestamp`입니다.
pub fn validate_and_filter<F>(
    records: Vec<Record>,
    watermark: Option<DateTime<Utc>>,
    requirement: RecordRequirement,
    source_hook: F,
) -> FilterOutcome
where
    F: Fn(&Record) -> bool,
{
    let mut outcome = FilterOutcome::default();

    for mut record in records {
        if record.is_empty() {
            outcome.invalid += 1;
            continue;
        }

        if !source_hook(&record) {
            outcome.rejected += 1;
            continue;
        }

        let ts = match record.datetime() {
            None | Some(Value::Null) => {
                if requirement == RecordRequirement::Timestamped {
                    outcome.missing += 1;
                    continue;
                }
                None
            }
            Some(Value::Timestamp(dt)) => Some(*dt),
            Some(Value::NaiveTimestamp(naive)) => {
                let dt = Utc.from_utc_datetime(naive);
                record.insert(DATETIME_FIELD, dt);
                Some(dt)
            }
            Some(other) => {
                tracing::debug!(value_type = other.type_name(), "datetime 타입 오류로 제외");
                outcome.invalid += 1;
                continue;
            }
        };

        if let (Some(ts), Some(wm)) = (ts, watermark) {
            if ts <= wm {
                outcome.stale += 1;
                continue;
            }
        }

        outcome.kept.push(record);
    }

    if outcome.dropped() > 0 {
        tracing::debug!(
            kept = outcome.kept.len(),
            missing = outcome.missing,
            stale = outcome.stale,
            invalid = outcome.invalid,
            rejected = outcome.rejected,
            "레코드 필터링"
        );
    }

    outcome
}
