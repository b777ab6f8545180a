//! 타임스탬프 정규화와 기간 경계 계산.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::types::{Interval, Value};

/// 타임존 없는 문자열 형식. 매칭되면 UTC로 간주합니다.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

/// 다양한 형태의 값을 UTC 타임스탬프로 변환합니다.
///
/// - `Timestamp`: 그대로
/// - `NaiveTimestamp`: UTC로 간주
/// - `Int`/`Float`: 유닉스 초
/// - `Text`: 알려진 형식, 날짜만, RFC 3339 순서로 시도
///
/// 변환할 수 없으면 None.
pub fn ensure_utc(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(dt) => Some(*dt),
        Value::NaiveTimestamp(naive) => Some(Utc.from_utc_datetime(naive)),
        Value::Int(secs) => DateTime::from_timestamp(*secs, 0),
        Value::Float(secs) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }
        Value::Text(s) => parse_datetime(s),
        _ => None,
    }
}

/// 문자열을 UTC 타임스탬프로 파싱합니다.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }

    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!(value = s, "타임스탬프 문자열 파싱 실패");
            None
        }
    }
}

/// 유닉스 초.
pub fn to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// 해당 UTC 일자의 00:00:00.
pub fn truncate_to_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&dt.date_naive().and_time(chrono::NaiveTime::MIN))
}

/// 인터벌 단위로 내림한 기간 시작 시각.
pub fn truncate_to_interval(dt: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    match interval {
        Interval::Day => truncate_to_day(dt),
        Interval::Hour => truncate_to_day(dt) + Duration::hours(dt.hour() as i64),
        Interval::Minute => {
            truncate_to_day(dt) + Duration::hours(dt.hour() as i64)
                + Duration::minutes(dt.minute() as i64)
        }
    }
}

/// `dt`가 속한 기간의 시작과 끝(시작 + 인터벌 - 1µs).
pub fn period_boundaries(dt: DateTime<Utc>, interval: Interval) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = truncate_to_interval(dt, interval);
    let end = start + interval.duration() - Duration::microseconds(1);
    (start, end)
}

/// 직전 완결 기간의 끝 시각.
pub fn end_of_previous_period(dt: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    truncate_to_interval(dt, interval) - Duration::microseconds(1)
}
