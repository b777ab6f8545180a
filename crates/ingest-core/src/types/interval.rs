//! 시계열 수집 인터벌 정의.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// 시계열 수집 인터벌.
///
/// 원천 API가 제공하는 분/시/일 단위만 허용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// 1분봉
    #[serde(rename = "1m")]
    Minute,
    /// 1시간봉
    #[serde(rename = "1h")]
    Hour,
    /// 일봉
    #[serde(rename = "1d")]
    Day,
}

impl Interval {
    /// 지원하는 모든 인터벌.
    pub const ALL: [Interval; 3] = [Interval::Minute, Interval::Hour, Interval::Day];

    /// 한 틱의 길이.
    pub fn duration(&self) -> Duration {
        match self {
            Interval::Minute => Duration::minutes(1),
            Interval::Hour => Duration::hours(1),
            Interval::Day => Duration::days(1),
        }
    }

    /// 설정/테이블명에 쓰이는 태그 ("1m", "1h", "1d").
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "1m",
            Interval::Hour => "1h",
            Interval::Day => "1d",
        }
    }

    /// Data API 경로 세그먼트 ("minutes", "hours", "days").
    pub fn api_path(&self) -> &'static str {
        match self {
            Interval::Minute => "minutes",
            Interval::Hour => "hours",
            Interval::Day => "days",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Interval::Minute),
            "1h" => Ok(Interval::Hour),
            "1d" => Ok(Interval::Day),
            other => Err(IngestError::InvalidInterval(other.to_string())),
        }
    }
}
