//! 단일 수집 실행 요청.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use super::interval::Interval;
use super::record::Value;

/// 시리즈 식별자 (예: market + instrument).
///
/// 워터마크 조회의 등치 필터로 그대로 사용됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    parts: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// market + instrument 시리즈.
    pub fn market_instrument(market: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self::new()
            .with("market", market)
            .with("instrument", instrument)
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((column.into(), value.into()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// 저장소 워터마크 필터로 변환.
    pub fn to_filters(&self) -> Vec<(String, Value)> {
        self.parts
            .iter()
            .map(|(c, v)| (c.clone(), Value::Text(v.clone())))
            .collect()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return f.write_str("*");
        }
        let joined: Vec<String> = self.parts.iter().map(|(_, v)| v.clone()).collect();
        f.write_str(&joined.join(":"))
    }
}

/// 수집 실행 요청.
#[derive(Debug, Clone, Default)]
pub struct IngestionRequest {
    /// 대상 시리즈
    pub series: SeriesKey,
    /// 조회 시작 시각 (백필 계산 결과 또는 호출자 지정)
    pub start: Option<DateTime<Utc>>,
    /// 조회 종료 시각 (없으면 현재)
    pub end: Option<DateTime<Utc>>,
    /// 최대 레코드 수
    pub limit: Option<u32>,
    /// 시계열 인터벌 태그
    pub interval: Option<Interval>,
    /// 워터마크 조회/필터를 건너뜀 (전체 갱신)
    pub ignore_watermark: bool,
    /// 소스별 추가 파라미터 (page_size 등)
    pub params: BTreeMap<String, String>,
}

impl IngestionRequest {
    pub fn new(series: SeriesKey) -> Self {
        Self {
            series,
            ..Default::default()
        }
    }

    /// market + instrument 시리즈 요청.
    pub fn for_pair(market: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self::new(SeriesKey::market_instrument(market, instrument))
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// 파라미터를 파싱해서 반환합니다. 없거나 파싱 실패 시 None.
    pub fn param<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }
}
