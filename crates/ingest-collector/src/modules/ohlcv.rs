//! 현물 OHLCV 수집.

use std::collections::HashSet;
use std::sync::Arc;

use ingest_core::{
    FanOutSummary, IngestionRequest, Interval, RunResult, RunStatus, SeriesKey,
    TimeSeriesIngestor,
};
use ingest_data::SpotOhlcvSource;

use super::retry::run_with_retry;
use super::runtime::Runtime;
use crate::error::{CollectorError, Result};

/// market, instrument 쌍.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPair {
    pub market: String,
    pub instrument: String,
}

impl SeriesPair {
    pub fn new(market: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            instrument: instrument.into(),
        }
    }

    fn request(&self) -> IngestionRequest {
        IngestionRequest::for_pair(&self.market, &self.instrument)
    }

    fn series_name(&self) -> String {
        SeriesKey::market_instrument(&self.market, &self.instrument).to_string()
    }
}

/// `"coinbase:BTC-USD,kraken:ETH-USD"` 형식을 파싱합니다.
///
/// 빈 항목은 무시하고, 같은 쌍이 반복되면 첫 번째만 남깁니다.
pub fn parse_pairs(input: &str) -> Result<Vec<SeriesPair>> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (market, instrument) = item
            .split_once(':')
            .map(|(m, i)| (m.trim(), i.trim()))
            .filter(|(m, i)| !m.is_empty() && !i.is_empty())
            .ok_or_else(|| {
                CollectorError::InvalidArgument(format!(
                    "시리즈 형식은 market:instrument 입니다: {}",
                    item
                ))
            })?;

        if seen.insert((market.to_string(), instrument.to_string())) {
            pairs.push(SeriesPair::new(market, instrument));
        }
    }

    if pairs.is_empty() {
        return Err(CollectorError::InvalidArgument(
            "수집할 시리즈가 없습니다".to_string(),
        ));
    }
    Ok(pairs)
}

fn spot_ingestor(rt: &Runtime, interval: Interval) -> Result<TimeSeriesIngestor> {
    let settings = rt.settings().clone();
    let source = SpotOhlcvSource::new(rt.data_api().clone(), interval, settings.max_api_limit);
    Ok(TimeSeriesIngestor::new(
        Arc::new(source),
        rt.store(),
        settings,
        interval,
    )?)
}

/// 시리즈 하나를 수집합니다. `failure`면 재시도합니다.
pub async fn collect_series(rt: &Runtime, pair: &SeriesPair, interval: Interval) -> Result<RunResult> {
    let ingestor = spot_ingestor(rt, interval)?;
    let label = format!("ohlcv {} {}", pair.series_name(), interval);

    let result = run_with_retry(rt.settings(), &label, || {
        ingestor.run_with_backfill(pair.request())
    })
    .await;

    tracing::info!(
        series = %pair.series_name(),
        status = %result.status,
        processed = result.records_processed,
        inserted = result.records_inserted,
        "OHLCV 수집 결과"
    );
    Ok(result)
}

/// 여러 시리즈를 병렬 수집합니다.
///
/// `failure`로 끝난 시리즈만 모아 `max_retries`회까지 다시 실행하고,
/// 결과를 원래 순서 그대로 합칩니다.
pub async fn collect_many(
    rt: &Runtime,
    pairs: &[SeriesPair],
    interval: Interval,
) -> Result<FanOutSummary> {
    let ingestor = spot_ingestor(rt, interval)?;
    let settings = rt.settings();

    let mut summary = ingestor
        .run_for_many(pairs.iter().map(SeriesPair::request).collect())
        .await;

    let mut attempt = 0u32;
    loop {
        let failed: HashSet<String> = summary
            .outcomes
            .iter()
            .filter(|o| o.result.status == RunStatus::Failure)
            .map(|o| o.series.clone())
            .collect();
        if failed.is_empty() || attempt >= settings.max_retries {
            break;
        }

        attempt += 1;
        tracing::warn!(
            attempt,
            max_retries = settings.max_retries,
            failed = failed.len(),
            "실패한 시리즈 재시도"
        );
        tokio::time::sleep(settings.retry_delay()).await;

        let retry_pairs: Vec<&SeriesPair> = pairs
            .iter()
            .filter(|p| failed.contains(&p.series_name()))
            .collect();
        let retry = ingestor
            .run_for_many(retry_pairs.iter().map(|p| p.request()).collect())
            .await;

        let mut outcomes = summary.outcomes;
        for retried in retry.outcomes {
            if let Some(slot) = outcomes.iter_mut().find(|o| o.series == retried.series) {
                *slot = retried;
            }
        }
        summary = FanOutSummary::from_outcomes(outcomes, summary.duration + retry.duration);
    }

    Ok(summary)
}
