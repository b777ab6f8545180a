//! 거래소, 자산 메타데이터 수집.

use std::sync::Arc;

use ingest_core::{IngestionRequest, MetadataIngestor, MetadataRunResult, RecordSource};
use ingest_data::{AssetMetadataSource, ExchangeMetadataSource};

use super::retry::run_with_retry;
use super::runtime::Runtime;
use crate::error::Result;

async fn run_metadata(
    rt: &Runtime,
    source: Arc<dyn RecordSource>,
    request: IngestionRequest,
) -> Result<MetadataRunResult> {
    let name = source.name().to_string();
    let ingestor = MetadataIngestor::new(source, rt.store(), rt.settings().clone())?;

    let result = run_with_retry(rt.settings(), &name, || ingestor.run(request.clone())).await;

    tracing::info!(
        source = %name,
        status = %result.run.status,
        processed = result.run.records_processed,
        inserted = result.run.records_inserted,
        full_refresh = result.full_refresh,
        "메타데이터 수집 결과"
    );
    Ok(result)
}

/// 거래소 일반 정보를 수집합니다.
pub async fn collect_exchanges(rt: &Runtime) -> Result<MetadataRunResult> {
    let source = ExchangeMetadataSource::new(rt.min_api().clone());
    run_metadata(rt, Arc::new(source), IngestionRequest::default()).await
}

/// 자산 목록을 수집합니다. 인자가 없으면 소스 기본값(100건, 전체 페이지)을 사용합니다.
pub async fn collect_assets(
    rt: &Runtime,
    page_size: Option<u32>,
    max_pages: Option<u32>,
) -> Result<MetadataRunResult> {
    let mut source = AssetMetadataSource::new(rt.data_api().clone()).with_max_pages(max_pages);
    if let Some(page_size) = page_size {
        source = source.with_page_size(page_size);
    }
    run_metadata(rt, Arc::new(source), IngestionRequest::default()).await
}
