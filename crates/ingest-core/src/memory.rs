//! 인메모리 저장소.
//!
//! dry-run 모드와 테스트에서 웨어하우스 대신 사용합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::source::{RecordStore, TableBatch, WriteMode};
use crate::types::{Record, Value};

/// 테이블별 레코드를 메모리에 보관하는 저장소.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 테이블에 레코드를 미리 채웁니다 (워터마크 준비용).
    pub async fn seed(&self, table: &str, records: Vec<Record>) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(records);
    }

    /// 테이블의 모든 레코드 복사본.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Vec::len)
    }

    /// 저장된 테이블 이름 (정렬됨).
    pub async fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

fn matches_filters(record: &Record, filters: &[(String, Value)]) -> bool {
    filters
        .iter()
        .all(|(column, expected)| record.get(column) == Some(expected))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read_watermark(
        &self,
        table: &str,
        filters: &[(String, Value)],
    ) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.read().await;
        let watermark = tables.get(table).and_then(|rows| {
            rows.iter()
                .filter(|r| matches_filters(r, filters))
                .filter_map(Record::timestamp)
                .max()
        });
        Ok(watermark)
    }

    async fn insert_batch(&self, batch: &TableBatch) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(batch.table.clone()).or_default();

        for record in &batch.records {
            if batch.mode == WriteMode::Upsert && !batch.conflict_columns.is_empty() {
                let key = record.key_of(&batch.conflict_columns);
                if let Some(existing) = rows
                    .iter_mut()
                    .find(|r| r.key_of(&batch.conflict_columns) == key)
                {
                    *existing = record.clone();
                    continue;
                }
            }
            rows.push(record.clone());
        }

        tracing::debug!(table = %batch.table, rows = batch.len(), "메모리 저장소 반영");
        Ok(batch.len() as u64)
    }
}
