//! PostgreSQL 웨어하우스 저장소.
//!
//! 코어의 `RecordStore` 계약을 sqlx로 구현합니다. 테이블/컬럼 이름은
//! 소스가 제공하는 스키마에서 오므로 SQL에 넣기 전에 모두 검증합니다.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ingest_core::datetime::ensure_utc;
use ingest_core::{
    ColumnType, DatabaseSettings, IngestError, Record, RecordStore, TableBatch, Value, WriteMode,
    DATETIME_FIELD,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DataError, Result};

/// PostgreSQL 바인드 파라미터 상한.
const MAX_BIND_PARAMS: usize = 65_535;

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 새로운 데이터베이스 연결 풀을 생성합니다.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        info!("데이터베이스 연결 중...");

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("데이터베이스 연결 완료");

        Ok(Self { pool })
    }

    /// 기존 연결 풀에서 Database 인스턴스를 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 내부 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;
        Ok(true)
    }
}

/// 컬럼 타입에 맞춰 변환된 바인드 값.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Timestamp(Option<DateTime<Utc>>),
    Text(Option<String>),
    Float(Option<f64>),
    Decimal(Option<Decimal>),
    Int(Option<i64>),
    Bool(Option<bool>),
    Json(Option<serde_json::Value>),
}

fn invalid(column: &str, ty: ColumnType, value: &Value) -> DataError {
    DataError::InvalidData(format!(
        "컬럼 {}: {} 값을 {:?}로 변환할 수 없음",
        column,
        value.type_name(),
        ty
    ))
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Decimal(d) => serde_json::Value::String(d.to_string()),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Timestamp(dt) => serde_json::Value::String(dt.to_rfc3339()),
        Value::NaiveTimestamp(n) => serde_json::Value::String(n.to_string()),
        Value::Json(v) => v.clone(),
    }
}

/// 레코드 값을 스키마 컬럼 타입으로 변환합니다. 누락/Null은 타입이 있는 NULL.
fn coerce(column: &str, ty: ColumnType, value: Option<&Value>) -> Result<SqlValue> {
    let value = match value {
        None | Some(Value::Null) => {
            return Ok(match ty {
                ColumnType::Timestamp => SqlValue::Timestamp(None),
                ColumnType::Text => SqlValue::Text(None),
                ColumnType::Float => SqlValue::Float(None),
                ColumnType::Decimal => SqlValue::Decimal(None),
                ColumnType::Int => SqlValue::Int(None),
                ColumnType::Bool => SqlValue::Bool(None),
                ColumnType::Json => SqlValue::Json(None),
            })
        }
        Some(v) => v,
    };

    let coerced = match ty {
        ColumnType::Timestamp => SqlValue::Timestamp(Some(
            ensure_utc(value).ok_or_else(|| invalid(column, ty, value))?,
        )),
        ColumnType::Text => SqlValue::Text(Some(match value {
            Value::Text(s) => s.clone(),
            Value::Json(v) => v.to_string(),
            Value::Timestamp(dt) => dt.to_rfc3339(),
            other => match value_to_json(other) {
                serde_json::Value::String(s) => s,
                json => json.to_string(),
            },
        })),
        ColumnType::Float => SqlValue::Float(Some(match value {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            Value::Decimal(d) => d.to_f64().ok_or_else(|| invalid(column, ty, value))?,
            Value::Text(s) => s.trim().parse().map_err(|_| invalid(column, ty, value))?,
            _ => return Err(invalid(column, ty, value)),
        })),
        ColumnType::Decimal => SqlValue::Decimal(Some(match value {
            Value::Decimal(d) => *d,
            Value::Int(i) => Decimal::from(*i),
            Value::Float(f) => Decimal::from_f64(*f).ok_or_else(|| invalid(column, ty, value))?,
            Value::Text(s) => Decimal::from_str(s.trim()).map_err(|_| invalid(column, ty, value))?,
            _ => return Err(invalid(column, ty, value)),
        })),
        ColumnType::Int => SqlValue::Int(Some(match value {
            Value::Int(i) => *i,
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
            Value::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().ok_or_else(|| invalid(column, ty, value))?
            }
            Value::Text(s) => s.trim().parse().map_err(|_| invalid(column, ty, value))?,
            _ => return Err(invalid(column, ty, value)),
        })),
        ColumnType::Bool => SqlValue::Bool(Some(match value {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Text(s) if s.eq_ignore_ascii_case("true") => true,
            Value::Text(s) if s.eq_ignore_ascii_case("false") => false,
            _ => return Err(invalid(column, ty, value)),
        })),
        ColumnType::Json => SqlValue::Json(Some(value_to_json(value))),
    };
    Ok(coerced)
}

/// `schema.table` 형태의 식별자를 검증하고 인용합니다.
fn quote_ident(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(DataError::InvalidIdentifier(name.to_string()));
    }

    let mut quoted = Vec::with_capacity(parts.len());
    for part in parts {
        let mut chars = part.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DataError::InvalidIdentifier(name.to_string()));
        }
        quoted.push(format!("\"{}\"", part));
    }
    Ok(quoted.join("."))
}

/// `INSERT INTO ... (cols) ` 접두부.
fn insert_prefix(table: &str, columns: &[&str]) -> Result<String> {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("INSERT INTO {} ({}) ", quote_ident(table)?, cols.join(", ")))
}

/// upsert 모드의 `ON CONFLICT` 절.
fn conflict_clause(columns: &[&str], conflict: &[String]) -> Result<String> {
    let keys = conflict
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;

    let updates = columns
        .iter()
        .filter(|c| !conflict.iter().any(|k| k == *c))
        .map(|c| quote_ident(c).map(|q| format!("{q} = EXCLUDED.{q}")))
        .collect::<Result<Vec<_>>>()?;

    if updates.is_empty() {
        Ok(format!(" ON CONFLICT ({}) DO NOTHING", keys.join(", ")))
    } else {
        Ok(format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            keys.join(", "),
            updates.join(", ")
        ))
    }
}

/// 같은 충돌 키를 가진 레코드는 마지막 것만 남깁니다 (순서 유지).
///
/// 한 INSERT 문 안에서 같은 키가 두 번 나오면 PostgreSQL이 거부합니다.
fn dedupe_by_key<'a>(records: &'a [Record], conflict: &[String]) -> Vec<&'a Record> {
    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        let key = format!("{:?}", record.key_of(conflict));
        last_index.insert(key, idx);
    }

    records
        .iter()
        .enumerate()
        .filter(|(idx, record)| {
            let key = format!("{:?}", record.key_of(conflict));
            last_index.get(&key) == Some(idx)
        })
        .map(|(_, record)| record)
        .collect()
}

/// PostgreSQL 웨어하우스 저장소.
#[derive(Clone)]
pub struct PgWarehouse {
    db: Database,
    batch_size: usize,
}

impl PgWarehouse {
    pub fn new(db: Database, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn query_watermark(
        &self,
        table: &str,
        filters: &[(String, Value)],
    ) -> Result<Option<DateTime<Utc>>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(DATETIME_FIELD)?,
            quote_ident(table)?
        ));

        for (idx, (column, value)) in filters.iter().enumerate() {
            qb.push(if idx == 0 { " WHERE " } else { " AND " });
            qb.push(quote_ident(column)?);
            qb.push(" = ");
            match value {
                Value::Text(s) => qb.push_bind(s.clone()),
                Value::Int(i) => qb.push_bind(*i),
                Value::Bool(b) => qb.push_bind(*b),
                Value::Float(f) => qb.push_bind(*f),
                Value::Decimal(d) => qb.push_bind(*d),
                Value::Timestamp(dt) => qb.push_bind(*dt),
                Value::NaiveTimestamp(n) => qb.push_bind(Utc.from_utc_datetime(n)),
                other => {
                    return Err(DataError::InvalidData(format!(
                        "워터마크 필터 {}: 지원하지 않는 타입 {}",
                        column,
                        other.type_name()
                    )))
                }
            };
        }

        let watermark: Option<DateTime<Utc>> = qb
            .build_query_scalar()
            .fetch_one(self.db.pool())
            .await?;
        Ok(watermark)
    }

    async fn write_batch(&self, batch: &TableBatch) -> Result<u64> {
        let columns: Vec<&str> = batch
            .schema
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        if columns.is_empty() {
            return Err(DataError::InvalidData(format!("{}: 빈 스키마", batch.table)));
        }

        let upsert = batch.mode == WriteMode::Upsert && !batch.conflict_columns.is_empty();
        let records: Vec<&Record> = if upsert {
            dedupe_by_key(&batch.records, &batch.conflict_columns)
        } else {
            batch.records.iter().collect()
        };

        let prefix = insert_prefix(&batch.table, &columns)?;
        let suffix = if upsert {
            conflict_clause(&columns, &batch.conflict_columns)?
        } else {
            String::new()
        };

        // 타입 변환을 먼저 끝내서 잘못된 값이 있으면 트랜잭션을 열지 않습니다.
        let rows = records
            .iter()
            .map(|record| {
                batch
                    .schema
                    .columns()
                    .iter()
                    .map(|col| coerce(&col.name, col.ty, record.get(&col.name)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let chunk_size = self.batch_size.min(MAX_BIND_PARAMS / columns.len()).max(1);
        let mut affected = 0u64;
        let mut tx = self.db.pool().begin().await?;

        for chunk in rows.chunks(chunk_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            qb.push_values(chunk.iter().cloned(), |mut b, row| {
                for value in row {
                    match value {
                        SqlValue::Timestamp(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Text(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Float(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Decimal(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Int(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Bool(v) => {
                            b.push_bind(v);
                        }
                        SqlValue::Json(v) => {
                            b.push_bind(v);
                        }
                    }
                }
            });
            qb.push(&suffix);

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::InsertError(format!("{}: {}", batch.table, e)))?;
            affected += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            table = %batch.table,
            rows = rows.len(),
            affected,
            chunk_size,
            mode = ?batch.mode,
            "배치 저장 완료"
        );
        Ok(affected)
    }
}

#[async_trait]
impl RecordStore for PgWarehouse {
    async fn read_watermark(
        &self,
        table: &str,
        filters: &[(String, Value)],
    ) -> ingest_core::Result<Option<DateTime<Utc>>> {
        self.query_watermark(table, filters)
            .await
            .map_err(|e| IngestError::Watermark(e.to_string()))
    }

    async fn insert_batch(&self, batch: &TableBatch) -> ingest_core::Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.write_batch(batch)
            .await
            .map_err(|e| IngestError::Insert(e.to_string()))
    }
}
