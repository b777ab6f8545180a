//! 파이프라인 전반에서 사용하는 기본 타입.

pub mod interval;
pub mod record;
pub mod request;
pub mod result;
pub mod schema;

pub use interval::Interval;
pub use record::{Record, Value, DATETIME_FIELD};
pub use request::{IngestionRequest, SeriesKey};
pub use result::{RunResult, RunStage, RunStatus};
pub use schema::{Column, ColumnType, TableSchema};
