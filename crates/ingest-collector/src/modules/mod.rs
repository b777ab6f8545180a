//! 수집 모듈.

pub mod metadata;
pub mod ohlcv;
pub mod retry;
pub mod runtime;

pub use metadata::{collect_assets, collect_exchanges};
pub use ohlcv::{collect_many, collect_series, parse_pairs, SeriesPair};
pub use retry::{run_with_retry, RunOutcome};
pub use runtime::{Runtime, StoreBackend};
