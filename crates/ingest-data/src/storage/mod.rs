//! 데이터 저장소.

pub mod postgres;
