pub mod config;
pub mod error;
pub mod query;
pub mod ranking;
pub mod storage;
pub mod types;
