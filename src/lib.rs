pub mod storage;
pub mod index;
pub mod sql;
pub mod engine;
pub mod error;
