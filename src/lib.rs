//! stagedb - staged SELECT execution over pull-based block streams
//!
//! A query tree is planned by `SelectInterpreter` into a chain of
//! `BlockStream`s that stops at a requested processing stage, so partial
//! results from several sources can be merged and finished elsewhere.

pub mod analysis;
pub mod block;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod interpreter;
pub mod observability;
pub mod query;
pub mod set;
pub mod storage;
pub mod stream;
