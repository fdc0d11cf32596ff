//! Promotion ingestion pipeline: format detection, row mapping, identity
//! resolution, batch reconciliation and the per-file run loop.

pub mod fields;
pub mod format;
pub mod items;
pub mod mapper;
pub mod reconcile;
pub mod resolve;
pub mod runner;

pub use format::PromoFormat;
pub use mapper::{FileBatch, HeaderDraft, SkipCounters};
pub use runner::{PromoRunner, RunSummary};
