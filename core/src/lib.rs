//! Core types and pure transforms for the riskscan engine.

pub mod classify;
pub mod error;
pub mod features;
pub mod model;
pub mod ratelimiter;
pub mod recommend;
pub mod report;
pub mod source;
pub mod store;
pub mod targets;

pub use classify::{HeuristicModel, Prediction, RandomModel, RiskClassifier, RiskModel};
pub use error::{ClassifyError, DatasetError, ProbeError, StoreError};
pub use model::*;
pub use recommend::{recommend, RiskBand};
pub use source::{DatasetSource, HostProber, RecordRow};
pub use store::ScanStore;

use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Wall clock in unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
