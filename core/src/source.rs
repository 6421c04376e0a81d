//! Input-side collaborators: host probing and dataset loading.

use async_trait::async_trait;

use crate::error::{DatasetError, ProbeError};
use crate::model::{DatasetRef, ProbeReport, Record};

#[async_trait]
pub trait HostProber: Send + Sync {
    /// Probe one address and report its open ports.
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError>;
}

/// One dataset row; `Err` marks a row that could not be read as a record.
pub type RecordRow = Result<Record, DatasetError>;

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Load every row behind `reference`, in source order.
    ///
    /// The outer `Err` is for datasets that cannot be read at all. A bad row
    /// does not stop the load.
    async fn load(&self, reference: &DatasetRef) -> Result<Vec<RecordRow>, DatasetError>;
}
