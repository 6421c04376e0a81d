//! Scan orchestration: runs jobs through the dataset and host phases,
//! persists their results and fans progress out to subscribers.

mod error;
pub mod orchestrator;
pub mod progress;
pub mod publisher;

pub use error::EngineError;
pub use orchestrator::{EngineConfig, JobOutcome, ScanHandle, ScanOrchestrator};
pub use publisher::{ProgressPublisher, SubscriberId, Subscription};
