pub mod aggregate;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod inputs;
pub mod item;
pub mod processor;
pub mod progress;
pub mod report;
pub mod util;

pub use aggregate::ResultAggregator;
pub use coordinator::{BatchCoordinator, BatchOptions, StopFlag};
pub use error::{Artifact, BatchError};
pub use item::{ItemOutcome, ResultRecord, WorkItem};
pub use processor::{ItemProcessor, ProcessorFactory};
pub use progress::{ProgressState, ProgressStore};
pub use report::{FailedItem, RunStatistics};
