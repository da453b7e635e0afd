pub mod script;
pub mod types;

use crate::item::{ItemOutcome, WorkItem};
use anyhow::Result;

pub use script::{ScriptProcessor, ScriptProcessorFactory};
pub use types::{ExtractIn, ExtractOut, ExtractorDiag};

/// Per-item transformation invoked by the worker pool.
///
/// Implementations report every failure through [`ItemOutcome::Failure`];
/// a panic is still caught by the worker and recorded the same way.
pub trait ItemProcessor {
    fn process(&mut self, item: &WorkItem) -> ItemOutcome;
}

impl<F> ItemProcessor for F
where
    F: FnMut(&WorkItem) -> ItemOutcome,
{
    fn process(&mut self, item: &WorkItem) -> ItemOutcome {
        self(item)
    }
}

/// Builds a fresh processor for every item, so no mutable state is shared
/// between invocations. Shared across worker threads by reference.
pub trait ProcessorFactory: Sync {
    type Processor: ItemProcessor;

    fn create(&self) -> Result<Self::Processor>;
}

impl<F, P> ProcessorFactory for F
where
    F: Fn() -> P + Sync,
    P: ItemProcessor,
{
    type Processor = P;

    fn create(&self) -> Result<P> {
        Ok(self())
    }
}
