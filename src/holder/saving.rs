//! The saving future: the most advanced unit known for a holder

use crate::chunk::{advancement, ChunkRef};
use crate::holder::promise::Promise;
use crate::holder::status::StageResult;

/// Folds every requested future into the best unit seen so far.
///
/// Each fold waits for both the previous saving future and the new result, so
/// a save requested later always observes every result folded before it.
/// Unloaded or failed results leave the previous unit in place.
#[derive(Debug, Clone)]
pub struct SavingFuture {
    current: Promise<Option<ChunkRef>>,
}

impl SavingFuture {
    pub fn new() -> Self {
        Self {
            current: Promise::completed(None),
        }
    }

    /// Combine `result` into the saving future
    pub fn fold(&mut self, result: &Promise<StageResult>) {
        self.current = self.current.combine(result, |previous, result| match result {
            StageResult::Loaded(unit) => Some(more_advanced(previous.as_ref(), unit)),
            StageResult::Unloaded => previous.clone(),
        });
    }

    /// Handle to hand to a writer
    pub fn promise(&self) -> Promise<Option<ChunkRef>> {
        self.current.clone()
    }

    /// Best unit, if the future has resolved and one is known
    pub fn peek(&self) -> Option<ChunkRef> {
        self.current.peek().flatten()
    }

    pub fn is_done(&self) -> bool {
        self.current.is_done()
    }
}

impl Default for SavingFuture {
    fn default() -> Self {
        Self::new()
    }
}

fn more_advanced(previous: Option<&ChunkRef>, candidate: &ChunkRef) -> ChunkRef {
    match previous {
        Some(previous) if advancement(previous) > advancement(candidate) => previous.clone(),
        _ => candidate.clone(),
    }
}
