use std::sync::Mutex;

use crate::error::StoreError;
use crate::record::WireRecord;

/// Downstream link. Receives every inbound batch once, after the store
/// attempted to persist it.
pub trait RecordEmitter: Send + Sync {
    fn emit(&self, records: &[WireRecord]) -> Result<(), StoreError>;
}

/// Emitter with no downstream consumers.
#[derive(Debug, Default)]
pub struct NullEmitter;

impl RecordEmitter for NullEmitter {
    fn emit(&self, _records: &[WireRecord]) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Keeps every emitted batch in memory. Useful for wiring tests and
/// for in-process consumers that poll.
#[derive(Debug, Default)]
pub struct CollectingEmitter {
    batches: Mutex<Vec<Vec<WireRecord>>>,
}

impl CollectingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches emitted so far, in emission order.
    pub fn batches(&self) -> Vec<Vec<WireRecord>> {
        match self.batches.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RecordEmitter for CollectingEmitter {
    fn emit(&self, records: &[WireRecord]) -> Result<(), StoreError> {
        let mut guard = self
            .batches
            .lock()
            .map_err(|_| StoreError::logic("collecting emitter lock poisoned"))?;
        guard.push(records.to_vec());
        Ok(())
    }
}
