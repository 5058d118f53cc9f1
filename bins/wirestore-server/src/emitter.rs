use std::io::Write;

use wirestore_api::{RecordEmitter, StoreError, WireRecord};

/// Writes each forwarded batch to stdout as one JSON array per line.
pub struct StdoutEmitter;

impl RecordEmitter for StdoutEmitter {
    fn emit(&self, records: &[WireRecord]) -> Result<(), StoreError> {
        let line = serde_json::to_string(records)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
