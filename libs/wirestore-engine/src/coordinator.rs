use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use wirestore_api::{ErrorKind, IdentifierSanitizer, StoreError, WireRecord};

use crate::options::StoreOptions;
use crate::reconciler::SchemaReconciler;
use crate::writer::RecordWriter;

/// Reconciliation passes allowed per record before it is abandoned.
pub const MAX_RECONCILE_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Stored { attempts: u32 },
    Abandoned { attempts: u32, error: StoreError },
}

impl WriteOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, WriteOutcome::Stored { .. })
    }
}

/// Epoch-millisecond timestamps, strictly increasing per instance.
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: AtomicI64,
}

impl TimestampClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Writes a record, reconciling the schema and retrying on failure.
pub struct WriteCoordinator {
    writer: RecordWriter,
    reconciler: SchemaReconciler,
    sanitizer: Arc<dyn IdentifierSanitizer>,
    clock: TimestampClock,
}

impl WriteCoordinator {
    pub fn new(
        writer: RecordWriter,
        reconciler: SchemaReconciler,
        sanitizer: Arc<dyn IdentifierSanitizer>,
    ) -> Self {
        Self {
            writer,
            reconciler,
            sanitizer,
            clock: TimestampClock::new(),
        }
    }

    /// Persist one record. Never fails; the outcome says what happened.
    pub fn write(&self, options: &StoreOptions, record: &WireRecord) -> WriteOutcome {
        let table = match options.qualified_table(self.sanitizer.as_ref()) {
            Ok(t) => t,
            Err(error) => {
                tracing::error!(error = %error, "record not stored");
                return WriteOutcome::Abandoned { attempts: 0, error };
            }
        };

        let mut attempts = 0;
        let mut retries = 0;
        loop {
            attempts += 1;
            let error = match self.writer.insert(&table, record, self.clock.next()) {
                Ok(()) => {
                    tracing::debug!(table = %table, attempts, "record stored");
                    return WriteOutcome::Stored { attempts };
                }
                Err(e) => e,
            };

            if error.kind() == ErrorKind::Precondition {
                tracing::error!(table = %table, error = %error, "record not stored");
                return WriteOutcome::Abandoned { attempts, error };
            }
            if retries >= MAX_RECONCILE_RETRIES {
                tracing::error!(
                    table = %table,
                    attempts,
                    error = %error,
                    "insert failed, retries exhausted, record abandoned"
                );
                return WriteOutcome::Abandoned { attempts, error };
            }

            tracing::debug!(table = %table, error = %error, "insert failed, reconciling schema");
            if let Err(e) = self.reconciler.reconcile(&table, record) {
                tracing::error!(
                    table = %table,
                    error = %e,
                    "schema reconciliation failed, record abandoned"
                );
                return WriteOutcome::Abandoned { attempts, error: e };
            }
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirestore_api::{ConnectionProvider, DefaultTypeMapper, SqlIdentifierSanitizer, TypedValue};
    use wirestore_storage_memory::MemoryDatabase;

    fn coordinator(db: &MemoryDatabase) -> WriteCoordinator {
        let sanitizer: Arc<dyn IdentifierSanitizer> = Arc::new(SqlIdentifierSanitizer);
        WriteCoordinator::new(
            RecordWriter::new(Arc::new(db.clone()), sanitizer.clone()),
            SchemaReconciler::new(
                Arc::new(db.clone()),
                Arc::new(DefaultTypeMapper),
                sanitizer.clone(),
            ),
            sanitizer,
        )
    }

    fn outcome_attempts(o: &WriteOutcome) -> u32 {
        match o {
            WriteOutcome::Stored { attempts } | WriteOutcome::Abandoned { attempts, .. } => {
                *attempts
            }
        }
    }

    #[test]
    fn clock_is_strictly_monotonic() {
        let clock = TimestampClock::new();
        let mut prev = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn first_record_creates_table_on_second_attempt() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        let options = StoreOptions::new("sensor");
        let record = WireRecord::from_pairs([("temperature", 21.5f64)]).unwrap();

        let outcome = c.write(&options, &record);
        assert!(outcome.is_stored());
        assert_eq!(outcome_attempts(&outcome), 2);

        let outcome = c.write(&options, &record);
        assert_eq!(outcome_attempts(&outcome), 1);
        assert_eq!(db.row_count("WR_sensor"), Some(2));
    }

    #[test]
    fn type_drift_loses_old_values() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        let options = StoreOptions::new("t");

        let int = WireRecord::from_pairs([("x", 1i32)]).unwrap();
        let text = WireRecord::from_pairs([("x", "one")]).unwrap();
        assert!(c.write(&options, &int).is_stored());
        assert!(c.write(&options, &text).is_stored());

        let snap = db.snapshot("WR_t").unwrap();
        assert_eq!(snap.rows.len(), 2);
        assert_eq!(snap.value(0, "x"), Some(None));
        assert_eq!(snap.value(1, "x"), Some(Some(&TypedValue::from("one"))));
    }

    #[test]
    fn abandons_after_three_attempts() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        let options = StoreOptions::new("t");
        let record = WireRecord::from_pairs([("x", 1i32)]).unwrap();
        assert!(c.write(&options, &record).is_stored());

        db.fail_next("INSERT", 3);
        let outcome = c.write(&options, &record);
        assert!(!outcome.is_stored());
        assert_eq!(outcome_attempts(&outcome), 3);
        assert_eq!(db.row_count("WR_t"), Some(1));
        assert_eq!(db.open_connections(), 0);

        assert!(c.write(&options, &record).is_stored());
    }

    #[test]
    fn transient_failure_recovers_within_bound() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        let options = StoreOptions::new("t");
        let record = WireRecord::from_pairs([("x", 1i32)]).unwrap();
        assert!(c.write(&options, &record).is_stored());

        db.fail_next("INSERT", 2);
        let outcome = c.write(&options, &record);
        assert!(outcome.is_stored());
        assert_eq!(outcome_attempts(&outcome), 3);
    }

    #[test]
    fn reconciliation_failure_abandons_record() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        db.fail_next("CREATE", 1);
        let record = WireRecord::from_pairs([("x", 1i32)]).unwrap();
        let outcome = c.write(&StoreOptions::new("t"), &record);
        assert_eq!(outcome_attempts(&outcome), 1);
        assert!(db.snapshot("WR_t").is_none());
    }

    #[test]
    fn blank_table_name_fails_before_io() {
        let db = MemoryDatabase::default();
        let c = coordinator(&db);
        db.fail_next("CONNECT", 1);
        let record = WireRecord::from_pairs([("x", 1i32)]).unwrap();
        match c.write(&StoreOptions::new(" "), &record) {
            WriteOutcome::Abandoned { attempts, error } => {
                assert_eq!(attempts, 0);
                assert_eq!(error.kind(), ErrorKind::Precondition);
            }
            other => panic!("unexpected {other:?}"),
        }
        // The injected connection failure is still pending: no I/O happened.
        assert!(db.connection().is_err());
    }
}
