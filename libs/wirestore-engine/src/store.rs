use std::sync::{Arc, Mutex, RwLock};

use wirestore_api::{
    ConnectionProvider, DefaultTypeMapper, IdentifierSanitizer, RecordEmitter,
    SqlIdentifierSanitizer, TypeMapper, WireRecord,
};

use crate::coordinator::{WriteCoordinator, WriteOutcome};
use crate::error::EngineError;
use crate::options::StoreOptions;
use crate::reconciler::SchemaReconciler;
use crate::retention::{RetentionPlan, RetentionScheduler};
use crate::writer::RecordWriter;

/// Result of one `deliver` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub stored: usize,
    pub abandoned: usize,
}

/// Record sink: persists each inbound batch, then forwards it downstream.
///
/// Storage is best effort, forwarding is guaranteed. Batches are handled
/// one at a time. Retention runs in the background on the tokio runtime
/// the store was activated on.
pub struct RecordStore {
    options: RwLock<Arc<StoreOptions>>,
    coordinator: WriteCoordinator,
    sanitizer: Arc<dyn IdentifierSanitizer>,
    emitter: Arc<dyn RecordEmitter>,
    scheduler: RetentionScheduler,
    receipt: Mutex<()>,
    reconfigure: Mutex<()>,
}

impl RecordStore {
    /// Build a store with the default type mapper and sanitizer and arm
    /// retention. Must be called within a tokio runtime.
    pub fn activate(
        options: StoreOptions,
        provider: Arc<dyn ConnectionProvider>,
        emitter: Arc<dyn RecordEmitter>,
    ) -> Result<Self, EngineError> {
        Self::activate_with(
            options,
            provider,
            emitter,
            Arc::new(DefaultTypeMapper),
            Arc::new(SqlIdentifierSanitizer),
        )
    }

    pub fn activate_with(
        options: StoreOptions,
        provider: Arc<dyn ConnectionProvider>,
        emitter: Arc<dyn RecordEmitter>,
        mapper: Arc<dyn TypeMapper>,
        sanitizer: Arc<dyn IdentifierSanitizer>,
    ) -> Result<Self, EngineError> {
        let coordinator = WriteCoordinator::new(
            RecordWriter::new(provider.clone(), sanitizer.clone()),
            SchemaReconciler::new(provider.clone(), mapper, sanitizer.clone()),
            sanitizer.clone(),
        );
        let store = Self {
            options: RwLock::new(Arc::new(options)),
            coordinator,
            sanitizer,
            emitter,
            scheduler: RetentionScheduler::new(provider)?,
            receipt: Mutex::new(()),
            reconfigure: Mutex::new(()),
        };
        let options = store.options();
        tracing::info!(
            table = %options.table_name,
            prefix = %options.table_prefix,
            cleanup_rate_secs = options.cleanup_rate.as_secs(),
            records_to_keep = options.records_to_keep,
            schedule = %options.cleanup_schedule,
            "record store activated"
        );
        store.schedule_retention(&options)?;
        Ok(store)
    }

    /// Current options snapshot.
    pub fn options(&self) -> Arc<StoreOptions> {
        match self.options.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => {
                tracing::warn!("options lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    /// Re-arm retention with new options, then make them current.
    ///
    /// If retention cannot be armed the previous options stay in effect.
    pub fn update(&self, options: StoreOptions) -> Result<(), EngineError> {
        let _reconfigure = match self.reconfigure.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("reconfigure lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        self.schedule_retention(&options)?;

        let options = Arc::new(options);
        match self.options.write() {
            Ok(mut g) => *g = options.clone(),
            Err(poisoned) => {
                tracing::warn!("options lock was poisoned, recovering");
                *poisoned.into_inner() = options.clone();
            }
        }
        tracing::info!(
            table = %options.table_name,
            cleanup_rate_secs = options.cleanup_rate.as_secs(),
            records_to_keep = options.records_to_keep,
            schedule = %options.cleanup_schedule,
            "record store options updated"
        );
        Ok(())
    }

    /// Stop retention and wait for a run in progress to finish.
    /// `deliver` keeps working afterwards.
    pub async fn deactivate(&self) {
        self.scheduler.shutdown().await;
        tracing::info!("record store deactivated");
    }

    /// Persist every record, then forward the whole batch once.
    pub fn deliver(&self, records: &[WireRecord]) -> DeliveryReport {
        let _receipt = match self.receipt.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut report = DeliveryReport::default();
        for record in records {
            let options = self.options();
            match self.coordinator.write(&options, record) {
                WriteOutcome::Stored { .. } => report.stored += 1,
                WriteOutcome::Abandoned { .. } => report.abandoned += 1,
            }
        }
        if !records.is_empty() {
            tracing::info!(
                stored = report.stored,
                abandoned = report.abandoned,
                "stored {} of {} records",
                report.stored,
                records.len()
            );
        }

        if let Err(e) = self.emitter.emit(records) {
            tracing::error!(error = %e, "failed to forward records");
        }
        report
    }

    fn schedule_retention(&self, options: &StoreOptions) -> Result<(), EngineError> {
        let plan = RetentionPlan::from_options(options, self.sanitizer.as_ref());
        self.scheduler.arm(plan)
    }
}
