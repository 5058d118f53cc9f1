pub mod config;
pub mod coordinator;
pub mod error;
pub mod options;
pub mod params;
pub mod reconciler;
pub mod retention;
pub mod sql;
pub mod store;
pub mod writer;

pub use config::StoreConfig;
pub use coordinator::{WriteCoordinator, WriteOutcome};
pub use error::EngineError;
pub use options::{CleanupSchedule, StoreOptions};
pub use reconciler::{SchemaChange, SchemaReconciler};
pub use retention::{RetentionAction, RetentionPlan, RetentionScheduler};
pub use store::{DeliveryReport, RecordStore};
pub use writer::RecordWriter;
