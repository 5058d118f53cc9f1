//! Background retention: trims the table after a delay.
//!
//! At most one arming is live at a time. Re-arming cancels the pending
//! wait of the previous arming; a run already talking to the database
//! finishes on its own and is drained at shutdown.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wirestore_api::{ConnectionProvider, IdentifierSanitizer, StoreError};

use crate::error::EngineError;
use crate::options::{CleanupSchedule, StoreOptions};
use crate::sql;

/// What one retention run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    /// Table does not exist yet.
    Skipped,
    Truncated,
    /// Rows removed by `DELETE ... LIMIT`.
    Deleted(u64),
}

/// Snapshot of what an arming will do, captured at arm time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    pub table: String,
    pub records_to_keep: u64,
    pub delay: Duration,
    pub recurring: bool,
}

impl RetentionPlan {
    /// `None` when retention is disabled or no valid table is configured.
    pub fn from_options(
        options: &StoreOptions,
        sanitizer: &dyn IdentifierSanitizer,
    ) -> Option<Self> {
        if options.cleanup_rate.is_zero() {
            return None;
        }
        let table = match options.qualified_table(sanitizer) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "retention not scheduled");
                return None;
            }
        };
        Some(Self {
            table,
            records_to_keep: options.records_to_keep,
            delay: options.cleanup_rate,
            recurring: options.cleanup_schedule == CleanupSchedule::Recurring,
        })
    }
}

/// One retention run against the live table, on its own connection.
///
/// `records_to_keep == 0` truncates. Otherwise at most that many rows are
/// deleted, in no particular order.
pub fn run_retention(
    provider: &dyn ConnectionProvider,
    table: &str,
    records_to_keep: u64,
) -> Result<RetentionAction, StoreError> {
    let mut conn = provider.connection()?;
    if !conn.table_exists(table)? {
        tracing::debug!(table = %table, "retention: table does not exist");
        return Ok(RetentionAction::Skipped);
    }
    if records_to_keep == 0 {
        conn.execute(&sql::truncate(table))?;
        tracing::info!(table = %table, "table truncated");
        Ok(RetentionAction::Truncated)
    } else {
        let removed = conn.execute(&sql::delete_limit(table, records_to_keep))?;
        tracing::info!(table = %table, removed, "old records deleted");
        Ok(RetentionAction::Deleted(removed))
    }
}

struct Armed {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    current: Option<Armed>,
    /// Superseded armings that may still be finishing a run.
    draining: Vec<JoinHandle<()>>,
    shut_down: bool,
}

/// Single timer driving retention runs.
pub struct RetentionScheduler {
    provider: Arc<dyn ConnectionProvider>,
    runtime: Handle,
    state: Mutex<SchedulerState>,
}

impl RetentionScheduler {
    /// Must be called from within a tokio runtime; timers are spawned on it.
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Result<Self, EngineError> {
        let runtime = Handle::try_current()
            .map_err(|e| EngineError::Config(format!("retention needs a tokio runtime: {e}")))?;
        Ok(Self {
            provider,
            runtime,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    /// Cancel any pending wait and arm `plan`. `None` only cancels.
    pub fn arm(&self, plan: Option<RetentionPlan>) -> Result<(), EngineError> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(EngineError::ShutDown);
        }
        if let Some(prev) = state.current.take() {
            prev.token.cancel();
            state.draining.push(prev.handle);
        }
        state.draining.retain(|h| !h.is_finished());

        let Some(plan) = plan else {
            tracing::debug!("retention disarmed");
            return Ok(());
        };
        tracing::debug!(
            table = %plan.table,
            delay_ms = delay_millis(plan.delay),
            records_to_keep = plan.records_to_keep,
            recurring = plan.recurring,
            "retention armed"
        );
        let token = CancellationToken::new();
        let handle = self
            .runtime
            .spawn(retention_task(self.provider.clone(), plan, token.clone()));
        state.current = Some(Armed { token, handle });
        Ok(())
    }

    pub fn disarm(&self) {
        let mut state = self.lock_state();
        if let Some(prev) = state.current.take() {
            prev.token.cancel();
            state.draining.push(prev.handle);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock_state()
            .current
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// Cancel, wait for every run to finish, and refuse further arming.
    pub async fn shutdown(&self) {
        let handles = {
            let mut state = self.lock_state();
            state.shut_down = true;
            let mut handles = std::mem::take(&mut state.draining);
            if let Some(armed) = state.current.take() {
                armed.token.cancel();
                handles.push(armed.handle);
            }
            handles
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "retention task failed");
            }
        }
        tracing::debug!("retention scheduler stopped");
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("retention state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Whole milliseconds in `delay`, saturating at `u64::MAX`.
fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

async fn retention_task(
    provider: Arc<dyn ConnectionProvider>,
    plan: RetentionPlan,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(plan.delay) => {}
        }

        let provider = provider.clone();
        let table = plan.table.clone();
        let keep = plan.records_to_keep;
        let run = tokio::task::spawn_blocking(move || {
            run_retention(provider.as_ref(), &table, keep)
        })
        .await;
        match run {
            Ok(Ok(action)) => tracing::debug!(table = %plan.table, ?action, "retention run finished"),
            Ok(Err(e)) => tracing::error!(table = %plan.table, error = %e, "retention run failed"),
            Err(e) => tracing::error!(table = %plan.table, error = %e, "retention run panicked"),
        }

        if !plan.recurring || token.is_cancelled() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirestore_api::{SqlIdentifierSanitizer, SqlParam};
    use wirestore_storage_memory::MemoryDatabase;

    fn table_with_rows(db: &MemoryDatabase, n: i64) {
        let mut conn = db.connection().unwrap();
        conn.execute(&sql::create_table("t")).unwrap();
        for ts in 0..n {
            conn.execute_with(&sql::insert("t", &["TIMESTAMP"]), &[SqlParam::BigInt(ts)])
                .unwrap();
        }
        conn.commit().unwrap();
    }

    fn plan(keep: u64, delay_ms: u64, recurring: bool) -> Option<RetentionPlan> {
        Some(RetentionPlan {
            table: "t".into(),
            records_to_keep: keep,
            delay: Duration::from_millis(delay_ms),
            recurring,
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[test]
    fn run_retention_truncates_or_caps() {
        let db = MemoryDatabase::default();
        assert_eq!(run_retention(&db, "t", 0).unwrap(), RetentionAction::Skipped);

        table_with_rows(&db, 5);
        assert_eq!(run_retention(&db, "t", 2).unwrap(), RetentionAction::Deleted(2));
        assert_eq!(db.row_count("t"), Some(3));
        assert_eq!(run_retention(&db, "t", 10).unwrap(), RetentionAction::Deleted(3));

        table_with_rows(&db, 0);
        assert_eq!(run_retention(&db, "t", 0).unwrap(), RetentionAction::Truncated);
        assert_eq!(db.snapshot("t").unwrap().column_names(), ["TIMESTAMP"]);
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn delay_millis_saturates() {
        assert_eq!(delay_millis(Duration::from_secs(900)), 900_000);
        assert_eq!(delay_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn plan_follows_options() {
        let s = SqlIdentifierSanitizer;
        let options = StoreOptions::new("sensor").with_cleanup_rate(Duration::from_secs(5));
        let p = RetentionPlan::from_options(&options, &s).unwrap();
        assert_eq!(p.table, "WR_sensor");
        assert!(!p.recurring);

        let disabled = options.clone().with_cleanup_rate(Duration::ZERO);
        assert!(RetentionPlan::from_options(&disabled, &s).is_none());
        assert!(RetentionPlan::from_options(&StoreOptions::new(""), &s).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_shot_fires_once() {
        let db = MemoryDatabase::default();
        table_with_rows(&db, 5);
        let scheduler = RetentionScheduler::new(Arc::new(db.clone())).unwrap();

        scheduler.arm(plan(2, 20, false)).unwrap();
        settle().await;
        assert_eq!(db.row_count("t"), Some(3));
        settle().await;
        assert_eq!(db.row_count("t"), Some(3));
        assert!(!scheduler.is_armed());
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn recurring_keeps_firing() {
        let db = MemoryDatabase::default();
        table_with_rows(&db, 100);
        let scheduler = RetentionScheduler::new(Arc::new(db.clone())).unwrap();

        scheduler.arm(plan(1, 10, true)).unwrap();
        settle().await;
        let remaining = db.row_count("t").unwrap();
        assert!(remaining <= 98, "only {} rows removed", 100 - remaining);
        assert!(scheduler.is_armed());
        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rearming_cancels_pending_wait() {
        let db = MemoryDatabase::default();
        table_with_rows(&db, 5);
        let scheduler = RetentionScheduler::new(Arc::new(db.clone())).unwrap();

        scheduler.arm(plan(0, 60_000, false)).unwrap();
        scheduler.arm(plan(1, 20, false)).unwrap();
        settle().await;
        assert_eq!(db.row_count("t"), Some(4));

        scheduler.arm(plan(0, 60_000, false)).unwrap();
        scheduler.arm(None).unwrap();
        assert!(!scheduler.is_armed());
        scheduler.shutdown().await;
        assert_eq!(db.row_count("t"), Some(4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rearm_during_run_lets_run_finish() {
        let db = MemoryDatabase::default();
        table_with_rows(&db, 5);
        db.delay_statements("DELETE", Duration::from_millis(200));
        let scheduler = RetentionScheduler::new(Arc::new(db.clone())).unwrap();

        scheduler.arm(plan(1, 10, false)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.arm(plan(0, 10, false)).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(db.row_count("t"), Some(0));
        scheduler.shutdown().await;
        assert_eq!(db.open_connections(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_run_does_not_stop_recurring_schedule() {
        let db = MemoryDatabase::default();
        table_with_rows(&db, 5);
        db.fail_next("TRUNCATE", 1);
        let scheduler = RetentionScheduler::new(Arc::new(db.clone())).unwrap();

        scheduler.arm(plan(0, 10, true)).unwrap();
        settle().await;
        assert_eq!(db.row_count("t"), Some(0));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_rejects_arming() {
        let db = MemoryDatabase::default();
        let scheduler = RetentionScheduler::new(Arc::new(db)).unwrap();
        scheduler.arm(plan(0, 60_000, false)).unwrap();
        scheduler.shutdown().await;
        assert!(matches!(
            scheduler.arm(plan(0, 10, false)),
            Err(EngineError::ShutDown)
        ));
    }

    #[test]
    fn needs_a_runtime() {
        assert!(RetentionScheduler::new(Arc::new(MemoryDatabase::default())).is_err());
    }
}
