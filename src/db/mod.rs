pub mod appreciations;
pub mod core_values;
pub mod grades;
pub mod quota;
pub mod reports;
pub mod rewards;
pub mod users;

use crate::errors::{AppError, AppResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn hold_connection(&self) -> MutexGuard<'_, Connection> {
        self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction unwinds through `Transaction::drop`, which rolls
        // back, so the connection behind a poisoned lock is still consistent.
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering database connection after a panicked holder");
            poisoned.into_inner()
        })
    }

    /// Runs statements in autocommit mode, outside of any transaction.
    pub fn run<T>(&self, work: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let conn = self.lock();
        work(&conn)
    }

    /// Runs `work` inside an IMMEDIATE transaction and commits only if it
    /// returned `Ok` before `deadline` expired or was canceled. Every other
    /// exit path, including a panic inside `work`, drops the transaction and
    /// rolls it back.
    pub fn transaction<T>(
        &self,
        deadline: Deadline,
        work: impl FnOnce(&Transaction<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut conn = self.lock();
        deadline.check("begin transaction")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        deadline.check("commit transaction")?;
        tx.commit()?;
        Ok(value)
    }
}

/// Point in time after which a transactional operation must not commit.
/// Also carries the caller's cancellation flag, see [`Deadline::cancel_on_drop`].
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    canceled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Returns a guard that cancels this deadline when dropped. Held by the
    /// awaiting future, so a caller that stops waiting also stops the commit.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            canceled: self.canceled.clone(),
        }
    }

    pub fn check(&self, stage: &str) -> AppResult<()> {
        if self.is_canceled() {
            return Err(AppError::Canceled(format!("caller went away before {}", stage)));
        }
        if self.is_expired() {
            return Err(AppError::DeadlineExceeded(format!("deadline passed before {}", stage)));
        }
        Ok(())
    }
}

pub struct CancelOnDrop {
    canceled: Arc<AtomicBool>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

/// Runs transactional store `work` off the async executor. If the returned
/// future is dropped before the work finishes, `deadline` is canceled and the
/// transaction rolls back instead of committing.
pub async fn run_transactional<T, F>(deadline: Deadline, work: F) -> AppResult<T>
where
    F: FnOnce(Deadline) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let _cancel = deadline.cancel_on_drop();
    run_blocking(move || work(deadline)).await
}

/// Moves blocking store work off the async executor. A panic inside `work`
/// is re-raised on the caller once its transaction has been rolled back.
pub async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
        Err(error) => Err(AppError::Internal(format!("blocking task failed: {}", error))),
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
