use crate::errors::{AppError, AppResult, ErrorKind};
use once_cell::sync::OnceCell;
use std::future::Future;
use std::path::Path;
use tracing::Instrument;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Installs the global JSON subscriber writing to a daily-rolling file under
/// `log_dir`. `RUST_LOG` overrides `default_filter` when set.
pub fn init_tracing(log_dir: &Path, default_filter: &str) -> AppResult<()> {
    if LOG_GUARD.get().is_some() {
        return Err(AppError::Internal("tracing is already initialised".to_string()));
    }
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "peerly.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(format!("installing tracing subscriber: {}", error)))
}

/// Logs a failed operation at a level matching how much an operator should care.
pub fn record_failure(operation: &'static str, error: &AppError) {
    match error.kind() {
        ErrorKind::InvalidInput | ErrorKind::NotFound => {
            tracing::info!(operation, error = %error, "request rejected")
        }
        ErrorKind::BusinessRule => tracing::warn!(operation, error = %error, "business rule violated"),
        ErrorKind::Authentication | ErrorKind::Infrastructure => {
            tracing::error!(operation, error = %error, "operation failed")
        }
    }
}

/// Runs `work` inside `span` and records a failure on the way out.
pub async fn traced<T>(
    span: tracing::Span,
    operation: &'static str,
    work: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    let result = work.instrument(span.clone()).await;
    if let Err(error) = &result {
        span.in_scope(|| record_failure(operation, error));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn second_initialisation_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        init_tracing(&log_dir, "debug").expect("first init");
        assert!(log_dir.is_dir());

        let err = init_tracing(&log_dir, "debug").expect_err("second init");
        assert!(err.to_string().contains("already initialised"));
    }
}
