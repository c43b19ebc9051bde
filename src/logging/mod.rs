//! Structured logging for the registration engine
//!
//! Console and JSON file output via `tracing-subscriber`, spans per batch and
//! per target, and thread-local correlation ids tying a target's log lines
//! together across worker threads.

pub mod config;
pub mod spans;

use anyhow::Result;
use std::cell::Cell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

pub use config::LoggingConfig;
pub use spans::{AlignmentSpan, BatchSpan};

thread_local! {
    static CORRELATION_ID: Cell<Option<Uuid>> = const { Cell::new(None) };
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let crate_name = env!("CARGO_PKG_NAME").replace('-', "_");
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives(&crate_name)))?;

    let mut layers = Vec::new();
    let mut guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(config.include_file_location)
            .with_file(config.include_file_location);
        layers.push(console_layer.boxed());
    }

    if let Some(ref log_dir) = config.log_directory {
        let file_appender = tracing_appender::rolling::daily(log_dir, "alignment.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        level = %config.global_level,
        file_output = config.log_directory.is_some(),
        "Logging initialized"
    );
    Ok(guard)
}

/// Correlation id of the work running on this thread, if any.
pub fn current_correlation_id() -> Option<Uuid> {
    CORRELATION_ID.with(Cell::get)
}

/// Binds a correlation id to the current thread. The previous id is
/// restored on drop, so scopes nest.
#[must_use = "the id is unbound as soon as the scope is dropped"]
pub struct CorrelationScope {
    id: Uuid,
    previous: Option<Uuid>,
}

impl CorrelationScope {
    pub fn enter(id: Uuid) -> Self {
        let previous = CORRELATION_ID.with(|cell| cell.replace(Some(id)));
        Self { id, previous }
    }

    /// Scope with a freshly generated id.
    pub fn fresh() -> Self {
        Self::enter(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        CORRELATION_ID.with(|cell| cell.set(self.previous));
    }
}

/// `tracing::span!` carrying the thread's correlation id when one is bound.
#[macro_export]
macro_rules! correlation_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        tracing::span!(
            $level,
            $name,
            correlation_id = $crate::logging::current_correlation_id().map(tracing::field::display)
            $(, $($field)*)?
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_nest_and_restore() {
        assert!(current_correlation_id().is_none());
        {
            let outer = CorrelationScope::fresh();
            assert_eq!(current_correlation_id(), Some(outer.id()));
            {
                let inner = CorrelationScope::fresh();
                assert_ne!(inner.id(), outer.id());
                assert_eq!(current_correlation_id(), Some(inner.id()));
            }
            assert_eq!(current_correlation_id(), Some(outer.id()));
        }
        assert!(current_correlation_id().is_none());
    }

    #[test]
    fn test_ids_are_per_thread() {
        let scope = CorrelationScope::fresh();
        let other = std::thread::spawn(current_correlation_id).join().unwrap();
        assert!(other.is_none());
        assert_eq!(current_correlation_id(), Some(scope.id()));
    }
}
