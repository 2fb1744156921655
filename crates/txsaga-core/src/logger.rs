use std::fmt;
use std::sync::Arc;

/// Diagnostic sink used by the coordinator.
///
/// Logging is best-effort: implementations must not fail or panic.
pub trait Logger: Send + Sync {
    fn info(&self, message: fmt::Arguments<'_>);

    fn error(&self, message: fmt::Arguments<'_>);
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn info(&self, message: fmt::Arguments<'_>) {
        (**self).info(message);
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        (**self).error(message);
    }
}

/// Forwards messages to `tracing` under the `txsaga` target, inside whatever
/// span the coordinator has entered.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: fmt::Arguments<'_>) {
        tracing::info!(target: "txsaga", "{message}");
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        tracing::error!(target: "txsaga", "{message}");
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: fmt::Arguments<'_>) {}

    fn error(&self, _message: fmt::Arguments<'_>) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl Logger for Recording {
        fn info(&self, message: fmt::Arguments<'_>) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(format!("INFO {message}"));
            }
        }

        fn error(&self, message: fmt::Arguments<'_>) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(format!("ERROR {message}"));
            }
        }
    }

    #[test]
    fn loggers_accept_formatted_arguments() {
        let recording = Recording::default();
        let loggers: [&dyn Logger; 3] = [&TracingLogger, &NoopLogger, &recording];

        for logger in loggers {
            logger.info(format_args!("step '{}' added", "debit"));
            logger.error(format_args!("{} failed", "credit"));
        }

        let lines = recording.0.lock().expect("lock");
        assert_eq!(*lines, vec!["INFO step 'debit' added", "ERROR credit failed"]);
    }
}
