//! Sweep events and the handlers that observe them.
//!
//! The sweep reports what it does through [`SweepEvent`] values. Callers
//! implement [`EventHandler`] to log, push updates to browsers, or count
//! calls in tests.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget sweeps |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures |
//! | [`CompositeEventHandler`] | Several handlers in order |

use tracing::{debug, info, warn};

use crate::sweep::SweepReport;

/// Events emitted while a sweep runs.
#[derive(Debug)]
pub enum SweepEvent<'a> {
    /// A sweep is starting with this many pending cells.
    Started { pending: usize },
    /// A prompt is about to be sent.
    CellRequested {
        row: usize,
        column: &'a str,
        prompt: &'a str,
    },
    /// A result was written into the grid.
    CellUpdated {
        row: usize,
        column: &'a str,
        value: &'a str,
        note: Option<&'a str>,
    },
    /// The row changed while the call was in flight; the result was dropped.
    CellStale { row: usize, column: &'a str },
    /// The call failed; the cell is unchanged and stays pending.
    CellFailed {
        row: usize,
        column: &'a str,
        error: &'a str,
    },
    /// The sweep is done.
    Finished { report: &'a SweepReport },
}

/// Observer of sweep events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &SweepEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```
/// use promptsheet::events::{FnEventHandler, SweepEvent};
///
/// let handler = FnEventHandler::new(|event| {
///     if let SweepEvent::CellUpdated { row, value, .. } = event {
///         println!("row {row}: {value}");
///     }
/// });
/// # let _ = handler;
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&SweepEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&SweepEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&SweepEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &SweepEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to several handlers in registration order.
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &SweepEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs sweep events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &SweepEvent<'_>) {
        match event {
            SweepEvent::Started { pending } => {
                debug!("sweep started: {pending} pending cell(s)");
            }
            SweepEvent::CellRequested { row, column, prompt } => {
                let preview: String = prompt.chars().take(120).collect();
                debug!(
                    "[{column} #{row}] prompt: {preview}{}",
                    if prompt.chars().count() > 120 { "..." } else { "" }
                );
            }
            SweepEvent::CellUpdated {
                row, column, value, ..
            } => {
                debug!("[{column} #{row}] = {value}");
            }
            SweepEvent::CellStale { row, column } => {
                debug!("[{column} #{row}] inputs changed during the call, result dropped");
            }
            SweepEvent::CellFailed { row, column, error } => {
                warn!("[{column} #{row}] completion failed, cell left unchanged: {error}");
            }
            SweepEvent::Finished { report } => {
                if report.attempted > 0 {
                    info!(
                        "sweep finished: {} attempted, {} updated, {} failed, {} stale in {:.2}s",
                        report.attempted,
                        report.updated,
                        report.failed,
                        report.stale,
                        report.elapsed.as_secs_f64()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_calls_every_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (count.clone(), count.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with(LoggingHandler)
            .with(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }));

        handler.on_event(&SweepEvent::Started { pending: 3 });
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
