pub mod counter;
pub mod logging;

use anyhow::Result;

use crate::event::TaskAttemptEvent;

use self::counter::TaskAttemptCounterSink;
use self::logging::LoggingSink;

/// Sink consumes task-attempt events from the agent loop.
///
/// Methods take `&mut self`: events arrive serially from one producer
/// context and `flush` is only invoked between events, so sinks need no
/// internal synchronization.
pub trait Sink: Send {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Called by the agent when the sink is activated.
    fn on_install(&mut self) -> Result<()>;

    /// Called by the agent when the sink is deactivated.
    fn on_uninstall(&mut self) -> Result<()>;

    /// Process a single event.
    fn handle_event(&mut self, event: &TaskAttemptEvent);

    /// Push accumulated state downstream. No-op for stateless sinks.
    fn flush(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Configured sink instances.
///
/// Uses enum dispatch rather than trait objects for zero-cost async dispatch
/// (avoids `Pin<Box<dyn Future>>` overhead on every flush call).
pub enum SinkKind {
    Counter(TaskAttemptCounterSink),
    Logging(LoggingSink),
}

impl SinkKind {
    /// Returns the sink name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Counter(s) => s.name(),
            Self::Logging(s) => s.name(),
        }
    }

    /// Activates the sink.
    pub fn on_install(&mut self) -> Result<()> {
        match self {
            Self::Counter(s) => s.on_install(),
            Self::Logging(s) => s.on_install(),
        }
    }

    /// Deactivates the sink.
    pub fn on_uninstall(&mut self) -> Result<()> {
        match self {
            Self::Counter(s) => s.on_uninstall(),
            Self::Logging(s) => s.on_uninstall(),
        }
    }

    /// Processes a single event.
    pub fn handle_event(&mut self, event: &TaskAttemptEvent) {
        match self {
            Self::Counter(s) => s.handle_event(event),
            Self::Logging(s) => s.handle_event(event),
        }
    }

    /// Pushes accumulated state downstream.
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Counter(s) => s.flush().await,
            Self::Logging(s) => s.flush().await,
        }
    }
}
