//! Runtime events for monitoring mixer health.
//!
//! Events are non-fatal notifications about bus lifecycle and persistence
//! behavior. The mixer keeps running after an event is emitted - they exist
//! for logging and UI status, not error handling.

use std::sync::Arc;

/// Runtime events emitted by the routing manager.
///
/// These are informational. Use the [`EventCallback`] to log them or update
/// UI state; none of them require action.
#[derive(Debug, Clone)]
pub enum MixerEvent {
    /// A bus transitioned to running.
    BusStarted {
        /// Bus key (e.g. `personal`).
        bus: String,
        /// Resolved sink device name.
        sink: String,
    },

    /// A bus was stopped.
    BusStopped {
        /// Bus key.
        bus: String,
    },

    /// A bus failed to start or restart; it remains stopped.
    BusStartFailed {
        /// Bus key.
        bus: String,
        /// Description of the failure.
        error: String,
    },

    /// A channel reported loopback underruns since the last report.
    ///
    /// Underruns are normal while a source application is not playing;
    /// sustained growth during playback indicates the consumer is stalled.
    ChannelUnderruns {
        /// Channel id.
        channel: String,
        /// Total underruns observed so far.
        total: u64,
    },

    /// A debounced configuration save failed.
    ///
    /// The in-memory configuration remains authoritative and the save is
    /// retried on the next mutation.
    ConfigSaveFailed {
        /// Description of the failure.
        error: String,
    },
}

/// Callback type for receiving runtime events.
pub type EventCallback = Arc<dyn Fn(MixerEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use panelmix::{event_callback, MixerEvent};
///
/// let callback = event_callback(|event| {
///     println!("mixer event: {event:?}");
/// });
/// callback(MixerEvent::BusStopped { bus: "personal".into() });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(MixerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
