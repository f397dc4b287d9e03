//! Meter and activity reporting.
//!
//! Pure read side for UI polling: peak/RMS levels and a recent-activity
//! flag per input channel. Everything here loads atomics only and is safe
//! to call from any non-real-time thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::mixer::ChannelControls;

/// How long a channel stays "active" after its last above-threshold sample.
pub const ACTIVITY_WINDOW: Duration = Duration::from_millis(500);

/// Process-relative monotonic clock in nanoseconds.
///
/// Real-time ingest callbacks stamp activity with this; it never goes
/// backwards and is comparable across threads.
pub(crate) fn monotonic_ns() -> u64 {
    static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);
    EPOCH.elapsed().as_nanos() as u64
}

/// Whether the channel saw an above-threshold sample within the activity
/// window.
pub(crate) fn is_active(controls: &ChannelControls) -> bool {
    let last = controls.last_activity_ns();
    if last == 0 {
        return false;
    }
    monotonic_ns().saturating_sub(last) < ACTIVITY_WINDOW.as_nanos() as u64
}

/// A snapshot of one channel's meter state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLevels {
    /// Channel id.
    pub id: String,
    /// Peak of the most recent ingest buffer.
    pub peak: f32,
    /// RMS of the most recent ingest buffer.
    pub rms: f32,
}

/// Aggregates meters for the channels of the primary bus.
///
/// Built fresh per poll by the routing manager; holding one across
/// membership changes only means it reports the old channel set.
pub struct MeterReporter {
    entries: Vec<(String, Arc<ChannelControls>)>,
}

impl MeterReporter {
    pub(crate) fn from_entries(entries: Vec<(String, Arc<ChannelControls>)>) -> Self {
        Self { entries }
    }

    /// Current peak and RMS for every channel, in bus order.
    pub fn levels(&self) -> Vec<ChannelLevels> {
        self.entries
            .iter()
            .map(|(id, controls)| ChannelLevels {
                id: id.clone(),
                peak: controls.peak(),
                rms: controls.rms(),
            })
            .collect()
    }

    /// Whether the given channel was recently active, or `None` for an
    /// unknown id.
    pub fn activity(&self, channel_id: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(id, _)| id == channel_id)
            .map(|(_, controls)| is_active(controls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ns_is_nondecreasing() {
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_activity_false_before_any_audio() {
        let controls = ChannelControls::new(1.0, false, true);
        assert!(!is_active(&controls));
    }

    #[test]
    fn test_reporter_levels_and_unknown_channel() {
        let controls = Arc::new(ChannelControls::new(1.0, false, true));
        let reporter =
            MeterReporter::from_entries(vec![("k1".to_string(), Arc::clone(&controls))]);

        let levels = reporter.levels();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].id, "k1");
        assert_eq!(levels[0].peak, 0.0);

        assert_eq!(reporter.activity("k1"), Some(false));
        assert_eq!(reporter.activity("nope"), None);
    }
}
