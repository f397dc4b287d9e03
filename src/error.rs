//! Error types for panelmix.
//!
//! Errors are split into two categories:
//! - **Control-path errors** ([`MixError`]): returned from the routing
//!   manager, bus lifecycle, and device lookups.
//! - **Persistence errors** ([`ConfigError`]): configuration load/save
//!   failures, which are recoverable (the in-memory state stays
//!   authoritative).
//!
//! Real-time render and ingest paths never construct errors; they degrade
//! to silence and count underruns instead.

use std::path::PathBuf;

/// Errors returned from control-path operations.
///
/// These are returned from [`RoutingManager`](crate::RoutingManager)
/// operations and bus lifecycle calls. Real-time issues (underruns, short
/// reads) are never reported this way - they show up in the meters and
/// underrun counters instead.
#[derive(Debug, thiserror::Error)]
pub enum MixError {
    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultOutput,

    /// An operation referenced a channel id that doesn't exist.
    #[error("unknown channel: {id}")]
    UnknownChannel {
        /// The channel id that wasn't found.
        id: String,
    },

    /// An operation referenced a bus id that doesn't exist.
    #[error("unknown bus: {id}")]
    UnknownBus {
        /// The bus id that wasn't found.
        id: String,
    },

    /// The bus is running and the operation requires it stopped.
    #[error("bus '{id}' is running - stop it before changing its sink")]
    BusRunning {
        /// The bus id.
        id: String,
    },

    /// The bus was never configured with a sink.
    #[error("bus '{id}' has no sink configured - call set_sink first")]
    BusNotConfigured {
        /// The bus id.
        id: String,
    },

    /// A channel label exceeded the allowed length.
    #[error("label too long: {length} code points (max {max})")]
    LabelTooLong {
        /// Length of the rejected label in code points.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The requested sample rate is not supported by the endpoint.
    #[error("sample rate {requested}Hz not supported (available: {available:?})")]
    UnsupportedRate {
        /// The requested sample rate.
        requested: u32,
        /// Sample rates that are supported.
        available: Vec<u32>,
    },

    /// The device's native sample format is not 32-bit float.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// An error from the underlying audio backend (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// A configuration persistence error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that can occur while loading or saving the routing configuration.
///
/// Save failures are recoverable - the manager logs them and retries on the
/// next mutation; the in-memory configuration remains authoritative.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config file error: {path}: {source}")]
    Io {
        /// Path to the config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid JSON for the config schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The parsed configuration violates an invariant.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What was wrong.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invariant-violation error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}
