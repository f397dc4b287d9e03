//! # panelmix
//!
//! Per-application volume control and sub-mix routing for hosts without
//! native per-app audio faders.
//!
//! `panelmix` exposes a set of virtual stereo playback endpoints - one per
//! physical knob or slider on an attached USB panel - and mixes whatever
//! applications play into them down to real output devices. One bus doubles
//! as a virtual microphone so voice-chat apps can capture the mixed result.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use panelmix::{default_config_path, HardwareEvent, MixerBackend, RoutingManager};
//!
//! let manager = RoutingManager::new(
//!     default_config_path().expect("config dir"),
//!     MixerBackend::Device,
//! );
//! manager.initialize().await?;
//!
//! // Knob 1 turned down to ~50%
//! manager.on_hardware_event(HardwareEvent::Dial { index: 0, value: 128 });
//!
//! // Route the personal mix to headphones
//! manager.set_bus_sink("personal", Some("External Headphones".into()))?;
//!
//! manager.shutdown();
//! ```
//!
//! ## Architecture
//!
//! Two tightly coupled real-time subsystems:
//!
//! - **Loopback plugin** ([`plugin`]): virtual endpoints whose output and
//!   input streams are joined by lock-free rings, published to the OS
//!   through a single entry point.
//! - **Mixing engine** ([`mixer`] + [`RoutingManager`]): per-endpoint input
//!   channels with gain, mute, and meters, summed by buses onto output
//!   sinks, resampling per channel when rates differ.
//!
//! The thread boundary is strict: real-time callbacks touch only atomics
//! and lock-free rings; control calls take coarse locks and never block a
//! callback.

// Audio code requires intentional numeric casts between sample formats
// and rates.
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod devices;
mod error;
mod event;
pub mod format;
mod meter;
pub mod mixer;
pub mod plugin;
mod routing;

pub use config::{
    default_config_path, BusChannelConfig, HardwareActionKind, HardwareMapping,
    InputChannelConfig, MixBusConfig, RoutingConfig, PERSONAL_BUS, VOICECHAT_BUS,
};
pub use devices::{DeviceDirectory, DeviceId, DeviceInfo};
pub use error::{ConfigError, MixError};
pub use event::{event_callback, EventCallback, MixerEvent};
pub use meter::{ChannelLevels, MeterReporter, ACTIVITY_WINDOW};
pub use mixer::{Bus, BusMember, BusState, ChannelControls, NullSink};
pub use plugin::{plugin_entry, PluginHost, VirtualEndpoint, PLUGIN_TYPE_UUID};
pub use routing::{
    BusMemberView, BusView, ChannelView, HardwareEvent, MixerBackend, OutputView, RoutingManager,
    StateView, MAX_LABEL_CODE_POINTS, SAVE_DEBOUNCE,
};
