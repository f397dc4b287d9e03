//! Virtual-device loopback plugin.
//!
//! This side of the crate materializes the virtual playback endpoints the
//! panel hardware maps onto, plus the bidirectional voice-chat endpoint.
//! Audio an application writes to an endpoint's output stream is carried
//! over a lock-free ring to the endpoint's input stream, where the mixing
//! engine (or any capture client) reads it back.

mod endpoint;
mod host;
mod ring;

pub use endpoint::{
    ControlRequestHandler, Direction, EndpointParams, EndpointStream, IoRequestHandler,
    StreamFormat, VirtualEndpoint, SUPPORTED_RATES,
};
pub use host::{
    plugin_entry, AllocatorRef, PluginHost, PANEL_ENDPOINT_COUNT, PANEL_ENDPOINT_NAMES,
    PLUGIN_TYPE_UUID, VOICE_CHAT_NAME,
};
pub use ring::{LoopbackRing, DEFAULT_RING_CAPACITY};
