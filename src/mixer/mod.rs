//! The user-space mixing engine.
//!
//! Input channels pull audio from virtual endpoints, buses sum their
//! enabled channels and push the result to an output sink. The split is
//! strict: control code mutates membership and lifecycle, real-time
//! callbacks touch only atomics and lock-free rings.

mod bus;
mod channel;

pub use bus::{Bus, BusMember, BusState, NullSink};
pub use channel::{channel_pair, ChannelControls, ChannelSlot, ChannelTap};
