//! Virtual endpoint: one OS-visible audio device whose output and input
//! streams are connected only by the loopback ring between them.
//!
//! The endpoint is a capability bundle assembled by composition: it owns
//! its two streams, the shared ring, and the handler objects the OS audio
//! server calls into. Handlers hold the ring by shared ownership so stream
//! teardown in arbitrary order stays safe.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::ring::{LoopbackRing, DEFAULT_RING_CAPACITY};
use crate::error::MixError;

/// Sample rates every endpoint advertises, preferred first.
pub const SUPPORTED_RATES: [u32; 2] = [48_000, 44_100];

/// A physical stream format: 32-bit float, packed, native-endian, stereo.
///
/// Only the sample rate varies; the rest is fixed by the endpoint design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channels per frame (always 2).
    pub channels: u16,
    /// Bits per channel (always 32).
    pub bits_per_channel: u16,
}

impl StreamFormat {
    /// The canonical stereo f32 format at the given rate.
    pub fn stereo_f32(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            bits_per_channel: 32,
        }
    }

    /// Bytes per interleaved frame.
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_channel) / 8
    }
}

/// Stream direction relative to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applications write to this stream (playback side).
    Output,
    /// Applications read from this stream (capture side).
    Input,
}

/// One stream of a virtual endpoint.
///
/// The physical format is mutated only through the endpoint's sample-rate
/// negotiation, which keeps stream format equal to device rate in
/// lock-step.
pub struct EndpointStream {
    direction: Direction,
    format: Mutex<StreamFormat>,
}

impl EndpointStream {
    fn new(direction: Direction, sample_rate: u32) -> Self {
        Self {
            direction,
            format: Mutex::new(StreamFormat::stereo_f32(sample_rate)),
        }
    }

    /// The stream direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The current physical format.
    pub fn physical_format(&self) -> StreamFormat {
        *self.format.lock()
    }

    /// Sets the physical format.
    ///
    /// Only canonical stereo f32 formats at a supported rate are accepted;
    /// anything else leaves the stream untouched.
    pub fn set_physical_format(&self, format: StreamFormat) -> Result<(), MixError> {
        if format.channels != 2 || format.bits_per_channel != 32 {
            return Err(MixError::UnsupportedFormat {
                format: format!(
                    "{}ch/{}bit (only stereo f32 is supported)",
                    format.channels, format.bits_per_channel
                ),
            });
        }
        if !SUPPORTED_RATES.contains(&format.sample_rate) {
            return Err(MixError::UnsupportedRate {
                requested: format.sample_rate,
                available: SUPPORTED_RATES.to_vec(),
            });
        }
        *self.format.lock() = format;
        Ok(())
    }
}

/// I/O request handler: the callbacks the OS audio server drives.
///
/// Both methods run on real-time threads and must not lock, allocate, or
/// log.
pub trait IoRequestHandler: Send + Sync {
    /// Mixed output was written to the device; `bytes` is the raw buffer.
    fn on_write_mixed_output(&self, bytes: &[u8]);

    /// A client is reading from the device input; fill `bytes` and return
    /// the number of real bytes delivered (the rest must be silence).
    fn on_read_client_input(&self, bytes: &mut [u8]) -> usize;
}

/// Control request handler: IO lifecycle notifications.
pub trait ControlRequestHandler: Send + Sync {
    /// IO is about to start on the device.
    fn on_start_io(&self);

    /// IO stopped on the device.
    fn on_stop_io(&self);
}

/// Loopback I/O: output writes land in the ring, input reads drain it.
struct LoopbackIoHandler {
    ring: Arc<LoopbackRing>,
}

impl IoRequestHandler for LoopbackIoHandler {
    fn on_write_mixed_output(&self, bytes: &[u8]) {
        self.ring.write(bytes);
    }

    fn on_read_client_input(&self, bytes: &mut [u8]) -> usize {
        self.ring.read(bytes)
    }
}

/// Loopback control: the ring is zeroed on both IO transitions so a new
/// session never replays stale audio.
struct LoopbackControlHandler {
    ring: Arc<LoopbackRing>,
}

impl ControlRequestHandler for LoopbackControlHandler {
    fn on_start_io(&self) {
        self.ring.clear();
    }

    fn on_stop_io(&self) {
        self.ring.clear();
    }
}

/// Construction parameters for a virtual endpoint.
#[derive(Debug, Clone)]
pub struct EndpointParams {
    /// Human-readable device name.
    pub name: String,
    /// Stable device UID (reverse-DNS).
    pub uid: String,
    /// Manufacturer string.
    pub manufacturer: String,
    /// Model UID shared by all endpoints.
    pub model_uid: String,
    /// Initial nominal sample rate.
    pub sample_rate: u32,
    /// Whether the input stream carries volume/mute controls (the voice
    /// chat endpoint surfaces its input as a microphone).
    pub input_has_controls: bool,
}

/// A virtual audio device with paired output and input streams and a
/// loopback ring between them.
///
/// Created once at plugin load and destroyed at unload; nothing is mutated
/// after registration except the nominal sample rate.
pub struct VirtualEndpoint {
    params: EndpointParams,
    nominal_rate: AtomicU32,
    output_stream: EndpointStream,
    input_stream: EndpointStream,
    ring: Arc<LoopbackRing>,
    io_handler: Arc<dyn IoRequestHandler>,
    control_handler: Arc<dyn ControlRequestHandler>,
    /// Count of IO sessions; the ring is cleared on 0->1 and 1->0.
    io_clients: AtomicU32,
}

impl VirtualEndpoint {
    /// Creates an endpoint with a loopback ring of the default capacity.
    pub fn new(params: EndpointParams) -> Self {
        Self::with_ring_capacity(params, DEFAULT_RING_CAPACITY)
    }

    /// Creates an endpoint with an explicit ring capacity in bytes.
    pub fn with_ring_capacity(params: EndpointParams, ring_capacity: usize) -> Self {
        let ring = Arc::new(LoopbackRing::new(ring_capacity));
        let io_handler = Arc::new(LoopbackIoHandler {
            ring: Arc::clone(&ring),
        });
        let control_handler = Arc::new(LoopbackControlHandler {
            ring: Arc::clone(&ring),
        });
        let rate = params.sample_rate;
        Self {
            nominal_rate: AtomicU32::new(rate),
            output_stream: EndpointStream::new(Direction::Output, rate),
            input_stream: EndpointStream::new(Direction::Input, rate),
            ring,
            io_handler,
            control_handler,
            io_clients: AtomicU32::new(0),
            params,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Stable device UID.
    pub fn uid(&self) -> &str {
        &self.params.uid
    }

    /// Manufacturer string.
    pub fn manufacturer(&self) -> &str {
        &self.params.manufacturer
    }

    /// Model UID.
    pub fn model_uid(&self) -> &str {
        &self.params.model_uid
    }

    /// Whether the input stream is surfaced with controls (virtual mic).
    pub fn input_has_controls(&self) -> bool {
        self.params.input_has_controls
    }

    /// Current nominal sample rate.
    pub fn nominal_rate(&self) -> u32 {
        self.nominal_rate.load(Ordering::Relaxed)
    }

    /// Rates this endpoint advertises, preferred first.
    pub fn supported_rates(&self) -> &'static [u32] {
        &SUPPORTED_RATES
    }

    /// The output (playback) stream.
    pub fn output_stream(&self) -> &EndpointStream {
        &self.output_stream
    }

    /// The input (capture) stream.
    pub fn input_stream(&self) -> &EndpointStream {
        &self.input_stream
    }

    /// Total loopback underruns since the last IO start.
    pub fn underruns(&self) -> u64 {
        self.ring.underruns()
    }

    /// Changes the nominal rate, updating both stream formats in
    /// lock-step.
    ///
    /// On failure the endpoint keeps its previous rate and formats.
    pub fn set_nominal_rate(&self, rate: u32) -> Result<(), MixError> {
        if !SUPPORTED_RATES.contains(&rate) {
            return Err(MixError::UnsupportedRate {
                requested: rate,
                available: SUPPORTED_RATES.to_vec(),
            });
        }

        let previous = self.nominal_rate();
        let format = StreamFormat::stereo_f32(rate);
        self.output_stream.set_physical_format(format)?;
        if let Err(e) = self.input_stream.set_physical_format(format) {
            // Roll the output stream back so stream format == device rate
            // still holds.
            let _ = self
                .output_stream
                .set_physical_format(StreamFormat::stereo_f32(previous));
            return Err(e);
        }
        self.nominal_rate.store(rate, Ordering::Relaxed);
        Ok(())
    }

    /// Forwards a mixed-output buffer from the OS into the loopback ring.
    pub fn write_mixed_output(&self, bytes: &[u8]) {
        self.io_handler.on_write_mixed_output(bytes);
    }

    /// Fills a client-input read from the loopback ring; the tail beyond
    /// the returned count is silence.
    pub fn read_client_input(&self, bytes: &mut [u8]) -> usize {
        self.io_handler.on_read_client_input(bytes)
    }

    /// Registers an IO session. The first session clears the ring.
    pub fn start_io(&self) {
        if self.io_clients.fetch_add(1, Ordering::AcqRel) == 0 {
            self.control_handler.on_start_io();
        }
    }

    /// Deregisters an IO session. The last session clears the ring.
    pub fn stop_io(&self) {
        let prev = self.io_clients.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "stop_io without matching start_io");
        if prev == 1 {
            self.control_handler.on_stop_io();
        }
    }

    /// Whether any IO session is active.
    pub fn io_running(&self) -> bool {
        self.io_clients.load(Ordering::Acquire) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::samples_to_bytes;

    fn test_endpoint() -> VirtualEndpoint {
        VirtualEndpoint::with_ring_capacity(
            EndpointParams {
                name: "Panel K1".to_string(),
                uid: "com.panelmix.audio.device.1".to_string(),
                manufacturer: "Panelmix".to_string(),
                model_uid: "com.panelmix.audio.model".to_string(),
                sample_rate: 48_000,
                input_has_controls: false,
            },
            1024,
        )
    }

    #[test]
    fn test_loopback_output_to_input() {
        let ep = test_endpoint();
        ep.start_io();

        let written = samples_to_bytes(&[0.1f32, -0.1, 0.2, -0.2]);
        ep.write_mixed_output(&written);

        let mut out = vec![0u8; written.len()];
        assert_eq!(ep.read_client_input(&mut out), written.len());
        assert_eq!(out, written);
        ep.stop_io();
    }

    #[test]
    fn test_io_start_clears_stale_audio() {
        let ep = test_endpoint();
        ep.start_io();
        ep.write_mixed_output(&[1u8; 64]);
        ep.stop_io();

        // The next session must not replay the previous session's bytes.
        ep.start_io();
        let mut out = vec![0xffu8; 64];
        assert_eq!(ep.read_client_input(&mut out), 0);
        assert_eq!(out, vec![0u8; 64]);
        ep.stop_io();
    }

    #[test]
    fn test_nested_io_sessions_clear_once() {
        let ep = test_endpoint();
        ep.start_io();
        ep.write_mixed_output(&[3u8; 16]);

        // A second client joining must not wipe in-flight audio.
        ep.start_io();
        let mut out = vec![0u8; 16];
        assert_eq!(ep.read_client_input(&mut out), 16);

        ep.stop_io();
        assert!(ep.io_running());
        ep.stop_io();
        assert!(!ep.io_running());
    }

    #[test]
    fn test_set_nominal_rate_updates_both_streams() {
        let ep = test_endpoint();
        assert_eq!(ep.nominal_rate(), 48_000);

        ep.set_nominal_rate(44_100).expect("44100 is supported");
        assert_eq!(ep.nominal_rate(), 44_100);
        assert_eq!(ep.output_stream().physical_format().sample_rate, 44_100);
        assert_eq!(ep.input_stream().physical_format().sample_rate, 44_100);
    }

    #[test]
    fn test_set_nominal_rate_rejects_unsupported() {
        let ep = test_endpoint();
        let err = ep.set_nominal_rate(96_000).unwrap_err();
        assert!(matches!(err, MixError::UnsupportedRate { requested: 96_000, .. }));
        // Prior rate and formats are untouched.
        assert_eq!(ep.nominal_rate(), 48_000);
        assert_eq!(ep.output_stream().physical_format().sample_rate, 48_000);
    }

    #[test]
    fn test_stream_format_rejects_non_stereo() {
        let ep = test_endpoint();
        let bad = StreamFormat {
            sample_rate: 48_000,
            channels: 1,
            bits_per_channel: 32,
        };
        assert!(ep.output_stream().set_physical_format(bad).is_err());
    }

    #[test]
    fn test_stream_format_bytes_per_frame() {
        assert_eq!(StreamFormat::stereo_f32(48_000).bytes_per_frame(), 8);
    }
}
