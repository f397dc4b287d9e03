//! Mixer bus: a fan-in summing node in front of one output sink.
//!
//! The control-side [`Bus`] owns membership and the lifecycle state
//! machine; the render-side [`BusRenderer`] is self-contained and moves
//! into the sink's output callback when the bus starts. Tearing down and
//! rebuilding that wiring is the only way membership structure changes -
//! while running, only the per-channel atomic flags move.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use crate::devices::{DeviceDirectory, DeviceId};
use crate::error::MixError;
use crate::format::{bytes_to_samples_into, BYTES_PER_FRAME};
use crate::mixer::channel::{channel_pair, ChannelControls, ChannelSlot, ChannelTap, MAX_RENDER_FRAMES};
use crate::plugin::{PluginHost, VirtualEndpoint};

/// Lifecycle state of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Built, no sink selected yet.
    Created,
    /// Has a sink selection (possibly "use the default output").
    Configured,
    /// IO wiring installed and audio flowing.
    Running,
    /// IO wiring torn down; sink selection retained.
    Stopped,
}

/// One channel's membership in a bus.
pub struct BusMember {
    /// Channel id (unique across the configuration).
    pub channel_id: String,
    /// Name of the source endpoint this channel pulls from.
    pub source_name: String,
    /// Optional per-bus gain applied on top of the channel gain.
    pub gain_override: Option<f32>,
    /// Shared fader/meter state; persists across bus restarts.
    pub controls: Arc<ChannelControls>,
}

/// The render core: everything the sink callback needs, nothing else.
///
/// Lives on the real-time render thread once the bus starts; reads only
/// atomics and lock-free rings.
pub(crate) struct BusRenderer {
    slots: Vec<ChannelSlot>,
    master_bits: Arc<AtomicU32>,
    scratch: Vec<f32>,
}

impl BusRenderer {
    pub(crate) fn new(slots: Vec<ChannelSlot>, master_bits: Arc<AtomicU32>) -> Self {
        Self {
            slots,
            master_bits,
            scratch: vec![0.0; MAX_RENDER_FRAMES * 2],
        }
    }

    /// Renders one block: clear, sum enabled channels with their gains,
    /// scale by master volume, clip at full scale.
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = (out.len() / 2).min(MAX_RENDER_FRAMES);
        let out = &mut out[..frames * 2];

        for slot in &mut self.slots {
            // Disabled channels are still drained so their rings don't
            // serve ten seconds of stale audio on re-enable.
            let scratch = &mut self.scratch[..out.len()];
            slot.fetch(scratch);

            if !slot.controls().is_enabled() {
                continue;
            }
            let gain = slot.controls().effective_gain() * slot.gain_override().unwrap_or(1.0);
            if gain == 0.0 {
                continue;
            }
            for (o, s) in out.iter_mut().zip(scratch.iter()) {
                *o += s * gain;
            }
        }

        let master = f32::from_bits(self.master_bits.load(Ordering::Relaxed));
        for o in out.iter_mut() {
            *o = (*o * master).clamp(-1.0, 1.0);
        }
    }
}

/// Shared state behind a [`NullSink`] handle.
struct NullSinkShared {
    renderer: Mutex<Option<BusRenderer>>,
    sample_rate: u32,
}

/// A capturing sink for in-process buses.
///
/// Stands in for a hardware output device: each [`pull`](Self::pull)
/// renders the next block exactly like a device callback would, and
/// returns the samples instead of playing them. Once the owning bus stops,
/// the handle is disconnected and yields `None`.
#[derive(Clone)]
pub struct NullSink {
    shared: Arc<NullSinkShared>,
}

impl NullSink {
    /// The sink's nominal sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Renders and captures the next `frames` stereo frames, or `None`
    /// once the bus has moved on from this sink.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        let mut guard = self.shared.renderer.lock();
        let renderer = guard.as_mut()?;
        let mut out = vec![0.0f32; frames * 2];
        renderer.render(&mut out);
        Some(out)
    }
}

/// In-process input wiring: drives one channel tap from a virtual
/// endpoint's input side, the way a device input callback would.
struct LoopbackPump {
    endpoint: Arc<VirtualEndpoint>,
    tap: ChannelTap,
    byte_buf: Vec<u8>,
    sample_buf: Vec<f32>,
}

impl LoopbackPump {
    fn pump(&mut self, frames: usize) {
        let bytes = frames * BYTES_PER_FRAME;
        self.byte_buf.resize(bytes, 0);
        // Short reads come back zero-filled, which is exactly what the
        // device callback would deliver.
        self.endpoint.read_client_input(&mut self.byte_buf);
        bytes_to_samples_into(&self.byte_buf, &mut self.sample_buf);
        self.tap.ingest(&self.sample_buf);
    }
}

/// Installed IO wiring for a running bus.
enum BusIo {
    /// CPAL streams on real devices.
    Device {
        input_streams: Vec<cpal::Stream>,
        output_stream: cpal::Stream,
    },
    /// Direct wiring to in-process virtual endpoints and a capturing sink.
    InProcess {
        pumps: Vec<LoopbackPump>,
        sink: NullSink,
    },
}

impl Drop for BusIo {
    fn drop(&mut self) {
        match self {
            // Output first, then inputs in reverse order of creation.
            BusIo::Device {
                input_streams,
                output_stream,
            } => {
                let _ = output_stream.pause();
                for stream in input_streams.iter().rev() {
                    let _ = stream.pause();
                }
            }
            BusIo::InProcess { pumps, sink } => {
                *sink.shared.renderer.lock() = None;
                for pump in pumps.iter().rev() {
                    pump.endpoint.stop_io();
                }
            }
        }
    }
}

/// A fan-in summing node followed by one output sink.
pub struct Bus {
    key: String,
    name: String,
    sink_id: Option<DeviceId>,
    state: BusState,
    master_bits: Arc<AtomicU32>,
    members: Vec<BusMember>,
    io: Option<BusIo>,
    sink_rate: u32,
    resolved_sink: Option<String>,
}

impl Bus {
    /// Creates an empty bus in the `Created` state.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            sink_id: None,
            state: BusState::Created,
            master_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            members: Vec::new(),
            io: None,
            sink_rate: 0,
            resolved_sink: None,
        }
    }

    /// The bus key (e.g. `personal`).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BusState {
        self.state
    }

    /// Whether the bus is running.
    pub fn is_running(&self) -> bool {
        self.state == BusState::Running
    }

    /// The configured sink id; `None` means the OS default output at start
    /// time.
    pub fn sink_id(&self) -> Option<&DeviceId> {
        self.sink_id.as_ref()
    }

    /// The sink name the bus actually started against, while running.
    pub fn resolved_sink(&self) -> Option<&str> {
        self.resolved_sink.as_deref()
    }

    /// The sink's nominal rate from the last start.
    pub fn sink_rate(&self) -> u32 {
        self.sink_rate
    }

    /// Master volume in `[0, 1]`.
    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_bits.load(Ordering::Relaxed))
    }

    /// Sets the master volume, clamped to `[0, 1]`. Takes effect at the
    /// next render cycle.
    pub fn set_master_volume(&self, volume: f32) {
        self.master_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Bus membership, in summing order.
    pub fn members(&self) -> &[BusMember] {
        &self.members
    }

    /// Controls for a member channel, if present.
    pub fn member_controls(&self, channel_id: &str) -> Option<&Arc<ChannelControls>> {
        self.members
            .iter()
            .find(|m| m.channel_id == channel_id)
            .map(|m| &m.controls)
    }

    /// Whether the bus contains the channel.
    pub fn contains_channel(&self, channel_id: &str) -> bool {
        self.member_controls(channel_id).is_some()
    }

    /// Adds a member. Structural membership changes require the bus to be
    /// rebuilt, so this is rejected while running.
    pub fn add_member(&mut self, member: BusMember) -> Result<(), MixError> {
        if self.state == BusState::Running {
            return Err(MixError::BusRunning {
                id: self.key.clone(),
            });
        }
        self.members.push(member);
        Ok(())
    }

    /// Selects the sink. Not permitted while running: callers stop,
    /// re-sink, and start (the routing manager wraps this as one switch
    /// operation).
    pub fn set_sink(&mut self, sink_id: Option<DeviceId>) -> Result<(), MixError> {
        if self.state == BusState::Running {
            return Err(MixError::BusRunning {
                id: self.key.clone(),
            });
        }
        self.sink_id = sink_id;
        self.state = BusState::Configured;
        Ok(())
    }

    fn check_can_start(&self) -> Result<(), MixError> {
        match self.state {
            BusState::Running => Err(MixError::BusRunning {
                id: self.key.clone(),
            }),
            BusState::Created => Err(MixError::BusNotConfigured {
                id: self.key.clone(),
            }),
            BusState::Configured | BusState::Stopped => Ok(()),
        }
    }

    /// Builds the render slots and input taps for every member.
    fn build_wiring(&self, rates: &[u32], sink_rate: u32) -> (Vec<ChannelTap>, BusRenderer) {
        let mut taps = Vec::with_capacity(self.members.len());
        let mut slots = Vec::with_capacity(self.members.len());
        for (member, &source_rate) in self.members.iter().zip(rates) {
            let (tap, slot) = channel_pair(
                Arc::clone(&member.controls),
                source_rate,
                sink_rate,
                member.gain_override,
            );
            taps.push(tap);
            slots.push(slot);
        }
        (taps, BusRenderer::new(slots, Arc::clone(&self.master_bits)))
    }

    /// Starts the bus against real devices.
    ///
    /// Resolves the sink (falling back to the OS default), queries nominal
    /// rates, installs one input stream per member and one output stream
    /// on the sink, and starts inputs before the output. Any failure rolls
    /// back the streams installed so far and leaves the bus stopped.
    pub fn start(&mut self, directory: &DeviceDirectory) -> Result<(), MixError> {
        self.check_can_start()?;

        let sink_device = directory.output_device(self.sink_id.as_ref())?;
        let sink_name = sink_device
            .name()
            .unwrap_or_else(|_| "unknown".to_string());
        let sink_config = sink_device
            .default_output_config()
            .map_err(|e| MixError::BackendError(e.to_string()))?;
        if sink_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(MixError::UnsupportedFormat {
                format: format!("{:?}", sink_config.sample_format()),
            });
        }
        let sink_rate = sink_config.sample_rate().0;

        // Resolve every source before installing anything.
        let mut sources = Vec::with_capacity(self.members.len());
        let mut rates = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let device = directory.input_device(&member.source_name)?;
            let config = device
                .default_input_config()
                .map_err(|e| MixError::BackendError(e.to_string()))?;
            rates.push(config.sample_rate().0);
            sources.push((device, config));
        }

        let (taps, renderer) = self.build_wiring(&rates, sink_rate);

        // Install input streams; a failure here drops the ones already
        // built, which is the rollback.
        let mut input_streams = Vec::with_capacity(taps.len());
        for ((device, config), mut tap) in sources.into_iter().zip(taps) {
            let stream_config = cpal::StreamConfig {
                channels: 2,
                sample_rate: config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        tap.ingest(data);
                    },
                    |err| {
                        tracing::error!("input stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| MixError::BackendError(e.to_string()))?;
            input_streams.push(stream);
        }

        let mut renderer = renderer;
        let output_config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sink_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_stream = sink_device
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                |err| {
                    tracing::error!("output stream error: {err}");
                },
                None,
            )
            .map_err(|e| MixError::BackendError(e.to_string()))?;

        // Inputs first, then the output.
        for stream in &input_streams {
            stream
                .play()
                .map_err(|e| MixError::BackendError(e.to_string()))?;
        }
        output_stream
            .play()
            .map_err(|e| MixError::BackendError(e.to_string()))?;

        tracing::info!(
            bus = %self.key,
            sink = %sink_name,
            sink_rate,
            channels = self.members.len(),
            "bus started"
        );

        self.io = Some(BusIo::Device {
            input_streams,
            output_stream,
        });
        self.sink_rate = sink_rate;
        self.resolved_sink = Some(sink_name);
        self.state = BusState::Running;
        Ok(())
    }

    /// Starts the bus wired directly to in-process virtual endpoints, with
    /// a capturing [`NullSink`] standing in for the output device.
    ///
    /// Sources resolve by endpoint name against the plugin host; the sink
    /// rate is the voice-chat endpoint family's preferred rate. Used by
    /// in-process embeddings and the end-to-end tests.
    pub fn start_in_process(
        &mut self,
        host: &PluginHost,
        sink_rate: u32,
    ) -> Result<NullSink, MixError> {
        self.check_can_start()?;

        let mut endpoints = Vec::with_capacity(self.members.len());
        let mut rates = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let endpoint = host.endpoint_by_name(&member.source_name).ok_or_else(|| {
                MixError::DeviceNotFound {
                    name: member.source_name.clone(),
                }
            })?;
            rates.push(endpoint.nominal_rate());
            endpoints.push(Arc::clone(endpoint));
        }

        let (taps, renderer) = self.build_wiring(&rates, sink_rate);

        let pumps: Vec<LoopbackPump> = endpoints
            .into_iter()
            .zip(taps)
            .map(|(endpoint, tap)| {
                endpoint.start_io();
                LoopbackPump {
                    endpoint,
                    tap,
                    byte_buf: Vec::new(),
                    sample_buf: Vec::new(),
                }
            })
            .collect();

        let sink = NullSink {
            shared: Arc::new(NullSinkShared {
                renderer: Mutex::new(Some(renderer)),
                sample_rate: sink_rate,
            }),
        };

        let sink_name = self
            .sink_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| "null".to_string());

        tracing::info!(
            bus = %self.key,
            sink = %sink_name,
            sink_rate,
            channels = self.members.len(),
            "bus started in-process"
        );

        self.io = Some(BusIo::InProcess {
            pumps,
            sink: sink.clone(),
        });
        self.sink_rate = sink_rate;
        self.resolved_sink = Some(sink_name);
        self.state = BusState::Running;
        Ok(sink)
    }

    /// The capturing sink of a running in-process bus.
    pub fn null_sink(&self) -> Option<NullSink> {
        match &self.io {
            Some(BusIo::InProcess { sink, .. }) => Some(sink.clone()),
            _ => None,
        }
    }

    /// Drives every in-process input by `frames` source frames, the way
    /// the device input callbacks would. No-op for device-backed buses.
    pub fn pump_inputs(&mut self, frames: usize) {
        if let Some(BusIo::InProcess { pumps, .. }) = &mut self.io {
            for pump in pumps.iter_mut() {
                pump.pump(frames);
            }
        }
    }

    /// Stops the bus: the output is stopped first, then the inputs in
    /// reverse order of creation, and the wiring is destroyed.
    pub fn stop(&mut self) {
        if self.state != BusState::Running {
            return;
        }
        self.io = None;
        self.resolved_sink = None;
        self.state = BusState::Stopped;
        tracing::info!(bus = %self.key, "bus stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::samples_to_bytes;

    fn member(id: &str, source: &str, gain: f32) -> BusMember {
        BusMember {
            channel_id: id.to_string(),
            source_name: source.to_string(),
            gain_override: None,
            controls: Arc::new(ChannelControls::new(gain, false, true)),
        }
    }

    fn write_constant(host: &PluginHost, endpoint: &str, value: f32, frames: usize) {
        let samples = vec![value; frames * 2];
        host.endpoint_by_name(endpoint)
            .expect("endpoint exists")
            .write_mixed_output(&samples_to_bytes(&samples));
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut bus = Bus::new("personal", "Personal");
        assert_eq!(bus.state(), BusState::Created);

        // Starting unconfigured is rejected.
        let host = PluginHost::new();
        assert!(matches!(
            bus.start_in_process(&host, 48_000),
            Err(MixError::BusNotConfigured { .. })
        ));

        bus.set_sink(None).expect("set_sink on created bus");
        assert_eq!(bus.state(), BusState::Configured);

        bus.start_in_process(&host, 48_000).expect("start");
        assert_eq!(bus.state(), BusState::Running);
        assert!(bus.set_sink(None).is_err());
        assert!(bus.start_in_process(&host, 48_000).is_err());

        bus.stop();
        assert_eq!(bus.state(), BusState::Stopped);
        bus.set_sink(Some(DeviceId::new("Speakers")))
            .expect("re-sink stopped bus");
        assert_eq!(bus.state(), BusState::Configured);
    }

    #[test]
    fn test_single_member_passthrough_gain() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        write_constant(&host, "Panel K1", 0.5, 256);
        bus.pump_inputs(256);
        let out = sink.pull(256).expect("sink alive");
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_two_members_sum_with_gains() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 0.5)).expect("add");
        bus.add_member(member("k2", "Panel K2", 0.25)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        write_constant(&host, "Panel K1", 1.0, 128);
        write_constant(&host, "Panel K2", 1.0, 128);
        bus.pump_inputs(128);
        let out = sink.pull(128).expect("sink alive");
        // 1.0*0.5 + 1.0*0.25
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_gain_override_and_master_scale() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        let mut m = member("k1", "Panel K1", 1.0);
        m.gain_override = Some(0.5);
        bus.add_member(m).expect("add");
        bus.set_sink(None).expect("sink");
        bus.set_master_volume(0.5);
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        write_constant(&host, "Panel K1", 0.8, 64);
        bus.pump_inputs(64);
        let out = sink.pull(64).expect("sink alive");
        // 0.8 * 1.0 * 0.5 (override) * 0.5 (master)
        assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_disabled_member_is_silent_but_drained() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        let m = member("k1", "Panel K1", 1.0);
        let controls = Arc::clone(&m.controls);
        bus.add_member(m).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        controls.set_enabled(false);
        write_constant(&host, "Panel K1", 0.9, 64);
        bus.pump_inputs(64);
        let out = sink.pull(64).expect("sink alive");
        assert!(out.iter().all(|&s| s == 0.0));

        // Re-enable: the next block plays fresh audio, not the stale 0.9s.
        controls.set_enabled(true);
        write_constant(&host, "Panel K1", 0.3, 64);
        bus.pump_inputs(64);
        let out = sink.pull(64).expect("sink alive");
        assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_soft_clip_limits_output() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.add_member(member("k2", "Panel K2", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        write_constant(&host, "Panel K1", 0.9, 64);
        write_constant(&host, "Panel K2", 0.9, 64);
        bus.pump_inputs(64);
        let out = sink.pull(64).expect("sink alive");
        assert!(out.iter().all(|&s| s <= 1.0));
        assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_underrunning_member_sums_as_silence() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.add_member(member("k2", "Panel K2", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        // Only K1 gets audio; K2 underruns independently.
        write_constant(&host, "Panel K1", 0.4, 64);
        bus.pump_inputs(64);
        let out = sink.pull(64).expect("sink alive");
        assert!(out.iter().all(|&s| (s - 0.4).abs() < 1e-6));
        bus.stop();
    }

    #[test]
    fn test_stop_disconnects_null_sink() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");
        assert!(sink.pull(16).is_some());

        bus.stop();
        assert!(sink.pull(16).is_none());
        assert!(bus.null_sink().is_none());
    }

    #[test]
    fn test_unknown_source_fails_start_and_stops_io_rollback() {
        let host = PluginHost::new();
        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.add_member(member("zz", "Panel Z9", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");

        let err = match bus.start_in_process(&host, 48_000) {
            Err(e) => e,
            Ok(_) => panic!("start should fail on an unknown source"),
        };
        assert!(matches!(err, MixError::DeviceNotFound { .. }));
        assert_eq!(bus.state(), BusState::Configured);
        // Nothing was left half-installed.
        assert!(!host
            .endpoint_by_name("Panel K1")
            .expect("endpoint exists")
            .io_running());
    }

    #[test]
    fn test_rate_mismatch_installs_resampler_path() {
        let host = PluginHost::new();
        host.endpoint_by_name("Panel K1")
            .expect("endpoint exists")
            .set_nominal_rate(44_100)
            .expect("rate supported");

        let mut bus = Bus::new("personal", "Personal");
        bus.add_member(member("k1", "Panel K1", 1.0)).expect("add");
        bus.set_sink(None).expect("sink");
        let sink = bus.start_in_process(&host, 48_000).expect("start");

        // Feed a constant; after the resampler warms up the output holds
        // the level at the sink rate.
        write_constant(&host, "Panel K1", 0.6, 4410);
        bus.pump_inputs(4410);
        let out = sink.pull(480).expect("sink alive");
        assert!(out[40..].iter().all(|&s| (s - 0.6).abs() < 1e-3));
        bus.stop();
    }
}
