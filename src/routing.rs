//! Routing manager: owns channels, buses, and the hardware mapping.
//!
//! The manager is the single control-plane entry point: it loads the
//! persisted configuration, builds and starts the buses, applies hardware
//! events, and schedules debounced saves. All methods are synchronous and
//! take a coarse internal lock; none of them are called from real-time
//! threads - gain and mute changes reach the render path through the
//! channels' atomics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{
    BusChannelConfig, HardwareActionKind, MixBusConfig, RoutingConfig, PERSONAL_BUS, VOICECHAT_BUS,
};
use crate::devices::{DeviceDirectory, DeviceId, DeviceInfo};
use crate::error::MixError;
use crate::event::{EventCallback, MixerEvent};
use crate::meter::{is_active, MeterReporter};
use crate::mixer::{Bus, BusMember, ChannelControls, NullSink};
use crate::plugin::{PluginHost, VOICE_CHAT_NAME};

/// Maximum channel label length in Unicode code points.
pub const MAX_LABEL_CODE_POINTS: usize = 32;

/// Coalescing window for configuration saves.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(1);

/// Sink rate used for in-process buses (the endpoints' preferred rate).
const IN_PROCESS_SINK_RATE: u32 = 48_000;

/// How bus IO is wired to the world.
pub enum MixerBackend {
    /// CPAL streams on real OS devices (production).
    Device,
    /// Direct wiring to an in-process plugin host with capturing sinks.
    InProcess(Arc<PluginHost>),
}

/// A decoded event from the hardware panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEvent {
    /// A knob or slider moved; `value` is the raw 0-255 position.
    Dial {
        /// Hardware control index.
        index: u8,
        /// Raw position.
        value: u8,
    },
    /// A button changed state.
    Button {
        /// Hardware control index.
        index: u8,
        /// Whether the button is down.
        pressed: bool,
    },
}

/// Snapshot of one channel for UI consumption.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    /// Channel id.
    pub id: String,
    /// User-facing label.
    pub label: String,
    /// Bound hardware control index.
    pub hardware_index: u8,
    /// Configured volume in `[0, 1]`.
    pub volume: f32,
    /// Whether the channel is muted.
    pub muted: bool,
    /// Whether the channel saw audio within the activity window.
    pub active: bool,
    /// Applications currently playing to this channel (externally fed).
    pub apps: Vec<String>,
    /// Render-side underruns on the primary bus instance.
    pub underruns: u64,
}

/// Snapshot of one bus membership entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMemberView {
    /// Member channel id.
    pub channel_id: String,
    /// Whether the channel is summed into this bus.
    pub enabled: bool,
    /// Per-bus gain override, if any.
    pub gain_override: Option<f32>,
}

/// Snapshot of one bus.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusView {
    /// Bus key.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Configured sink id; `null` means the default output.
    pub sink_id: Option<String>,
    /// Memberships in summing order.
    pub channels: Vec<BusMemberView>,
    /// Whether the bus is currently running.
    pub running: bool,
}

/// Snapshot of an available output device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    /// Device id.
    pub id: String,
    /// Device name.
    pub name: String,
}

/// Full control-surface state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    /// All configured channels.
    pub channels: Vec<ChannelView>,
    /// All buses.
    pub buses: Vec<BusView>,
    /// Available output devices.
    pub outputs: Vec<OutputView>,
}

struct Inner {
    config: RoutingConfig,
    buses: Vec<Bus>,
    active_apps: HashMap<String, Vec<String>>,
    initialized: bool,
}

struct Saver {
    tx: mpsc::UnboundedSender<RoutingConfig>,
    handle: tokio::task::JoinHandle<()>,
}

/// The per-app-instance routing registry.
///
/// One of the two process-wide singletons (the other is the plugin host);
/// `initialize`/`shutdown` are idempotent.
pub struct RoutingManager {
    inner: Mutex<Inner>,
    config_path: PathBuf,
    backend: MixerBackend,
    directory: DeviceDirectory,
    event_callback: Option<EventCallback>,
    saver: Mutex<Option<Saver>>,
}

impl RoutingManager {
    /// Creates a manager that persists to `config_path`.
    pub fn new(config_path: PathBuf, backend: MixerBackend) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config: RoutingConfig::default(),
                buses: Vec::new(),
                active_apps: HashMap::new(),
                initialized: false,
            }),
            config_path,
            backend,
            directory: DeviceDirectory::new(),
            event_callback: None,
            saver: Mutex::new(None),
        }
    }

    /// Installs an event callback for lifecycle and persistence events.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    fn emit(&self, event: MixerEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    /// Loads the configuration, builds both buses, and starts them.
    ///
    /// The `personal` bus always starts (a missing sink is logged and
    /// leaves it stopped; the rest keeps running). The `voicechat` bus is
    /// skipped while it has no enabled members or its endpoint is absent;
    /// its configuration is retained either way. Idempotent.
    pub async fn initialize(&self) -> Result<(), MixError> {
        {
            let mut inner = self.inner.lock();
            if inner.initialized {
                return Ok(());
            }
            inner.config = RoutingConfig::load(&self.config_path)?;

            let inner = &mut *inner;
            inner.buses = inner
                .config
                .mix_buses
                .iter()
                .map(|bus_cfg| build_bus(&inner.config, bus_cfg))
                .collect();

            for i in 0..inner.buses.len() {
                let key = inner.buses[i].key().to_string();
                if key == VOICECHAT_BUS && !self.voicechat_should_start(&inner, i) {
                    tracing::info!("voicechat bus not started (no enabled members or endpoint)");
                    continue;
                }
                if let Err(e) = self.start_bus(&mut inner.buses[i]) {
                    tracing::warn!(bus = %key, error = %e, "bus failed to start");
                    self.emit(MixerEvent::BusStartFailed {
                        bus: key,
                        error: e.to_string(),
                    });
                } else {
                    self.emit_started(&inner.buses[i]);
                }
            }
            inner.initialized = true;
        }

        self.install_saver();
        Ok(())
    }

    /// Stops all buses and flushes the configuration synchronously.
    /// Idempotent.
    pub fn shutdown(&self) {
        let config = {
            let mut inner = self.inner.lock();
            if !inner.initialized {
                return;
            }
            for bus in &mut inner.buses {
                if bus.is_running() {
                    // Final health report before teardown.
                    for member in bus.members() {
                        let total = member.controls.underruns();
                        if total > 0 {
                            self.emit(MixerEvent::ChannelUnderruns {
                                channel: member.channel_id.clone(),
                                total,
                            });
                        }
                    }
                    bus.stop();
                    self.emit(MixerEvent::BusStopped {
                        bus: bus.key().to_string(),
                    });
                }
            }
            inner.initialized = false;
            inner.config.clone()
        };

        if let Some(saver) = self.saver.lock().take() {
            saver.handle.abort();
        }
        if let Err(e) = config.save(&self.config_path) {
            tracing::warn!(error = %e, "final config save failed");
            self.emit(MixerEvent::ConfigSaveFailed {
                error: e.to_string(),
            });
        }
    }

    fn install_saver(&self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RoutingConfig>();
        let path = self.config_path.clone();
        let callback = self.event_callback.clone();
        let handle = tokio::spawn(async move {
            while let Some(mut config) = rx.recv().await {
                // Coalesce every mutation that lands within the window.
                tokio::time::sleep(SAVE_DEBOUNCE).await;
                while let Ok(newer) = rx.try_recv() {
                    config = newer;
                }
                if let Err(e) = config.save(&path) {
                    tracing::warn!(error = %e, "config save failed");
                    if let Some(cb) = &callback {
                        cb(MixerEvent::ConfigSaveFailed {
                            error: e.to_string(),
                        });
                    }
                }
            }
        });
        *self.saver.lock() = Some(Saver { tx, handle });
    }

    fn schedule_save(&self, config: &RoutingConfig) {
        if let Some(saver) = self.saver.lock().as_ref() {
            let _ = saver.tx.send(config.clone());
        }
    }

    fn start_bus(&self, bus: &mut Bus) -> Result<(), MixError> {
        match &self.backend {
            MixerBackend::Device => bus.start(&self.directory),
            MixerBackend::InProcess(host) => {
                bus.start_in_process(host, IN_PROCESS_SINK_RATE).map(|_| ())
            }
        }
    }

    fn emit_started(&self, bus: &Bus) {
        self.emit(MixerEvent::BusStarted {
            bus: bus.key().to_string(),
            sink: bus.resolved_sink().unwrap_or("unknown").to_string(),
        });
    }

    fn voicechat_should_start(&self, inner: &Inner, bus_index: usize) -> bool {
        let has_enabled = inner.buses[bus_index]
            .members()
            .iter()
            .any(|m| m.controls.is_enabled());
        if !has_enabled {
            return false;
        }
        match &self.backend {
            MixerBackend::InProcess(host) => host.endpoint_by_name(VOICE_CHAT_NAME).is_some(),
            MixerBackend::Device => self.directory.output_device(Some(&DeviceId::from(VOICE_CHAT_NAME))).is_ok(),
        }
    }

    /// Returns the full control-surface state.
    pub fn get_state(&self) -> StateView {
        let inner = self.inner.lock();
        self.state_view(&inner)
    }

    fn state_view(&self, inner: &Inner) -> StateView {
        let primary = inner.buses.iter().find(|b| b.key() == PERSONAL_BUS);
        let channels = inner
            .config
            .input_channels
            .iter()
            .map(|ch| {
                let controls = primary.and_then(|bus| bus.member_controls(&ch.id));
                ChannelView {
                    id: ch.id.clone(),
                    label: ch.channel_name.clone(),
                    hardware_index: ch.hardware_index,
                    volume: ch.volume,
                    muted: ch.muted,
                    active: controls.map(|c| is_active(c)).unwrap_or(false),
                    apps: inner.active_apps.get(&ch.id).cloned().unwrap_or_default(),
                    underruns: controls.map(|c| c.underruns()).unwrap_or(0),
                }
            })
            .collect();

        let buses = inner
            .buses
            .iter()
            .map(|bus| {
                let bus_cfg = inner.config.bus(bus.key());
                BusView {
                    id: bus.key().to_string(),
                    name: bus.name().to_string(),
                    sink_id: bus.sink_id().map(|id| id.as_str().to_string()),
                    channels: bus_cfg
                        .map(|cfg| {
                            cfg.channels
                                .iter()
                                .map(|m| BusMemberView {
                                    channel_id: m.channel_id.clone(),
                                    enabled: m.enabled,
                                    gain_override: m.gain_override,
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                    running: bus.is_running(),
                }
            })
            .collect();

        let outputs = self
            .directory
            .list_outputs()
            .unwrap_or_default()
            .into_iter()
            .map(|d: DeviceInfo| OutputView {
                id: d.id.as_str().to_string(),
                name: d.name,
            })
            .collect();

        StateView {
            channels,
            buses,
            outputs,
        }
    }

    /// Renames a channel. Labels are capped at 32 code points.
    pub fn set_channel_label(&self, id: &str, label: &str) -> Result<StateView, MixError> {
        let length = label.chars().count();
        if length > MAX_LABEL_CODE_POINTS {
            return Err(MixError::LabelTooLong {
                length,
                max: MAX_LABEL_CODE_POINTS,
            });
        }
        let mut inner = self.inner.lock();
        let channel = inner
            .config
            .channel_mut(id)
            .ok_or_else(|| MixError::UnknownChannel { id: id.to_string() })?;
        channel.channel_name = label.to_string();
        self.schedule_save(&inner.config);
        Ok(self.state_view(&inner))
    }

    /// Sets a channel's volume (clamped to `[0, 1]`) and broadcasts the
    /// effective gain to every bus containing it.
    pub fn set_channel_volume(&self, id: &str, volume: f32) -> Result<(), MixError> {
        let volume = volume.clamp(0.0, 1.0);
        let mut inner = self.inner.lock();
        let channel = inner
            .config
            .channel_mut(id)
            .ok_or_else(|| MixError::UnknownChannel { id: id.to_string() })?;
        channel.volume = volume;
        broadcast(&inner.buses, id, |c| c.set_gain(volume));
        self.schedule_save(&inner.config);
        Ok(())
    }

    /// Sets a channel's mute flag and broadcasts it.
    pub fn set_channel_muted(&self, id: &str, muted: bool) -> Result<(), MixError> {
        let mut inner = self.inner.lock();
        let channel = inner
            .config
            .channel_mut(id)
            .ok_or_else(|| MixError::UnknownChannel { id: id.to_string() })?;
        channel.muted = muted;
        broadcast(&inner.buses, id, |c| c.set_muted(muted));
        self.schedule_save(&inner.config);
        Ok(())
    }

    /// Adds a channel to a bus or flips its membership flag.
    ///
    /// Flipping an existing membership is a pure atomic toggle. Adding a
    /// brand-new member restructures the bus, which means a restart when
    /// it is running - and for a stopped `voicechat` bus, an on-demand
    /// start once it gains its first enabled member.
    pub fn set_channel_in_mix(
        &self,
        bus_id: &str,
        channel_id: &str,
        enabled: bool,
    ) -> Result<(), MixError> {
        let mut inner = self.inner.lock();
        if inner.config.channel(channel_id).is_none() {
            return Err(MixError::UnknownChannel {
                id: channel_id.to_string(),
            });
        }
        let bus_cfg = inner
            .config
            .bus_mut(bus_id)
            .ok_or_else(|| MixError::UnknownBus {
                id: bus_id.to_string(),
            })?;

        let mut structural_change = false;
        match bus_cfg.channels.iter_mut().find(|m| m.channel_id == channel_id) {
            Some(member) => member.enabled = enabled,
            None => {
                bus_cfg.channels.push(BusChannelConfig {
                    channel_id: channel_id.to_string(),
                    enabled,
                    gain_override: None,
                });
                structural_change = true;
            }
        }

        let bus_index = inner
            .buses
            .iter()
            .position(|b| b.key() == bus_id)
            .ok_or_else(|| MixError::UnknownBus {
                id: bus_id.to_string(),
            })?;

        if structural_change {
            self.rebuild_bus(&mut inner, bus_index)?;
        } else if let Some(controls) = inner.buses[bus_index].member_controls(channel_id) {
            controls.set_enabled(enabled);
        }

        // On-demand start for a voicechat bus that just gained a member.
        if bus_id == VOICECHAT_BUS
            && !inner.buses[bus_index].is_running()
            && self.voicechat_should_start(&inner, bus_index)
        {
            match self.start_bus(&mut inner.buses[bus_index]) {
                Ok(()) => self.emit_started(&inner.buses[bus_index]),
                Err(e) => {
                    tracing::warn!(error = %e, "on-demand voicechat start failed");
                    self.emit(MixerEvent::BusStartFailed {
                        bus: VOICECHAT_BUS.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.schedule_save(&inner.config);
        Ok(())
    }

    /// Rebuilds one bus from its configuration, restarting it if it was
    /// running.
    fn rebuild_bus(&self, inner: &mut Inner, bus_index: usize) -> Result<(), MixError> {
        let was_running = inner.buses[bus_index].is_running();
        if was_running {
            inner.buses[bus_index].stop();
        }
        let key = inner.buses[bus_index].key().to_string();
        let bus_cfg = inner
            .config
            .bus(&key)
            .cloned()
            .ok_or_else(|| MixError::UnknownBus { id: key })?;
        inner.buses[bus_index] = build_bus(&inner.config, &bus_cfg);
        if was_running {
            self.start_bus(&mut inner.buses[bus_index])?;
        }
        Ok(())
    }

    /// Atomically switches a bus to another sink: stop, re-sink, restart.
    ///
    /// No audio reaches the old or the new sink during the switch window.
    /// If the restart fails the bus stays stopped and the error surfaces.
    pub fn set_bus_sink(&self, bus_id: &str, sink: Option<DeviceId>) -> Result<(), MixError> {
        let mut inner = self.inner.lock();
        let bus_index = inner
            .buses
            .iter()
            .position(|b| b.key() == bus_id)
            .ok_or_else(|| MixError::UnknownBus {
                id: bus_id.to_string(),
            })?;

        if inner.buses[bus_index].is_running() {
            inner.buses[bus_index].stop();
            self.emit(MixerEvent::BusStopped {
                bus: bus_id.to_string(),
            });
        }

        if let Some(bus_cfg) = inner.config.bus_mut(bus_id) {
            bus_cfg.output_device_id = sink.as_ref().map(|id| id.as_str().to_string());
        }
        inner.buses[bus_index].set_sink(sink)?;
        self.schedule_save(&inner.config);

        match self.start_bus(&mut inner.buses[bus_index]) {
            Ok(()) => {
                self.emit_started(&inner.buses[bus_index]);
                Ok(())
            }
            Err(e) => {
                self.emit(MixerEvent::BusStartFailed {
                    bus: bus_id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Applies a decoded hardware event through the index mapping.
    ///
    /// Unknown indices are logged and ignored; a mapping kind that doesn't
    /// match the event kind is ignored quietly.
    pub fn on_hardware_event(&self, event: HardwareEvent) {
        let index = match event {
            HardwareEvent::Dial { index, .. } | HardwareEvent::Button { index, .. } => index,
        };

        let action = {
            let inner = self.inner.lock();
            match inner.config.hardware_mapping.get(&index) {
                Some(mapping) => mapping.clone(),
                None => {
                    tracing::warn!(index, "hardware event for unmapped index");
                    return;
                }
            }
        };

        match (action.kind, event) {
            (HardwareActionKind::Volume, HardwareEvent::Dial { value, .. }) => {
                let volume = f32::from(value) / 255.0;
                if let Err(e) = self.set_channel_volume(&action.target_id, volume) {
                    tracing::warn!(error = %e, "hardware volume update failed");
                }
            }
            (HardwareActionKind::MuteToggle, HardwareEvent::Button { pressed: true, .. }) => {
                let muted = {
                    let inner = self.inner.lock();
                    inner
                        .config
                        .channel(&action.target_id)
                        .map(|ch| ch.muted)
                        .unwrap_or(false)
                };
                if let Err(e) = self.set_channel_muted(&action.target_id, !muted) {
                    tracing::warn!(error = %e, "hardware mute toggle failed");
                }
            }
            _ => {
                tracing::debug!(index, "hardware event kind doesn't match mapping");
            }
        }
    }

    /// Lists the available output devices.
    pub fn list_outputs(&self) -> Result<Vec<DeviceInfo>, MixError> {
        self.directory.list_outputs()
    }

    /// Builds a meter reporter over the primary (`personal`) bus's
    /// channels.
    pub fn meter_reporter(&self) -> MeterReporter {
        let inner = self.inner.lock();
        let entries = inner
            .buses
            .iter()
            .find(|b| b.key() == PERSONAL_BUS)
            .map(|bus| {
                bus.members()
                    .iter()
                    .map(|m| (m.channel_id.clone(), Arc::clone(&m.controls)))
                    .collect()
            })
            .unwrap_or_default();
        MeterReporter::from_entries(entries)
    }

    /// Records the applications currently playing into a channel.
    ///
    /// Attribution is an external data source; the manager only stores the
    /// latest list for `get_state`.
    pub fn report_active_apps(&self, channel_id: &str, apps: Vec<String>) {
        self.inner
            .lock()
            .active_apps
            .insert(channel_id.to_string(), apps);
    }

    /// Drives the in-process inputs of a bus by `frames` source frames.
    ///
    /// Only meaningful for the in-process backend, where no OS audio
    /// server schedules the callbacks.
    pub fn pump_bus(&self, bus_id: &str, frames: usize) -> Result<(), MixError> {
        let mut inner = self.inner.lock();
        let bus = inner
            .buses
            .iter_mut()
            .find(|b| b.key() == bus_id)
            .ok_or_else(|| MixError::UnknownBus {
                id: bus_id.to_string(),
            })?;
        bus.pump_inputs(frames);
        Ok(())
    }

    /// The capturing sink of a running in-process bus.
    pub fn null_sink(&self, bus_id: &str) -> Option<NullSink> {
        let inner = self.inner.lock();
        inner
            .buses
            .iter()
            .find(|b| b.key() == bus_id)
            .and_then(|b| b.null_sink())
    }
}

/// Applies a controls update to every bus containing the channel.
fn broadcast(buses: &[Bus], channel_id: &str, apply: impl Fn(&ChannelControls)) {
    for bus in buses {
        if let Some(controls) = bus.member_controls(channel_id) {
            apply(controls);
        }
    }
}

/// Builds a bus (with live channel controls) from its configuration.
fn build_bus(config: &RoutingConfig, bus_cfg: &MixBusConfig) -> Bus {
    let mut bus = Bus::new(&bus_cfg.id, &bus_cfg.name);
    for member in &bus_cfg.channels {
        let Some(channel) = config.channel(&member.channel_id) else {
            // validate() rejects dangling members; tolerate here anyway.
            continue;
        };
        let controls = Arc::new(ChannelControls::new(
            channel.volume,
            channel.muted,
            member.enabled,
        ));
        // add_member only fails on a running bus; this one is fresh.
        let _ = bus.add_member(BusMember {
            channel_id: member.channel_id.clone(),
            source_name: channel.device_name.clone(),
            gain_override: member.gain_override,
            controls,
        });
    }

    // A null sink means "default output" - except for the voicechat bus,
    // whose natural sink is the voice-chat endpoint itself.
    let sink = bus_cfg
        .output_device_id
        .as_deref()
        .map(DeviceId::from)
        .or_else(|| {
            (bus_cfg.id == VOICECHAT_BUS).then(|| DeviceId::from(VOICE_CHAT_NAME))
        });
    let _ = bus.set_sink(sink);
    bus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_process_manager(dir: &tempfile::TempDir) -> RoutingManager {
        let host = Arc::new(PluginHost::new());
        RoutingManager::new(
            dir.path().join("config.json"),
            MixerBackend::InProcess(host),
        )
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("first init");
        manager.initialize().await.expect("second init");

        let state = manager.get_state();
        assert_eq!(state.channels.len(), 9);
        assert_eq!(state.buses.len(), 2);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_personal_runs_voicechat_stays_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        let state = manager.get_state();
        let personal = state.buses.iter().find(|b| b.id == "personal").expect("bus");
        assert!(personal.running);
        let voicechat = state.buses.iter().find(|b| b.id == "voicechat").expect("bus");
        assert!(!voicechat.running);
        assert!(voicechat.channels.is_empty());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_set_channel_volume_updates_config_and_gains() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        manager.set_channel_volume("k2", 0.25).expect("volume");
        let state = manager.get_state();
        let ch = state.channels.iter().find(|c| c.id == "k2").expect("k2");
        assert!((ch.volume - 0.25).abs() < 1e-6);

        // Out-of-range values clamp instead of erroring.
        manager.set_channel_volume("k2", 7.0).expect("volume");
        assert!(
            (manager.get_state().channels[1].volume - 1.0).abs() < 1e-6
        );

        assert!(manager.set_channel_volume("nope", 0.5).is_err());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_set_channel_label_enforces_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        let state = manager.set_channel_label("k1", "Browser").expect("label");
        assert_eq!(state.channels[0].label, "Browser");

        // 32 code points is fine, 33 is not; count code points, not bytes.
        let ok = "é".repeat(32);
        manager.set_channel_label("k1", &ok).expect("32 points");
        let too_long = "é".repeat(33);
        assert!(matches!(
            manager.set_channel_label("k1", &too_long),
            Err(MixError::LabelTooLong { length: 33, .. })
        ));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_hardware_dial_sets_volume() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        // Index 3 maps to k4 by default.
        manager.on_hardware_event(HardwareEvent::Dial { index: 3, value: 0 });
        let state = manager.get_state();
        let k4 = state.channels.iter().find(|c| c.id == "k4").expect("k4");
        assert_eq!(k4.volume, 0.0);

        manager.on_hardware_event(HardwareEvent::Dial {
            index: 3,
            value: 255,
        });
        let state = manager.get_state();
        let k4 = state.channels.iter().find(|c| c.id == "k4").expect("k4");
        assert_eq!(k4.volume, 1.0);

        // Unknown index: ignored.
        manager.on_hardware_event(HardwareEvent::Dial {
            index: 99,
            value: 10,
        });
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_hardware_button_toggles_mute_via_mapping() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        // Rebind index 0 to a mute toggle.
        {
            let mut inner = manager.inner.lock();
            inner.config.hardware_mapping.insert(
                0,
                crate::config::HardwareMapping {
                    kind: crate::config::HardwareActionKind::MuteToggle,
                    target_id: "k1".to_string(),
                },
            );
        }

        manager.on_hardware_event(HardwareEvent::Button {
            index: 0,
            pressed: true,
        });
        assert!(manager.get_state().channels[0].muted);

        // Release does nothing; next press toggles back.
        manager.on_hardware_event(HardwareEvent::Button {
            index: 0,
            pressed: false,
        });
        assert!(manager.get_state().channels[0].muted);
        manager.on_hardware_event(HardwareEvent::Button {
            index: 0,
            pressed: true,
        });
        assert!(!manager.get_state().channels[0].muted);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_voicechat_starts_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");
        assert!(!manager.get_state().buses[1].running);

        manager
            .set_channel_in_mix("voicechat", "k1", true)
            .expect("add member");

        let state = manager.get_state();
        let voicechat = state.buses.iter().find(|b| b.id == "voicechat").expect("bus");
        assert!(voicechat.running);
        assert_eq!(voicechat.channels.len(), 1);
        assert!(voicechat.channels[0].enabled);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_set_channel_in_mix_rejects_unknowns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        assert!(matches!(
            manager.set_channel_in_mix("personal", "ghost", true),
            Err(MixError::UnknownChannel { .. })
        ));
        assert!(matches!(
            manager.set_channel_in_mix("ghost", "k1", true),
            Err(MixError::UnknownBus { .. })
        ));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_persists_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        {
            let manager = in_process_manager(&dir);
            manager.initialize().await.expect("init");
            manager.set_channel_volume("s3", 0.5).expect("volume");
            manager.set_channel_muted("s3", true).expect("mute");
            manager.shutdown();
        }

        let config = RoutingConfig::load(&path).expect("reload");
        let s3 = config.channel("s3").expect("s3");
        assert!((s3.volume - 0.5).abs() < 1e-6);
        assert!(s3.muted);
    }

    #[tokio::test]
    async fn test_meter_reporter_covers_primary_bus() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        let reporter = manager.meter_reporter();
        let levels = reporter.levels();
        assert_eq!(levels.len(), 9);
        assert_eq!(reporter.activity("k1"), Some(false));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_report_active_apps_surfaces_in_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = in_process_manager(&dir);
        manager.initialize().await.expect("init");

        manager.report_active_apps("k1", vec!["Music.app".to_string()]);
        let state = manager.get_state();
        assert_eq!(state.channels[0].apps, vec!["Music.app".to_string()]);
        manager.shutdown();
    }
}
