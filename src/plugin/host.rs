//! Plugin host: owns the virtual endpoints and the OS entry point.
//!
//! The OS audio server loads the plugin once and calls the entry function
//! with an allocator handle and a type UUID; a matching UUID yields a
//! reference the server retains for the plugin's lifetime. Repeated calls
//! return the same reference.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use uuid::Uuid;

use super::endpoint::{EndpointParams, VirtualEndpoint};

/// The audio-plugin type UUID the entry point accepts
/// (443ABAB8-E7B3-491A-B985-BEB9187030DB).
pub const PLUGIN_TYPE_UUID: Uuid = Uuid::from_bytes([
    0x44, 0x3a, 0xba, 0xb8, 0xe7, 0xb3, 0x49, 0x1a, 0xb9, 0x85, 0xbe, 0xb9, 0x18, 0x70, 0x30, 0xdb,
]);

/// Opaque allocator handle passed by the OS; unused by this plugin.
pub type AllocatorRef = *const std::ffi::c_void;

/// Number of one-way panel endpoints (five knobs, four sliders).
pub const PANEL_ENDPOINT_COUNT: usize = 9;

/// Name of the bidirectional voice-chat endpoint.
pub const VOICE_CHAT_NAME: &str = "Panel Voice Chat";

/// Panel endpoint names in hardware order (K = knob, S = slider).
pub const PANEL_ENDPOINT_NAMES: [&str; PANEL_ENDPOINT_COUNT] = [
    "Panel K1", "Panel K2", "Panel K3", "Panel K4", "Panel K5", "Panel S1", "Panel S2", "Panel S3",
    "Panel S4",
];

const MANUFACTURER: &str = "Panelmix";
const MODEL_UID: &str = "com.panelmix.audio.model";
const DEFAULT_RATE: u32 = 48_000;

/// Owns all virtual endpoints for the plugin's lifetime.
///
/// Nine one-way panel endpoints plus the bidirectional voice-chat endpoint
/// whose input stream applications see as a microphone.
pub struct PluginHost {
    panel: Vec<Arc<VirtualEndpoint>>,
    voice_chat: Arc<VirtualEndpoint>,
}

impl PluginHost {
    /// Builds the full endpoint set.
    ///
    /// The OS path goes through [`plugin_entry`], which constructs the host
    /// once per load; in-process embedding (and tests) may build their own.
    pub fn new() -> Self {
        let panel = PANEL_ENDPOINT_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Arc::new(VirtualEndpoint::new(EndpointParams {
                    name: (*name).to_string(),
                    uid: format!("com.panelmix.audio.device.{}", i + 1),
                    manufacturer: MANUFACTURER.to_string(),
                    model_uid: MODEL_UID.to_string(),
                    sample_rate: DEFAULT_RATE,
                    input_has_controls: false,
                }))
            })
            .collect();

        let voice_chat = Arc::new(VirtualEndpoint::new(EndpointParams {
            name: VOICE_CHAT_NAME.to_string(),
            uid: "com.panelmix.audio.voicechat".to_string(),
            manufacturer: MANUFACTURER.to_string(),
            model_uid: MODEL_UID.to_string(),
            sample_rate: DEFAULT_RATE,
            input_has_controls: true,
        }));

        Self { panel, voice_chat }
    }

    /// The nine one-way panel endpoints, in hardware order.
    pub fn panel_endpoints(&self) -> &[Arc<VirtualEndpoint>] {
        &self.panel
    }

    /// The bidirectional voice-chat endpoint (virtual microphone).
    pub fn voice_chat(&self) -> &Arc<VirtualEndpoint> {
        &self.voice_chat
    }

    /// All endpoints, panel first, then voice chat.
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<VirtualEndpoint>> {
        self.panel.iter().chain(std::iter::once(&self.voice_chat))
    }

    /// Looks up an endpoint by its device name.
    pub fn endpoint_by_name(&self, name: &str) -> Option<&Arc<VirtualEndpoint>> {
        self.endpoints().find(|ep| ep.name() == name)
    }

    /// Looks up an endpoint by its stable UID.
    pub fn endpoint_by_uid(&self, uid: &str) -> Option<&Arc<VirtualEndpoint>> {
        self.endpoints().find(|ep| ep.uid() == uid)
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide host the OS entry point hands out.
static HOST: OnceCell<PluginHost> = OnceCell::new();

/// Plugin entry point.
///
/// Returns the process-wide [`PluginHost`] iff `type_uuid` matches
/// [`PLUGIN_TYPE_UUID`]; a mismatch is a normal negative probe and yields
/// `None`. The host is constructed on the first matching call; subsequent
/// calls return the same reference.
pub fn plugin_entry(_allocator: AllocatorRef, type_uuid: &Uuid) -> Option<&'static PluginHost> {
    if *type_uuid != PLUGIN_TYPE_UUID {
        return None;
    }
    let host = HOST.get_or_init(|| {
        tracing::info!(
            endpoints = PANEL_ENDPOINT_COUNT + 1,
            "plugin host initialized"
        );
        PluginHost::new()
    });
    Some(host)
}
