//! Persisted routing configuration.
//!
//! A single JSON document at a per-user path: input channels, mix buses
//! with their memberships, and the hardware-index mapping. Unknown fields
//! are ignored and missing fields are filled from defaults, so older and
//! newer builds can share a file. Writes go through a temp file and a
//! rename so a crash never leaves a torn config behind.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::plugin::PANEL_ENDPOINT_NAMES;

/// Key of the primary bus.
pub const PERSONAL_BUS: &str = "personal";

/// Key of the voice-chat bus.
pub const VOICECHAT_BUS: &str = "voicechat";

/// One input channel: a virtual endpoint bound to a hardware control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputChannelConfig {
    /// Unique channel id (e.g. `k1`).
    pub id: String,
    /// Name of the virtual endpoint this channel captures from.
    pub device_name: String,
    /// User-facing label.
    pub channel_name: String,
    /// Index of the hardware control bound to this channel.
    pub hardware_index: u8,
    /// Configured volume in `[0, 1]`.
    pub volume: f32,
    /// Whether the channel is muted.
    pub muted: bool,
}

impl Default for InputChannelConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            device_name: String::new(),
            channel_name: String::new(),
            hardware_index: 0,
            volume: 1.0,
            muted: false,
        }
    }
}

/// One channel's membership in a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusChannelConfig {
    /// The member channel's id.
    pub channel_id: String,
    /// Whether the channel is summed into this bus.
    pub enabled: bool,
    /// Optional per-bus gain on top of the channel volume.
    pub gain_override: Option<f32>,
}

impl Default for BusChannelConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            enabled: true,
            gain_override: None,
        }
    }
}

/// One mix bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MixBusConfig {
    /// Bus key (e.g. `personal`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Sink device id; `null` means the OS default output at start time.
    pub output_device_id: Option<String>,
    /// Memberships in summing order.
    pub channels: Vec<BusChannelConfig>,
}

/// What a hardware control drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareActionKind {
    /// A knob/slider position sets the target channel's volume.
    #[serde(rename = "volume")]
    Volume,
    /// A button press toggles the target channel's mute.
    #[serde(rename = "mute-toggle")]
    MuteToggle,
}

/// Binding of one hardware index to a channel action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareMapping {
    /// The action kind.
    #[serde(rename = "type")]
    pub kind: HardwareActionKind,
    /// The channel id the action applies to.
    pub target_id: String,
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Input channels, in hardware order.
    pub input_channels: Vec<InputChannelConfig>,
    /// Mix buses.
    pub mix_buses: Vec<MixBusConfig>,
    /// Hardware index to action mapping (one mapping per index).
    pub hardware_mapping: BTreeMap<u8, HardwareMapping>,
}

impl Default for RoutingConfig {
    /// Nine channels on hardware indices 0-8, a `personal` bus enabling
    /// all of them with the default output, an empty `voicechat` bus, and
    /// every index mapped to `volume` on its channel.
    fn default() -> Self {
        let ids = ["k1", "k2", "k3", "k4", "k5", "s1", "s2", "s3", "s4"];
        let labels = [
            "Knob 1", "Knob 2", "Knob 3", "Knob 4", "Knob 5", "Slider 1", "Slider 2", "Slider 3",
            "Slider 4",
        ];

        let input_channels: Vec<InputChannelConfig> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| InputChannelConfig {
                id: (*id).to_string(),
                device_name: PANEL_ENDPOINT_NAMES[i].to_string(),
                channel_name: labels[i].to_string(),
                hardware_index: i as u8,
                volume: 1.0,
                muted: false,
            })
            .collect();

        let personal = MixBusConfig {
            id: PERSONAL_BUS.to_string(),
            name: "Personal Mix".to_string(),
            output_device_id: None,
            channels: input_channels
                .iter()
                .map(|ch| BusChannelConfig {
                    channel_id: ch.id.clone(),
                    enabled: true,
                    gain_override: None,
                })
                .collect(),
        };

        let voicechat = MixBusConfig {
            id: VOICECHAT_BUS.to_string(),
            name: "Voice Chat".to_string(),
            output_device_id: None,
            channels: Vec::new(),
        };

        let hardware_mapping = input_channels
            .iter()
            .map(|ch| {
                (
                    ch.hardware_index,
                    HardwareMapping {
                        kind: HardwareActionKind::Volume,
                        target_id: ch.id.clone(),
                    },
                )
            })
            .collect();

        Self {
            input_channels,
            mix_buses: vec![personal, voicechat],
            hardware_mapping,
        }
    }
}

impl RoutingConfig {
    /// Looks up a channel by id.
    pub fn channel(&self, id: &str) -> Option<&InputChannelConfig> {
        self.input_channels.iter().find(|ch| ch.id == id)
    }

    /// Looks up a channel mutably.
    pub fn channel_mut(&mut self, id: &str) -> Option<&mut InputChannelConfig> {
        self.input_channels.iter_mut().find(|ch| ch.id == id)
    }

    /// Looks up a bus by key.
    pub fn bus(&self, id: &str) -> Option<&MixBusConfig> {
        self.mix_buses.iter().find(|b| b.id == id)
    }

    /// Looks up a bus mutably.
    pub fn bus_mut(&mut self, id: &str) -> Option<&mut MixBusConfig> {
        self.mix_buses.iter_mut().find(|b| b.id == id)
    }

    /// Checks the configuration invariants: unique channel ids, every bus
    /// membership and hardware mapping resolving to an existing channel.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for ch in &self.input_channels {
            if ch.id.is_empty() {
                return Err(ConfigError::invalid("empty channel id"));
            }
            if !seen.insert(ch.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate channel id: {}",
                    ch.id
                )));
            }
        }
        for bus in &self.mix_buses {
            for member in &bus.channels {
                if !seen.contains(member.channel_id.as_str()) {
                    return Err(ConfigError::invalid(format!(
                        "bus '{}' references unknown channel: {}",
                        bus.id, member.channel_id
                    )));
                }
            }
        }
        for (index, mapping) in &self.hardware_mapping {
            if !seen.contains(mapping.target_id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "hardware index {index} maps to unknown channel: {}",
                    mapping.target_id
                )));
            }
        }
        Ok(())
    }

    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the defaults; a present but invalid file is
    /// an error (overwriting a user's config with defaults on a parse
    /// hiccup would lose their setup).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to `path` atomically
    /// (write-temp-then-rename).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| ConfigError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| ConfigError::io(path, e))?;
        Ok(())
    }
}

/// The per-user config path, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("panelmix").join("config.json"))
}
