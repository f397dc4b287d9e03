//! Device directory: query-only enumeration of OS audio devices.
//!
//! The mixer consumes this to resolve bus sinks and source endpoints; it
//! never caches results across calls, so hot-plugged devices show up on the
//! next query.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::MixError;

/// Identifier for an OS audio device.
///
/// CPAL exposes no portable stable UID, so the device name doubles as the
/// id. Cloning is cheap (`Arc<str>` inside).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a device id from a name.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One enumerated audio device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Stable-enough identifier (the device name).
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Whether the device has at least one output stream.
    pub has_output: bool,
    /// Whether the device has at least one input stream.
    pub has_input: bool,
}

/// Enumerates OS audio devices through CPAL's default host.
pub struct DeviceDirectory {
    host: cpal::Host,
}

impl DeviceDirectory {
    /// Opens the default audio host.
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Lists all devices with their stream capabilities.
    pub fn list(&self) -> Result<Vec<DeviceInfo>, MixError> {
        let devices = self
            .host
            .devices()
            .map_err(|e| MixError::BackendError(e.to_string()))?;

        let mut result = Vec::new();
        for device in devices {
            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            result.push(DeviceInfo {
                id: DeviceId::new(name.clone()),
                has_output: device
                    .supported_output_configs()
                    .map(|mut c| c.next().is_some())
                    .unwrap_or(false),
                has_input: device
                    .supported_input_configs()
                    .map(|mut c| c.next().is_some())
                    .unwrap_or(false),
                name,
            });
        }
        Ok(result)
    }

    /// Lists devices that can act as a bus sink.
    pub fn list_outputs(&self) -> Result<Vec<DeviceInfo>, MixError> {
        Ok(self.list()?.into_iter().filter(|d| d.has_output).collect())
    }

    /// The current default output device, if any.
    pub fn default_output(&self) -> Option<DeviceInfo> {
        let device = self.host.default_output_device()?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        Some(DeviceInfo {
            id: DeviceId::new(name.clone()),
            name,
            has_output: true,
            has_input: false,
        })
    }

    /// Resolves an output device, falling back to the default when `id` is
    /// `None`.
    pub fn output_device(&self, id: Option<&DeviceId>) -> Result<cpal::Device, MixError> {
        match id {
            Some(id) => self.device_by_name(id.as_str(), false),
            None => self
                .host
                .default_output_device()
                .ok_or(MixError::NoDefaultOutput),
        }
    }

    /// Resolves a capture device by exact name.
    pub fn input_device(&self, name: &str) -> Result<cpal::Device, MixError> {
        self.device_by_name(name, true)
    }

    fn device_by_name(&self, name: &str, input: bool) -> Result<cpal::Device, MixError> {
        let devices = if input {
            self.host.input_devices()
        } else {
            self.host.output_devices()
        }
        .map_err(|e| MixError::BackendError(e.to_string()))?;

        for device in devices {
            if device.name().map(|n| n == name).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(MixError::DeviceNotFound {
            name: name.to_string(),
        })
    }
}

impl Default for DeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_equality_and_display() {
        let a = DeviceId::new("Speakers");
        let b: DeviceId = "Speakers".into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Speakers");
        assert_ne!(a, DeviceId::new("Headphones"));
    }

    #[test]
    fn test_list_doesnt_panic() {
        // May be empty in CI, but must not panic.
        let dir = DeviceDirectory::new();
        let _ = dir.list();
        let _ = dir.list_outputs();
        let _ = dir.default_output();
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let dir = DeviceDirectory::new();
        match dir.input_device("NonexistentDevice12345XYZ") {
            Err(MixError::DeviceNotFound { name }) => {
                assert_eq!(name, "NonexistentDevice12345XYZ");
            }
            Err(MixError::BackendError(_)) => {
                // Hosts without an audio server error out at enumeration.
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("nonexistent device resolved"),
        }
    }
}
