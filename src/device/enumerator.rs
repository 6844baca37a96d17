//! Audio device enumeration using the cpal default host

use crate::error::{LoopError, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use std::fmt;
use tracing::{debug, info};

/// Information about an output device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name
    pub name: String,
    /// Whether this is the host's default output device
    pub is_default: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let default_marker = if self.is_default { " (default)" } else { "" };
        write!(f, "{}{}", self.name, default_marker)
    }
}

/// Output device enumerator wrapping the cpal default host
pub struct DeviceEnumerator {
    host: Host,
    default_device_name: Option<String>,
}

impl DeviceEnumerator {
    /// Create a new device enumerator on the default host
    pub fn new() -> Self {
        let host = cpal::default_host();
        let default_device_name = host
            .default_output_device()
            .and_then(|device| device.name().ok());

        debug!(
            "Device enumerator initialized on host {} (default: {:?})",
            host.id().name(),
            default_device_name
        );

        Self {
            host,
            default_device_name,
        }
    }

    /// Name of the audio host in use
    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    /// Get the default output device
    pub fn get_default_output_device(&self) -> Result<Device> {
        self.host.default_output_device().ok_or_else(|| {
            LoopError::device("Could not find output device", "no default output device")
        })
    }

    /// Get an output device by name
    ///
    /// An exact name match wins; otherwise the first device whose name
    /// contains `name` is used.
    pub fn get_device_by_name(&self, name: &str) -> Result<Device> {
        let devices: Vec<(String, Device)> = self
            .host
            .output_devices()
            .map_err(|e| LoopError::device("Could not enumerate output devices", e))?
            .filter_map(|device| device.name().ok().map(|n| (n, device)))
            .collect();

        let position = devices
            .iter()
            .position(|(n, _)| n == name)
            .or_else(|| devices.iter().position(|(n, _)| n.contains(name)))
            .ok_or_else(|| LoopError::DeviceNotFound(name.to_string()))?;

        let (found, device) = devices
            .into_iter()
            .nth(position)
            .ok_or_else(|| LoopError::DeviceNotFound(name.to_string()))?;
        info!("Found requested output device: {}", found);
        Ok(device)
    }

    /// Enumerate all output devices
    pub fn enumerate_all_devices(&self) -> Result<Vec<DeviceInfo>> {
        let devices: Vec<DeviceInfo> = self
            .host
            .output_devices()
            .map_err(|e| LoopError::device("Could not enumerate output devices", e))?
            .filter_map(|device| device.name().ok())
            .map(|name| DeviceInfo {
                is_default: self.default_device_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}
