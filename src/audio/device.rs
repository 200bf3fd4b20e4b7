//! Audio device catalog
//!
//! Devices are addressed by name and resolved against a fresh host on
//! every call, so the catalog always reflects what is plugged in right
//! now. Nothing here caches a `cpal::Device`.

use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, warn};

use crate::error::{Error, Result};

/// Which way audio flows through a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// A snapshot of one usable device at enumeration time
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub direction: DeviceDirection,
    /// Native sample rate of the device's default config
    pub sample_rate: u32,
    pub channels: u16,
}

/// Snapshot a resolved output device's name and native format.
///
/// This is the single source of device facts; stream openers take the
/// native rate and default channel count from here.
pub fn describe_output(device: &cpal::Device) -> Result<DeviceDescriptor> {
    let name = device
        .name()
        .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|_| Error::DeviceUnavailable(name.clone()))?;
    Ok(DeviceDescriptor {
        name,
        direction: DeviceDirection::Output,
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Snapshot a resolved input device's name and native format
pub fn describe_input(device: &cpal::Device) -> Result<DeviceDescriptor> {
    let name = device
        .name()
        .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|_| Error::DeviceUnavailable(name.clone()))?;
    Ok(DeviceDescriptor {
        name,
        direction: DeviceDirection::Input,
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// List all output-capable devices
pub fn list_output_devices() -> Result<Vec<DeviceDescriptor>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;

    let mut result = Vec::new();
    for device in devices {
        match describe_output(&device) {
            Ok(descriptor) => result.push(descriptor),
            Err(e) => debug!("Skipping output device: {}", e),
        }
    }
    Ok(result)
}

/// List all input-capable devices
pub fn list_input_devices() -> Result<Vec<DeviceDescriptor>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;

    let mut result = Vec::new();
    for device in devices {
        match describe_input(&device) {
            Ok(descriptor) => result.push(descriptor),
            Err(e) => debug!("Skipping input device: {}", e),
        }
    }
    Ok(result)
}

/// Resolve an output device by name.
///
/// The lookup happens at the moment of use; a device that disappeared
/// since it was configured yields `DeviceUnavailable`.
pub fn resolve_output(name: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(Error::DeviceUnavailable(name.to_string()))
}

/// Resolve an input device by name, or the system default when None
pub fn resolve_input(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => {
            let devices = host
                .input_devices()
                .map_err(|e| Error::DeviceEnumeration(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return Ok(device);
                }
            }
            warn!("Input device '{}' not found", name);
            Err(Error::DeviceUnavailable(name.to_string()))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("default input".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These touch real hardware; on a machine without audio devices the
    // lists are simply empty or enumeration fails, both acceptable here.
    #[test]
    fn list_output_devices_does_not_panic() {
        match list_output_devices() {
            Ok(devices) => {
                for d in &devices {
                    assert!(!d.name.is_empty());
                    assert_eq!(d.direction, DeviceDirection::Output);
                    assert!(d.sample_rate > 0);
                }
            }
            Err(Error::DeviceEnumeration(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn list_input_devices_does_not_panic() {
        match list_input_devices() {
            Ok(devices) => {
                for d in &devices {
                    assert_eq!(d.direction, DeviceDirection::Input);
                }
            }
            Err(Error::DeviceEnumeration(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn describe_matches_listing() {
        let Ok(devices) = list_output_devices() else {
            return;
        };
        let Some(first) = devices.first() else {
            return;
        };
        if let Ok(device) = resolve_output(&first.name) {
            let descriptor = describe_output(&device).unwrap();
            assert_eq!(descriptor.name, first.name);
            assert_eq!(descriptor.direction, DeviceDirection::Output);
            assert!(descriptor.sample_rate > 0);
        }
    }

    #[test]
    fn resolving_a_bogus_name_fails() {
        let result = resolve_output("no such device, surely");
        match result {
            Err(Error::DeviceUnavailable(name)) => {
                assert_eq!(name, "no such device, surely")
            }
            Err(Error::DeviceEnumeration(_)) => {}
            other => panic!("expected DeviceUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
