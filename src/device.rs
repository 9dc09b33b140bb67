//! The devices this plugin advertises to kubelet.
use crate::device_plugin_api::v1beta1::{Device, ListAndWatchResponse};
use crate::Error;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Healthy means the device is allocatable (whether already allocated or not)
pub const HEALTHY: &str = "Healthy";

/// Unhealthy means the device is not allocatable
pub const UNHEALTHY: &str = "Unhealthy";

/// ID of the device advertised when none are configured
pub const DEFAULT_DEVICE_ID: &str = "bme280-nxcore";

/// Health of a device as reported in `ListAndWatch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceHealth {
    /// The device can be allocated
    Healthy,
    /// The device must not be allocated
    Unhealthy,
}

impl DeviceHealth {
    /// The string kubelet expects in `Device.health`
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceHealth::Healthy => HEALTHY,
            DeviceHealth::Unhealthy => UNHEALTHY,
        }
    }
}

impl fmt::Display for DeviceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceHealth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(HEALTHY) {
            Ok(DeviceHealth::Healthy)
        } else if s.eq_ignore_ascii_case(UNHEALTHY) {
            Ok(DeviceHealth::Unhealthy)
        } else {
            Err(format!(
                "unknown health {:?}, expected {} or {}",
                s, HEALTHY, UNHEALTHY
            ))
        }
    }
}

/// A single advertised device. Parsed from `ID` or `ID=HEALTH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Unique device ID sent to kubelet
    pub id: String,
    /// Reported health
    pub health: DeviceHealth,
}

impl DeviceSpec {
    /// Returns a healthy device with the given ID
    pub fn healthy(id: impl Into<String>) -> Self {
        DeviceSpec {
            id: id.into(),
            health: DeviceHealth::Healthy,
        }
    }
}

/// The devices advertised when none are configured
pub fn default_devices() -> Vec<DeviceSpec> {
    vec![DeviceSpec::healthy(DEFAULT_DEVICE_ID)]
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| Error::InvalidDeviceSpec {
            spec: s.to_string(),
            reason,
        };
        let (id, health) = match s.split_once('=') {
            Some((id, health)) => (id.trim(), health.trim().parse().map_err(invalid)?),
            None => (s.trim(), DeviceHealth::Healthy),
        };
        if id.is_empty() {
            return Err(invalid("device ID is empty".to_string()));
        }
        Ok(DeviceSpec {
            id: id.to_string(),
            health,
        })
    }
}

impl From<&DeviceSpec> for Device {
    fn from(spec: &DeviceSpec) -> Self {
        Device {
            id: spec.id.clone(),
            health: spec.health.as_str().to_string(),
            topology: None,
        }
    }
}

/// The fixed set of devices the plugin advertises, in the order they were given.
#[derive(Clone, Debug)]
pub struct DeviceInventory {
    devices: Vec<DeviceSpec>,
}

impl DeviceInventory {
    /// Builds an inventory, rejecting an empty list and duplicate IDs.
    pub fn new(devices: Vec<DeviceSpec>) -> Result<Self, Error> {
        if devices.is_empty() {
            return Err(Error::EmptyInventory);
        }
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.id.as_str()) {
                return Err(Error::DuplicateDevice {
                    id: device.id.clone(),
                });
            }
        }
        Ok(DeviceInventory { devices })
    }

    /// Looks up a device by ID
    pub fn get(&self, id: &str) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Whether the inventory has a device with this ID
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Whether the device exists and is healthy
    pub fn is_healthy(&self, id: &str) -> bool {
        matches!(self.get(id), Some(d) if d.health == DeviceHealth::Healthy)
    }

    /// The devices in their wire form
    pub fn devices(&self) -> Vec<Device> {
        self.devices.iter().map(Device::from).collect()
    }

    /// The message sent on every `ListAndWatch` update
    pub fn list_and_watch_response(&self) -> ListAndWatchResponse {
        ListAndWatchResponse {
            devices: self.devices(),
        }
    }

    /// Number of advertised devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always false, an inventory cannot be constructed empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceInventory {
    fn default() -> Self {
        DeviceInventory {
            devices: default_devices(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_spec() {
        let spec: DeviceSpec = "bme280-nxcore".parse().unwrap();
        assert_eq!(spec, DeviceSpec::healthy("bme280-nxcore"));

        let spec: DeviceSpec = "sensor-2=unhealthy".parse().unwrap();
        assert_eq!(spec.id, "sensor-2");
        assert_eq!(spec.health, DeviceHealth::Unhealthy);

        let spec: DeviceSpec = " sensor-3 = Healthy ".parse().unwrap();
        assert_eq!(spec, DeviceSpec::healthy("sensor-3"));
    }

    #[test]
    fn test_parse_invalid_device_spec() {
        assert!(matches!(
            "".parse::<DeviceSpec>(),
            Err(Error::InvalidDeviceSpec { .. })
        ));
        assert!(matches!(
            "=Healthy".parse::<DeviceSpec>(),
            Err(Error::InvalidDeviceSpec { .. })
        ));
        let err = "sensor=broken".parse::<DeviceSpec>().unwrap_err();
        assert!(err.to_string().contains("unknown health"));
    }

    #[test]
    fn test_inventory_rejects_duplicates_and_empty() {
        assert!(matches!(
            DeviceInventory::new(Vec::new()),
            Err(Error::EmptyInventory)
        ));
        let err = DeviceInventory::new(vec![
            DeviceSpec::healthy("d1"),
            DeviceSpec::healthy("d2"),
            DeviceSpec::healthy("d1"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateDevice { id } if id == "d1"));
    }

    #[test]
    fn test_inventory_wire_form() {
        let inventory = DeviceInventory::new(vec![
            DeviceSpec::healthy("d1"),
            DeviceSpec {
                id: "d2".to_string(),
                health: DeviceHealth::Unhealthy,
            },
        ])
        .unwrap();
        let response = inventory.list_and_watch_response();
        assert_eq!(
            response.devices,
            vec![
                Device {
                    id: "d1".to_string(),
                    health: HEALTHY.to_string(),
                    topology: None,
                },
                Device {
                    id: "d2".to_string(),
                    health: UNHEALTHY.to_string(),
                    topology: None,
                },
            ]
        );
        assert!(inventory.is_healthy("d1"));
        assert!(!inventory.is_healthy("d2"));
        assert!(inventory.contains("d2"));
        assert!(!inventory.is_healthy("d3"));
    }

    #[test]
    fn test_default_inventory() {
        let inventory = DeviceInventory::default();
        assert_eq!(inventory.len(), 1);
        assert!(inventory.is_healthy(DEFAULT_DEVICE_ID));
        assert_eq!(
            DeviceInventory::new(default_devices()).unwrap().devices(),
            inventory.devices()
        );
    }
}
