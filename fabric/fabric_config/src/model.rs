// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The topology file schema and its validation rules.

use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level topology file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub options: Vec<BTreeMap<String, String>>,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

/// One switch in the fabric.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// PAX identifier, matched against what the device itself reports.
    pub id: u8,
    #[serde(default)]
    pub metadata: Metadata,
    pub domains: Vec<Domain>,
    /// Physical port numbers with endpoint drives attached.
    #[serde(default)]
    pub endpoints: Vec<u8>,
}

/// A host virtualization domain: a named upstream port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Domain {
    pub name: String,
    pub port: u8,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Checks the structural rules: two devices, each with at least one
    /// domain, and a shared interconnect name in the domain 0 slot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != "v1" {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }
        if self.devices.len() != 2 {
            return Err(ConfigError::DeviceCount(self.devices.len()));
        }
        for device in &self.devices {
            if device.domains.is_empty() {
                return Err(ConfigError::NoDomains(device.metadata.name.clone()));
            }
        }
        let device0 = &self.devices[0].domains[0].name;
        let device1 = &self.devices[1].domains[0].name;
        if device0 != device1 {
            return Err(ConfigError::InterconnectMismatch {
                device0: device0.clone(),
                device1: device1.clone(),
            });
        }
        Ok(())
    }
}

/// Transport for switch discovery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FabricCtrl {
    #[default]
    Pci,
    Uart,
}

impl FabricCtrl {
    pub fn base(&self) -> &'static str {
        match self {
            FabricCtrl::Pci => "switchtec",
            FabricCtrl::Uart => "ttyUSB",
        }
    }
}

/// Transport for tunneled virtualization management commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum VirtMgmtCtrl {
    /// Reserved. Rejected rather than silently falling back to uart.
    Pci,
    #[default]
    Uart,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub fabric_ctrl: FabricCtrl,
    pub virt_mgmt_ctrl: VirtMgmtCtrl,
}

impl Options {
    /// Folds the option list into the known settings. Unknown keys are
    /// rejected to catch typos.
    pub fn load(config: &ConfigFile) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        for map in &config.options {
            for (key, value) in map {
                match (key.as_str(), value.as_str()) {
                    ("fabric-ctrl", "pci") => options.fabric_ctrl = FabricCtrl::Pci,
                    ("fabric-ctrl", "uart") => options.fabric_ctrl = FabricCtrl::Uart,
                    ("virt-mgmt-ctrl", "pci") => options.virt_mgmt_ctrl = VirtMgmtCtrl::Pci,
                    ("virt-mgmt-ctrl", "uart") => options.virt_mgmt_ctrl = VirtMgmtCtrl::Uart,
                    ("fabric-ctrl" | "virt-mgmt-ctrl", _) => {
                        return Err(ConfigError::UnsupportedOptionValue {
                            key: key.clone(),
                            value: value.clone(),
                        });
                    }
                    _ => return Err(ConfigError::UnknownOption(key.clone())),
                }
            }
        }
        Ok(options)
    }
}

/// One slot of the function-ID to host-domain assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub host_sw_idx: u8,
    pub domain: Domain,
}

/// Builds the binding table for `device`: its own domains in order, then
/// domains 1.. of every other device. Function ID `k` maps to entry `k - 1`,
/// so the table order is load-bearing.
pub fn binding_table(config: &ConfigFile, device: &DeviceConfig) -> Vec<Binding> {
    let mut table: Vec<Binding> = device
        .domains
        .iter()
        .map(|domain| Binding {
            host_sw_idx: device.id,
            domain: domain.clone(),
        })
        .collect();
    for other in &config.devices {
        if other.id == device.id {
            continue;
        }
        // Domain 0 of a remote device is its end of the interconnect, not a
        // bindable host slot.
        table.extend(other.domains.iter().skip(1).map(|domain| Binding {
            host_sw_idx: other.id,
            domain: domain.clone(),
        }));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigFile {
        ConfigFile::parse(
            r#"
version: v1
metadata:
  name: rabbit-s
options:
  - fabric-ctrl: pci
  - virt-mgmt-ctrl: uart
devices:
  - id: 0
    metadata:
      name: pax-left
    domains:
      - name: rabbit
        port: 24
      - name: compute-0
        port: 32
    endpoints: [8, 10, 12, 14]
  - id: 1
    metadata:
      name: pax-right
    domains:
      - name: rabbit
        port: 24
      - name: compute-1
        port: 32
    endpoints: [8, 10, 12, 14]
"#,
        )
        .unwrap()
    }

    #[test]
    fn sample_parses_and_validates() {
        let config = sample();
        config.validate().unwrap();
        assert_eq!(config.version, "v1");
        assert_eq!(config.metadata.name, "rabbit-s");
        assert_eq!(config.devices[1].endpoints, vec![8, 10, 12, 14]);
        assert_eq!(
            config.devices[0].domains[1],
            Domain {
                name: "compute-0".to_string(),
                port: 32
            }
        );
        assert_eq!(Options::load(&config).unwrap(), Options::default());
    }

    #[test]
    fn version_and_shape_rejected() {
        let mut config = sample();
        config.version = "v2".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion(_))
        ));

        let mut config = sample();
        config.devices.pop();
        assert!(matches!(config.validate(), Err(ConfigError::DeviceCount(1))));

        let mut config = sample();
        config.devices[1].domains.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoDomains(_))));

        let mut config = sample();
        config.devices[1].domains[0].name = "other".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InterconnectMismatch { .. })
        ));
    }

    #[test]
    fn unknown_options_rejected() {
        let mut config = sample();
        config.options[0] = [("fabric-ctl".to_string(), "pci".to_string())].into();
        assert!(matches!(
            Options::load(&config),
            Err(ConfigError::UnknownOption(_))
        ));

        let mut config = sample();
        config.options[0] = [("fabric-ctrl".to_string(), "i2c".to_string())].into();
        assert!(matches!(
            Options::load(&config),
            Err(ConfigError::UnsupportedOptionValue { .. })
        ));
    }

    #[test]
    fn binding_table_order() {
        let config = sample();
        for device in &config.devices {
            let table = binding_table(&config, device);
            let expected_len = 1 + config
                .devices
                .iter()
                .map(|d| d.domains.len() - 1)
                .sum::<usize>();
            assert_eq!(table.len(), expected_len);
            // Local domains first, in order.
            for (i, domain) in device.domains.iter().enumerate() {
                assert_eq!(table[i].host_sw_idx, device.id);
                assert_eq!(&table[i].domain, domain);
            }
            // Remote entries never include the remote interconnect end.
            for entry in &table[device.domains.len()..] {
                assert_ne!(entry.host_sw_idx, device.id);
                assert_ne!(entry.domain.name, "rabbit");
            }
        }
    }
}
