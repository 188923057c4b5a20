// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use nvme_admin::NvmeError;
use pax_switch::SwitchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported config version {0:?}, expected \"v1\"")]
    UnsupportedVersion(String),
    #[error("unsupported device count, expected 2 got {0}")]
    DeviceCount(usize),
    #[error("at least one domain needed for device {0:?}")]
    NoDomains(String),
    #[error(
        "domain 0 of each device must share a name, device 0 has {device0:?}, device 1 has {device1:?}"
    )]
    InterconnectMismatch { device0: String, device1: String },
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    #[error("unsupported value {value:?} for option {key:?}")]
    UnsupportedOptionValue { key: String, value: String },
    #[error("pci is an unsupported virtualization management controller")]
    PciVirtMgmtUnsupported,
    #[error("no secondary controller info for controller {0}")]
    NoSecondaryController(u16),
    #[error("config file is not valid yaml")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Switch(#[from] SwitchError),
    #[error(transparent)]
    Nvme(#[from] NvmeError),
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
}
