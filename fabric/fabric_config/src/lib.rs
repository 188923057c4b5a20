// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declarative bring-up of a two-switch NVMe fabric.
//!
//! A YAML topology file names two switches by PAX ID, the host
//! virtualization domains each one carries, and the ports with drives
//! attached. Applying it fans the virtualization-management and bind steps
//! out across every virtual function of every drive.

#![forbid(unsafe_code)]

mod apply;
mod error;
mod model;

pub use apply::ApplySummary;
pub use apply::UartVirtMgmt;
pub use apply::VirtMgmt;
pub use apply::configure_device;
pub use apply::open_virt_mgmt;
pub use apply::run;
pub use error::ConfigError;
pub use model::Binding;
pub use model::ConfigFile;
pub use model::DeviceConfig;
pub use model::Domain;
pub use model::FabricCtrl;
pub use model::Metadata;
pub use model::Options;
pub use model::VirtMgmtCtrl;
pub use model::binding_table;
