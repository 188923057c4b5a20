// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Management client for PAX PCIe fabric switches.
//!
//! A [`Switch`] wraps one management transport, either the switchtec PCI
//! character device or a UART console, and exposes the MRPC-based fabric
//! operations: identify, link status, HVD bind/unbind, GFMS dumps and
//! events, bandwidth counters, endpoint CSR access, and the tunneled NVMe
//! admin passthrough.

mod admin;
pub mod backend;
mod chardev;
mod error;
pub mod event;
mod fabric;
pub mod mock;
mod mrpc;
mod pci;
mod tunnel;
mod uart;

pub use admin::AdminResponse;
pub use error::SwitchError;
pub use fabric::DumpEpPortDevice;
pub use fabric::LinkStat;
pub use tunnel::TunnelStatus;

use backend::GasBackend;
use pax_spec::mrpc::CommandId;
use std::path::Path;
use std::path::PathBuf;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

/// Device-node base name of the switchtec character device.
const CHARDEV_BASE: &str = "switchtec";
/// Device-node base names treated as serial consoles.
const UART_BASES: &[&str] = &["ttyUSB", "ttyS", "ttyACM"];

/// An open management connection to one switch.
pub struct Switch {
    backend: Box<dyn GasBackend>,
    path: PathBuf,
    pax_id: Option<u8>,
}

impl Switch {
    /// Opens the management device at `path`, picking the transport from the
    /// device-node name. NVMe device nodes are rejected: endpoints are
    /// addressed through their switch, not through a host NVMe driver.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SwitchError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let backend: Box<dyn GasBackend> = if name.starts_with("nvme") {
            return Err(SwitchError::DirectNvmeDevice);
        } else if name.starts_with(CHARDEV_BASE) {
            Box::new(chardev::CharDevBackend::open(path)?)
        } else if UART_BASES.iter().any(|base| name.starts_with(base)) {
            Box::new(uart::UartBackend::open(path)?)
        } else {
            // Paths that look like neither default to the PCI transport so
            // odd udev names still work.
            Box::new(chardev::CharDevBackend::open(path)?)
        };

        Ok(Switch {
            backend,
            path: path.to_owned(),
            pax_id: None,
        })
    }

    /// Builds a switch over an explicit backend. Tests pair this with
    /// [`mock::MockBackend`].
    pub fn with_backend(backend: impl GasBackend + 'static, path: impl Into<PathBuf>) -> Self {
        Switch {
            backend: Box::new(backend),
            path: path.into(),
            pax_id: None,
        }
    }

    /// Scans `/dev/switchtec0..9` for the switch reporting `pax_id`.
    pub fn locate(pax_id: u8) -> Result<Self, SwitchError> {
        Self::locate_base(pax_id, CHARDEV_BASE)
    }

    /// Scans `/dev/<base>0..9` for the switch reporting `pax_id`. Device
    /// nodes do not enumerate in PAX order, so each one is identified.
    pub fn locate_base(pax_id: u8, base: &str) -> Result<Self, SwitchError> {
        for index in 0..10 {
            let path = PathBuf::from(format!("/dev/{base}{index}"));
            if !path.exists() {
                continue;
            }
            match Self::open(&path) {
                Ok(mut switch) => match switch.id() {
                    Ok(id) if id == pax_id => return Ok(switch),
                    Ok(id) => {
                        tracing::debug!(path = %path.display(), id, "pax id mismatch")
                    }
                    Err(err) => {
                        tracing::debug!(path = %path.display(), error = %err, "identify failed")
                    }
                },
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "open failed")
                }
            }
        }
        Err(SwitchError::PaxNotFound(pax_id))
    }

    /// The device-node path this handle was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PAX identifier of this switch, fetched once and cached.
    pub fn id(&mut self) -> Result<u8, SwitchError> {
        if let Some(id) = self.pax_id {
            return Ok(id);
        }
        let id: u32 = self.run(CommandId::GET_PAX_ID, &[0u8; 0])?;
        let id = id as u8;
        self.pax_id = Some(id);
        Ok(id)
    }

    /// Reads `bytes` (1, 2, 4, or 8) from the Global Address Space.
    pub fn gas_read(&mut self, addr: u64, bytes: usize) -> Result<u64, SwitchError> {
        if !matches!(bytes, 1 | 2 | 4 | 8) {
            return Err(SwitchError::InvalidAccessWidth(bytes));
        }
        let mut buf = [0u8; 8];
        self.backend.gas_read(addr, &mut buf[..bytes])?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes `bytes` (1, 2, 4, or 8) of `value` to the Global Address
    /// Space.
    pub fn gas_write(&mut self, addr: u64, value: u64, bytes: usize) -> Result<(), SwitchError> {
        if !matches!(bytes, 1 | 2 | 4 | 8) {
            return Err(SwitchError::InvalidAccessWidth(bytes));
        }
        self.backend.gas_write(addr, &value.to_le_bytes()[..bytes])
    }

    /// Resolves a sysfs subpath for the device.
    pub fn system_path(&self, subpath: &str) -> Result<PathBuf, SwitchError> {
        self.backend.system_path(subpath)
    }

    /// Size of a sysfs resource file, e.g. `device/resource0` for the GAS.
    pub fn resource_size(&self, subpath: &str) -> Result<u64, SwitchError> {
        self.backend.resource_size(subpath)
    }

    /// Runs an MRPC command with raw byte buffers.
    pub(crate) fn run_command(
        &mut self,
        cmd: CommandId,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), SwitchError> {
        mrpc::run_command(self.backend.as_mut(), cmd, input, output)
    }

    /// Runs an MRPC command with typed input and output frames.
    pub(crate) fn run<O>(
        &mut self,
        cmd: CommandId,
        input: &(impl IntoBytes + Immutable + ?Sized),
    ) -> Result<O, SwitchError>
    where
        O: FromBytes + IntoBytes,
    {
        let mut output = O::new_zeroed();
        self.run_command(cmd, input.as_bytes(), output.as_mut_bytes())?;
        Ok(output)
    }
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("path", &self.path)
            .field("pax_id", &self.pax_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockBackend;

    #[test]
    fn direct_nvme_path_rejected() {
        let err = Switch::open("/dev/nvme0").unwrap_err();
        assert!(matches!(err, SwitchError::DirectNvmeDevice));
    }

    #[test]
    fn pax_id_cached_after_first_identify() {
        let mock = MockBackend::new();
        mock.expect(CommandId::GET_PAX_ID, |_, output| {
            output[..4].copy_from_slice(&3u32.to_le_bytes());
            Ok(())
        });
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        assert_eq!(switch.id().unwrap(), 3);
        assert_eq!(switch.id().unwrap(), 3);
        assert_eq!(mock.commands_run(), 1);
        mock.verify();
    }
}
