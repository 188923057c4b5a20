// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Transport abstraction over the switch Global Address Space.
//!
//! Every management operation reduces to byte reads and writes of the GAS.
//! The PCI character-device backend maps the GAS directly; the UART backend
//! shuttles the same accesses over a serial console protocol.

use crate::SwitchError;
use std::path::PathBuf;

/// Raw access to the switch Global Address Space.
pub trait GasBackend: Send {
    /// Reads `buf.len()` bytes at `addr`. Accesses of 1, 2, 4, or 8 bytes
    /// are issued as a single bus access.
    fn gas_read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), SwitchError>;

    /// Writes `buf` at `addr`, same width rules as [`Self::gas_read`].
    fn gas_write(&mut self, addr: u64, buf: &[u8]) -> Result<(), SwitchError>;

    /// Resolves a sysfs subpath for the underlying device, if it has one.
    fn system_path(&self, subpath: &str) -> Result<PathBuf, SwitchError>;

    /// Size in bytes of a sysfs resource file.
    fn resource_size(&self, subpath: &str) -> Result<u64, SwitchError> {
        let path = self.system_path(subpath)?;
        Ok(std::fs::metadata(path)?.len())
    }
}
