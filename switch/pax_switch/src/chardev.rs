// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PCI character-device backend.
//!
//! The switchtec driver exposes the GAS as the mmap region of
//! `/dev/switchtec<N>`. Accesses of bus width go through volatile pointer
//! operations so each one hits the device exactly once.

// UNSAFETY: required to map the device register file and access it
// volatilely.
#![allow(unsafe_code)]

use crate::SwitchError;
use crate::backend::GasBackend;
use memmap2::MmapOptions;
use memmap2::MmapRaw;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;

pub(crate) struct CharDevBackend {
    _file: File,
    map: MmapRaw,
    sysfs: PathBuf,
}

impl CharDevBackend {
    pub fn open(path: &Path) -> Result<Self, SwitchError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| SwitchError::Open {
                path: path.to_owned(),
                source,
            })?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let sysfs = PathBuf::from("/sys/class/switchtec").join(name);

        let len = std::fs::metadata(sysfs.join("device/resource0"))
            .map(|m| m.len() as usize)
            .unwrap_or(4 << 20);

        let map = MmapOptions::new()
            .len(len)
            .map_raw(&file)
            .map_err(|source| SwitchError::Open {
                path: path.to_owned(),
                source,
            })?;

        Ok(CharDevBackend {
            _file: file,
            map,
            sysfs,
        })
    }

    fn check_range(&self, addr: u64, len: usize) -> Result<usize, SwitchError> {
        let addr = addr as usize;
        if addr.checked_add(len).is_none_or(|end| end > self.map.len()) {
            return Err(SwitchError::GasOutOfRange {
                addr: addr as u64,
                len,
                size: self.map.len(),
            });
        }
        Ok(addr)
    }
}

impl GasBackend for CharDevBackend {
    fn gas_read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), SwitchError> {
        let offset = self.check_range(addr, buf.len())?;
        let ptr = self.map.as_ptr();
        // SAFETY: the range is within the mapping, which lives as long as
        // self, and the widths below never exceed the checked length.
        unsafe {
            match buf.len() {
                1 => buf[0] = ptr.add(offset).read_volatile(),
                2 => buf.copy_from_slice(
                    &ptr.add(offset).cast::<u16>().read_volatile().to_le_bytes(),
                ),
                4 => buf.copy_from_slice(
                    &ptr.add(offset).cast::<u32>().read_volatile().to_le_bytes(),
                ),
                8 => buf.copy_from_slice(
                    &ptr.add(offset).cast::<u64>().read_volatile().to_le_bytes(),
                ),
                _ => {
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = ptr.add(offset + i).read_volatile();
                    }
                }
            }
        }
        Ok(())
    }

    fn gas_write(&mut self, addr: u64, buf: &[u8]) -> Result<(), SwitchError> {
        let offset = self.check_range(addr, buf.len())?;
        let ptr = self.map.as_mut_ptr();
        // SAFETY: same range and width argument as gas_read.
        unsafe {
            match buf.len() {
                1 => ptr.add(offset).write_volatile(buf[0]),
                2 => ptr
                    .add(offset)
                    .cast::<u16>()
                    .write_volatile(u16::from_le_bytes(buf.try_into().unwrap())),
                4 => ptr
                    .add(offset)
                    .cast::<u32>()
                    .write_volatile(u32::from_le_bytes(buf.try_into().unwrap())),
                8 => ptr
                    .add(offset)
                    .cast::<u64>()
                    .write_volatile(u64::from_le_bytes(buf.try_into().unwrap())),
                _ => {
                    for (i, b) in buf.iter().enumerate() {
                        ptr.add(offset + i).write_volatile(*b);
                    }
                }
            }
        }
        Ok(())
    }

    fn system_path(&self, subpath: &str) -> Result<PathBuf, SwitchError> {
        let base = self.sysfs.canonicalize().unwrap_or_else(|_| self.sysfs.clone());
        if subpath.is_empty() {
            Ok(base)
        } else {
            Ok(base.join(subpath))
        }
    }
}
