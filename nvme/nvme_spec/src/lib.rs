// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVMe admin command definitions used when tunneling commands to
//! switch-attached endpoints.
//!
//! Only the admin command set is modeled. I/O queues never exist on the
//! management path, so submission entries carry buffer lengths rather than
//! host addresses.

#![forbid(unsafe_code)]

pub mod feature;
pub mod identify;
pub mod log;

use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Admin command opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct AdminOpcode(pub u8);

impl AdminOpcode {
    pub const GET_LOG_PAGE: Self = Self(0x02);
    pub const IDENTIFY: Self = Self(0x06);
    pub const SET_FEATURES: Self = Self(0x09);
    pub const GET_FEATURES: Self = Self(0x0a);
    pub const NAMESPACE_MANAGEMENT: Self = Self(0x0d);
    pub const NAMESPACE_ATTACH: Self = Self(0x15);
    pub const VIRTUALIZATION_MANAGEMENT: Self = Self(0x1c);
    pub const FORMAT_NVM: Self = Self(0x80);
}

/// Admin submission queue entry, in the fixed 72-byte form carried over the
/// endpoint tunnel. `metadata` and `addr` are ignored by the firmware, which
/// sizes transfers from `data_len` instead.
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct AdminCmd {
    pub opcode: u8,
    pub flags: u8,
    pub rsvd1: u16,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub metadata: u64,
    pub addr: u64,
    pub metadata_len: u32,
    pub data_len: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub timeout_ms: u32,
    pub result: u32,
}

pub const ADMIN_CMD_LEN: usize = 72;
const_assert_eq!(size_of::<AdminCmd>(), ADMIN_CMD_LEN);

impl AdminCmd {
    pub fn new(opcode: AdminOpcode) -> Self {
        Self {
            opcode: opcode.0,
            ..Self::default()
        }
    }
}

/// Identify CNS values (command dword 10, bits 7:0).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Cns(pub u8);

impl Cns {
    pub const NAMESPACE: Self = Self(0x00);
    pub const CONTROLLER: Self = Self(0x01);
    pub const NAMESPACE_LIST: Self = Self(0x02);
    pub const NAMESPACE_PRESENT_LIST: Self = Self(0x10);
    pub const NAMESPACE_PRESENT: Self = Self(0x11);
    pub const CONTROLLER_NAMESPACE_LIST: Self = Self(0x12);
    pub const CONTROLLER_LIST: Self = Self(0x13);
    pub const PRIMARY_CONTROLLER_CAPABILITIES: Self = Self(0x14);
    pub const SECONDARY_CONTROLLER_LIST: Self = Self(0x15);
}

/// Transfer size for all identify data structures.
pub const IDENTIFY_DATA_SIZE: usize = 4096;

/// Broadcast namespace ID.
pub const NSID_ALL: u32 = 0xffff_ffff;

/// Completion status field decoding. The phase bit has already been stripped
/// by the tunnel, so bit 0 here is the low bit of the status code.
pub mod status {
    pub const CODE_MASK: u32 = 0x7ff;
    pub const CRD_MASK: u32 = 0x1800;
    pub const CRD_SHIFT: u32 = 11;
    pub const MORE: u32 = 0x2000;
    pub const DNR: u32 = 0x4000;

    pub const NAMESPACE_ALREADY_ATTACHED: u32 = 0x118;
    pub const NAMESPACE_NOT_ATTACHED: u32 = 0x11a;
}

/// Format NVM command dword 10.
#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct FormatCdw10 {
    #[bits(4)]
    pub lba_format: u8,
    pub metadata_settings: bool,
    #[bits(3)]
    pub protection_info: u8,
    pub protection_info_location: bool,
    #[bits(3)]
    pub secure_erase: u8,
    #[bits(20)]
    _rsvd: u32,
}

/// Secure erase settings for [`FormatCdw10::secure_erase`].
pub mod secure_erase {
    pub const NONE: u8 = 0;
    pub const USER_DATA: u8 = 1;
    pub const CRYPTO: u8 = 2;
}

/// Virtualization management encodings.
pub mod virt_mgmt {
    pub const ACTION_PRIMARY_FLEXIBLE: u8 = 1;
    pub const ACTION_SECONDARY_OFFLINE: u8 = 7;
    pub const ACTION_SECONDARY_ASSIGN: u8 = 8;
    pub const ACTION_SECONDARY_ONLINE: u8 = 9;

    pub const RESOURCE_VQ: u8 = 0;
    pub const RESOURCE_VI: u8 = 1;

    /// Command dword 10 for a virtualization management command.
    pub fn cdw10(ctrl_id: u16, resource: u8, action: u8) -> u32 {
        (ctrl_id as u32) << 16 | (resource as u32) << 8 | action as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn admin_cmd_layout() {
        assert_eq!(offset_of!(AdminCmd, nsid), 4);
        assert_eq!(offset_of!(AdminCmd, metadata), 16);
        assert_eq!(offset_of!(AdminCmd, addr), 24);
        assert_eq!(offset_of!(AdminCmd, data_len), 36);
        assert_eq!(offset_of!(AdminCmd, cdw10), 40);
        assert_eq!(offset_of!(AdminCmd, timeout_ms), 64);
        assert_eq!(offset_of!(AdminCmd, result), 68);
    }

    #[test]
    fn format_cdw10_fields() {
        let cdw10 = FormatCdw10::new()
            .with_lba_format(0x3)
            .with_secure_erase(secure_erase::CRYPTO);
        assert_eq!(u32::from(cdw10), 0x3 | 2 << 9);
    }

    #[test]
    fn virt_mgmt_cdw10() {
        let cdw10 = virt_mgmt::cdw10(
            5,
            virt_mgmt::RESOURCE_VI,
            virt_mgmt::ACTION_SECONDARY_ASSIGN,
        );
        assert_eq!(cdw10, 5 << 16 | 1 << 8 | 8);
    }
}
