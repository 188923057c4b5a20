// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Identify data structures.

use crate::IDENTIFY_DATA_SIZE;
use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cmic {
    pub multi_port: bool,
    pub multi_controller: bool,
    pub sriov_virtual_function: bool,
    pub ana_reporting: bool,
    #[bits(4)]
    _rsvd: u8,
}

#[bitfield(u32)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SanitizeCaps {
    pub crypto_erase: bool,
    pub block_erase: bool,
    pub overwrite: bool,
    #[bits(26)]
    _rsvd: u32,
    pub no_deallocate_inhibited: bool,
    #[bits(2)]
    pub nodmmas: u8,
}

/// Optional admin command support bits (OACS).
pub mod oacs {
    pub const FORMAT_NVM: u16 = 1 << 1;
    pub const NAMESPACE_MANAGEMENT: u16 = 1 << 3;
    pub const VIRTUALIZATION_MANAGEMENT: u16 = 1 << 7;
}

#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct PowerStateDescriptor {
    pub max_power: u16,
    pub rsvd2: u8,
    pub flags: u8,
    pub entry_lat: u32,
    pub exit_lat: u32,
    pub read_tput: u8,
    pub read_lat: u8,
    pub write_tput: u8,
    pub write_lat: u8,
    pub idle_power: u16,
    pub idle_scale: u8,
    pub rsvd19: u8,
    pub active_power: u16,
    pub active_work_scale: u8,
    pub rsvd23: [u8; 9],
}

const_assert_eq!(size_of::<PowerStateDescriptor>(), 32);

#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IdentifyController {
    pub vid: u16,
    pub ssvid: u16,
    pub sn: [u8; 20],
    pub mn: [u8; 40],
    pub fr: [u8; 8],
    pub rab: u8,
    pub ieee: [u8; 3],
    pub cmic: Cmic,
    pub mdts: u8,
    pub cntlid: u16,
    pub ver: u32,
    pub rtd3r: u32,
    pub rtd3e: u32,
    pub oaes: u32,
    pub ctratt: u32,
    pub rrls: u16,
    pub rsvd102: [u8; 9],
    pub cntrltype: u8,
    pub fguid: [u8; 16],
    pub crdt1: u16,
    pub crdt2: u16,
    pub crdt3: u16,
    pub rsvd134: [u8; 122],
    pub oacs: u16,
    pub acl: u8,
    pub aerl: u8,
    pub frmw: u8,
    pub lpa: u8,
    pub elpe: u8,
    pub npss: u8,
    pub avscc: u8,
    pub apsta: u8,
    pub wctemp: u16,
    pub cctemp: u16,
    pub mtfa: u16,
    pub hmpre: u32,
    pub hmmin: u32,
    pub tnvmcap: [u8; 16],
    pub unvmcap: [u8; 16],
    pub rpmbs: u32,
    pub edstt: u16,
    pub dsto: u8,
    pub fwug: u8,
    pub kas: u16,
    pub hctma: u16,
    pub mntmt: u16,
    pub mxtmt: u16,
    pub sanicap: SanitizeCaps,
    pub hmminds: u32,
    pub hmmaxd: u16,
    pub nsetidmax: u16,
    pub endgidmax: u16,
    pub anatt: u8,
    pub anacap: u8,
    pub anagrpmax: u32,
    pub nanagrpid: u32,
    pub pels: u32,
    pub rsvd356: [u8; 156],
    pub sqes: u8,
    pub cqes: u8,
    pub maxcmd: u16,
    pub nn: u32,
    pub oncs: u16,
    pub fuses: u16,
    pub fna: u8,
    pub vwc: u8,
    pub awun: u16,
    pub awupf: u16,
    pub nvscc: u8,
    pub nwpc: u8,
    pub acwu: u16,
    pub rsvd534: [u8; 2],
    pub sgls: u32,
    pub mnan: u32,
    pub rsvd544: [u8; 224],
    pub subnqn: [u8; 256],
    pub rsvd1024: [u8; 768],
    pub ioccsz: u32,
    pub iorcsz: u32,
    pub icdoff: u16,
    pub ctrattr: u8,
    pub msdbd: u8,
    pub rsvd1804: [u8; 244],
    pub psd: [PowerStateDescriptor; 32],
    pub vs: [u8; 1024],
}

const_assert_eq!(size_of::<IdentifyController>(), IDENTIFY_DATA_SIZE);

impl IdentifyController {
    pub fn serial_number(&self) -> String {
        ascii_field(&self.sn)
    }

    pub fn model_number(&self) -> String {
        ascii_field(&self.mn)
    }

    pub fn firmware_revision(&self) -> String {
        ascii_field(&self.fr)
    }
}

fn ascii_field(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches([' ', '\0']).to_string()
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Flbas {
    #[bits(4)]
    pub format: u8,
    pub extended_metadata: bool,
    #[bits(3)]
    _rsvd: u8,
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Nmic {
    pub shared: bool,
    #[bits(7)]
    _rsvd: u8,
}

#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct LbaFormat {
    pub ms: u16,
    pub lbads: u8,
    pub rp: u8,
}

const_assert_eq!(size_of::<LbaFormat>(), 4);

#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IdentifyNamespace {
    pub nsze: u64,
    pub ncap: u64,
    pub nuse: u64,
    pub nsfeat: u8,
    pub nlbaf: u8,
    pub flbas: Flbas,
    pub mc: u8,
    pub dpc: u8,
    pub dps: u8,
    pub nmic: Nmic,
    pub rescap: u8,
    pub fpi: u8,
    pub dlfeat: u8,
    pub nawun: u16,
    pub nawupf: u16,
    pub nacwu: u16,
    pub nabsn: u16,
    pub nabo: u16,
    pub nabspf: u16,
    pub noiob: u16,
    pub nvmcap: [u8; 16],
    pub npwg: u16,
    pub npwa: u16,
    pub npdg: u16,
    pub npda: u16,
    pub nows: u16,
    pub rsvd74: [u8; 18],
    pub anagrpid: u32,
    pub rsvd96: [u8; 3],
    pub nsattr: u8,
    pub nvmsetid: u16,
    pub endgid: u16,
    pub nguid: [u8; 16],
    pub eui64: [u8; 8],
    pub lbaf: [LbaFormat; 16],
    pub rsvd192: [u8; 192],
    pub vs: [u8; 3712],
}

const_assert_eq!(size_of::<IdentifyNamespace>(), IDENTIFY_DATA_SIZE);

/// Controller list returned for CNS 0x12/0x13 and sent as the payload of
/// namespace attach and detach.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ControllerList {
    pub num: u16,
    pub identifiers: [u16; 2047],
}

const_assert_eq!(size_of::<ControllerList>(), IDENTIFY_DATA_SIZE);

impl ControllerList {
    pub fn from_ids(ids: &[u16]) -> Self {
        let mut list = Self::new_zeroed();
        list.num = ids.len() as u16;
        list.identifiers[..ids.len()].copy_from_slice(ids);
        list
    }

    pub fn ids(&self) -> &[u16] {
        &self.identifiers[..(self.num as usize).min(self.identifiers.len())]
    }
}

/// Primary controller capabilities, CNS 0x14.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct PrimaryCtrlCaps {
    pub cntlid: u16,
    pub portid: u16,
    pub crt: u8,
    pub rsvd5: [u8; 27],
    pub vqfrt: u32,
    pub vqrfa: u32,
    pub vqrfap: u16,
    pub vqprt: u16,
    pub vqfrsm: u16,
    pub vqgran: u16,
    pub rsvd48: [u8; 16],
    pub vifrt: u32,
    pub virfa: u32,
    pub virfap: u16,
    pub viprt: u16,
    pub vifrsm: u16,
    pub vigran: u16,
    pub rsvd80: [u8; 4016],
}

const_assert_eq!(size_of::<PrimaryCtrlCaps>(), IDENTIFY_DATA_SIZE);

/// Secondary controller state bit: online.
pub const SECONDARY_CTRL_ONLINE: u8 = 1;

#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SecondaryCtrlEntry {
    pub scid: u16,
    pub pcid: u16,
    pub scs: u8,
    pub rsvd5: [u8; 3],
    pub vfn: u16,
    pub nvq: u16,
    pub nvi: u16,
    pub rsvd14: [u8; 18],
}

const_assert_eq!(size_of::<SecondaryCtrlEntry>(), 32);

/// Secondary controller list, CNS 0x15.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SecondaryCtrlList {
    pub count: u8,
    pub rsvd1: [u8; 31],
    pub entries: [SecondaryCtrlEntry; 127],
}

const_assert_eq!(size_of::<SecondaryCtrlList>(), IDENTIFY_DATA_SIZE);

impl SecondaryCtrlList {
    pub fn entries(&self) -> &[SecondaryCtrlEntry] {
        &self.entries[..(self.count as usize).min(self.entries.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn identify_controller_layout() {
        assert_eq!(offset_of!(IdentifyController, sn), 4);
        assert_eq!(offset_of!(IdentifyController, mn), 24);
        assert_eq!(offset_of!(IdentifyController, fr), 64);
        assert_eq!(offset_of!(IdentifyController, cntlid), 78);
        assert_eq!(offset_of!(IdentifyController, ver), 80);
        assert_eq!(offset_of!(IdentifyController, oacs), 256);
        assert_eq!(offset_of!(IdentifyController, sanicap), 328);
        assert_eq!(offset_of!(IdentifyController, sqes), 512);
        assert_eq!(offset_of!(IdentifyController, nn), 516);
        assert_eq!(offset_of!(IdentifyController, subnqn), 768);
        assert_eq!(offset_of!(IdentifyController, psd), 2048);
        assert_eq!(offset_of!(IdentifyController, vs), 3072);
    }

    #[test]
    fn identify_namespace_layout() {
        assert_eq!(offset_of!(IdentifyNamespace, nsfeat), 24);
        assert_eq!(offset_of!(IdentifyNamespace, nvmcap), 48);
        assert_eq!(offset_of!(IdentifyNamespace, anagrpid), 92);
        assert_eq!(offset_of!(IdentifyNamespace, nguid), 104);
        assert_eq!(offset_of!(IdentifyNamespace, eui64), 120);
        assert_eq!(offset_of!(IdentifyNamespace, lbaf), 128);
        assert_eq!(offset_of!(IdentifyNamespace, vs), 384);
    }

    #[test]
    fn primary_ctrl_caps_layout() {
        assert_eq!(offset_of!(PrimaryCtrlCaps, vqfrt), 32);
        assert_eq!(offset_of!(PrimaryCtrlCaps, vifrt), 64);
    }

    #[test]
    fn ascii_fields_trimmed() {
        let mut id = IdentifyController::new_zeroed();
        id.sn[..8].copy_from_slice(b"S1234   ");
        assert_eq!(id.serial_number(), "S1234");
    }

    #[test]
    fn controller_list_round_trip() {
        let list = ControllerList::from_ids(&[1, 3, 7]);
        assert_eq!(list.ids(), &[1, 3, 7]);
    }
}
