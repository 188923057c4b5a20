// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fabric management structures: link status, HVD bind/unbind, and the GFMS
//! endpoint-port dump.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// PFF index reported for the virtual endpoint of a partition.
pub const PFF_VEP: i32 = 100;

/// Input frame for `LINK_STAT`. A `count` of 0xff requests every physical
/// port.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct LinkStatInput {
    pub phys_port_start: u8,
    pub count: u8,
    pub rsvd: u16,
}

/// Per-port record in a `LINK_STAT` reply. The reply is a
/// [`LinkStatReplyHdr`] followed by `count` records.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct LinkStatRecord {
    pub phys_port_id: u8,
    pub flags: u8,
    pub link_gen: u8,
    pub rsvd: u8,
    pub link_state: u16,
    pub cfg_link_width: u8,
    pub neg_link_width: u8,
}

impl LinkStatRecord {
    pub const FLAG_LINK_UP: u8 = 1 << 0;

    pub fn link_up(&self) -> bool {
        self.flags & Self::FLAG_LINK_UP != 0
    }
}

#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct LinkStatReplyHdr {
    pub count: u8,
    pub rsvd: [u8; 3],
}

/// Input frame for `PORT_TO_PFF`. The reply is the PFF index as one dword.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PortToPffInput {
    pub partition_id: u32,
    pub logical_port_id: u32,
}

/// Input frame for `GFMS_BIND`.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BindInput {
    pub host_sw_idx: u8,
    pub host_phys_port_id: u8,
    pub host_log_port_id: u8,
    pub rsvd: u8,
    pub pdfid: u16,
    pub rsvd2: u16,
}

/// Input frame for `GFMS_UNBIND`.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct UnbindInput {
    pub host_sw_idx: u8,
    pub host_phys_port_id: u8,
    pub host_log_port_id: u8,
    pub rsvd: u8,
}

/// Sub-commands of `GFMS_DUMP`. The dump is a three-phase protocol: start
/// returns the dump length in dwords, get pulls chunks, finish releases the
/// firmware-side snapshot.
pub mod gfms_dump {
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    pub const EP_PORT_START: u8 = 1;
    pub const EP_PORT_GET: u8 = 2;
    pub const EP_PORT_FINISH: u8 = 3;

    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct StartInput {
        pub subcmd: u8,
        pub phys_port_id: u8,
        pub rsvd: u16,
    }

    /// Reply to [`EP_PORT_START`].
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct StartReply {
        pub len_dw: u32,
    }

    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct GetInput {
        pub subcmd: u8,
        pub phys_port_id: u8,
        pub offset_dw: u16,
        pub count_dw: u16,
        pub rsvd: u16,
    }

    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct FinishInput {
        pub subcmd: u8,
        pub rsvd: [u8; 3],
    }
}

/// Endpoint-port types reported in [`DumpEpPortHdr::typ`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EpPortType(pub u8);

impl EpPortType {
    pub const UNUSED: EpPortType = EpPortType(0);
    pub const FABRIC: EpPortType = EpPortType(1);
    /// An attached endpoint device; the only type the configurator walks.
    pub const DEVICE: EpPortType = EpPortType(2);
    pub const SWITCH: EpPortType = EpPortType(3);
}

/// Fixed header of a GFMS endpoint-port dump.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DumpEpPortHdr {
    pub typ: u8,
    pub phys_port_id: u8,
    pub function_count: u16,
    pub size_dw: u16,
    pub rsvd: u16,
}

/// One function record of a GFMS endpoint-port dump. `function_count` of
/// these follow the header.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DumpEpPortFunction {
    pub func_id: u16,
    pub pdfid: u16,
    /// Non-zero for the SR-IOV physical function.
    pub sriov_cap_pf: u8,
    pub bound: u8,
    pub bound_pax_id: u8,
    pub bound_hvd_phys_pid: u8,
    pub bound_hvd_log_pid: u8,
    pub rsvd: [u8; 3],
}

impl DumpEpPortFunction {
    pub fn is_pf(&self) -> bool {
        self.sriov_cap_pf != 0
    }

    pub fn is_bound(&self) -> bool {
        self.bound != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn dump_record_sizes() {
        assert_eq!(size_of::<DumpEpPortHdr>(), 8);
        assert_eq!(size_of::<DumpEpPortFunction>(), 12);
        assert_eq!(size_of::<LinkStatRecord>(), 8);
        assert_eq!(size_of::<BindInput>(), 8);
    }
}
