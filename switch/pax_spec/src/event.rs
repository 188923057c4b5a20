// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Switch event definitions.
//!
//! Events come in two flavors. Partition-scoped events are identified by an
//! [`EventId`] and classified as global, per-partition, or per-port; they are
//! read through the event summary and per-event control commands. GFMS events
//! are a fabric-wide queue of [`GfmsEventCode`] records with event-specific
//! payload words.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Index value selecting every partition (or every PFF) of an event class.
pub const INDEX_ALL: i32 = -2;

/// Scope of an [`EventId`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventType {
    Invalid,
    Global,
    Partition,
    Port,
}

/// Identifier of a partition-scoped switch event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u32);

impl EventId {
    pub const STACK_ERROR: EventId = EventId(0);
    pub const PPU_ERROR: EventId = EventId(1);
    pub const ISP_ERROR: EventId = EventId(2);
    pub const SYS_RESET: EventId = EventId(3);
    pub const FW_EXC: EventId = EventId(4);
    pub const FW_NMI: EventId = EventId(5);
    pub const FW_NON_FATAL: EventId = EventId(6);
    pub const FW_FATAL: EventId = EventId(7);
    pub const TWI_MRPC_COMP: EventId = EventId(8);
    pub const TWI_MRPC_COMP_ASYNC: EventId = EventId(9);
    pub const CLI_MRPC_COMP: EventId = EventId(10);
    pub const CLI_MRPC_COMP_ASYNC: EventId = EventId(11);
    pub const GPIO_INT: EventId = EventId(12);
    pub const GFMS: EventId = EventId(13);
    pub const PART_RESET: EventId = EventId(14);
    pub const MRPC_COMP: EventId = EventId(15);
    pub const MRPC_COMP_ASYNC: EventId = EventId(16);
    pub const DYN_PART_BIND_COMP: EventId = EventId(17);
    pub const AER_IN_P2P: EventId = EventId(18);
    pub const AER_IN_VEP: EventId = EventId(19);
    pub const DPC: EventId = EventId(20);
    pub const CTS: EventId = EventId(21);
    pub const UEC: EventId = EventId(22);
    pub const HOTPLUG: EventId = EventId(23);
    pub const IER: EventId = EventId(24);
    pub const THRESH: EventId = EventId(25);
    pub const POWER_MGMT: EventId = EventId(26);
    pub const TLP_THROTTLING: EventId = EventId(27);
    pub const FORCE_SPEED: EventId = EventId(28);
    pub const CREDIT_TIMEOUT: EventId = EventId(29);
    pub const LINK_STATE: EventId = EventId(30);

    pub const COUNT: u32 = 31;

    pub fn name(&self) -> &'static str {
        match *self {
            EventId::STACK_ERROR => "STACK_ERROR",
            EventId::PPU_ERROR => "PPU_ERROR",
            EventId::ISP_ERROR => "ISP_ERROR",
            EventId::SYS_RESET => "SYS_RESET",
            EventId::FW_EXC => "FW_EXC",
            EventId::FW_NMI => "FW_NMI",
            EventId::FW_NON_FATAL => "FW_NON_FATAL",
            EventId::FW_FATAL => "FW_FATAL",
            EventId::TWI_MRPC_COMP => "TWI_MRPC_COMP",
            EventId::TWI_MRPC_COMP_ASYNC => "TWI_MRPC_COMP_ASYNC",
            EventId::CLI_MRPC_COMP => "CLI_MRPC_COMP",
            EventId::CLI_MRPC_COMP_ASYNC => "CLI_MRPC_COMP_ASYNC",
            EventId::GPIO_INT => "GPIO_INT",
            EventId::GFMS => "GFMS",
            EventId::PART_RESET => "PART_RESET",
            EventId::MRPC_COMP => "MRPC_COMP",
            EventId::MRPC_COMP_ASYNC => "MRPC_COMP_ASYNC",
            EventId::DYN_PART_BIND_COMP => "DYN_PART_BIND_COMP",
            EventId::AER_IN_P2P => "AER_IN_P2P",
            EventId::AER_IN_VEP => "AER_IN_VEP",
            EventId::DPC => "DPC",
            EventId::CTS => "CTS",
            EventId::UEC => "UEC",
            EventId::HOTPLUG => "HOTPLUG",
            EventId::IER => "IER",
            EventId::THRESH => "THRESH",
            EventId::POWER_MGMT => "POWER_MGMT",
            EventId::TLP_THROTTLING => "TLP_THROTTLING",
            EventId::FORCE_SPEED => "FORCE_SPEED",
            EventId::CREDIT_TIMEOUT => "CREDIT_TIMEOUT",
            EventId::LINK_STATE => "LINK_STATE",
            _ => "UNKNOWN",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self.0 {
            0..=13 => EventType::Global,
            14..=17 => EventType::Partition,
            18..=30 => EventType::Port,
            _ => EventType::Invalid,
        }
    }
}

/// Reply to `EVENT_SUMMARY` and `EVENT_WAIT`. Non-zero words flag pending
/// events; bit `n` of a word corresponds to [`EventId`] `n` within the scope.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EventSummary {
    pub global: u64,
    pub part_bitmap: u64,
    pub local_part: u32,
    pub rsvd: u32,
    pub part: [u32; 48],
    pub pff: [u32; 128],
}

/// Input frame for `EVENT_CTRL`.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EventCtrlInput {
    pub event_id: u32,
    /// Partition or PFF index, [`INDEX_ALL`] cast to u32 for every index.
    pub index: u32,
    pub flags: u32,
}

/// Flags for [`EventCtrlInput`].
pub mod event_ctrl {
    pub const CLEAR: u32 = 1 << 0;
}

/// Reply to `EVENT_CTRL`: occurrence count plus event-specific data words.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EventCtrlReply {
    pub count: u32,
    pub data: [u32; 5],
}

/// Input frame for `EVENT_WAIT`. A `timeout_ms` of `u32::MAX` waits forever.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EventWaitInput {
    pub event_id: u32,
    pub index: u32,
    pub timeout_ms: u32,
}

/// GFMS event queue codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GfmsEventCode(pub u16);

impl GfmsEventCode {
    pub const HOST_LINK_UP: GfmsEventCode = GfmsEventCode(1);
    pub const HOST_LINK_DOWN: GfmsEventCode = GfmsEventCode(2);
    pub const DEVICE_ADD: GfmsEventCode = GfmsEventCode(3);
    pub const DEVICE_DELETE: GfmsEventCode = GfmsEventCode(4);
    pub const FABRIC_LINK_UP: GfmsEventCode = GfmsEventCode(5);
    pub const FABRIC_LINK_DOWN: GfmsEventCode = GfmsEventCode(6);
    pub const BIND: GfmsEventCode = GfmsEventCode(7);
    pub const UNBIND: GfmsEventCode = GfmsEventCode(8);
    pub const DATABASE_CHANGED: GfmsEventCode = GfmsEventCode(9);
    pub const HVD_INST_ENABLE: GfmsEventCode = GfmsEventCode(10);
    pub const HVD_INST_DISABLE: GfmsEventCode = GfmsEventCode(11);
    pub const EP_PORT_ADD: GfmsEventCode = GfmsEventCode(12);
    pub const EP_PORT_REMOVE: GfmsEventCode = GfmsEventCode(13);
    pub const AER: GfmsEventCode = GfmsEventCode(14);
}

/// Sub-commands of `GFMS_EVENT`.
pub mod gfms_event {
    pub const GET: u32 = 0;
    pub const CLEAR: u32 = 1;
}

/// Header of a `GFMS_EVENT` get reply. `count` variable-length
/// [`GfmsEventHdr`] records follow; `remaining` reports events still queued
/// switch-side.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GfmsEventReplyHdr {
    pub remaining: u16,
    pub count: u16,
}

/// Header of one queued GFMS event; `data_len_dw` payload dwords follow.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GfmsEventHdr {
    pub code: u16,
    pub src_pax_id: u16,
    pub data_len_dw: u16,
    pub rsvd: u16,
}
