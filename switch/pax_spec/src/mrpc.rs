// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! MRPC (Management Request/Response Procedure Call) wire definitions.
//!
//! An MRPC exchange writes up to [`INPUT_DATA_MAX`] bytes of input into the
//! GAS window, writes the command register last, polls the status register
//! out of [`Status::INPROGRESS`], then reads the return code and up to
//! [`OUTPUT_DATA_MAX`] bytes of output.

use core::mem::offset_of;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Maximum MRPC input payload, in bytes.
pub const INPUT_DATA_MAX: usize = 1024;
/// Maximum MRPC output payload, in bytes.
pub const OUTPUT_DATA_MAX: usize = 1024;

/// The MRPC register window at the base of the GAS.
///
/// The layout is fixed by the switch firmware; a unit test pins the register
/// offsets.
#[repr(C)]
#[derive(Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct MrpcRegs {
    pub input_data: [u8; INPUT_DATA_MAX],
    pub output_data: [u8; OUTPUT_DATA_MAX],
    pub command: u32,
    pub status: u32,
    pub ret: u32,
}

const_assert_eq!(offset_of!(MrpcRegs, command), 2048);
const_assert_eq!(offset_of!(MrpcRegs, status), 2052);
const_assert_eq!(offset_of!(MrpcRegs, ret), 2056);

/// GAS offset of the MRPC input window.
pub const GAS_INPUT_DATA: u64 = offset_of!(MrpcRegs, input_data) as u64;
/// GAS offset of the MRPC output window.
pub const GAS_OUTPUT_DATA: u64 = offset_of!(MrpcRegs, output_data) as u64;
/// GAS offset of the MRPC command register.
pub const GAS_COMMAND: u64 = offset_of!(MrpcRegs, command) as u64;
/// GAS offset of the MRPC status register.
pub const GAS_STATUS: u64 = offset_of!(MrpcRegs, status) as u64;
/// GAS offset of the MRPC return-code register.
pub const GAS_RET: u64 = offset_of!(MrpcRegs, ret) as u64;

/// MRPC status register values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    pub const INPROGRESS: Status = Status(1);
    pub const DONE: Status = Status(2);
    pub const ERROR: Status = Status(0xff);
    pub const INTERRUPTED: Status = Status(0x100);
}

/// Management command ids.
///
/// Commands with [`CommandId::PAX_BIT`] set are serviced by the fabric
/// management firmware (GFMS) rather than the per-partition firmware.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandId(pub u32);

impl CommandId {
    /// Fabric-scoped (GFMS) command marker.
    pub const PAX_BIT: u32 = 1 << 31;

    /// Echo the bit-inverse of the input dword.
    pub const ECHO: CommandId = CommandId(0x41);
    /// Per-port link status.
    pub const LINK_STAT: CommandId = CommandId(0x28);
    /// Bandwidth-counter control and readout.
    pub const PMON: CommandId = CommandId(0x32);
    /// Event summary readout.
    pub const EVENT_SUMMARY: CommandId = CommandId(0x42);
    /// Per-event readout and clear.
    pub const EVENT_CTRL: CommandId = CommandId(0x43);
    /// Block until an event fires or the supplied timeout expires.
    pub const EVENT_WAIT: CommandId = CommandId(0x44);
    /// Resolve (partition, logical port) to a PFF index.
    pub const PORT_TO_PFF: CommandId = CommandId(0x45);
    /// Chip serial number.
    pub const GET_SERIAL: CommandId = CommandId(0x46);
    /// Running firmware version.
    pub const GET_FW_VERSION: CommandId = CommandId(0x47);

    /// PAX identifier of this switch within the fabric.
    pub const GET_PAX_ID: CommandId = CommandId(Self::PAX_BIT | 0x81);
    /// Endpoint CSR access and tunneled NVMe admin passthrough.
    pub const EP_RESOURCE_ACCESS: CommandId = CommandId(Self::PAX_BIT | 0x82);
    /// Endpoint tunnel enable/disable/status.
    pub const EP_TUNNEL_CFG: CommandId = CommandId(Self::PAX_BIT | 0x83);
    /// GFMS event queue readout and clear.
    pub const GFMS_EVENT: CommandId = CommandId(Self::PAX_BIT | 0x84);
    /// Bind an endpoint function into a host virtualization domain.
    pub const GFMS_BIND: CommandId = CommandId(Self::PAX_BIT | 0x85);
    /// Remove a host virtualization domain binding.
    pub const GFMS_UNBIND: CommandId = CommandId(Self::PAX_BIT | 0x86);
    /// Three-phase GFMS endpoint-port dump.
    pub const GFMS_DUMP: CommandId = CommandId(Self::PAX_BIT | 0x87);
}

/// Well-known non-zero MRPC return codes.
pub mod ret {
    /// Bind target already carries a binding.
    pub const ALREADY_BOUND: u32 = 0x66;
    /// Event wait timed out without the event firing.
    pub const EVENT_WAIT_TIMEOUT: u32 = 0x78;
}

/// Sub-commands of [`CommandId::EP_TUNNEL_CFG`].
///
/// The input frame is `{ subcmd: u32, pdfid: u32 }`; `STATUS` returns one
/// dword, `0` for disabled and `1` for enabled.
pub mod ep_tunnel {
    pub const DISABLE: u32 = 0;
    pub const ENABLE: u32 = 1;
    pub const STATUS: u32 = 2;
}

/// Sub-commands of [`CommandId::EP_RESOURCE_ACCESS`].
pub mod ep_resource {
    use zerocopy::FromBytes;
    use zerocopy::Immutable;
    use zerocopy::IntoBytes;
    use zerocopy::KnownLayout;

    pub const CSR_READ: u32 = 0;
    pub const CSR_WRITE: u32 = 1;
    /// Stage a tunneled NVMe admin command (72-byte SQE image + data length).
    pub const NVME_START: u32 = 2;
    /// Stage a chunk of write data at an explicit offset.
    pub const NVME_DATA: u32 = 3;
    /// Issue the staged command; the reply is a [`NvmeCompletion`].
    pub const NVME_EXEC: u32 = 4;
    /// Read back a chunk of completion data at an explicit offset.
    pub const NVME_FETCH: u32 = 5;

    /// Common header of every `EP_RESOURCE_ACCESS` input frame.
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct Header {
        pub subcmd: u32,
        pub pdfid: u16,
        pub rsvd: u16,
    }

    /// CSR access frame following the header. Writes below a dword are
    /// zero-padded; `bytes` carries the effective width.
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct CsrAccess {
        pub addr: u16,
        pub bytes: u16,
        pub data: u32,
    }

    /// Data/fetch chunk descriptor following the header.
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct Chunk {
        pub offset: u32,
        pub len: u32,
    }

    /// Reply to [`NVME_EXEC`]: the masked NVMe completion status and the
    /// command-specific result dword.
    #[repr(C)]
    #[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
    pub struct NvmeCompletion {
        pub status: u32,
        pub result: u32,
    }

    /// Largest write-data chunk that fits an input frame with its header.
    pub const DATA_CHUNK_MAX: usize = 896;
    /// Largest read-back chunk that fits the output window.
    pub const FETCH_CHUNK_MAX: usize = 1008;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn register_layout() {
        // The firmware fixes the window layout.
        assert_eq!(offset_of!(MrpcRegs, command), 2048);
        assert_eq!(offset_of!(MrpcRegs, status), 2052);
        assert_eq!(offset_of!(MrpcRegs, ret), 2056);
        assert_eq!(size_of::<MrpcRegs>(), 2060);
    }

    #[test]
    fn pax_commands_are_marked() {
        for cmd in [
            CommandId::GET_PAX_ID,
            CommandId::EP_RESOURCE_ACCESS,
            CommandId::EP_TUNNEL_CFG,
            CommandId::GFMS_EVENT,
            CommandId::GFMS_BIND,
            CommandId::GFMS_UNBIND,
            CommandId::GFMS_DUMP,
        ] {
            assert_ne!(cmd.0 & CommandId::PAX_BIT, 0);
        }
        assert_eq!(CommandId::ECHO.0 & CommandId::PAX_BIT, 0);
    }
}
