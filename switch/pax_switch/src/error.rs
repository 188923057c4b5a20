// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use pax_spec::mrpc::CommandId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by switch transport and management operations.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("failed to open switch device {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("direct nvme device paths are not supported, address the endpoint through a switch device")]
    DirectNvmeDevice,
    #[error("no switch device found for pax id {0}")]
    PaxNotFound(u8),
    #[error("mrpc input of {len} bytes exceeds the {max} byte window")]
    InputTooLarge { len: usize, max: usize },
    #[error("mrpc output of {len} bytes exceeds the {max} byte window")]
    OutputTooLarge { len: usize, max: usize },
    #[error("command {cmd:#x} failed with status {status:#x}", cmd = .cmd.0)]
    CommandStatus { cmd: CommandId, status: u32 },
    #[error("command {cmd:#x} returned {ret:#x}", cmd = .cmd.0)]
    CommandRet { cmd: CommandId, ret: u32 },
    #[error("endpoint function {pdfid:#06x} is already bound")]
    AlreadyBound { pdfid: u16 },
    #[error("event wait timed out")]
    EventWaitTimeout,
    #[error("event {0} is not a valid event id")]
    InvalidEvent(u32),
    #[error("echo mismatch: sent {sent:#010x}, received {received:#010x}")]
    EchoMismatch { sent: u32, received: u32 },
    #[error("invalid access width of {0} bytes")]
    InvalidAccessWidth(usize),
    #[error("gas access at {addr:#x}+{len} exceeds the {size} byte region")]
    GasOutOfRange { addr: u64, len: usize, size: usize },
    #[error("endpoint port {port} reports type {typ} instead of an attached device")]
    NotDeviceEpPort { port: u8, typ: u8 },
    #[error("short reply: got {got} bytes, need {need}")]
    ShortReply { got: usize, need: usize },
    #[error("no pcie capability found for endpoint function {pdfid:#06x}")]
    NoPcieCapability { pdfid: u16 },
    #[error("endpoint tunnel for {pdfid:#06x} did not become enabled")]
    TunnelNotReady { pdfid: u16 },
    #[error("uart framing error: {0}")]
    UartFraming(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SwitchError {
    /// True when a bind failed only because the binding already exists.
    pub fn is_already_bound(&self) -> bool {
        matches!(self, SwitchError::AlreadyBound { .. })
    }
}
