// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use nvme_spec::status;
use pax_switch::SwitchError;
use std::fmt;
use thiserror::Error;

/// Failure of a tunneled NVMe admin command.
#[derive(Debug, Error)]
pub enum NvmeError {
    #[error(
        "invalid target {0:?}, expected <pdfid>@<device> (e.g. 0x3300@/dev/switchtec0)"
    )]
    InvalidTarget(String),
    #[error("device returned {got} bytes, needed {need}")]
    ShortData { got: usize, need: usize },
    #[error("{0}")]
    Command(CommandError),
    #[error(transparent)]
    Switch(#[from] SwitchError),
}

impl NvmeError {
    pub fn status_code(&self) -> Option<u32> {
        match self {
            NvmeError::Command(err) => Some(err.status_code),
            _ => None,
        }
    }
}

/// Decoded completion status for a command that failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub status_code: u32,
    pub retry_delay: u8,
    pub more: bool,
    pub do_not_retry: bool,
}

impl CommandError {
    /// Decodes a nonzero completion status field. The phase bit is not
    /// present in the tunneled status.
    pub fn from_status(raw: u32) -> Self {
        Self {
            status_code: raw & status::CODE_MASK,
            retry_delay: ((raw & status::CRD_MASK) >> status::CRD_SHIFT) as u8,
            more: raw & status::MORE != 0,
            do_not_retry: raw & status::DNR != 0,
        }
    }

    fn status_name(&self) -> &'static str {
        match self.status_code {
            0x001 => "Invalid Command Opcode",
            0x002 => "Invalid Field in Command",
            0x004 => "Data Transfer Error",
            0x005 => "Commands Aborted due to Power Loss Notification",
            0x006 => "Internal Error",
            0x00b => "Invalid Namespace or Format",
            0x00d => "Feature Identifier Not Saveable",
            0x00e => "Feature Not Changeable",
            0x00f => "Feature Not Namespace Specific",
            0x015 => "Namespace Insufficient Capacity",
            0x016 => "Namespace Identifier Unavailable",
            0x10a => "Invalid Format",
            0x10c => "Invalid Number of Controller Resources",
            0x10d => "Invalid Resource Identifier",
            0x115 => "Namespace Attachment Limit Exceeded",
            0x118 => "Namespace Already Attached",
            0x119 => "Namespace Is Private",
            0x11a => "Namespace Not Attached",
            _ => "Unknown Status",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NVMe Status: {} ({:#03x}) CRD: {} More: {} DNR: {}",
            self.status_name(),
            self.status_code,
            self.retry_delay,
            self.more,
            self.do_not_retry
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decode() {
        let err = CommandError::from_status(0x4118);
        assert_eq!(err.status_code, status::NAMESPACE_ALREADY_ATTACHED);
        assert!(err.do_not_retry);
        assert!(!err.more);
        assert_eq!(err.retry_delay, 0);
        assert_eq!(
            err.to_string(),
            "NVMe Status: Namespace Already Attached (0x118) CRD: 0 More: false DNR: true"
        );
    }
}
