// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Endpoint tunnel control.
//!
//! The tunnel is per-PDFID state on the switch: disabled after a switch
//! reset, enabled on demand, and left enabled on handle close so repeated
//! invocations do not churn it.

use crate::Switch;
use crate::SwitchError;
use pax_spec::mrpc::CommandId;
use pax_spec::mrpc::ep_tunnel;
use std::time::Duration;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

const ENABLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ENABLE_POLL_LIMIT: usize = 50;

/// Reported tunnel state for one endpoint function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TunnelStatus {
    Disabled,
    Enabled,
    Unknown(u32),
}

#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct TunnelCfgInput {
    subcmd: u32,
    pdfid: u16,
    rsvd: u16,
}

impl Switch {
    pub fn ep_tunnel_status(&mut self, pdfid: u16) -> Result<TunnelStatus, SwitchError> {
        let input = TunnelCfgInput {
            subcmd: ep_tunnel::STATUS,
            pdfid,
            rsvd: 0,
        };
        let state: u32 = self.run(CommandId::EP_TUNNEL_CFG, &input)?;
        Ok(match state {
            0 => TunnelStatus::Disabled,
            1 => TunnelStatus::Enabled,
            other => TunnelStatus::Unknown(other),
        })
    }

    pub fn ep_tunnel_enable(&mut self, pdfid: u16) -> Result<(), SwitchError> {
        let input = TunnelCfgInput {
            subcmd: ep_tunnel::ENABLE,
            pdfid,
            rsvd: 0,
        };
        self.run::<[u8; 0]>(CommandId::EP_TUNNEL_CFG, &input)
            .map(|_| ())
    }

    pub fn ep_tunnel_disable(&mut self, pdfid: u16) -> Result<(), SwitchError> {
        let input = TunnelCfgInput {
            subcmd: ep_tunnel::DISABLE,
            pdfid,
            rsvd: 0,
        };
        self.run::<[u8; 0]>(CommandId::EP_TUNNEL_CFG, &input)
            .map(|_| ())
    }

    /// Idempotent enable: an already-enabled tunnel issues no enable
    /// command; otherwise enable and poll until the switch reports it up.
    pub fn ensure_ep_tunnel(&mut self, pdfid: u16) -> Result<(), SwitchError> {
        if self.ep_tunnel_status(pdfid)? == TunnelStatus::Enabled {
            return Ok(());
        }
        self.ep_tunnel_enable(pdfid)?;
        for _ in 0..ENABLE_POLL_LIMIT {
            if self.ep_tunnel_status(pdfid)? == TunnelStatus::Enabled {
                return Ok(());
            }
            std::thread::sleep(ENABLE_POLL_INTERVAL);
        }
        Err(SwitchError::TunnelNotReady { pdfid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn expect_status(mock: &MockBackend, state: u32) {
        mock.expect(CommandId::EP_TUNNEL_CFG, move |input, output| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_tunnel::STATUS
            );
            output[..4].copy_from_slice(&state.to_le_bytes());
            Ok(())
        });
    }

    #[test]
    fn ensure_skips_enable_when_already_up() {
        let mock = MockBackend::new();
        expect_status(&mock, 1);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch.ensure_ep_tunnel(0x1800).unwrap();
        assert_eq!(mock.commands_run(), 1);
        mock.verify();
    }

    #[test]
    fn ensure_enables_and_polls() {
        let mock = MockBackend::new();
        expect_status(&mock, 0);
        mock.expect(CommandId::EP_TUNNEL_CFG, |input, _| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_tunnel::ENABLE
            );
            assert_eq!(u16::from_le_bytes(input[4..6].try_into().unwrap()), 0x1800);
            Ok(())
        });
        expect_status(&mock, 0);
        expect_status(&mock, 1);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch.ensure_ep_tunnel(0x1800).unwrap();
        mock.verify();
    }

    #[test]
    fn ensure_is_idempotent_across_calls() {
        let mock = MockBackend::new();
        expect_status(&mock, 0);
        mock.expect(CommandId::EP_TUNNEL_CFG, |_, _| Ok(()));
        expect_status(&mock, 1);
        expect_status(&mock, 1);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch.ensure_ep_tunnel(0x1800).unwrap();
        switch.ensure_ep_tunnel(0x1800).unwrap();
        // One enable total across both calls.
        assert_eq!(mock.commands_run(), 4);
        mock.verify();
    }
}
