// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Endpoint configuration-space access and function level reset.

use crate::Switch;
use crate::SwitchError;
use pax_spec::mrpc::CommandId;
use pax_spec::mrpc::ep_resource;
use pax_spec::pcie;
use zerocopy::IntoBytes;

impl Switch {
    /// Reads `bytes` (1, 2, or 4) of config space from endpoint function
    /// `pdfid`.
    pub fn csr_read(&mut self, pdfid: u16, addr: u16, bytes: u8) -> Result<u32, SwitchError> {
        if !matches!(bytes, 1 | 2 | 4) {
            return Err(SwitchError::InvalidAccessWidth(bytes.into()));
        }
        let mut frame = ep_resource::Header {
            subcmd: ep_resource::CSR_READ,
            pdfid,
            rsvd: 0,
        }
        .as_bytes()
        .to_vec();
        frame.extend_from_slice(
            ep_resource::CsrAccess {
                addr,
                bytes: bytes.into(),
                data: 0,
            }
            .as_bytes(),
        );
        let value: u32 = self.run(CommandId::EP_RESOURCE_ACCESS, frame.as_slice())?;
        Ok(value & width_mask(bytes))
    }

    /// Writes `bytes` (1, 2, or 4) of `data` to config space of endpoint
    /// function `pdfid`. Sub-dword writes are staged zero-padded; the
    /// effective width rides in the frame.
    pub fn csr_write(
        &mut self,
        pdfid: u16,
        addr: u16,
        data: u32,
        bytes: u8,
    ) -> Result<(), SwitchError> {
        if !matches!(bytes, 1 | 2 | 4) {
            return Err(SwitchError::InvalidAccessWidth(bytes.into()));
        }
        let mut frame = ep_resource::Header {
            subcmd: ep_resource::CSR_WRITE,
            pdfid,
            rsvd: 0,
        }
        .as_bytes()
        .to_vec();
        frame.extend_from_slice(
            ep_resource::CsrAccess {
                addr,
                bytes: bytes.into(),
                data: data & width_mask(bytes),
            }
            .as_bytes(),
        );
        self.run_command(CommandId::EP_RESOURCE_ACCESS, &frame, &mut [])
    }

    /// Issues a function level reset to `pdfid` by walking its capability
    /// chain to the PCIe capability and setting the FLR bit in Device
    /// Control.
    pub fn vf_reset(&mut self, pdfid: u16) -> Result<(), SwitchError> {
        let mut cap =
            u16::from(self.csr_read(pdfid, pcie::CAP_POINTER, 1)? as u8 & pcie::CAP_POINTER_MASK);
        for _ in 0..pcie::CAP_WALK_MAX {
            if cap == 0 {
                break;
            }
            let id = self.csr_read(pdfid, cap, 1)? as u8;
            if id == pcie::CAP_ID_PCIE {
                let devctl_addr = cap + pcie::PCIE_CAP_DEVCTL;
                let devctl = self.csr_read(pdfid, devctl_addr, 2)? as u16;
                self.csr_write(pdfid, devctl_addr, (devctl | pcie::DEVCTL_FLR).into(), 2)?;
                return Ok(());
            }
            cap = u16::from(
                self.csr_read(pdfid, cap + pcie::CAP_NEXT, 1)? as u8 & pcie::CAP_POINTER_MASK,
            );
        }
        Err(SwitchError::NoPcieCapability { pdfid })
    }
}

fn width_mask(bytes: u8) -> u32 {
    match bytes {
        1 => 0xff,
        2 => 0xffff,
        _ => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use std::collections::HashMap;

    /// Queues CSR expectations backed by a config-space image.
    fn expect_csr_reads(mock: &MockBackend, image: HashMap<u16, u32>, count: usize) {
        for _ in 0..count {
            let image = image.clone();
            mock.expect(CommandId::EP_RESOURCE_ACCESS, move |input, output| {
                let subcmd = u32::from_le_bytes(input[..4].try_into().unwrap());
                assert_eq!(subcmd, ep_resource::CSR_READ);
                let addr = u16::from_le_bytes(input[8..10].try_into().unwrap());
                let value = image.get(&addr).copied().unwrap_or(0);
                output[..4].copy_from_slice(&value.to_le_bytes());
                Ok(())
            });
        }
    }

    #[test]
    fn vf_reset_walks_to_pcie_cap() {
        // Cap chain: 0x40 (MSI) -> 0x60 (PCIe).
        let image: HashMap<u16, u32> = [
            (pcie::CAP_POINTER, 0x40),
            (0x40, 0x05),
            (0x41, 0x60),
            (0x60, u32::from(pcie::CAP_ID_PCIE)),
            (0x68, 0x2810),
        ]
        .into_iter()
        .collect();

        let mock = MockBackend::new();
        // cap ptr, id@40, next@41, id@60, devctl read.
        expect_csr_reads(&mock, image, 5);
        mock.expect(CommandId::EP_RESOURCE_ACCESS, |input, _| {
            let subcmd = u32::from_le_bytes(input[..4].try_into().unwrap());
            assert_eq!(subcmd, ep_resource::CSR_WRITE);
            let addr = u16::from_le_bytes(input[8..10].try_into().unwrap());
            assert_eq!(addr, 0x68);
            let bytes = u16::from_le_bytes(input[10..12].try_into().unwrap());
            assert_eq!(bytes, 2);
            let data = u32::from_le_bytes(input[12..16].try_into().unwrap());
            assert_eq!(data, 0x2810 | u32::from(pcie::DEVCTL_FLR));
            Ok(())
        });

        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch.vf_reset(0x1901).unwrap();
        mock.verify();
    }

    #[test]
    fn vf_reset_without_pcie_cap_fails() {
        // A two-entry loop that never reaches a PCIe capability.
        let image: HashMap<u16, u32> = [
            (pcie::CAP_POINTER, 0x40),
            (0x40, 0x05),
            (0x41, 0x50),
            (0x50, 0x11),
            (0x51, 0x40),
        ]
        .into_iter()
        .collect();

        let mock = MockBackend::new();
        // One pointer read plus two reads per hop, capped at the walk limit.
        expect_csr_reads(&mock, image, 1 + 2 * pcie::CAP_WALK_MAX);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        let err = switch.vf_reset(0x1901).unwrap_err();
        assert!(matches!(err, SwitchError::NoPcieCapability { pdfid: 0x1901 }));
    }

    #[test]
    fn sub_dword_write_is_masked() {
        let mock = MockBackend::new();
        mock.expect(CommandId::EP_RESOURCE_ACCESS, |input, _| {
            let bytes = u16::from_le_bytes(input[10..12].try_into().unwrap());
            let data = u32::from_le_bytes(input[12..16].try_into().unwrap());
            assert_eq!(bytes, 1);
            assert_eq!(data, 0xcd);
            Ok(())
        });
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch.csr_write(0x1900, 0x34, 0xabcd, 1).unwrap();
        mock.verify();
    }
}
