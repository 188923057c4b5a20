// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVMe admin access to switch-attached endpoint functions.
//!
//! Commands are tunneled through the fabric rather than issued to a local
//! NVMe character device, so targets name a function by PDFID plus the
//! switch device to reach it through, e.g. `0x3300@/dev/switchtec0`.

#![forbid(unsafe_code)]

mod error;

pub use error::CommandError;
pub use error::NvmeError;

use nvme_spec::ADMIN_CMD_LEN;
use nvme_spec::AdminCmd;
use nvme_spec::AdminOpcode;
use nvme_spec::Cns;
use nvme_spec::FormatCdw10;
use nvme_spec::IDENTIFY_DATA_SIZE;
use nvme_spec::NSID_ALL;
use nvme_spec::feature;
use nvme_spec::feature::Feature;
use nvme_spec::identify::ControllerList;
use nvme_spec::identify::IdentifyController;
use nvme_spec::identify::IdentifyNamespace;
use nvme_spec::identify::PrimaryCtrlCaps;
use nvme_spec::identify::SecondaryCtrlList;
use nvme_spec::log::LogPageId;
use nvme_spec::log::SMART_LOG_LEN;
use nvme_spec::log::SmartLog;
use nvme_spec::log::get_log_cdw10_11;
use nvme_spec::secure_erase;
use nvme_spec::virt_mgmt;
use pax_switch::Switch;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// A `<pdfid>@<device>` target string, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub pdfid: u16,
    pub device: String,
}

impl std::str::FromStr for Target {
    type Err = NvmeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pdfid, device) = s
            .split_once('@')
            .ok_or_else(|| NvmeError::InvalidTarget(s.to_string()))?;
        if pdfid.is_empty() || device.is_empty() {
            return Err(NvmeError::InvalidTarget(s.to_string()));
        }
        let pdfid = parse_pdfid(pdfid).ok_or_else(|| NvmeError::InvalidTarget(s.to_string()))?;
        Ok(Self {
            pdfid,
            device: device.to_string(),
        })
    }
}

fn parse_pdfid(s: &str) -> Option<u16> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else if s != "0" && s.starts_with('0') {
        u16::from_str_radix(&s[1..], 8).ok()
    } else {
        s.parse().ok()
    }
}

/// Handle for admin commands to one endpoint function.
pub struct Device {
    switch: Switch,
    pdfid: u16,
}

impl Device {
    /// Opens the switch named by `target` and binds to its PDFID.
    pub fn open(target: &str) -> Result<Self, NvmeError> {
        let target: Target = target.parse()?;
        let switch = Switch::open(&target.device)?;
        Ok(Self::connect(switch, target.pdfid))
    }

    /// Binds to a function through an already open switch.
    pub fn connect(switch: Switch, pdfid: u16) -> Self {
        Self { switch, pdfid }
    }

    pub fn pdfid(&self) -> u16 {
        self.pdfid
    }

    pub fn switch_mut(&mut self) -> &mut Switch {
        &mut self.switch
    }

    fn admin(
        &mut self,
        cmd: &AdminCmd,
        write_data: &[u8],
        read_len: usize,
    ) -> Result<(u32, Vec<u8>), NvmeError> {
        let mut sqe = [0u8; ADMIN_CMD_LEN];
        sqe.copy_from_slice(cmd.as_bytes());
        tracing::debug!(
            pdfid = self.pdfid,
            opcode = cmd.opcode,
            nsid = cmd.nsid,
            "admin command"
        );
        let resp = self.switch.admin_passthru(self.pdfid, &sqe, write_data, read_len)?;
        if resp.status != 0 {
            return Err(NvmeError::Command(CommandError::from_status(resp.status)));
        }
        if resp.data.len() < read_len {
            return Err(NvmeError::ShortData {
                got: resp.data.len(),
                need: read_len,
            });
        }
        Ok((resp.result, resp.data))
    }

    fn identify(&mut self, nsid: u32, cns: Cns, cdw10_upper: u16) -> Result<Vec<u8>, NvmeError> {
        let cmd = AdminCmd {
            nsid,
            data_len: IDENTIFY_DATA_SIZE as u32,
            cdw10: cns.0 as u32 | (cdw10_upper as u32) << 16,
            ..AdminCmd::new(AdminOpcode::IDENTIFY)
        };
        let (_, data) = self.admin(&cmd, &[], IDENTIFY_DATA_SIZE)?;
        Ok(data)
    }

    pub fn identify_controller(&mut self) -> Result<IdentifyController, NvmeError> {
        let data = self.identify(0, Cns::CONTROLLER, 0)?;
        Ok(IdentifyController::read_from_bytes(&data).expect("identify-sized"))
    }

    /// Identify a namespace. With `present`, namespaces that exist but are
    /// not attached to this controller are also visible.
    pub fn identify_namespace(
        &mut self,
        nsid: u32,
        present: bool,
    ) -> Result<IdentifyNamespace, NvmeError> {
        let cns = if present {
            Cns::NAMESPACE_PRESENT
        } else {
            Cns::NAMESPACE
        };
        let data = self.identify(nsid, cns, 0)?;
        Ok(IdentifyNamespace::read_from_bytes(&data).expect("identify-sized"))
    }

    /// Namespace IDs above `start_nsid`, attached or (with `all`) merely
    /// present on the subsystem.
    pub fn list_namespaces(&mut self, start_nsid: u32, all: bool) -> Result<Vec<u32>, NvmeError> {
        let cns = if all {
            Cns::NAMESPACE_PRESENT_LIST
        } else {
            Cns::NAMESPACE_LIST
        };
        let data = self.identify(start_nsid, cns, 0)?;
        Ok(data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .take_while(|&nsid| nsid != 0)
            .collect())
    }

    /// Controllers a namespace is attached to.
    pub fn attached_controllers(&mut self, nsid: u32) -> Result<Vec<u16>, NvmeError> {
        let data = self.identify(nsid, Cns::CONTROLLER_NAMESPACE_LIST, 0)?;
        let list = ControllerList::read_from_bytes(&data).expect("identify-sized");
        Ok(list.ids().to_vec())
    }

    pub fn primary_ctrl_caps(&mut self, cntlid: u16) -> Result<PrimaryCtrlCaps, NvmeError> {
        let data = self.identify(0, Cns::PRIMARY_CONTROLLER_CAPABILITIES, cntlid)?;
        Ok(PrimaryCtrlCaps::read_from_bytes(&data).expect("identify-sized"))
    }

    pub fn list_secondary(&mut self, start_ctrl_id: u16) -> Result<SecondaryCtrlList, NvmeError> {
        let data = self.identify(0, Cns::SECONDARY_CONTROLLER_LIST, start_ctrl_id)?;
        Ok(SecondaryCtrlList::read_from_bytes(&data).expect("identify-sized"))
    }

    /// Creates a namespace described by `id_ns` and returns its NSID.
    pub fn create_namespace(&mut self, id_ns: &IdentifyNamespace) -> Result<u32, NvmeError> {
        let cmd = AdminCmd {
            data_len: IDENTIFY_DATA_SIZE as u32,
            cdw10: 0,
            ..AdminCmd::new(AdminOpcode::NAMESPACE_MANAGEMENT)
        };
        let (result, _) = self.admin(&cmd, id_ns.as_bytes(), 0)?;
        Ok(result)
    }

    pub fn delete_namespace(&mut self, nsid: u32) -> Result<(), NvmeError> {
        let cmd = AdminCmd {
            nsid,
            cdw10: 1,
            ..AdminCmd::new(AdminOpcode::NAMESPACE_MANAGEMENT)
        };
        self.admin(&cmd, &[], 0)?;
        Ok(())
    }

    pub fn attach_namespace(&mut self, nsid: u32, ctrl_ids: &[u16]) -> Result<(), NvmeError> {
        self.ns_attachment(nsid, ctrl_ids, 0)
    }

    pub fn detach_namespace(&mut self, nsid: u32, ctrl_ids: &[u16]) -> Result<(), NvmeError> {
        self.ns_attachment(nsid, ctrl_ids, 1)
    }

    fn ns_attachment(&mut self, nsid: u32, ctrl_ids: &[u16], sel: u32) -> Result<(), NvmeError> {
        let list = ControllerList::from_ids(ctrl_ids);
        let cmd = AdminCmd {
            nsid,
            data_len: IDENTIFY_DATA_SIZE as u32,
            cdw10: sel,
            ..AdminCmd::new(AdminOpcode::NAMESPACE_ATTACH)
        };
        self.admin(&cmd, list.as_bytes(), 0)?;
        Ok(())
    }

    /// Formats a namespace, keeping its current LBA format. Crypto erase is
    /// requested when the controller advertises it, otherwise no secure
    /// erase is performed.
    pub fn format_namespace(&mut self, nsid: u32) -> Result<(), NvmeError> {
        let id_ctrl = self.identify_controller()?;
        let ses = if id_ctrl.sanicap.crypto_erase() {
            secure_erase::CRYPTO
        } else {
            secure_erase::NONE
        };
        let id_ns = self.identify_namespace(nsid, true)?;
        let cdw10 = FormatCdw10::new()
            .with_lba_format(id_ns.flbas.format())
            .with_secure_erase(ses);
        let cmd = AdminCmd {
            nsid,
            cdw10: cdw10.into(),
            ..AdminCmd::new(AdminOpcode::FORMAT_NVM)
        };
        self.admin(&cmd, &[], 0)?;
        Ok(())
    }

    /// Virtualization management. Returns the number of resources modified
    /// for the assign actions.
    pub fn virtual_mgmt(
        &mut self,
        ctrl_id: u16,
        resource: u8,
        action: u8,
        count: u16,
    ) -> Result<u32, NvmeError> {
        let cmd = AdminCmd {
            cdw10: virt_mgmt::cdw10(ctrl_id, resource, action),
            cdw11: count as u32,
            ..AdminCmd::new(AdminOpcode::VIRTUALIZATION_MANAGEMENT)
        };
        let (result, _) = self.admin(&cmd, &[], 0)?;
        Ok(result)
    }

    /// Get features. Returns the completion dword and the feature data
    /// buffer, which is empty for dword-only features and for select 3
    /// (supported capabilities, reported in the completion dword).
    pub fn get_feature(
        &mut self,
        nsid: u32,
        fid: Feature,
        sel: u8,
        cdw11: u32,
    ) -> Result<(u32, Vec<u8>), NvmeError> {
        let read_len = if sel == 3 { 0 } else { fid.buffer_len() };
        let cmd = AdminCmd {
            nsid,
            data_len: read_len as u32,
            cdw10: feature::get_cdw10(fid, sel),
            cdw11,
            ..AdminCmd::new(AdminOpcode::GET_FEATURES)
        };
        self.admin(&cmd, &[], read_len)
    }

    /// Set features. `data` must match the feature's buffer length.
    pub fn set_feature(
        &mut self,
        nsid: u32,
        fid: Feature,
        save: bool,
        cdw11: u32,
        cdw12: u32,
        data: &[u8],
    ) -> Result<u32, NvmeError> {
        let cmd = AdminCmd {
            nsid,
            data_len: data.len() as u32,
            cdw10: feature::set_cdw10(fid, save),
            cdw11,
            cdw12,
            ..AdminCmd::new(AdminOpcode::SET_FEATURES)
        };
        let (result, _) = self.admin(&cmd, data, 0)?;
        Ok(result)
    }

    pub fn get_log(
        &mut self,
        lid: LogPageId,
        lsp: u8,
        rae: bool,
        nsid: u32,
        len: usize,
    ) -> Result<Vec<u8>, NvmeError> {
        let (cdw10, cdw11) = get_log_cdw10_11(lid, lsp, rae, len);
        let cmd = AdminCmd {
            nsid,
            data_len: len as u32,
            cdw10,
            cdw11,
            ..AdminCmd::new(AdminOpcode::GET_LOG_PAGE)
        };
        let (_, data) = self.admin(&cmd, &[], len)?;
        Ok(data)
    }

    pub fn smart_log(&mut self) -> Result<SmartLog, NvmeError> {
        let data = self.get_log(LogPageId::SMART, 0, false, NSID_ALL, SMART_LOG_LEN)?;
        Ok(SmartLog::read_from_bytes(&data).expect("log-sized"))
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("switch", &self.switch)
            .field("pdfid", &self.pdfid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvme_spec::status;
    use pax_spec::mrpc::CommandId;
    use pax_spec::mrpc::ep_resource;
    use pax_spec::mrpc::ep_tunnel;
    use pax_switch::mock::MockBackend;
    use zerocopy::FromZeros;

    fn device(mock: &MockBackend) -> Device {
        Device::connect(
            Switch::with_backend(mock.clone(), "/dev/switchtec0"),
            0x3300,
        )
    }

    fn expect_tunnel_enabled(mock: &MockBackend) {
        mock.expect(CommandId::EP_TUNNEL_CFG, |input, output| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_tunnel::STATUS
            );
            output[..4].copy_from_slice(&1u32.to_le_bytes());
            Ok(())
        });
    }

    fn expect_exec_ok(mock: &MockBackend, result: u32) {
        mock.expect(CommandId::EP_RESOURCE_ACCESS, move |input, output| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_resource::NVME_EXEC
            );
            output[..4].copy_from_slice(&0u32.to_le_bytes());
            output[4..8].copy_from_slice(&result.to_le_bytes());
            Ok(())
        });
    }

    // Serves an identify-sized read: start, exec, then fetch pages out of
    // `data`.
    fn expect_read(mock: &MockBackend, expect_opcode: u8, data: Vec<u8>) {
        expect_tunnel_enabled(mock);
        mock.expect(CommandId::EP_RESOURCE_ACCESS, move |input, _| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_resource::NVME_START
            );
            // Submission entry follows the 8-byte header and 4-byte length.
            assert_eq!(input[12], expect_opcode);
            Ok(())
        });
        expect_exec_ok(mock, 0);
        let mut served = 0usize;
        let total = data.len();
        while served < total {
            let page = (total - served).min(ep_resource::FETCH_CHUNK_MAX);
            let data = data.clone();
            mock.expect(CommandId::EP_RESOURCE_ACCESS, move |input, output| {
                let offset = u32::from_le_bytes(input[8..12].try_into().unwrap()) as usize;
                let len = u32::from_le_bytes(input[12..16].try_into().unwrap()) as usize;
                output[..len].copy_from_slice(&data[offset..offset + len]);
                Ok(())
            });
            served += page;
        }
    }

    #[test]
    fn target_parsing() {
        let target: Target = "0x3300@/dev/switchtec0".parse().unwrap();
        assert_eq!(target.pdfid, 0x3300);
        assert_eq!(target.device, "/dev/switchtec0");
        let target: Target = "512@/dev/ttyUSB0".parse().unwrap();
        assert_eq!(target.pdfid, 512);
        assert!("".parse::<Target>().is_err());
        assert!("@/dev/switchtec0".parse::<Target>().is_err());
        assert!("/dev/switchtec0".parse::<Target>().is_err());
        assert!("0x13300@/dev/switchtec0".parse::<Target>().is_err());
    }

    #[test]
    fn identify_controller_decoded() {
        let mut id = IdentifyController::new_zeroed();
        id.sn[..6].copy_from_slice(b"SN0001");
        id.mn[..7].copy_from_slice(b"Fabrika");
        id.nn = 64;
        let mock = MockBackend::new();
        expect_read(&mock, AdminOpcode::IDENTIFY.0, id.as_bytes().to_vec());
        let mut dev = device(&mock);
        let id = dev.identify_controller().unwrap();
        assert_eq!(id.serial_number(), "SN0001");
        assert_eq!(id.model_number(), "Fabrika");
        assert_eq!(id.nn, 64);
    }

    #[test]
    fn namespace_list_stops_at_zero() {
        let mut data = vec![0u8; IDENTIFY_DATA_SIZE];
        for (i, nsid) in [1u32, 2, 5].iter().enumerate() {
            data[i * 4..i * 4 + 4].copy_from_slice(&nsid.to_le_bytes());
        }
        let mock = MockBackend::new();
        expect_read(&mock, AdminOpcode::IDENTIFY.0, data);
        let mut dev = device(&mock);
        assert_eq!(dev.list_namespaces(0, false).unwrap(), vec![1, 2, 5]);
    }

    #[test]
    fn create_namespace_returns_nsid() {
        let mock = MockBackend::new();
        expect_tunnel_enabled(&mock);
        mock.expect(CommandId::EP_RESOURCE_ACCESS, |input, _| {
            assert_eq!(
                u32::from_le_bytes(input[..4].try_into().unwrap()),
                ep_resource::NVME_START
            );
            Ok(())
        });
        // 4096-byte payload arrives in five data chunks.
        for _ in 0..5 {
            mock.expect(CommandId::EP_RESOURCE_ACCESS, |input, _| {
                assert_eq!(
                    u32::from_le_bytes(input[..4].try_into().unwrap()),
                    ep_resource::NVME_DATA
                );
                Ok(())
            });
        }
        expect_exec_ok(&mock, 7);
        let mut dev = device(&mock);
        let mut id_ns = IdentifyNamespace::new_zeroed();
        id_ns.nsze = 0x10000;
        id_ns.ncap = 0x10000;
        assert_eq!(dev.create_namespace(&id_ns).unwrap(), 7);
        mock.verify();
    }

    #[test]
    fn attach_failure_surfaces_nvme_status() {
        let mock = MockBackend::new();
        expect_tunnel_enabled(&mock);
        mock.expect(CommandId::EP_RESOURCE_ACCESS, |_, _| Ok(()));
        for _ in 0..5 {
            mock.expect(CommandId::EP_RESOURCE_ACCESS, |_, _| Ok(()));
        }
        mock.expect(CommandId::EP_RESOURCE_ACCESS, |_, output| {
            output[..4].copy_from_slice(&status::NAMESPACE_ALREADY_ATTACHED.to_le_bytes());
            Ok(())
        });
        let mut dev = device(&mock);
        let err = dev.attach_namespace(1, &[0]).unwrap_err();
        assert_eq!(err.status_code(), Some(status::NAMESPACE_ALREADY_ATTACHED));
    }

    #[test]
    fn format_secure_erase_follows_sanitize_caps() {
        use nvme_spec::identify::Flbas;
        use nvme_spec::identify::SanitizeCaps;

        for (crypto, ses) in [(true, secure_erase::CRYPTO), (false, secure_erase::NONE)] {
            let mock = MockBackend::new();
            let mut id_ctrl = IdentifyController::new_zeroed();
            id_ctrl.sanicap = SanitizeCaps::new().with_crypto_erase(crypto);
            expect_read(&mock, AdminOpcode::IDENTIFY.0, id_ctrl.as_bytes().to_vec());
            let mut id_ns = IdentifyNamespace::new_zeroed();
            id_ns.flbas = Flbas::new().with_format(3);
            expect_read(&mock, AdminOpcode::IDENTIFY.0, id_ns.as_bytes().to_vec());

            expect_tunnel_enabled(&mock);
            mock.expect(CommandId::EP_RESOURCE_ACCESS, move |input, _| {
                assert_eq!(input[12], AdminOpcode::FORMAT_NVM.0);
                // The LBA format is kept; bits 11:9 carry the erase setting.
                let cdw10 = u32::from_le_bytes(input[52..56].try_into().unwrap());
                assert_eq!(cdw10, 0x3 | u32::from(ses) << 9);
                Ok(())
            });
            expect_exec_ok(&mock, 0);
            let mut dev = device(&mock);
            dev.format_namespace(1).unwrap();
            mock.verify();
        }
    }

    #[test]
    fn smart_log_read() {
        let mut log = SmartLog::new_zeroed();
        log.composite_temp = zerocopy::little_endian::U16::new(310);
        log.percent_used = 3;
        let mock = MockBackend::new();
        expect_read(&mock, AdminOpcode::GET_LOG_PAGE.0, log.as_bytes().to_vec());
        let mut dev = device(&mock);
        let log = dev.smart_log().unwrap();
        assert_eq!(log.composite_temp_celsius(), 37);
        assert_eq!(log.percent_used, 3);
        mock.verify();
    }
}
