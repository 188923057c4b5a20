// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fabric management operations: echo, link status, manufacturing info,
//! HVD bind/unbind, bandwidth counters, and the GFMS endpoint-port dump.

use crate::Switch;
use crate::SwitchError;
use pax_spec::fabric::BindInput;
use pax_spec::fabric::DumpEpPortFunction;
use pax_spec::fabric::DumpEpPortHdr;
use pax_spec::fabric::LinkStatInput;
use pax_spec::fabric::LinkStatRecord;
use pax_spec::fabric::LinkStatReplyHdr;
use pax_spec::fabric::PortToPffInput;
use pax_spec::fabric::UnbindInput;
use pax_spec::fabric::gfms_dump;
use pax_spec::mrpc;
use pax_spec::mrpc::CommandId;
use pax_spec::pcie;
use pax_spec::pmon::BW_GET_MAX_PORTS;
use pax_spec::pmon::BandwidthType;
use pax_spec::pmon::BwGetInput;
use pax_spec::pmon::BwGetReplyHdr;
use pax_spec::pmon::BwSetInput;
use pax_spec::pmon::PortBandwidth;
use pax_spec::pmon::pmon;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// Decoded per-port link status.
#[derive(Debug, Clone)]
pub struct LinkStat {
    pub phys_port_id: u8,
    pub link_up: bool,
    pub link_gen: u8,
    pub link_state: u16,
    pub cfg_link_width: u8,
    pub neg_link_width: u8,
    pub cur_link_rate_gbps: f64,
}

impl From<LinkStatRecord> for LinkStat {
    fn from(rec: LinkStatRecord) -> Self {
        LinkStat {
            phys_port_id: rec.phys_port_id,
            link_up: rec.link_up(),
            link_gen: rec.link_gen,
            link_state: rec.link_state,
            cfg_link_width: rec.cfg_link_width,
            neg_link_width: rec.neg_link_width,
            cur_link_rate_gbps: pcie::link_rate_gbps(rec.link_gen, rec.neg_link_width),
        }
    }
}

/// A decoded GFMS endpoint-port dump.
#[derive(Debug, Clone)]
pub struct DumpEpPortDevice {
    pub hdr: DumpEpPortHdr,
    pub functions: Vec<DumpEpPortFunction>,
}

impl DumpEpPortDevice {
    /// Parses a dump buffer: fixed header, then `function_count` records.
    pub fn decode(buf: &[u8]) -> Result<Self, SwitchError> {
        let (hdr, mut rest) =
            DumpEpPortHdr::read_from_prefix(buf).map_err(|_| SwitchError::ShortReply {
                got: buf.len(),
                need: size_of::<DumpEpPortHdr>(),
            })?;
        let mut functions = Vec::with_capacity(hdr.function_count.into());
        for _ in 0..hdr.function_count {
            let (func, tail) =
                DumpEpPortFunction::read_from_prefix(rest).map_err(|_| SwitchError::ShortReply {
                    got: buf.len(),
                    need: size_of::<DumpEpPortHdr>()
                        + usize::from(hdr.function_count) * size_of::<DumpEpPortFunction>(),
                })?;
            functions.push(func);
            rest = tail;
        }
        Ok(DumpEpPortDevice { hdr, functions })
    }
}

impl Switch {
    /// Sends a payload dword and checks that the firmware echoes its
    /// bit-inverse.
    pub fn echo(&mut self, payload: u32) -> Result<(), SwitchError> {
        let reply: u32 = self.run(CommandId::ECHO, &payload)?;
        if reply != !payload {
            return Err(SwitchError::EchoMismatch {
                sent: payload,
                received: reply,
            });
        }
        Ok(())
    }

    /// Chip serial number.
    pub fn serial_number(&mut self) -> Result<u32, SwitchError> {
        self.run(CommandId::GET_SERIAL, &[0u8; 0])
    }

    /// Running firmware version, formatted for display.
    pub fn firmware_version(&mut self) -> Result<String, SwitchError> {
        let ver: u32 = self.run(CommandId::GET_FW_VERSION, &[0u8; 0])?;
        Ok(format!(
            "{:x}.{:02x} B{:03x}",
            ver >> 24,
            (ver >> 16) & 0xff,
            ver & 0xffff
        ))
    }

    /// Link status of every physical port.
    pub fn link_stat(&mut self) -> Result<Vec<LinkStat>, SwitchError> {
        let input = LinkStatInput {
            phys_port_start: 0,
            count: 0xff,
            rsvd: 0,
        };
        let mut output = [0u8; mrpc::OUTPUT_DATA_MAX];
        self.run_command(CommandId::LINK_STAT, input.as_bytes(), &mut output)?;

        let (hdr, mut rest) = LinkStatReplyHdr::read_from_prefix(&output[..]).unwrap();
        let mut stats = Vec::with_capacity(hdr.count.into());
        for _ in 0..hdr.count {
            let (rec, tail) =
                LinkStatRecord::read_from_prefix(rest).map_err(|_| SwitchError::ShortReply {
                    got: output.len(),
                    need: usize::from(hdr.count) * size_of::<LinkStatRecord>(),
                })?;
            stats.push(rec.into());
            rest = tail;
        }
        Ok(stats)
    }

    /// Installs an HVD binding for `pdfid` at the given host slot.
    pub fn bind(
        &mut self,
        host_sw_idx: u8,
        host_phys_port_id: u8,
        host_log_port_id: u8,
        pdfid: u16,
    ) -> Result<(), SwitchError> {
        let input = BindInput {
            host_sw_idx,
            host_phys_port_id,
            host_log_port_id,
            rsvd: 0,
            pdfid,
            rsvd2: 0,
        };
        match self.run::<[u8; 0]>(CommandId::GFMS_BIND, &input) {
            Err(SwitchError::CommandRet {
                ret: mrpc::ret::ALREADY_BOUND,
                ..
            }) => Err(SwitchError::AlreadyBound { pdfid }),
            other => other.map(|_| ()),
        }
    }

    /// Removes the HVD binding at the given host slot.
    pub fn unbind(
        &mut self,
        host_sw_idx: u8,
        host_phys_port_id: u8,
        host_log_port_id: u8,
    ) -> Result<(), SwitchError> {
        let input = UnbindInput {
            host_sw_idx,
            host_phys_port_id,
            host_log_port_id,
            rsvd: 0,
        };
        self.run::<[u8; 0]>(CommandId::GFMS_UNBIND, &input)
            .map(|_| ())
    }

    /// Resolves (partition, logical port) to a PFF index.
    pub fn port_to_pff(&mut self, partition: i32, port: i32) -> Result<u32, SwitchError> {
        let input = PortToPffInput {
            partition_id: partition as u32,
            logical_port_id: port as u32,
        };
        self.run(CommandId::PORT_TO_PFF, &input)
    }

    /// Arms every port's bandwidth counters with the requested type and
    /// resets them. The firmware takes about a second to finish the reset.
    pub fn bandwidth_counter_set_all(
        &mut self,
        bw_type: BandwidthType,
    ) -> Result<(), SwitchError> {
        let input = BwSetInput {
            subcmd: pmon::BW_SET_ALL,
            bw_type: bw_type.0,
            rsvd: 0,
        };
        self.run::<[u8; 0]>(CommandId::PMON, &input).map(|_| ())
    }

    /// Snapshots the bandwidth counters of every port.
    pub fn bandwidth_counter_all(
        &mut self,
        clear: bool,
    ) -> Result<Vec<PortBandwidth>, SwitchError> {
        let mut counters = Vec::new();
        loop {
            let input = BwGetInput {
                subcmd: pmon::BW_GET,
                clear: clear.into(),
                start_port: counters.len() as u8,
                count: BW_GET_MAX_PORTS as u8,
            };
            let mut output = [0u8; mrpc::OUTPUT_DATA_MAX];
            self.run_command(CommandId::PMON, input.as_bytes(), &mut output)?;

            let (hdr, mut rest) = BwGetReplyHdr::read_from_prefix(&output[..]).unwrap();
            // Records start at the next 8-byte boundary after the header.
            rest = &rest[4..];
            for _ in 0..hdr.count {
                let (rec, tail) =
                    PortBandwidth::read_from_prefix(rest).map_err(|_| SwitchError::ShortReply {
                        got: output.len(),
                        need: usize::from(hdr.count) * size_of::<PortBandwidth>(),
                    })?;
                counters.push(rec);
                rest = tail;
            }
            if usize::from(hdr.count) < BW_GET_MAX_PORTS {
                break;
            }
        }
        Ok(counters)
    }

    /// Starts a GFMS dump for one endpoint port, returning its length in
    /// dwords.
    pub fn gfms_ep_port_start(&mut self, phys_port_id: u8) -> Result<u32, SwitchError> {
        let input = gfms_dump::StartInput {
            subcmd: gfms_dump::EP_PORT_START,
            phys_port_id,
            rsvd: 0,
        };
        let reply: gfms_dump::StartReply = self.run(CommandId::GFMS_DUMP, &input)?;
        Ok(reply.len_dw)
    }

    /// Pulls a started dump, paging through the output window.
    pub fn gfms_ep_port_get(
        &mut self,
        phys_port_id: u8,
        len_dw: u32,
    ) -> Result<Vec<u8>, SwitchError> {
        const CHUNK_DW: u32 = (mrpc::OUTPUT_DATA_MAX / 4) as u32;
        let mut buf = Vec::with_capacity(len_dw as usize * 4);
        let mut offset_dw = 0;
        while offset_dw < len_dw {
            let count_dw = (len_dw - offset_dw).min(CHUNK_DW);
            let input = gfms_dump::GetInput {
                subcmd: gfms_dump::EP_PORT_GET,
                phys_port_id,
                offset_dw: offset_dw as u16,
                count_dw: count_dw as u16,
                rsvd: 0,
            };
            let mut output = [0u8; mrpc::OUTPUT_DATA_MAX];
            self.run_command(
                CommandId::GFMS_DUMP,
                input.as_bytes(),
                &mut output[..count_dw as usize * 4],
            )?;
            buf.extend_from_slice(&output[..count_dw as usize * 4]);
            offset_dw += count_dw;
        }
        Ok(buf)
    }

    /// Releases the firmware-side dump snapshot.
    pub fn gfms_ep_port_finish(&mut self) -> Result<(), SwitchError> {
        let input = gfms_dump::FinishInput {
            subcmd: gfms_dump::EP_PORT_FINISH,
            rsvd: [0; 3],
        };
        self.run::<[u8; 0]>(CommandId::GFMS_DUMP, &input).map(|_| ())
    }

    /// Dumps one endpoint port and hands the decoded record to `f`. The
    /// finish phase runs on every exit path so the firmware snapshot is
    /// never leaked.
    pub fn gfms_ep_port_enumerate<E>(
        &mut self,
        phys_port_id: u8,
        f: impl FnOnce(&DumpEpPortDevice) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<SwitchError>,
    {
        let result = (|| {
            let len_dw = self.gfms_ep_port_start(phys_port_id)?;
            let buf = self.gfms_ep_port_get(phys_port_id, len_dw)?;
            DumpEpPortDevice::decode(&buf)
        })();

        let finish = self.gfms_ep_port_finish();
        let device = result.map_err(E::from)?;
        finish?;
        f(&device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use pax_spec::fabric::EpPortType;

    fn dump_bytes(functions: &[DumpEpPortFunction]) -> Vec<u8> {
        let hdr = DumpEpPortHdr {
            typ: EpPortType::DEVICE.0,
            phys_port_id: 8,
            function_count: functions.len() as u16,
            size_dw: 0,
            rsvd: 0,
        };
        let mut buf = hdr.as_bytes().to_vec();
        for f in functions {
            buf.extend_from_slice(f.as_bytes());
        }
        buf
    }

    fn function(func_id: u16, pdfid: u16, pf: bool, bound: bool) -> DumpEpPortFunction {
        DumpEpPortFunction {
            func_id,
            pdfid,
            sriov_cap_pf: pf.into(),
            bound: bound.into(),
            bound_pax_id: 0,
            bound_hvd_phys_pid: 0,
            bound_hvd_log_pid: 0,
            rsvd: [0; 3],
        }
    }

    #[test]
    fn echo_checks_bit_inverse() {
        let mock = MockBackend::new();
        mock.expect(CommandId::ECHO, |input, output| {
            let payload = u32::from_le_bytes(input[..4].try_into().unwrap());
            output[..4].copy_from_slice(&(!payload).to_le_bytes());
            Ok(())
        });
        let mut switch = Switch::with_backend(mock, "/dev/switchtec0");
        switch.echo(0xdead_beef).unwrap();
    }

    #[test]
    fn echo_mismatch_detected() {
        let mock = MockBackend::new();
        mock.expect(CommandId::ECHO, |_, output| {
            output[..4].copy_from_slice(&0u32.to_le_bytes());
            Ok(())
        });
        let mut switch = Switch::with_backend(mock, "/dev/switchtec0");
        assert!(matches!(
            switch.echo(1).unwrap_err(),
            SwitchError::EchoMismatch { sent: 1, .. }
        ));
    }

    #[test]
    fn bind_maps_already_bound() {
        let mock = MockBackend::new();
        mock.expect_ret(CommandId::GFMS_BIND, mrpc::ret::ALREADY_BOUND);
        let mut switch = Switch::with_backend(mock, "/dev/switchtec0");
        let err = switch.bind(0, 4, 1, 0x1b00).unwrap_err();
        assert!(matches!(err, SwitchError::AlreadyBound { pdfid: 0x1b00 }));
        assert!(err.is_already_bound());
    }

    #[test]
    fn enumerate_finishes_on_success() {
        let mock = MockBackend::new();
        let funcs = [function(0, 0x1800, true, false), function(1, 0x1801, false, false)];
        let buf = dump_bytes(&funcs);
        let len_dw = (buf.len() as u32).div_ceil(4);
        mock.expect(CommandId::GFMS_DUMP, move |input, output| {
            assert_eq!(input[0], gfms_dump::EP_PORT_START);
            output[..4].copy_from_slice(&len_dw.to_le_bytes());
            Ok(())
        });
        mock.expect(CommandId::GFMS_DUMP, move |input, output| {
            assert_eq!(input[0], gfms_dump::EP_PORT_GET);
            output[..buf.len()].copy_from_slice(&buf);
            Ok(())
        });
        mock.expect(CommandId::GFMS_DUMP, |input, _| {
            assert_eq!(input[0], gfms_dump::EP_PORT_FINISH);
            Ok(())
        });

        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        switch
            .gfms_ep_port_enumerate(8, |dev: &DumpEpPortDevice| -> Result<(), SwitchError> {
                assert_eq!(dev.hdr.function_count, 2);
                assert!(dev.functions[0].is_pf());
                assert!(!dev.functions[1].is_pf());
                Ok(())
            })
            .unwrap();
        mock.verify();
    }

    #[test]
    fn enumerate_finishes_on_dump_failure() {
        let mock = MockBackend::new();
        mock.expect_ret(CommandId::GFMS_DUMP, 0x5);
        mock.expect(CommandId::GFMS_DUMP, |input, _| {
            assert_eq!(input[0], gfms_dump::EP_PORT_FINISH);
            Ok(())
        });
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        let err = switch
            .gfms_ep_port_enumerate(8, |_| -> Result<(), SwitchError> { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, SwitchError::CommandRet { ret: 0x5, .. }));
        mock.verify();
    }

    #[test]
    fn link_stat_decodes_records() {
        let mock = MockBackend::new();
        mock.expect(CommandId::LINK_STAT, |_, output| {
            output[0] = 1; // count
            let rec = LinkStatRecord {
                phys_port_id: 24,
                flags: LinkStatRecord::FLAG_LINK_UP,
                link_gen: 4,
                rsvd: 0,
                link_state: 0x11,
                cfg_link_width: 16,
                neg_link_width: 8,
            };
            output[4..12].copy_from_slice(rec.as_bytes());
            Ok(())
        });
        let mut switch = Switch::with_backend(mock, "/dev/switchtec0");
        let stats = switch.link_stat().unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].link_up);
        assert_eq!(stats[0].cur_link_rate_gbps, 1.969 * 8.0);
    }
}
