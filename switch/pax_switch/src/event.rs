// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Event readout: partition-scoped events via summary and per-event
//! control, and the fabric-wide GFMS event queue.

use crate::Switch;
use crate::SwitchError;
use pax_spec::event::EventCtrlInput;
use pax_spec::event::EventCtrlReply;
use pax_spec::event::EventId;
use pax_spec::event::EventSummary;
use pax_spec::event::EventType;
use pax_spec::event::EventWaitInput;
use pax_spec::event::GfmsEventCode;
use pax_spec::event::GfmsEventHdr;
use pax_spec::event::GfmsEventReplyHdr;
use pax_spec::event::INDEX_ALL;
use pax_spec::event::event_ctrl;
use pax_spec::event::gfms_event;
use pax_spec::mrpc;
use pax_spec::mrpc::CommandId;
use std::fmt;
use zerocopy::FromBytes;

/// One observed partition-scoped event occurrence.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    /// Owning partition, -1 for global events.
    pub partition: i32,
    /// PFF index for port events, -1 otherwise.
    pub port: i32,
    pub count: u32,
    pub data: [u32; 5],
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} events)", self.id.name(), self.count)
    }
}

/// Sort key grouping events by partition, then port, then id.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|e| (e.partition, e.port, e.id));
}

/// One record from the GFMS event queue.
#[derive(Debug, Clone)]
pub struct GfmsEvent {
    pub code: GfmsEventCode,
    /// PAX id of the switch that sourced the event.
    pub pax_id: u16,
    pub data: Vec<u32>,
}

impl GfmsEvent {
    fn word(&self, index: usize) -> u32 {
        self.data.get(index).copied().unwrap_or(0)
    }

    pub fn name(&self) -> &'static str {
        match self.code {
            GfmsEventCode::HOST_LINK_UP => "HOST_LINK_UP",
            GfmsEventCode::HOST_LINK_DOWN => "HOST_LINK_DOWN",
            GfmsEventCode::DEVICE_ADD => "DEVICE_ADD",
            GfmsEventCode::DEVICE_DELETE => "DEVICE_DELETE",
            GfmsEventCode::FABRIC_LINK_UP => "FABRIC_LINK_UP",
            GfmsEventCode::FABRIC_LINK_DOWN => "FABRIC_LINK_DOWN",
            GfmsEventCode::BIND => "BIND",
            GfmsEventCode::UNBIND => "UNBIND",
            GfmsEventCode::DATABASE_CHANGED => "DATABASE_CHANGED",
            GfmsEventCode::HVD_INST_ENABLE => "HVD_INSTANCE_ENABLE",
            GfmsEventCode::HVD_INST_DISABLE => "HVD_INSTANCE_DISABLE",
            GfmsEventCode::EP_PORT_ADD => "EP_PORT_ADD",
            GfmsEventCode::EP_PORT_REMOVE => "EP_PORT_REMOVE",
            GfmsEventCode::AER => "AER",
            _ => "UNKNOWN",
        }
    }

    /// Event-specific payload, decoded per code.
    pub fn detail(&self) -> Option<GfmsEventDetail> {
        Some(match self.code {
            GfmsEventCode::HOST_LINK_UP | GfmsEventCode::HOST_LINK_DOWN => {
                GfmsEventDetail::Host {
                    phys_port_id: self.word(0) as u8,
                }
            }
            GfmsEventCode::DEVICE_ADD | GfmsEventCode::DEVICE_DELETE => GfmsEventDetail::Device {
                phys_port_id: self.word(0) as u8,
            },
            GfmsEventCode::BIND | GfmsEventCode::UNBIND => GfmsEventDetail::Bind {
                host_sw_idx: self.word(0) as u8,
                phys_port_id: (self.word(0) >> 8) as u8,
                log_port_id: (self.word(0) >> 16) as u8,
                pdfid: self.word(1) as u16,
            },
            GfmsEventCode::HVD_INST_ENABLE | GfmsEventCode::HVD_INST_DISABLE => {
                GfmsEventDetail::Hvd {
                    hvd_inst_id: self.word(0) as u8,
                    phys_port_id: (self.word(0) >> 8) as u8,
                }
            }
            GfmsEventCode::EP_PORT_ADD | GfmsEventCode::EP_PORT_REMOVE => GfmsEventDetail::Port {
                phys_port_id: self.word(0) as u8,
            },
            GfmsEventCode::AER => GfmsEventDetail::Aer {
                phys_port_id: self.word(0) as u8,
                dpc_triggered: self.word(0) & (1 << 8) != 0,
                ce_ue: self.word(1),
            },
            _ => return None,
        })
    }
}

/// Decoded payload of a GFMS event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfmsEventDetail {
    Host { phys_port_id: u8 },
    Device { phys_port_id: u8 },
    Bind {
        host_sw_idx: u8,
        phys_port_id: u8,
        log_port_id: u8,
        pdfid: u16,
    },
    Hvd { hvd_inst_id: u8, phys_port_id: u8 },
    Port { phys_port_id: u8 },
    Aer {
        phys_port_id: u8,
        dpc_triggered: bool,
        ce_ue: u32,
    },
}

impl fmt::Display for GfmsEventDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfmsEventDetail::Host { phys_port_id }
            | GfmsEventDetail::Device { phys_port_id }
            | GfmsEventDetail::Port { phys_port_id } => {
                write!(f, "\tPhysical Port ID: {phys_port_id}")
            }
            GfmsEventDetail::Bind {
                host_sw_idx,
                phys_port_id,
                log_port_id,
                pdfid,
            } => write!(
                f,
                "\tHost Switch Index: {host_sw_idx}\n\tPhysical Port ID: {phys_port_id}\n\tLogical Port ID: {log_port_id}\n\tPDFID: {pdfid:#06x}"
            ),
            GfmsEventDetail::Hvd {
                hvd_inst_id,
                phys_port_id,
            } => write!(
                f,
                "\tHVD Instance: {hvd_inst_id}\n\tPhysical Port ID: {phys_port_id}"
            ),
            GfmsEventDetail::Aer {
                phys_port_id,
                dpc_triggered,
                ce_ue,
            } => write!(
                f,
                "\tPhysical Port ID: {phys_port_id}\n\tDPC Triggered: {dpc_triggered}\n\tCE/UE: {ce_ue:#010x}"
            ),
        }
    }
}

impl Switch {
    /// Snapshot of every pending event, grouped by scope.
    pub fn event_summary(&mut self) -> Result<EventSummary, SwitchError> {
        self.run(CommandId::EVENT_SUMMARY, &[0u8; 0])
    }

    /// Blocks until `event` fires within the indexed scope, or `timeout_ms`
    /// elapses (-1 waits forever). Returns the summary taken at wakeup.
    pub fn event_wait_for(
        &mut self,
        event: EventId,
        index: i32,
        timeout_ms: i64,
    ) -> Result<EventSummary, SwitchError> {
        if event.event_type() == EventType::Invalid {
            return Err(SwitchError::InvalidEvent(event.0));
        }
        let input = EventWaitInput {
            event_id: event.0,
            index: index as u32,
            timeout_ms: if timeout_ms < 0 {
                u32::MAX
            } else {
                timeout_ms as u32
            },
        };
        match self.run(CommandId::EVENT_WAIT, &input) {
            Err(SwitchError::CommandRet {
                ret: mrpc::ret::EVENT_WAIT_TIMEOUT,
                ..
            }) => Err(SwitchError::EventWaitTimeout),
            other => other,
        }
    }

    /// Reads out (and optionally clears) the events flagged in `summary`.
    ///
    /// `filter` restricts to one event id; `all` includes every partition
    /// rather than just the local one; a non-negative `index` restricts
    /// partition and port scopes to that index.
    pub fn get_events(
        &mut self,
        summary: &EventSummary,
        filter: Option<EventId>,
        all: bool,
        clear: bool,
        index: i32,
    ) -> Result<Vec<Event>, SwitchError> {
        let mut events = Vec::new();
        let wanted = |id: EventId| filter.is_none() || filter == Some(id);

        for bit in 0..EventId::COUNT {
            let id = EventId(bit);
            if !wanted(id) {
                continue;
            }
            match id.event_type() {
                EventType::Global => {
                    if summary.global & (1 << bit) != 0 {
                        events.push(self.read_event(id, INDEX_ALL, -1, -1, clear)?);
                    }
                }
                EventType::Partition => {
                    let part_bit = bit - 14;
                    for (part, flags) in summary.part.iter().enumerate() {
                        let part = part as i32;
                        if flags & (1 << part_bit) == 0 {
                            continue;
                        }
                        if !all && part != summary.local_part as i32 {
                            continue;
                        }
                        if index >= 0 && part != index {
                            continue;
                        }
                        events.push(self.read_event(id, part, part, -1, clear)?);
                    }
                }
                EventType::Port => {
                    let port_bit = bit - 18;
                    for (pff, flags) in summary.pff.iter().enumerate() {
                        let pff = pff as i32;
                        if flags & (1 << port_bit) == 0 {
                            continue;
                        }
                        if index >= 0 && pff != index {
                            continue;
                        }
                        events.push(self.read_event(
                            id,
                            pff,
                            summary.local_part as i32,
                            pff,
                            clear,
                        )?);
                    }
                }
                EventType::Invalid => {}
            }
        }
        Ok(events)
    }

    fn read_event(
        &mut self,
        id: EventId,
        index: i32,
        partition: i32,
        port: i32,
        clear: bool,
    ) -> Result<Event, SwitchError> {
        let input = EventCtrlInput {
            event_id: id.0,
            index: index as u32,
            flags: if clear { event_ctrl::CLEAR } else { 0 },
        };
        let reply: EventCtrlReply = self.run(CommandId::EVENT_CTRL, &input)?;
        Ok(Event {
            id,
            partition,
            port,
            count: reply.count,
            data: reply.data,
        })
    }

    /// Drains the GFMS event queue.
    pub fn get_gfms_events(&mut self) -> Result<Vec<GfmsEvent>, SwitchError> {
        let mut events = Vec::new();
        loop {
            let mut output = [0u8; mrpc::OUTPUT_DATA_MAX];
            self.run_command(
                CommandId::GFMS_EVENT,
                &gfms_event::GET.to_le_bytes(),
                &mut output,
            )?;
            let (hdr, mut rest) = GfmsEventReplyHdr::read_from_prefix(&output[..])
                .map_err(|_| SwitchError::ShortReply {
                    got: output.len(),
                    need: size_of::<GfmsEventReplyHdr>(),
                })?;
            for _ in 0..hdr.count {
                let (ehdr, tail) =
                    GfmsEventHdr::read_from_prefix(rest).map_err(|_| SwitchError::ShortReply {
                        got: output.len(),
                        need: size_of::<GfmsEventHdr>(),
                    })?;
                let data_len = usize::from(ehdr.data_len_dw) * 4;
                if tail.len() < data_len {
                    return Err(SwitchError::ShortReply {
                        got: tail.len(),
                        need: data_len,
                    });
                }
                let data = tail[..data_len]
                    .chunks_exact(4)
                    .map(|w| u32::from_le_bytes(w.try_into().unwrap()))
                    .collect();
                events.push(GfmsEvent {
                    code: GfmsEventCode(ehdr.code),
                    pax_id: ehdr.src_pax_id,
                    data,
                });
                rest = &tail[data_len..];
            }
            if hdr.remaining == 0 {
                break;
            }
        }
        Ok(events)
    }

    /// Clears the GFMS event queue.
    pub fn clear_gfms_events(&mut self) -> Result<(), SwitchError> {
        self.run_command(CommandId::GFMS_EVENT, &gfms_event::CLEAR.to_le_bytes(), &mut [])
    }
}
