// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Switch-side subcommands: identification, link status, binding, GAS and
//! CSR access, events, and bandwidth monitoring.

use crate::format;
use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use pax_spec::event::EventId;
use pax_spec::event::EventType;
use pax_spec::event::INDEX_ALL;
use pax_spec::fabric::PFF_VEP;
use pax_spec::pmon::BandwidthType;
use pax_switch::DumpEpPortDevice;
use pax_switch::Switch;
use pax_switch::event::Event;
use pax_switch::event::sort_events;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Opens the switch, runs `f`, and closes on every exit path.
pub fn with_switch<T>(
    device: &Path,
    f: impl FnOnce(&mut Switch) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    tracing::debug!(device = %device.display(), "opening switch");
    let mut switch = Switch::open(device)?;
    f(&mut switch)
}

#[derive(Args)]
pub struct DeviceArg {
    /// The switch device node.
    #[arg(env = "SWITCHTEC_DEV")]
    pub device: PathBuf,
}

#[derive(Args)]
pub struct EchoCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// The echo payload. The bit-inverse will be returned by the device.
    #[arg(long, default_value = "0", value_parser = format::parse_u32)]
    payload: u32,
}

impl EchoCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            switch.echo(self.payload)?;
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct IdentifyCmd {
    #[command(flatten)]
    device: DeviceArg,
}

impl IdentifyCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            println!("PAX ID: {}", switch.id()?);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct LinkStatCmd {
    #[command(flatten)]
    device: DeviceArg,
}

impl LinkStatCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            let stats = switch.link_stat()?;
            println!("Link Stats");
            for s in stats {
                println!("Physical Port ID: {}", s.phys_port_id);
                println!("  {:<32} : {}", "Link Up", s.link_up);
                println!("  {:<32} : Gen{}", "Link Gen", s.link_gen);
                println!("  {:<32} : {:04x}", "Link State", s.link_state);
                println!("  {:<32} : x{}", "Configured Link Width", s.cfg_link_width);
                println!("  {:<32} : x{}", "Negotiated Link Width", s.neg_link_width);
                println!(
                    "  {:<32} : {:4.2} GBps",
                    "Current Link Rate", s.cur_link_rate_gbps
                );
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct BindCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Software index of the fabric device.
    sw_index: u8,
    /// Physical port ID within the domain.
    phy_port_id: u8,
    /// Logical port ID within the domain.
    log_port_id: u8,
    /// PDFID of the end-point.
    #[arg(value_parser = format::parse_u16)]
    pdfid: u16,
}

impl BindCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            switch.bind(self.sw_index, self.phy_port_id, self.log_port_id, self.pdfid)?;
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct UnbindCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Software index of the fabric device.
    sw_index: u8,
    /// Physical port ID within the domain.
    phy_port_id: u8,
    /// Logical port ID within the domain.
    log_port_id: u8,
}

impl UnbindCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            switch.unbind(self.sw_index, self.phy_port_id, self.log_port_id)?;
            Ok(())
        })
    }
}

#[derive(Subcommand)]
pub enum DumpCmd {
    /// Dump information for a specific end-point port.
    EpPort(DumpEpPortCmd),
}

impl DumpCmd {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            DumpCmd::EpPort(cmd) => cmd.run(),
        }
    }
}

#[derive(Args)]
pub struct DumpEpPortCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// The end-point port ID.
    pid: u8,
}

impl DumpEpPortCmd {
    pub fn run(self) -> anyhow::Result<()> {
        println!("{} Dump EP Port {}", self.device.device.display(), self.pid);
        with_switch(&self.device.device, |switch| {
            println!(
                "PAX {} Device Opened. Port {} Start...",
                switch.id()?,
                self.pid
            );
            let len_dw = switch.gfms_ep_port_start(self.pid)?;
            println!("Dump EP Port Started. Port Get {len_dw} dwords...");
            let buf = switch.gfms_ep_port_get(self.pid, len_dw)?;
            println!("Dump EP Port Buf {} bytes", buf.len());
            format::hexdump(&buf);
            println!("Port Finish...");
            switch.gfms_ep_port_finish()?;
            println!("Dump EP Port Finished");
            let device = DumpEpPortDevice::decode(&buf)?;
            println!("{device:?}");
            Ok(())
        })
    }
}

#[derive(Subcommand)]
pub enum GasCmd {
    /// Read bytes from the Global Address Space.
    Read(GasReadCmd),
    /// Write bytes to the Global Address Space.
    Write(GasWriteCmd),
    /// Identify the device's Global Address Space.
    Stat(GasStatCmd),
}

impl GasCmd {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            GasCmd::Read(cmd) => cmd.run(),
            GasCmd::Write(cmd) => cmd.run(),
            GasCmd::Stat(cmd) => cmd.run(),
        }
    }
}

#[derive(Args)]
pub struct GasReadCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Address to read.
    #[arg(value_parser = format::parse_u32)]
    addr: u32,
    /// Number of bytes to read.
    #[arg(default_value = "4")]
    bytes: usize,
}

impl GasReadCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            let value = switch.gas_read(self.addr.into(), self.bytes)?;
            let width = self.bytes * 2;
            println!("{:06x} = {value:#0width$x}", self.addr);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct GasWriteCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Address to write.
    #[arg(value_parser = format::parse_u32)]
    addr: u32,
    /// Value to write.
    #[arg(value_parser = format::parse_u64)]
    value: u64,
    /// Number of bytes to write.
    #[arg(default_value = "4")]
    bytes: usize,
}

impl GasWriteCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            switch.gas_write(self.addr.into(), self.value, self.bytes)?;
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct GasStatCmd {
    #[command(flatten)]
    device: DeviceArg,
}

impl GasStatCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            println!("Device Path: {}", switch.system_path("")?.display());
            println!("Resource0 Size: {}", switch.resource_size("device/resource0")?);
            Ok(())
        })
    }
}

#[derive(Subcommand)]
pub enum CsrCmd {
    /// Read bytes from a device's Configuration Status Registers.
    Read(CsrReadCmd),
    /// Write bytes to a device's Configuration Status Registers.
    Write(CsrWriteCmd),
}

impl CsrCmd {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            CsrCmd::Read(cmd) => cmd.run(),
            CsrCmd::Write(cmd) => cmd.run(),
        }
    }
}

#[derive(Args)]
pub struct CsrReadCmd {
    /// The switch device node.
    #[arg(long, env = "SWITCHTEC_DEV")]
    device: PathBuf,
    /// PDFID of the end-point.
    #[arg(long, value_parser = format::parse_u16)]
    pdfid: u16,
    /// Address to read.
    #[arg(long, value_parser = format::parse_u16)]
    addr: u16,
    /// Number of bytes to read.
    #[arg(long, default_value = "4")]
    bytes: u8,
}

impl CsrReadCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device, |switch| {
            let value = switch.csr_read(self.pdfid, self.addr, self.bytes)?;
            let width = usize::from(self.bytes) * 2;
            println!("{:06x} - {value:#0width$x}", self.addr);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct CsrWriteCmd {
    /// The switch device node.
    #[arg(long, env = "SWITCHTEC_DEV")]
    device: PathBuf,
    /// PDFID of the end-point.
    #[arg(long, value_parser = format::parse_u16)]
    pdfid: u16,
    /// Address to write.
    #[arg(long, value_parser = format::parse_u16)]
    addr: u16,
    /// Value to write.
    #[arg(long, value_parser = format::parse_u32)]
    data: u32,
    /// Number of bytes to write.
    #[arg(long, default_value = "4")]
    bytes: u8,
}

impl CsrWriteCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device, |switch| {
            switch.csr_write(self.pdfid, self.addr, self.data, self.bytes)?;
            Ok(())
        })
    }
}

#[derive(Subcommand)]
pub enum MfgCmd {
    /// Retrieve the device serial number.
    Serial(MfgSerialCmd),
    /// Retrieve the active firmware.
    Firmware(MfgFirmwareCmd),
}

impl MfgCmd {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            MfgCmd::Serial(cmd) => cmd.run(),
            MfgCmd::Firmware(cmd) => cmd.run(),
        }
    }
}

#[derive(Args)]
pub struct MfgSerialCmd {
    #[command(flatten)]
    device: DeviceArg,
}

impl MfgSerialCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            println!("Device Serial Number: {:#08x}", switch.serial_number()?);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct MfgFirmwareCmd {
    #[command(flatten)]
    device: DeviceArg,
}

impl MfgFirmwareCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            println!("Device Firmware: {}", switch.firmware_version()?);
            Ok(())
        })
    }
}

#[derive(Subcommand)]
pub enum EventCmd {
    /// List events.
    List(EventListCmd),
    /// Wait on events.
    Wait(EventWaitCmd),
    /// Display and control GFMS event information.
    Gfms(EventGfmsCmd),
}

impl EventCmd {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            EventCmd::List(cmd) => cmd.run(),
            EventCmd::Wait(cmd) => cmd.run(),
            EventCmd::Gfms(cmd) => cmd.run(),
        }
    }
}

#[derive(Args)]
pub struct EventListCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Show events in all partitions.
    #[arg(short, long)]
    all: bool,
    /// Clear the listed events.
    #[arg(short, long)]
    reset: bool,
    /// Restrict to one event ID.
    #[arg(short, long)]
    event: Option<u32>,
}

impl EventListCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            println!("Retrieving Event Summary...");
            let summary = switch.event_summary()?;

            println!("Retrieving Events...");
            let mut events =
                switch.get_events(&summary, self.event.map(EventId), self.all, self.reset, -1)?;

            println!("Sort Events...");
            sort_events(&mut events);

            println!("Print Events...");
            print_events(&events);
            Ok(())
        })
    }
}

#[derive(Args)]
#[command(allow_negative_numbers = true)]
pub struct EventWaitCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Event to wait on.
    event: u32,
    /// Partition ID for the event.
    #[arg(short = 'p', long, default_value = "-1")]
    partition: i32,
    /// Logical port ID for the event.
    #[arg(short = 'P', long, default_value = "-1")]
    port: i32,
    /// Timeout in milliseconds (-1 = forever).
    #[arg(short, long, default_value = "-1")]
    timeout: i64,
}

impl EventWaitCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            let event = EventId(self.event);
            let index = match event.event_type() {
                EventType::Invalid => {
                    anyhow::bail!("event {} not recognized as a valid event", self.event)
                }
                EventType::Global => 0,
                EventType::Partition => {
                    if self.port >= 0 {
                        anyhow::bail!("port cannot be specified for a partition event");
                    }
                    if self.partition < 0 {
                        INDEX_ALL
                    } else {
                        self.partition
                    }
                }
                EventType::Port => {
                    if self.partition < 0 && self.port < 0 {
                        INDEX_ALL
                    } else if self.partition < 0 || self.port < 0 {
                        anyhow::bail!("port and partition are both required for a port event");
                    } else {
                        switch.port_to_pff(self.partition, self.port)? as i32
                    }
                }
            };

            println!("Wait For Event...");
            let summary = switch.event_wait_for(event, index, self.timeout)?;

            println!("Retrieving Events...");
            let mut events = switch.get_events(&summary, Some(event), false, false, index)?;

            println!("Sort Events...");
            sort_events(&mut events);

            println!("Print Events...");
            print_events(&events);
            Ok(())
        })
    }
}

fn print_events(events: &[Event]) {
    let (mut last_partition, mut last_port) = (-1, -1);
    for event in events {
        if event.partition != last_partition {
            if event.partition == -1 {
                println!("Global Events:");
            } else {
                println!("Partition {} Events:", event.partition);
            }
        }
        if event.port != last_port && event.port != -1 {
            if event.port == PFF_VEP {
                println!("Port VEP:");
            } else {
                println!("Port {}:", event.port);
            }
        }
        last_partition = event.partition;
        last_port = event.port;

        println!("\t{event}");
    }
}

#[derive(Args)]
pub struct EventGfmsCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Clear all GFMS events.
    #[arg(short, long)]
    clear: bool,
}

impl EventGfmsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            if self.clear {
                switch.clear_gfms_events()?;
                return Ok(());
            }

            for event in switch.get_gfms_events()? {
                if event.name() == "UNKNOWN" {
                    println!("WARNING: Unknown Event Code {}", event.code.0);
                    continue;
                }
                println!("{:<20} (PAX ID {}):", event.name(), event.pax_id);
                if let Some(detail) = event.detail() {
                    println!("{detail}");
                }
            }
            Ok(())
        })
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub enum BwType {
    Raw,
    Payload,
}

#[derive(Args)]
pub struct BandwidthCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// Measurement time in seconds.
    #[arg(short, long, default_value = "5")]
    time: u64,
    /// Print posted, non-posted and completion results.
    #[arg(short, long)]
    details: bool,
    /// Bandwidth type.
    #[arg(long = "type", value_enum, default_value = "raw")]
    bw_type: BwType,
}

impl BandwidthCmd {
    pub fn run(self) -> anyhow::Result<()> {
        let bw_type = match self.bw_type {
            BwType::Raw => BandwidthType::RAW,
            BwType::Payload => BandwidthType::PAYLOAD,
        };
        with_switch(&self.device.device, |switch| {
            switch.bandwidth_counter_set_all(bw_type)?;

            // The counter reset takes about a second to settle.
            thread::sleep(Duration::from_secs(1));

            let start = switch.bandwidth_counter_all(false)?;
            thread::sleep(Duration::from_secs(self.time));
            let end = switch.bandwidth_counter_all(false)?;

            let mut last_partition = None;
            for (mut sample, earlier) in end.into_iter().zip(&start) {
                if last_partition != Some(sample.port.partition) {
                    println!("Partition {}:", sample.port.partition);
                }
                last_partition = Some(sample.port.partition);

                let dir = if sample.port.upstream != 0 { "USP" } else { "DSP" };
                println!("\tLogical Port ID {} ({dir}):", sample.port.log_port_id);

                sample.subtract(earlier);

                if !self.details {
                    format::print_rate("Out:", sample.time_us, sample.egress.total());
                    format::print_rate("In:", sample.time_us, sample.ingress.total());
                } else {
                    println!("\tOut:");
                    format::print_rate("  Posted:", sample.time_us, sample.egress.posted);
                    format::print_rate("  Non-Posted:", sample.time_us, sample.egress.nonposted);
                    format::print_rate("  Completion:", sample.time_us, sample.egress.completion);
                    println!("\tIn:");
                    format::print_rate("  Posted:", sample.time_us, sample.ingress.posted);
                    format::print_rate("  Non-Posted:", sample.time_us, sample.ingress.nonposted);
                    format::print_rate("  Completion:", sample.time_us, sample.ingress.completion);
                }
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct VfResetCmd {
    #[command(flatten)]
    device: DeviceArg,
    /// PDFID of the end-point.
    #[arg(value_parser = format::parse_u16)]
    pdfid: u16,
}

impl VfResetCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_switch(&self.device.device, |switch| {
            switch.vf_reset(self.pdfid)?;
            Ok(())
        })
    }
}
