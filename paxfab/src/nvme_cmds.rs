// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVMe admin subcommands, routed to an endpoint drive over the switch
//! tunnel. Endpoint targets use `<pdfid>@<device>` notation.

use crate::format;
use clap::Args;
use clap::ValueEnum;
use nvme_admin::Device;
use nvme_spec::NSID_ALL;
use nvme_spec::feature::Feature;
use nvme_spec::feature::MiMetadataBuilder;
use nvme_spec::identify::Flbas;
use nvme_spec::identify::IdentifyNamespace;
use nvme_spec::identify::Nmic;
use nvme_spec::virt_mgmt;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use zerocopy::FromZeros;

/// Opens the endpoint, runs `f`, and closes on every exit path.
fn with_device<T>(
    target: &str,
    f: impl FnOnce(&mut Device) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    tracing::debug!(device = target, "opening endpoint");
    let mut dev = Device::open(target)?;
    f(&mut dev)
}

#[derive(Args)]
pub struct TargetArg {
    /// The endpoint drive, as `<pdfid>@<switch-device>`.
    #[arg(env = "SWITCHTEC_DEV")]
    pub device: String,
}

#[derive(Args)]
pub struct IdCtrlCmd {
    #[command(flatten)]
    device: TargetArg,
}

impl IdCtrlCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let ctrl = dev.identify_controller()?;
            println!("Identify Controller:");
            println!("  {:<8}: {:<32} : {:#06x}", "VID", "Vendor ID", ctrl.vid);
            println!("  {:<8}: {:<32} : {:#06x}", "SSVID", "Subsystem Vendor ID", ctrl.ssvid);
            println!("  {:<8}: {:<32} : {}", "SN", "Serial Number", ctrl.serial_number());
            println!("  {:<8}: {:<32} : {}", "MN", "Model Number", ctrl.model_number());
            println!("  {:<8}: {:<32} : {}", "FR", "Firmware Revision", ctrl.firmware_revision());
            println!("  {:<8}: {:<32} : {:#06x}", "CNTLID", "Controller ID", ctrl.cntlid);
            println!("  {:<8}: {:<32} : {:#010x}", "VER", "Version", ctrl.ver);
            println!("  {:<8}: {:<32} : {:#06x}", "OACS", "Optional Admin Commands", ctrl.oacs);
            println!(
                "  {:<8}: {:<32} : {:#010x}",
                "SANICAP",
                "Sanitize Capabilities",
                u32::from(ctrl.sanicap)
            );
            println!("  {:<8}: {:<32} : {}", "NN", "Number of Namespaces", ctrl.nn);
            println!(
                "  {:<8}: {:<32} : {}",
                "SUBNQN",
                "Subsystem NQN",
                String::from_utf8_lossy(&ctrl.subnqn).trim_end_matches(['\0', ' '])
            );
            Ok(())
        })
    }
}

#[derive(Args)]
#[command(allow_negative_numbers = true)]
pub struct IdNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to identify (-1 for the broadcast namespace).
    #[arg(short = 'n', long, default_value = "-1")]
    namespace_id: i64,
    /// Return the namespace even if merely present on the subsystem.
    #[arg(short, long)]
    present: bool,
}

impl IdNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let ns = dev.identify_namespace(self.namespace_id as u32, self.present)?;
            println!("NVME Identify Namespace {}", self.namespace_id);
            println!("  {:<8}: {:<32} : {:#016x}", "NSZE", "Namespace Size", ns.nsze);
            println!("  {:<8}: {:<32} : {:#016x}", "NCAP", "Namespace Capacity", ns.ncap);
            println!("  {:<8}: {:<32} : {:#016x}", "NUSE", "Namespace Utilization", ns.nuse);
            let nguid: String = ns.nguid.iter().map(|b| format!("{b:02x}")).collect();
            println!("  {:<8}: {:<32} : 0x{}", "NGUID", "Namespace GUID", nguid);
            println!("  {:<8}: {:<32} : {:<2}", "NLBAS", "Number LBA Formats", ns.nlbaf);
            for i in 0..usize::from(ns.nlbaf) {
                let f = &ns.lbaf[i];
                let rp_str = match f.rp {
                    0 => "Best",
                    1 => "Better",
                    2 => "Good",
                    3 => "Degraded",
                    _ => "",
                };
                let in_use = if i == usize::from(ns.flbas.format()) {
                    "(in use)"
                } else {
                    ""
                };
                println!(
                    "  {:<8}  {i:<2}: Data Size: {:>4}B - Metadata Size: {}B - Relative Performance: {:#x} {} {}",
                    "",
                    1u64 << f.lbads,
                    f.ms,
                    f.rp,
                    rp_str,
                    in_use
                );
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct ListNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// First NSID the returned list should start from.
    #[arg(default_value = "1", value_parser = format::parse_u32)]
    namespace_id: u32,
    /// Show all namespaces in the subsystem, whether attached or inactive.
    #[arg(long)]
    all: bool,
}

impl ListNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let list = dev.list_namespaces(self.namespace_id.wrapping_sub(1), self.all)?;
            for (idx, id) in list.iter().enumerate() {
                println!("[{idx:>4}]:{id:#x}");
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct IdNsCtrlsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to query.
    #[arg(short = 'n', long)]
    namespace_id: u32,
}

impl IdNsCtrlsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let ctrls = dev.attached_controllers(self.namespace_id)?;
            println!("Controller List for Namespace ID {}:", self.namespace_id);
            for (idx, id) in ctrls.iter().enumerate() {
                println!("  [{idx:>4}]: {id:#06x}");
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct PrimaryCtrlCapsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Controller ID.
    #[arg(short, long, default_value = "0", value_parser = format::parse_u16)]
    controller_id: u16,
}

impl PrimaryCtrlCapsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let caps = dev.primary_ctrl_caps(self.controller_id)?;
            println!("Identify Primary Controller Capabilities:");
            println!("{:<6}: {:<42} : {:#x}", "CNTLID", "Controller Identifier", caps.cntlid);
            println!("{:<6}: {:<42} : {:#x}", "PORTID", "Port Identifier", caps.portid);
            println!("{:<6}: {:<42} : {:#x}", "CRT", "Controller Resource Type", caps.crt);
            println!("{:<6}: {:<42} : {}", "VQFRT", "VQ Resources Flexible Total", caps.vqfrt);
            println!("{:<6}: {:<42} : {}", "VQRFA", "VQ Resources Flexible Assigned", caps.vqrfa);
            println!(
                "{:<6}: {:<42} : {}",
                "VQRFAP", "VQ Resources Flexible Allocated to Primary", caps.vqrfap
            );
            println!("{:<6}: {:<42} : {}", "VQPRT", "VQ Resources Private Total", caps.vqprt);
            println!(
                "{:<6}: {:<42} : {}",
                "VQFRSM", "VQ Resources Flexible Secondary Maximum", caps.vqfrsm
            );
            println!(
                "{:<6}: {:<42} : {}",
                "VQGRAN", "VQ Flexible Resource Preferred Granularity", caps.vqgran
            );
            println!("{:<6}: {:<42} : {}", "VIFRT", "VI Resources Flexible Total", caps.vifrt);
            println!("{:<6}: {:<42} : {}", "VIRFA", "VI Resources Flexible Assigned", caps.virfa);
            println!(
                "{:<6}: {:<42} : {}",
                "VIRFAP", "VI Resources Flexible Allocated to Primary", caps.virfap
            );
            println!("{:<6}: {:<42} : {}", "VIPRT", "VI Resources Private Total", caps.viprt);
            println!(
                "{:<6}: {:<42} : {}",
                "VIFRSM", "VI Resources Flexible Secondary Maximum", caps.vifrsm
            );
            println!(
                "{:<6}: {:<42} : {}",
                "VIGRAN", "VI Flexible Resource Preferred Granularity", caps.vigran
            );
            Ok(())
        })
    }
}

#[derive(Args)]
#[command(allow_negative_numbers = true)]
pub struct ListSecondaryCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Lowest controller identifier to display.
    #[arg(default_value = "0", value_parser = format::parse_u16)]
    cnt_id: u16,
    /// Number of entries to display (-1 for all).
    #[arg(default_value = "-1")]
    num_entries: i32,
}

impl ListSecondaryCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let list = dev.list_secondary(self.cnt_id)?;
            let count = if self.num_entries >= 0 {
                (self.num_entries as usize).min(usize::from(list.count))
            } else {
                usize::from(list.count)
            };

            println!("Identify Secondary Controller List:");
            println!("  {:<12}: {:<32} : {}", "NUMID", "Number of Identifiers", list.count);
            for (i, entry) in list.entries().iter().take(count).enumerate() {
                println!("  .............");
                println!("  {:<12}:", format!("SCEntry[{i:>3}]"));
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "SCID", "Secondary Controller Identifier", entry.scid
                );
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "PCID", "Primary Controller Identifier", entry.pcid
                );
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "SCS", "Secondary Controller State", entry.scs
                );
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "VFN", "Virtual Function Number", entry.vfn
                );
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "NVQ", "Num VQ Flex Resources Assigned", entry.nvq
                );
                println!(
                    "  {:<12}: {:<32} : {:04x}",
                    "NVI", "Num VI Flex Resources Assigned", entry.nvi
                );
            }
            if count < usize::from(list.count) {
                println!("  {:<12}: {:<32}", "", "Display truncated");
            }
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct CreateNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Size of the namespace, in logical blocks.
    #[arg(short, long, value_parser = format::parse_u64)]
    size: u64,
    /// Capacity of the namespace, in logical blocks.
    #[arg(short, long, value_parser = format::parse_u64)]
    capacity: u64,
    /// LBA format index. Conflicts with --blocksize.
    #[arg(short, long, value_parser = format::parse_u8)]
    format: Option<u8>,
    /// Data protection settings.
    #[arg(short, long, default_value = "0", value_parser = format::parse_u8)]
    dps: u8,
    /// Multipath and sharing capabilities.
    #[arg(short, long, default_value = "0", value_parser = format::parse_u8)]
    multipath: u8,
    /// ANA group identifier.
    #[arg(short, long, default_value = "0", value_parser = format::parse_u32)]
    anagrpid: u32,
    /// NVM set identifier.
    #[arg(short = 'i', long, default_value = "0", value_parser = format::parse_u16)]
    nvmesetid: u16,
    /// Target block size; resolved to an LBA format without metadata.
    #[arg(short, long, conflicts_with = "format", value_parser = format::parse_u64)]
    blocksize: Option<u64>,
}

impl CreateNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        if let Some(blocksize) = self.blocksize {
            if !blocksize.is_power_of_two() {
                anyhow::bail!(
                    "invalid value for block size {blocksize}; block size must be a power of two"
                );
            }
        }

        with_device(&self.device.device, |dev| {
            let lba_format = match (self.format, self.blocksize) {
                (Some(format), _) => format,
                (None, Some(blocksize)) => {
                    let ns = dev.identify_namespace(NSID_ALL, true)?;
                    ns.lbaf[..usize::from(ns.nlbaf)]
                        .iter()
                        .position(|f| f.ms == 0 && 1u64 << f.lbads == blocksize)
                        .ok_or_else(|| {
                            anyhow::anyhow!("no LBA format matches block size {blocksize}")
                        })? as u8
                }
                (None, None) => 0,
            };

            let id_ns = IdentifyNamespace {
                nsze: self.size,
                ncap: self.capacity,
                flbas: Flbas::new().with_format(lba_format & 0xf),
                dps: self.dps,
                nmic: Nmic::from_bits(self.multipath),
                anagrpid: self.anagrpid,
                nvmsetid: self.nvmesetid,
                ..IdentifyNamespace::new_zeroed()
            };

            let nsid = dev.create_namespace(&id_ns)?;
            println!("Success, created nsid: {nsid}");
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct DeleteNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to delete.
    #[arg(short = 'n', long, value_parser = format::parse_u32)]
    namespace_id: u32,
}

impl DeleteNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            dev.delete_namespace(self.namespace_id)?;
            println!("Success, deleted nsid: {}", self.namespace_id);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct AttachNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to attach.
    #[arg(short = 'n', long, value_parser = format::parse_u32)]
    namespace_id: u32,
    /// Comma-separated controller list.
    #[arg(short, long, value_delimiter = ',', value_parser = format::parse_u16)]
    controllers: Vec<u16>,
}

impl AttachNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            dev.attach_namespace(self.namespace_id, &self.controllers)?;
            println!("Success, attached nsid: {}", self.namespace_id);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct DetachNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to detach.
    #[arg(short = 'n', long, value_parser = format::parse_u32)]
    namespace_id: u32,
    /// Comma-separated controller list.
    #[arg(short, long, value_delimiter = ',', value_parser = format::parse_u16)]
    controllers: Vec<u16>,
}

impl DetachNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            dev.detach_namespace(self.namespace_id, &self.controllers)?;
            println!("Success, detached nsid: {}", self.namespace_id);
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct FormatNsCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Namespace to format.
    #[arg(short = 'n', long, value_parser = format::parse_u32)]
    namespace_id: u32,
}

impl FormatNsCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            dev.format_namespace(self.namespace_id)?;
            println!("\nSuccess, formatting nsid: {}", self.namespace_id);
            Ok(())
        })
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub enum VirtMgmtAction {
    Assign,
    Online,
    Offline,
}

#[derive(Copy, Clone, ValueEnum)]
pub enum VirtMgmtResource {
    Vq,
    Vi,
}

#[derive(Args)]
pub struct VirtMgmtCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Controller ID.
    #[arg(value_parser = format::parse_u16)]
    controller: u16,
    /// Action to take.
    #[arg(value_enum)]
    action: VirtMgmtAction,
    /// Resource type, required for assign.
    #[arg(value_enum)]
    resource: Option<VirtMgmtResource>,
    /// Number of resources.
    #[arg(default_value = "0", value_parser = format::parse_u16)]
    num_resources: u16,
}

impl VirtMgmtCmd {
    pub fn run(self) -> anyhow::Result<()> {
        let action = match self.action {
            VirtMgmtAction::Assign => virt_mgmt::ACTION_SECONDARY_ASSIGN,
            VirtMgmtAction::Online => virt_mgmt::ACTION_SECONDARY_ONLINE,
            VirtMgmtAction::Offline => virt_mgmt::ACTION_SECONDARY_OFFLINE,
        };
        let resource = match self.resource {
            Some(VirtMgmtResource::Vq) | None => virt_mgmt::RESOURCE_VQ,
            Some(VirtMgmtResource::Vi) => virt_mgmt::RESOURCE_VI,
        };
        if action == virt_mgmt::ACTION_SECONDARY_ASSIGN {
            if self.resource.is_none() {
                anyhow::bail!("secondary assignment requires a resource type");
            }
            if self.num_resources == 0 {
                anyhow::bail!("secondary assignment requires non-zero resources");
            }
        }

        with_device(&self.device.device, |dev| {
            dev.virtual_mgmt(self.controller, resource, action, self.num_resources)?;
            println!("Virtualization Management Command complete.");
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct GetFeatureCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Feature identifier.
    #[arg(short, long, value_parser = format::parse_u8)]
    feature_id: u8,
    /// Identifier of the desired namespace.
    #[arg(short = 'n', long, default_value = "0", value_parser = format::parse_u32)]
    namespace_id: u32,
    /// [0-3]: current/default/saved/supported.
    #[arg(short, long, default_value = "0")]
    select: u8,
    /// Output file for the feature buffer.
    #[arg(short, long)]
    output: PathBuf,
}

impl GetFeatureCmd {
    pub fn run(self) -> anyhow::Result<()> {
        if self.select > 3 {
            anyhow::bail!("select must be in the range 0-3");
        }
        with_device(&self.device.device, |dev| {
            let (_, buf) = dev.get_feature(
                self.namespace_id,
                Feature(self.feature_id),
                self.select,
                0,
            )?;
            std::fs::write(&self.output, &buf)?;
            println!("Success");
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct SetFeatureCmd {
    #[command(flatten)]
    device: TargetArg,
    /// Feature identifier.
    #[arg(short, long, value_parser = format::parse_u8)]
    feature_id: u8,
    /// Identifier of the desired namespace.
    #[arg(short = 'n', long, default_value = "0", value_parser = format::parse_u32)]
    namespace_id: u32,
    /// File holding the feature data.
    data: PathBuf,
    /// Save the data to persistent storage.
    #[arg(short, long)]
    save: bool,
}

impl SetFeatureCmd {
    pub fn run(self) -> anyhow::Result<()> {
        let fid = Feature(self.feature_id);
        let data = std::fs::read(&self.data)?;

        let buffer_len = fid.buffer_len();
        if data.len() > buffer_len {
            anyhow::bail!("data is larger than the feature buffer ({buffer_len} bytes)");
        }
        let mut buf = vec![0u8; buffer_len];
        buf[..data.len()].copy_from_slice(&data);

        with_device(&self.device.device, |dev| {
            println!(
                "Performing Set-Feature {:#02x} NSID {} of {} bytes",
                self.feature_id, self.namespace_id, buffer_len
            );
            dev.set_feature(self.namespace_id, fid, self.save, 0, 0, &buf)?;
            println!("Success");
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct BuildMiFeatureCmd {
    /// Output file.
    file: PathBuf,
}

impl BuildMiFeatureCmd {
    pub fn run(self) -> anyhow::Result<()> {
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        let mut prompt = |label: &str| -> anyhow::Result<Option<String>> {
            print!("{label}");
            std::io::stdout().flush()?;
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    Ok((!line.is_empty()).then_some(line))
                }
                None => Ok(None),
            }
        };

        let mut builder = MiMetadataBuilder::new();
        loop {
            let Some(typ) = prompt("Enter Element Type: ")? else {
                break;
            };
            let Some(rev) = prompt("Enter Element Rev: ")? else {
                break;
            };
            let Some(data) = prompt("Enter Element Data: ")? else {
                break;
            };

            let typ = format::parse_u8(&typ).map_err(anyhow::Error::msg)?;
            let rev = format::parse_u8(&rev).map_err(anyhow::Error::msg)?;
            builder = builder.element(typ, rev, data.as_bytes());
        }

        let bytes = builder.build();
        println!("Writing {} Bytes to {}...", bytes.len(), self.file.display());
        std::fs::write(&self.file, &bytes)?;
        Ok(())
    }
}

#[derive(Args)]
pub struct GetSmartLogCmd {
    #[command(flatten)]
    device: TargetArg,
}

impl GetSmartLogCmd {
    pub fn run(self) -> anyhow::Result<()> {
        with_device(&self.device.device, |dev| {
            let log = dev.smart_log()?;
            println!("SMART / Health Information:");
            println!(
                "  {:<24}: {:#04x}",
                "Critical Warning",
                u8::from(log.critical_warning)
            );
            println!("  {:<24}: {} C", "Composite Temperature", log.composite_temp_celsius());
            println!("  {:<24}: {}%", "Available Spare", log.avail_spare);
            println!("  {:<24}: {}%", "Available Spare Threshold", log.spare_thresh);
            println!("  {:<24}: {}%", "Percentage Used", log.percent_used);
            println!("  {:<24}: {}", "Data Units Read", log.data_units_read.get());
            println!("  {:<24}: {}", "Data Units Written", log.data_units_written.get());
            println!("  {:<24}: {}", "Host Read Commands", log.host_reads.get());
            println!("  {:<24}: {}", "Host Write Commands", log.host_writes.get());
            println!("  {:<24}: {}", "Controller Busy Time", log.ctrl_busy_time.get());
            println!("  {:<24}: {}", "Power Cycles", log.power_cycles.get());
            println!("  {:<24}: {}", "Power On Hours", log.power_on_hours.get());
            println!("  {:<24}: {}", "Unsafe Shutdowns", log.unsafe_shutdowns.get());
            println!("  {:<24}: {}", "Media Errors", log.media_errors.get());
            println!(
                "  {:<24}: {}",
                "Error Log Entries",
                log.num_err_log_entries.get()
            );
            Ok(())
        })
    }
}

#[derive(Args)]
pub struct DiscoverCmd {
    /// Regular expression used to filter drives by model number, serial
    /// number, or NQN.
    regexp: String,
}

impl DiscoverCmd {
    pub fn run(self) -> anyhow::Result<()> {
        let re = regex::Regex::new(&self.regexp)?;
        let devices = discover_devices(&re, "/sys/class/nvme")?;
        println!("Device List:");
        println!("{}", devices.join("\n"));
        Ok(())
    }
}

/// Matches each controller's model, serial, and subsystem NQN sysfs
/// attributes against `re` and returns the matching /dev nodes.
fn discover_devices(re: &regex::Regex, sysfs: &str) -> anyhow::Result<Vec<String>> {
    let mut devices = Vec::new();
    let entries = match std::fs::read_dir(sysfs) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(devices),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let matched = ["model", "serial", "subsysnqn"].iter().any(|attr| {
            std::fs::read_to_string(entry.path().join(attr))
                .is_ok_and(|text| re.is_match(text.trim()))
        });
        if matched {
            devices.push(format!("/dev/{}", name.to_string_lossy()));
        }
    }
    devices.sort();
    Ok(devices)
}

#[derive(Args)]
pub struct ConfigCmd {
    /// The fabric configuration file.
    file: PathBuf,
    /// Log side-effecting steps without issuing them.
    #[arg(long)]
    dry_run: bool,
}

impl ConfigCmd {
    pub fn run(self) -> anyhow::Result<()> {
        fabric_config::run(&self.file, self.dry_run)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_filters_by_sysfs_attributes() {
        let dir = tempfile::tempdir().unwrap();
        for (name, model) in [("nvme0", "KIOXIA CM6"), ("nvme1", "Samsung PM1733")] {
            let ctrl = dir.path().join(name);
            std::fs::create_dir(&ctrl).unwrap();
            std::fs::write(ctrl.join("model"), format!("{model}\n")).unwrap();
            std::fs::write(ctrl.join("serial"), "S123\n").unwrap();
            std::fs::write(ctrl.join("subsysnqn"), "nqn.2020-01.example:drive\n").unwrap();
        }

        let re = regex::Regex::new("KIOXIA").unwrap();
        let devices = discover_devices(&re, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(devices, vec!["/dev/nvme0".to_string()]);

        let re = regex::Regex::new("example:drive").unwrap();
        let devices = discover_devices(&re, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(devices.len(), 2);

        let re = regex::Regex::new("missing").unwrap();
        assert!(discover_devices(&re, dir.path().to_str().unwrap())
            .unwrap()
            .is_empty());
    }
}
