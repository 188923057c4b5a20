// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Operator CLI for PAX PCIe fabric switches and the SR-IOV NVMe drives
//! behind them.

mod fabric_cmds;
mod format;
mod nvme_cmds;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "paxfab", about = "Manage PAX fabric switches and tunneled NVMe endpoints.")]
struct Cli {
    /// Increase log verbosity. Repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send an echo payload and verify the response.
    Echo(fabric_cmds::EchoCmd),
    /// Report the switch's PAX identifier.
    Identify(fabric_cmds::IdentifyCmd),
    /// Report per-port link status.
    LinkStat(fabric_cmds::LinkStatCmd),
    /// Bind an endpoint function to a host port.
    Bind(fabric_cmds::BindCmd),
    /// Unbind a host port's logical port.
    Unbind(fabric_cmds::UnbindCmd),
    /// Dump GFMS state.
    #[command(subcommand)]
    Dump(fabric_cmds::DumpCmd),
    /// Access the Global Address Space.
    #[command(subcommand)]
    Gas(fabric_cmds::GasCmd),
    /// Access endpoint Configuration Status Registers.
    #[command(subcommand)]
    Csr(fabric_cmds::CsrCmd),
    /// Query manufacturing information.
    #[command(subcommand)]
    Mfg(fabric_cmds::MfgCmd),
    /// List, wait on, or clear events.
    #[command(subcommand)]
    Event(fabric_cmds::EventCmd),
    /// Measure per-port bandwidth.
    Bw(fabric_cmds::BandwidthCmd),
    /// Issue a function level reset to an endpoint function.
    VfReset(fabric_cmds::VfResetCmd),
    /// NVMe Identify Controller.
    IdCtrl(nvme_cmds::IdCtrlCmd),
    /// NVMe Identify Namespace.
    IdNs(nvme_cmds::IdNsCmd),
    /// List namespaces in the subsystem.
    ListNs(nvme_cmds::ListNsCmd),
    /// List controllers attached to a namespace.
    IdNsCtrls(nvme_cmds::IdNsCtrlsCmd),
    /// NVMe Identify Primary Controller Capabilities.
    PrimaryCtrlCaps(nvme_cmds::PrimaryCtrlCapsCmd),
    /// NVMe Identify Secondary Controller List.
    ListSecondary(nvme_cmds::ListSecondaryCmd),
    /// Create a namespace.
    CreateNs(nvme_cmds::CreateNsCmd),
    /// Delete a namespace.
    DeleteNs(nvme_cmds::DeleteNsCmd),
    /// Attach a namespace to controllers.
    AttachNs(nvme_cmds::AttachNsCmd),
    /// Detach a namespace from controllers.
    DetachNs(nvme_cmds::DetachNsCmd),
    /// Format a namespace.
    FormatNs(nvme_cmds::FormatNsCmd),
    /// NVMe Virtualization Management.
    VirtMgmt(nvme_cmds::VirtMgmtCmd),
    /// Read a feature buffer to a file.
    GetFeature(nvme_cmds::GetFeatureCmd),
    /// Write a feature buffer from a file.
    SetFeature(nvme_cmds::SetFeatureCmd),
    /// Interactively build a management-interface feature buffer.
    BuildMiFeature(nvme_cmds::BuildMiFeatureCmd),
    /// Read the SMART / health log page.
    GetSmartLog(nvme_cmds::GetSmartLogCmd),
    /// Find local NVMe drives by model, serial, or NQN.
    Discover(nvme_cmds::DiscoverCmd),
    /// Apply a fabric configuration file.
    Config(nvme_cmds::ConfigCmd),
}

impl Command {
    fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Echo(cmd) => cmd.run(),
            Command::Identify(cmd) => cmd.run(),
            Command::LinkStat(cmd) => cmd.run(),
            Command::Bind(cmd) => cmd.run(),
            Command::Unbind(cmd) => cmd.run(),
            Command::Dump(cmd) => cmd.run(),
            Command::Gas(cmd) => cmd.run(),
            Command::Csr(cmd) => cmd.run(),
            Command::Mfg(cmd) => cmd.run(),
            Command::Event(cmd) => cmd.run(),
            Command::Bw(cmd) => cmd.run(),
            Command::VfReset(cmd) => cmd.run(),
            Command::IdCtrl(cmd) => cmd.run(),
            Command::IdNs(cmd) => cmd.run(),
            Command::ListNs(cmd) => cmd.run(),
            Command::IdNsCtrls(cmd) => cmd.run(),
            Command::PrimaryCtrlCaps(cmd) => cmd.run(),
            Command::ListSecondary(cmd) => cmd.run(),
            Command::CreateNs(cmd) => cmd.run(),
            Command::DeleteNs(cmd) => cmd.run(),
            Command::AttachNs(cmd) => cmd.run(),
            Command::DetachNs(cmd) => cmd.run(),
            Command::FormatNs(cmd) => cmd.run(),
            Command::VirtMgmt(cmd) => cmd.run(),
            Command::GetFeature(cmd) => cmd.run(),
            Command::SetFeature(cmd) => cmd.run(),
            Command::BuildMiFeature(cmd) => cmd.run(),
            Command::GetSmartLog(cmd) => cmd.run(),
            Command::Discover(cmd) => cmd.run(),
            Command::Config(cmd) => cmd.run(),
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.command.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn csr_access_takes_named_flags() {
        let cli = Cli::try_parse_from([
            "paxfab", "csr", "read", "--device", "/dev/switchtec0", "--pdfid", "0x1900",
            "--addr", "0x34", "--bytes", "1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Csr(fabric_cmds::CsrCmd::Read(_))
        ));
        Cli::try_parse_from([
            "paxfab", "csr", "write", "--device", "/dev/switchtec0", "--pdfid", "0x1900",
            "--addr", "0x34", "--data", "0x10", "--bytes", "1",
        ])
        .unwrap();
    }

    #[test]
    fn subcommand_names_are_kebab_case() {
        let cmd = Cli::command();
        for name in ["link-stat", "id-ns-ctrls", "primary-ctrl-caps", "build-mi-feature"] {
            assert!(
                cmd.get_subcommands().any(|c| c.get_name() == name),
                "missing subcommand {name}"
            );
        }
    }
}
