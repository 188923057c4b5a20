// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The fabric bring-up walk.
//!
//! Per device: discover the switch by PAX ID, build the binding table, then
//! for every endpoint port enumerate the functions, top up flex resources,
//! online the secondary controller, and bind each virtual function into its
//! host domain slot. Steps are idempotent, so rerunning after a failure is
//! the recovery model.

use crate::ConfigError;
use crate::model::Binding;
use crate::model::ConfigFile;
use crate::model::DeviceConfig;
use crate::model::Options;
use crate::model::VirtMgmtCtrl;
use nvme_admin::Device;
use nvme_spec::identify::SecondaryCtrlEntry;
use nvme_spec::identify::SecondaryCtrlList;
use nvme_spec::virt_mgmt;
use pax_spec::fabric::EpPortType;
use pax_switch::Switch;
use std::path::Path;

/// Tunneled virtualization management commands for one endpoint PF.
///
/// The pci variant is reserved firmware work and is rejected at open rather
/// than silently falling back to uart.
pub trait VirtMgmt {
    fn list(&mut self, switch: &mut Switch, pdfid: u16)
    -> Result<SecondaryCtrlList, ConfigError>;

    fn manage(
        &mut self,
        switch: &mut Switch,
        pdfid: u16,
        ctrl_id: u16,
        resource: u8,
        action: u8,
        count: u16,
    ) -> Result<(), ConfigError>;
}

pub fn open_virt_mgmt(mode: VirtMgmtCtrl) -> Result<Box<dyn VirtMgmt>, ConfigError> {
    match mode {
        VirtMgmtCtrl::Pci => Err(ConfigError::PciVirtMgmtUnsupported),
        VirtMgmtCtrl::Uart => Ok(Box::new(UartVirtMgmt::default())),
    }
}

/// Virtualization management over a side-band serial console.
///
/// The switch's own management node cannot reach these commands yet, so they
/// are tunneled through the UART that fronts the same PAX. The tunnel handle
/// is cached per (PAX, PDFID) and reopened when the target function changes.
#[derive(Default)]
pub struct UartVirtMgmt {
    cached: Option<Cached>,
}

struct Cached {
    pax_id: u8,
    pdfid: u16,
    dev: Device,
}

impl UartVirtMgmt {
    fn device(&mut self, switch: &mut Switch, pdfid: u16) -> Result<&mut Device, ConfigError> {
        let pax_id = switch.id()?;
        if !matches!(&self.cached, Some(c) if c.pax_id == pax_id && c.pdfid == pdfid) {
            let uart = Switch::locate_base(pax_id, "ttyUSB")?;
            self.cached = Some(Cached {
                pax_id,
                pdfid,
                dev: Device::connect(uart, pdfid),
            });
        }
        let Some(cached) = &mut self.cached else {
            unreachable!()
        };
        Ok(&mut cached.dev)
    }
}

impl VirtMgmt for UartVirtMgmt {
    fn list(
        &mut self,
        switch: &mut Switch,
        pdfid: u16,
    ) -> Result<SecondaryCtrlList, ConfigError> {
        Ok(self.device(switch, pdfid)?.list_secondary(0)?)
    }

    fn manage(
        &mut self,
        switch: &mut Switch,
        pdfid: u16,
        ctrl_id: u16,
        resource: u8,
        action: u8,
        count: u16,
    ) -> Result<(), ConfigError> {
        self.device(switch, pdfid)?
            .virtual_mgmt(ctrl_id, resource, action, count)?;
        Ok(())
    }
}

/// Counts of work done (or intended, under dry run) by one invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplySummary {
    /// Functions whose binding was attempted or logged.
    pub bind_intents: usize,
    /// Bind commands actually issued.
    pub binds_issued: usize,
}

impl ApplySummary {
    fn merge(&mut self, other: ApplySummary) {
        self.bind_intents += other.bind_intents;
        self.binds_issued += other.binds_issued;
    }
}

/// Applies a topology file: parse, validate, then configure each device.
pub fn run(path: &Path, dry_run: bool) -> Result<ApplySummary, ConfigError> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("config");
    println!("Running Config {name}...");
    let config = ConfigFile::parse(&std::fs::read_to_string(path)?)?;

    println!("Config Loaded.");
    println!("  Version: {}", config.version);
    println!("  Name: {}", config.metadata.name);

    println!("Validate Config...");
    config.validate()?;

    let options = Options::load(&config)?;
    println!("Options Loaded:");
    println!("  {:<32} : {:?}", "Fabric Controller", options.fabric_ctrl);
    println!("  {:<32} : {:?}", "Virt-Mgmt Controller", options.virt_mgmt_ctrl);

    let mut summary = ApplySummary::default();
    for device in &config.devices {
        println!("Locate Device ID: {}...", device.id);
        let mut switch = Switch::locate_base(device.id, options.fabric_ctrl.base())?;
        println!("Device {} Found {}", device.id, switch.path().display());

        let mut ctrl = open_virt_mgmt(options.virt_mgmt_ctrl)?;
        let bindings = crate::model::binding_table(&config, device);
        summary.merge(configure_device(
            &mut switch,
            ctrl.as_mut(),
            device,
            &bindings,
            dry_run,
        )?);
    }
    Ok(summary)
}

/// Configures every endpoint port of one switch.
pub fn configure_device(
    switch: &mut Switch,
    ctrl: &mut dyn VirtMgmt,
    device: &DeviceConfig,
    bindings: &[Binding],
    dry_run: bool,
) -> Result<ApplySummary, ConfigError> {
    let mut summary = ApplySummary::default();
    println!("Enumerating End-Point Devices...");
    for (ep_index, &ep_port) in device.endpoints.iter().enumerate() {
        println!("Processing End-Point {ep_index}: Port {ep_port}");
        summary.merge(configure_endpoint(
            switch, ctrl, bindings, ep_index, ep_port, dry_run,
        )?);
    }
    Ok(summary)
}

fn configure_endpoint(
    switch: &mut Switch,
    ctrl: &mut dyn VirtMgmt,
    bindings: &[Binding],
    ep_index: usize,
    ep_port: u8,
    dry_run: bool,
) -> Result<ApplySummary, ConfigError> {
    let mut dump = None;
    switch.gfms_ep_port_enumerate::<ConfigError>(ep_port, |device| {
        dump = Some(device.clone());
        Ok(())
    })?;
    let dump = match dump {
        Some(dump) => dump,
        None => return Ok(ApplySummary::default()),
    };

    let mut summary = ApplySummary::default();
    if dump.hdr.typ != EpPortType::DEVICE.0 || dump.functions.is_empty() {
        println!("Warning: No device attached to end-point.");
        return Ok(summary);
    }

    let pfpdfid = dump.functions[0].pdfid;
    for function in &dump.functions {
        if function.is_pf() {
            println!("Physical Function. Skipping");
            continue;
        }
        // Function id 0 belongs to the PF; a virtual function reporting it
        // has no domain slot.
        if function.func_id == 0 {
            println!("Warning: Function ID 0 on a virtual function. Skipping");
            continue;
        }
        if usize::from(function.func_id) > bindings.len() {
            println!("No Domain Available.");
            continue;
        }

        ensure_secondary(switch, ctrl, pfpdfid, function.func_id, dry_run)?;

        if function.is_bound() {
            println!(
                "Already Bound: PAX: {} PhyPort: {} LogPort {}",
                function.bound_pax_id, function.bound_hvd_phys_pid, function.bound_hvd_log_pid
            );
            continue;
        }

        let binding = &bindings[usize::from(function.func_id) - 1];
        let host_phys_port = binding.domain.port;
        let host_log_port = ep_index as u8;
        print!(
            "Performing bind to {}: idx: {} phyPort {} logPort {} PDFID {:#06x}...",
            binding.domain.name, binding.host_sw_idx, host_phys_port, host_log_port, function.pdfid
        );
        summary.bind_intents += 1;
        if !dry_run {
            match switch.bind(
                binding.host_sw_idx,
                host_phys_port,
                host_log_port,
                function.pdfid,
            ) {
                Ok(()) => summary.binds_issued += 1,
                Err(err) if err.is_already_bound() => {
                    println!(" {err}");
                    continue;
                }
                Err(err) => {
                    println!(" Error: {err}");
                    return Err(err.into());
                }
            }
        }
        println!(" Complete.");
    }
    Ok(summary)
}

/// Makes sure the secondary controller behind `ctrl_id` has at least two VQ
/// and two VI flex resources and is online.
fn ensure_secondary(
    switch: &mut Switch,
    ctrl: &mut dyn VirtMgmt,
    pfpdfid: u16,
    ctrl_id: u16,
    dry_run: bool,
) -> Result<(), ConfigError> {
    let info = secondary_info(switch, ctrl, pfpdfid, ctrl_id)?;
    tracing::debug!(
        scid = info.scid,
        pcid = info.pcid,
        scs = info.scs,
        vfn = info.vfn,
        nvq = info.nvq,
        nvi = info.nvi,
        "secondary controller"
    );

    for (assigned, resource) in [
        (info.nvq, virt_mgmt::RESOURCE_VQ),
        (info.nvi, virt_mgmt::RESOURCE_VI),
    ] {
        if assigned < 2 {
            println!("Assigning flex resources (type {resource})...");
            if !dry_run {
                ctrl.manage(
                    switch,
                    pfpdfid,
                    ctrl_id,
                    resource,
                    virt_mgmt::ACTION_SECONDARY_ASSIGN,
                    2 - assigned,
                )?;
            }
        }
    }

    if info.scs == 0 {
        println!("Online Secondary Controller...");
        if !dry_run {
            ctrl.manage(
                switch,
                pfpdfid,
                ctrl_id,
                virt_mgmt::RESOURCE_VQ,
                virt_mgmt::ACTION_SECONDARY_ONLINE,
                0,
            )?;
        }
    }
    Ok(())
}

fn secondary_info(
    switch: &mut Switch,
    ctrl: &mut dyn VirtMgmt,
    pfpdfid: u16,
    ctrl_id: u16,
) -> Result<SecondaryCtrlEntry, ConfigError> {
    let list = ctrl.list(switch, pfpdfid)?;
    list.entries()
        .iter()
        .find(|entry| entry.scid == ctrl_id)
        .copied()
        .ok_or(ConfigError::NoSecondaryController(ctrl_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::binding_table;
    use pax_spec::fabric::DumpEpPortFunction;
    use pax_spec::fabric::DumpEpPortHdr;
    use pax_spec::fabric::gfms_dump;
    use pax_spec::mrpc::CommandId;
    use pax_switch::mock::MockBackend;
    use std::cell::RefCell;
    use std::rc::Rc;
    use zerocopy::FromZeros;
    use zerocopy::IntoBytes;

    // Answers every list with fully provisioned online controllers (or a
    // configurable entry) and records manage calls.
    struct FakeVirtMgmt {
        entry: SecondaryCtrlEntry,
        manage_calls: Rc<RefCell<Vec<(u16, u16, u8, u8, u16)>>>,
    }

    impl FakeVirtMgmt {
        fn provisioned() -> Self {
            let mut entry = SecondaryCtrlEntry::new_zeroed();
            entry.scs = 1;
            entry.nvq = 2;
            entry.nvi = 2;
            FakeVirtMgmt {
                entry,
                manage_calls: Default::default(),
            }
        }
    }

    impl VirtMgmt for FakeVirtMgmt {
        fn list(
            &mut self,
            _switch: &mut Switch,
            _pdfid: u16,
        ) -> Result<SecondaryCtrlList, ConfigError> {
            let mut list = SecondaryCtrlList::new_zeroed();
            list.count = 4;
            for (i, slot) in list.entries[..4].iter_mut().enumerate() {
                *slot = self.entry;
                slot.scid = i as u16;
            }
            Ok(list)
        }

        fn manage(
            &mut self,
            _switch: &mut Switch,
            pdfid: u16,
            ctrl_id: u16,
            resource: u8,
            action: u8,
            count: u16,
        ) -> Result<(), ConfigError> {
            self.manage_calls
                .borrow_mut()
                .push((pdfid, ctrl_id, resource, action, count));
            Ok(())
        }
    }

    fn expect_dump(mock: &MockBackend, functions: Vec<DumpEpPortFunction>) {
        let hdr = DumpEpPortHdr {
            typ: EpPortType::DEVICE.0,
            phys_port_id: 0,
            function_count: functions.len() as u16,
            size_dw: 0,
            rsvd: 0,
        };
        let mut buf = hdr.as_bytes().to_vec();
        for f in &functions {
            buf.extend_from_slice(f.as_bytes());
        }
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

    fn two_switch_config() -> ConfigFile {
        ConfigFile::parse(
            r#"
version: v1
devices:
  - id: 0
    domains:
      - name: shared
        port: 24
      - name: compute-0
        port: 32
    endpoints: [8, 10, 12, 14]
  - id: 1
    domains:
      - name: shared
        port: 24
      - name: compute-1
        port: 32
    endpoints: [8, 10, 12, 14]
"#,
        )
        .unwrap()
    }

    #[test]
    fn dry_run_counts_intents_without_binding() {
        let config = two_switch_config();
        config.validate().unwrap();
        let mut total = ApplySummary::default();
        for device in &config.devices {
            let mock = MockBackend::new();
            // Each endpoint exposes a PF and two unbound VFs. No bind
            // expectations are queued, so an issued bind would panic.
            for _ in &device.endpoints {
                expect_dump(
                    &mock,
                    vec![
                        function(0, 0x1800, true, false),
                        function(1, 0x1801, false, false),
                        function(2, 0x1802, false, false),
                    ],
                );
            }
            let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
            let mut ctrl = FakeVirtMgmt::provisioned();
            let bindings = binding_table(&config, device);
            assert_eq!(bindings.len(), 3);
            let summary =
                configure_device(&mut switch, &mut ctrl, device, &bindings, true).unwrap();
            assert_eq!(summary.binds_issued, 0);
            assert!(ctrl.manage_calls.borrow().is_empty());
            mock.verify();
            total.merge(summary);
        }
        assert_eq!(total.bind_intents, 16);
    }

    #[test]
    fn binds_use_function_id_slot() {
        let config = two_switch_config();
        let device = &config.devices[0];
        let bindings = binding_table(&config, device);

        let mock = MockBackend::new();
        expect_dump(
            &mock,
            vec![
                function(0, 0x1800, true, false),
                function(2, 0x1802, false, false),
            ],
        );
        mock.expect(CommandId::GFMS_BIND, |input, _| {
            // host_sw_idx, phys port, log port, then the pdfid.
            assert_eq!(&input[..3], &[0, 32, 3]);
            assert_eq!(u16::from_le_bytes(input[4..6].try_into().unwrap()), 0x1802);
            Ok(())
        });
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        let mut ctrl = FakeVirtMgmt::provisioned();
        let summary =
            configure_endpoint(&mut switch, &mut ctrl, &bindings, 3, 14, false).unwrap();
        assert_eq!(summary.binds_issued, 1);
        mock.verify();
    }

    #[test]
    fn deficits_assigned_and_onlined() {
        let config = two_switch_config();
        let device = &config.devices[0];
        let bindings = binding_table(&config, device);

        let mock = MockBackend::new();
        expect_dump(&mock, vec![
            function(0, 0x1800, true, false),
            function(1, 0x1801, false, false),
        ]);
        mock.expect(CommandId::GFMS_BIND, |_, _| Ok(()));
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");

        let mut entry = SecondaryCtrlEntry::new_zeroed();
        entry.nvq = 0;
        entry.nvi = 1;
        let mut ctrl = FakeVirtMgmt {
            entry,
            manage_calls: Default::default(),
        };
        configure_endpoint(&mut switch, &mut ctrl, &bindings, 0, 8, false).unwrap();
        assert_eq!(
            *ctrl.manage_calls.borrow(),
            vec![
                (0x1800, 1, virt_mgmt::RESOURCE_VQ, virt_mgmt::ACTION_SECONDARY_ASSIGN, 2),
                (0x1800, 1, virt_mgmt::RESOURCE_VI, virt_mgmt::ACTION_SECONDARY_ASSIGN, 1),
                (0x1800, 1, virt_mgmt::RESOURCE_VQ, virt_mgmt::ACTION_SECONDARY_ONLINE, 0),
            ]
        );
        mock.verify();
    }

    #[test]
    fn bound_functions_skipped() {
        let config = two_switch_config();
        let device = &config.devices[0];
        let bindings = binding_table(&config, device);

        let mock = MockBackend::new();
        expect_dump(&mock, vec![
            function(0, 0x1800, true, false),
            function(1, 0x1801, false, true),
        ]);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        let mut ctrl = FakeVirtMgmt::provisioned();
        let summary =
            configure_endpoint(&mut switch, &mut ctrl, &bindings, 0, 8, false).unwrap();
        assert_eq!(summary, ApplySummary::default());
        mock.verify();
    }

    #[test]
    fn zero_function_id_skipped() {
        let config = two_switch_config();
        let device = &config.devices[0];
        let bindings = binding_table(&config, device);

        let mock = MockBackend::new();
        // A VF reporting function id 0 must not panic or bind; no bind
        // expectation is queued.
        expect_dump(&mock, vec![
            function(0, 0x1800, true, false),
            function(0, 0x1801, false, false),
        ]);
        let mut switch = Switch::with_backend(mock.clone(), "/dev/switchtec0");
        let mut ctrl = FakeVirtMgmt::provisioned();
        let summary =
            configure_endpoint(&mut switch, &mut ctrl, &bindings, 0, 8, false).unwrap();
        assert_eq!(summary, ApplySummary::default());
        assert!(ctrl.manage_calls.borrow().is_empty());
        mock.verify();
    }

    #[test]
    fn uart_tunnel_handle_cached_per_function() {
        let fabric = MockBackend::new();
        fabric.expect(CommandId::GET_PAX_ID, |_, output| {
            output[..4].copy_from_slice(&2u32.to_le_bytes());
            Ok(())
        });
        let mut switch = Switch::with_backend(fabric.clone(), "/dev/switchtec0");

        let tunnel = MockBackend::new();
        let mut ctrl = UartVirtMgmt {
            cached: Some(Cached {
                pax_id: 2,
                pdfid: 0x3300,
                dev: Device::connect(
                    Switch::with_backend(tunnel.clone(), "/dev/ttyUSB0"),
                    0x3300,
                ),
            }),
        };
        // A matching (pax, pdfid) reuses the handle without reopening.
        assert_eq!(ctrl.device(&mut switch, 0x3300).unwrap().pdfid(), 0x3300);
        assert_eq!(tunnel.commands_run(), 0);
        assert_eq!(fabric.commands_run(), 1);

        // A different function invalidates the cache; with no console to
        // reopen through, the miss surfaces as a transport error.
        let err = ctrl.device(&mut switch, 0x3301).unwrap_err();
        assert!(matches!(err, ConfigError::Switch(_)));
    }

    #[test]
    fn pci_virt_mgmt_rejected() {
        assert!(matches!(
            open_virt_mgmt(VirtMgmtCtrl::Pci),
            Err(ConfigError::PciVirtMgmtUnsupported)
        ));
    }
}
