// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory GAS backend for tests.
//!
//! The mock keeps a byte image of the GAS and emulates the MRPC handshake: a
//! write to the command register pops the next queued expectation, runs it
//! against the staged input window, and latches status, return code, and
//! output for the client to read back. Handles are cheaply cloneable so a
//! test can keep one for expectations while the switch owns another.

use crate::SwitchError;
use crate::backend::GasBackend;
use pax_spec::mrpc;
use pax_spec::mrpc::CommandId;
use pax_spec::mrpc::Status;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

type Handler = Box<dyn FnOnce(&[u8], &mut [u8]) -> Result<(), u32> + Send>;

const GAS_IMAGE_SIZE: usize = 0x10000;

struct Inner {
    image: Vec<u8>,
    expectations: VecDeque<(CommandId, Handler)>,
    commands_run: usize,
    system_path: PathBuf,
    resource_size: u64,
}

#[derive(Clone)]
pub struct MockBackend(Arc<Mutex<Inner>>);

impl MockBackend {
    pub fn new() -> Self {
        MockBackend(Arc::new(Mutex::new(Inner {
            image: vec![0; GAS_IMAGE_SIZE],
            expectations: VecDeque::new(),
            commands_run: 0,
            system_path: PathBuf::from("/sys/class/switchtec/switchtec0"),
            resource_size: 4 << 20,
        })))
    }

    /// Queues an expectation. The handler sees the full input window and
    /// fills the output window; returning `Err(ret)` completes the command
    /// with that return code.
    pub fn expect(
        &self,
        cmd: CommandId,
        handler: impl FnOnce(&[u8], &mut [u8]) -> Result<(), u32> + Send + 'static,
    ) {
        self.0
            .lock()
            .expectations
            .push_back((cmd, Box::new(handler)));
    }

    /// Queues an expectation that fails with a non-zero return code.
    pub fn expect_ret(&self, cmd: CommandId, ret: u32) {
        self.expect(cmd, move |_, _| Err(ret));
    }

    /// Number of commands executed so far.
    pub fn commands_run(&self) -> usize {
        self.0.lock().commands_run
    }

    pub fn set_resource_size(&self, size: u64) {
        self.0.lock().resource_size = size;
    }

    /// Panics if queued expectations were never consumed.
    pub fn verify(&self) {
        let inner = self.0.lock();
        assert!(
            inner.expectations.is_empty(),
            "{} expected commands never ran",
            inner.expectations.len()
        );
    }

    fn run_expectation(inner: &mut Inner) {
        let raw: [u8; 4] = inner.image[mrpc::GAS_COMMAND as usize..][..4]
            .try_into()
            .unwrap();
        let cmd = CommandId(u32::from_le_bytes(raw));
        let (expected, handler) = inner
            .expectations
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command {:#x}", cmd.0));
        assert_eq!(cmd, expected, "command order mismatch");
        inner.commands_run += 1;

        let input: [u8; mrpc::INPUT_DATA_MAX] = inner.image
            [mrpc::GAS_INPUT_DATA as usize..][..mrpc::INPUT_DATA_MAX]
            .try_into()
            .unwrap();
        let mut output = [0u8; mrpc::OUTPUT_DATA_MAX];
        let ret = match handler(&input, &mut output) {
            Ok(()) => 0,
            Err(ret) => ret,
        };
        inner.image[mrpc::GAS_OUTPUT_DATA as usize..][..mrpc::OUTPUT_DATA_MAX]
            .copy_from_slice(&output);
        inner.image[mrpc::GAS_STATUS as usize..][..4]
            .copy_from_slice(&Status::DONE.0.to_le_bytes());
        inner.image[mrpc::GAS_RET as usize..][..4].copy_from_slice(&ret.to_le_bytes());
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GasBackend for MockBackend {
    fn gas_read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), SwitchError> {
        let inner = self.0.lock();
        let addr = addr as usize;
        if addr + buf.len() > inner.image.len() {
            return Err(SwitchError::GasOutOfRange {
                addr: addr as u64,
                len: buf.len(),
                size: inner.image.len(),
            });
        }
        buf.copy_from_slice(&inner.image[addr..addr + buf.len()]);
        Ok(())
    }

    fn gas_write(&mut self, addr: u64, buf: &[u8]) -> Result<(), SwitchError> {
        let mut inner = self.0.lock();
        let addr = addr as usize;
        if addr + buf.len() > inner.image.len() {
            return Err(SwitchError::GasOutOfRange {
                addr: addr as u64,
                len: buf.len(),
                size: inner.image.len(),
            });
        }
        inner.image[addr..addr + buf.len()].copy_from_slice(buf);
        if addr == mrpc::GAS_COMMAND as usize {
            Self::run_expectation(&mut inner);
        }
        Ok(())
    }

    fn system_path(&self, subpath: &str) -> Result<PathBuf, SwitchError> {
        Ok(self.0.lock().system_path.join(subpath))
    }

    fn resource_size(&self, _subpath: &str) -> Result<u64, SwitchError> {
        Ok(self.0.lock().resource_size)
    }
}
