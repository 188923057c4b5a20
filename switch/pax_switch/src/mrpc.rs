// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! MRPC command execution over a [`GasBackend`].

use crate::SwitchError;
use crate::backend::GasBackend;
use pax_spec::mrpc;
use pax_spec::mrpc::CommandId;
use pax_spec::mrpc::Status;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs one MRPC command: stages `input`, kicks the command register, polls
/// the status register out of `INPROGRESS`, then fills `output` from the
/// output window.
///
/// Blocks until the firmware completes the command; commands that wait
/// switch-side (event wait) finish when the firmware says so.
pub(crate) fn run_command(
    backend: &mut dyn GasBackend,
    cmd: CommandId,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), SwitchError> {
    if input.len() > mrpc::INPUT_DATA_MAX {
        return Err(SwitchError::InputTooLarge {
            len: input.len(),
            max: mrpc::INPUT_DATA_MAX,
        });
    }
    if output.len() > mrpc::OUTPUT_DATA_MAX {
        return Err(SwitchError::OutputTooLarge {
            len: output.len(),
            max: mrpc::OUTPUT_DATA_MAX,
        });
    }

    tracing::trace!(cmd = format_args!("{:#x}", cmd.0), len = input.len(), "mrpc submit");

    // Stage the input in ascending dword writes, zero-padding the tail. The
    // command register is written last; that write is what arms the firmware.
    let mut addr = mrpc::GAS_INPUT_DATA;
    for chunk in input.chunks(4) {
        let mut dword = [0u8; 4];
        dword[..chunk.len()].copy_from_slice(chunk);
        backend.gas_write(addr, &dword)?;
        addr += 4;
    }
    backend.gas_write(mrpc::GAS_COMMAND, &cmd.0.to_le_bytes())?;

    let status = loop {
        let mut raw = [0u8; 4];
        backend.gas_read(mrpc::GAS_STATUS, &mut raw)?;
        let status = Status(u32::from_le_bytes(raw));
        if status != Status::INPROGRESS {
            break status;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    if status != Status::DONE {
        return Err(SwitchError::CommandStatus {
            cmd,
            status: status.0,
        });
    }

    let mut raw = [0u8; 4];
    backend.gas_read(mrpc::GAS_RET, &mut raw)?;
    let ret = u32::from_le_bytes(raw);
    if ret != 0 {
        return Err(SwitchError::CommandRet { cmd, ret });
    }

    let mut addr = mrpc::GAS_OUTPUT_DATA;
    for chunk in output.chunks_mut(4) {
        let mut dword = [0u8; 4];
        backend.gas_read(addr, &mut dword)?;
        let n = chunk.len();
        chunk.copy_from_slice(&dword[..n]);
        addr += 4;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn input_staged_before_command() {
        let mock = MockBackend::new();
        mock.expect(CommandId::ECHO, |input, output| {
            assert_eq!(&input[..4], &0x1234_5678u32.to_le_bytes());
            output[..4].copy_from_slice(&(!0x1234_5678u32).to_le_bytes());
            Ok(())
        });
        let mut backend = mock.clone();
        let mut out = [0u8; 4];
        run_command(
            &mut backend,
            CommandId::ECHO,
            &0x1234_5678u32.to_le_bytes(),
            &mut out,
        )
        .unwrap();
        assert_eq!(u32::from_le_bytes(out), !0x1234_5678u32);
        mock.verify();
    }

    #[test]
    fn nonzero_ret_is_an_error() {
        let mock = MockBackend::new();
        mock.expect_ret(CommandId::GFMS_BIND, mrpc::ret::ALREADY_BOUND);
        let mut backend = mock.clone();
        let err = run_command(&mut backend, CommandId::GFMS_BIND, &[0u8; 8], &mut []).unwrap_err();
        match err {
            SwitchError::CommandRet { cmd, ret } => {
                assert_eq!(cmd, CommandId::GFMS_BIND);
                assert_eq!(ret, mrpc::ret::ALREADY_BOUND);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn oversized_input_rejected() {
        let mut backend = MockBackend::new();
        let err = run_command(&mut backend, CommandId::ECHO, &[0u8; 1025], &mut []).unwrap_err();
        assert!(matches!(err, SwitchError::InputTooLarge { len: 1025, .. }));
    }
}
