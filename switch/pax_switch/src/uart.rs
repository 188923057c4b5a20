// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! UART backend.
//!
//! Out-of-band management consoles expose the GAS through a line-oriented
//! ASCII protocol: `gasrd`/`gaswr` requests, a hex value reply, and a `>`
//! prompt terminating every exchange. The codec lives in free functions so
//! framing is testable without a tty.

use crate::SwitchError;
use crate::backend::GasBackend;
use nix::sys::termios;
use nix::sys::termios::BaudRate;
use nix::sys::termios::SetArg;
use nix::sys::termios::SpecialCharacterIndices;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

const PROMPT: u8 = b'>';
const RETRIES: usize = 3;

pub(crate) struct UartBackend {
    file: File,
}

impl UartBackend {
    pub fn open(path: &Path) -> Result<Self, SwitchError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| SwitchError::Open {
                path: path.to_owned(),
                source,
            })?;

        let mut attrs = termios::tcgetattr(&file).map_err(|errno| SwitchError::Open {
            path: path.to_owned(),
            source: errno.into(),
        })?;
        termios::cfmakeraw(&mut attrs);
        termios::cfsetspeed(&mut attrs, BaudRate::B115200).map_err(std::io::Error::from)?;
        // Reads return whatever arrived within a 1s window.
        attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = 10;
        termios::tcsetattr(&file, SetArg::TCSANOW, &attrs).map_err(std::io::Error::from)?;

        Ok(UartBackend { file })
    }

    /// Sends one request line and collects the reply up to the prompt.
    fn exchange(&mut self, request: &str) -> Result<String, SwitchError> {
        self.file.write_all(request.as_bytes())?;
        self.file.flush()?;

        let mut reply = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = self.file.read(&mut chunk)?;
            if n == 0 {
                return Err(SwitchError::UartFraming(format!(
                    "timed out waiting for prompt after {request:?}"
                )));
            }
            reply.extend_from_slice(&chunk[..n]);
            if chunk[..n].contains(&PROMPT) {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    fn retry<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, SwitchError>,
    ) -> Result<T, SwitchError> {
        let mut last = None;
        for attempt in 0..RETRIES {
            match f(self) {
                Ok(v) => return Ok(v),
                Err(err @ SwitchError::UartFraming(_)) => {
                    tracing::debug!(attempt, error = %err, "uart exchange failed, retrying");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap())
    }
}

impl GasBackend for UartBackend {
    fn gas_read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), SwitchError> {
        if !matches!(buf.len(), 1 | 2 | 4 | 8) {
            return Err(SwitchError::InvalidAccessWidth(buf.len()));
        }
        let request = encode_gas_read(addr, buf.len());
        let value = self.retry(|uart| {
            let reply = uart.exchange(&request)?;
            parse_value_reply(&reply)
        })?;
        buf.copy_from_slice(&value.to_le_bytes()[..buf.len()]);
        Ok(())
    }

    fn gas_write(&mut self, addr: u64, buf: &[u8]) -> Result<(), SwitchError> {
        if !matches!(buf.len(), 1 | 2 | 4 | 8) {
            return Err(SwitchError::InvalidAccessWidth(buf.len()));
        }
        let mut bytes = [0u8; 8];
        bytes[..buf.len()].copy_from_slice(buf);
        let request = encode_gas_write(addr, u64::from_le_bytes(bytes), buf.len());
        self.retry(|uart| {
            let reply = uart.exchange(&request)?;
            if reply.contains("error") {
                return Err(SwitchError::UartFraming(format!(
                    "write rejected: {}",
                    reply.trim()
                )));
            }
            Ok(())
        })
    }

    fn system_path(&self, _subpath: &str) -> Result<PathBuf, SwitchError> {
        Err(std::io::Error::from(std::io::ErrorKind::NotFound).into())
    }
}

fn encode_gas_read(addr: u64, len: usize) -> String {
    format!("gasrd -s {addr:x} {len}\r")
}

fn encode_gas_write(addr: u64, value: u64, len: usize) -> String {
    format!("gaswr -s {addr:x} 0x{value:x} {len}\r")
}

/// Extracts the value from a read reply. The console echoes the request,
/// prints the value as a `0x` hex literal on its own line, then prompts.
fn parse_value_reply(reply: &str) -> Result<u64, SwitchError> {
    reply
        .lines()
        .rev()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(PROMPT as char).trim();
            line.strip_prefix("0x")
        })
        .find_map(|hex| u64::from_str_radix(hex, 16).ok())
        .ok_or_else(|| SwitchError::UartFraming(format!("no value in reply {reply:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_framing() {
        assert_eq!(encode_gas_read(0x800, 4), "gasrd -s 800 4\r");
        assert_eq!(encode_gas_write(0x2048, 0xdead_beef, 4), "gaswr -s 2048 0xdeadbeef 4\r");
    }

    #[test]
    fn value_reply_parsing() {
        let reply = "gasrd -s 800 4\r\n0xcafef00d\r\n> ";
        assert_eq!(parse_value_reply(reply).unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn garbled_reply_is_framing_error() {
        assert!(matches!(
            parse_value_reply("gasrd -s 800 4\r\n?\r\n> "),
            Err(SwitchError::UartFraming(_))
        ));
    }
}
