// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tunneled NVMe admin passthrough.
//!
//! An admin command larger than the MRPC windows is carried in phases:
//! start stages the 72-byte submission entry and data length, data chunks
//! stage the write payload, exec issues the command, and fetch pages the
//! completion data back out. Each phase is one `EP_RESOURCE_ACCESS` call.

use crate::Switch;
use crate::SwitchError;
use pax_spec::mrpc::CommandId;
use pax_spec::mrpc::ep_resource;
use zerocopy::IntoBytes;

/// Size of the staged admin submission entry.
pub const ADMIN_CMD_LEN: usize = 72;

/// Outcome of a tunneled admin command.
#[derive(Debug, Clone)]
pub struct AdminResponse {
    /// NVMe completion status, phase bit stripped.
    pub status: u32,
    /// Command-specific completion dword.
    pub result: u32,
    /// Completion data, empty unless the command succeeded and data was
    /// requested.
    pub data: Vec<u8>,
}

impl Switch {
    /// Runs one NVMe admin command against the endpoint function `pdfid`.
    ///
    /// The tunnel is made enabled before the command is staged. A non-zero
    /// NVMe status is returned in the response, not as an error; transport
    /// failures are errors.
    pub fn admin_passthru(
        &mut self,
        pdfid: u16,
        sqe: &[u8; ADMIN_CMD_LEN],
        write_data: &[u8],
        read_len: usize,
    ) -> Result<AdminResponse, SwitchError> {
        self.ensure_ep_tunnel(pdfid)?;

        let header = |subcmd| ep_resource::Header {
            subcmd,
            pdfid,
            rsvd: 0,
        };

        let data_len = write_data.len().max(read_len) as u32;
        let mut frame = header(ep_resource::NVME_START).as_bytes().to_vec();
        frame.extend_from_slice(&data_len.to_le_bytes());
        frame.extend_from_slice(sqe);
        self.run_command(CommandId::EP_RESOURCE_ACCESS, &frame, &mut [])?;

        for (i, chunk) in write_data.chunks(ep_resource::DATA_CHUNK_MAX).enumerate() {
            let mut frame = header(ep_resource::NVME_DATA).as_bytes().to_vec();
            let desc = ep_resource::Chunk {
                offset: (i * ep_resource::DATA_CHUNK_MAX) as u32,
                len: chunk.len() as u32,
            };
            frame.extend_from_slice(desc.as_bytes());
            frame.extend_from_slice(chunk);
            self.run_command(CommandId::EP_RESOURCE_ACCESS, &frame, &mut [])?;
        }

        let mut frame = header(ep_resource::NVME_EXEC).as_bytes().to_vec();
        frame.extend_from_slice(&(read_len as u32).to_le_bytes());
        let completion: ep_resource::NvmeCompletion =
            self.run(CommandId::EP_RESOURCE_ACCESS, frame.as_slice())?;

        let mut data = Vec::new();
        if completion.status == 0 && read_len > 0 {
            data.reserve(read_len);
            while data.len() < read_len {
                let len = (read_len - data.len()).min(ep_resource::FETCH_CHUNK_MAX);
                let mut frame = header(ep_resource::NVME_FETCH).as_bytes().to_vec();
                let desc = ep_resource::Chunk {
                    offset: data.len() as u32,
                    len: len as u32,
                };
                frame.extend_from_slice(desc.as_bytes());
                let mut chunk = vec![0u8; len];
                self.run_command(CommandId::EP_RESOURCE_ACCESS, &frame, &mut chunk)?;
                data.extend_from_slice(&chunk);
            }
        }

        Ok(AdminResponse {
            status: completion.status,
            result: completion.result,
            data,
        })
    }
}
