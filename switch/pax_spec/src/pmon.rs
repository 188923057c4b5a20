// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Performance-monitor (bandwidth counter) structures.

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// What the per-port counters accumulate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BandwidthType(pub u8);

impl BandwidthType {
    /// Full TLP bytes including headers.
    pub const RAW: BandwidthType = BandwidthType(0);
    /// Payload bytes only.
    pub const PAYLOAD: BandwidthType = BandwidthType(1);
}

/// Sub-commands of `PMON`.
pub mod pmon {
    pub const BW_SET_ALL: u8 = 1;
    pub const BW_GET: u8 = 2;
}

/// Input frame for [`pmon::BW_SET_ALL`]: arm every port's counters with the
/// requested type and reset them.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BwSetInput {
    pub subcmd: u8,
    pub bw_type: u8,
    pub rsvd: u16,
}

/// Input frame for [`pmon::BW_GET`]. The reply is a [`BwGetReplyHdr`]
/// followed by `count` [`PortBandwidth`] records; callers page through ports
/// with `start_port` until a short reply.
#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BwGetInput {
    pub subcmd: u8,
    pub clear: u8,
    pub start_port: u8,
    pub count: u8,
}

#[repr(C)]
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BwGetReplyHdr {
    pub count: u8,
    pub rsvd: [u8; 3],
}

/// Identity of a switch port within its partition.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PortId {
    pub partition: u8,
    pub phys_port_id: u8,
    pub log_port_id: u8,
    pub stack: u8,
    pub stack_port: u8,
    /// Non-zero for an upstream (host-facing) port.
    pub upstream: u8,
}

/// Byte counts for one traffic direction.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BandwidthDir {
    pub posted: u64,
    pub nonposted: u64,
    pub completion: u64,
}

impl BandwidthDir {
    pub fn total(&self) -> u64 {
        self.posted
            .wrapping_add(self.nonposted)
            .wrapping_add(self.completion)
    }

    fn subtract(&mut self, earlier: &BandwidthDir) {
        self.posted = self.posted.wrapping_sub(earlier.posted);
        self.nonposted = self.nonposted.wrapping_sub(earlier.nonposted);
        self.completion = self.completion.wrapping_sub(earlier.completion);
    }
}

/// One port's snapshot in a [`pmon::BW_GET`] reply.
#[repr(C)]
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PortBandwidth {
    pub port: PortId,
    pub rsvd: u16,
    pub time_us: u64,
    pub egress: BandwidthDir,
    pub ingress: BandwidthDir,
}

impl PortBandwidth {
    /// Turn two snapshots into an interval: counters and timebase become
    /// deltas relative to `earlier`.
    pub fn subtract(&mut self, earlier: &PortBandwidth) {
        self.time_us = self.time_us.wrapping_sub(earlier.time_us);
        self.egress.subtract(&earlier.egress);
        self.ingress.subtract(&earlier.ingress);
    }
}

/// Ports per [`pmon::BW_GET`] reply.
pub const BW_GET_MAX_PORTS: usize = (crate::mrpc::OUTPUT_DATA_MAX
    - core::mem::size_of::<BwGetReplyHdr>())
    / core::mem::size_of::<PortBandwidth>();

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;
    use zerocopy::FromZeros;

    #[test]
    fn record_layout() {
        assert_eq!(size_of::<PortBandwidth>(), 64);
        assert_eq!(BW_GET_MAX_PORTS, 15);
    }

    #[test]
    fn snapshot_subtraction() {
        let mut end = PortBandwidth {
            port: PortId::new_zeroed(),
            rsvd: 0,
            time_us: 5_000_000,
            egress: BandwidthDir {
                posted: 1000,
                nonposted: 200,
                completion: 30,
            },
            ingress: BandwidthDir {
                posted: 50,
                nonposted: 5,
                completion: 1,
            },
        };
        let start = PortBandwidth {
            time_us: 1_000_000,
            egress: BandwidthDir {
                posted: 100,
                nonposted: 100,
                completion: 10,
            },
            ingress: BandwidthDir::default(),
            ..end
        };
        end.subtract(&start);
        assert_eq!(end.time_us, 4_000_000);
        assert_eq!(end.egress.total(), 900 + 100 + 20);
        assert_eq!(end.ingress.total(), 56);
    }
}
