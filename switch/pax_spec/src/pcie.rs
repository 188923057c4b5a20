// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! PCIe configuration-space constants used for endpoint CSR access.

/// Config-space offset of the capabilities pointer.
pub const CAP_POINTER: u16 = 0x34;
/// The low two bits of a capability pointer are reserved.
pub const CAP_POINTER_MASK: u8 = 0xfc;
/// Offset of the next-capability pointer within a capability.
pub const CAP_NEXT: u16 = 1;
/// Capability id of the PCI Express capability.
pub const CAP_ID_PCIE: u8 = 0x10;
/// Offset of the Device Control register within the PCIe capability.
pub const PCIE_CAP_DEVCTL: u16 = 8;
/// Initiate Function Level Reset bit of Device Control.
pub const DEVCTL_FLR: u16 = 0x8000;
/// Capability-chain walk limit. Config space fits at most 48 capabilities.
pub const CAP_WALK_MAX: usize = 48;

/// Per-lane link rate in GB/s, indexed by `link_gen - 1`. Values account for
/// the 8b/10b (gen 1 and 2) and 128b/130b encodings.
pub const LINK_RATE_GBPS_X1: [f64; 5] = [0.25, 0.5, 0.985, 1.969, 3.938];

/// Data rate of a negotiated link in GB/s, zero when the generation is out
/// of table range.
pub fn link_rate_gbps(link_gen: u8, width: u8) -> f64 {
    match link_gen {
        1..=5 => LINK_RATE_GBPS_X1[usize::from(link_gen) - 1] * f64::from(width),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_rates() {
        assert_eq!(link_rate_gbps(3, 4), 0.985 * 4.0);
        assert_eq!(link_rate_gbps(4, 16), 1.969 * 16.0);
        assert_eq!(link_rate_gbps(0, 16), 0.0);
        assert_eq!(link_rate_gbps(6, 1), 0.0);
    }
}
