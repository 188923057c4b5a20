// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Log page definitions.
//!
//! The SMART log has a 16-bit temperature at byte offset 1, so the whole
//! structure is modeled with unaligned little-endian field types.

use bitfield_struct::bitfield;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::little_endian::U16;
use zerocopy::little_endian::U32;
use zerocopy::little_endian::U64;

/// Log page identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct LogPageId(pub u8);

impl LogPageId {
    pub const SMART: Self = Self(0x02);
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CriticalWarning {
    pub spare_below_threshold: bool,
    pub temperature: bool,
    pub reliability_degraded: bool,
    pub read_only: bool,
    pub backup_failed: bool,
    pub persistent_memory_read_only: bool,
    #[bits(2)]
    _rsvd: u8,
}

/// A 128-bit counter stored as two little-endian halves.
#[derive(Copy, Clone, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Counter128 {
    pub lo: U64,
    pub hi: U64,
}

impl Counter128 {
    /// Low 64 bits, which is the whole value for any counter a display
    /// format can represent.
    pub fn get(&self) -> u64 {
        self.lo.get()
    }
}

/// SMART / health information log page (log page 0x02).
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SmartLog {
    pub critical_warning: CriticalWarning,
    pub composite_temp: U16,
    pub avail_spare: u8,
    pub spare_thresh: u8,
    pub percent_used: u8,
    pub endurance_grp_critical_warning: u8,
    pub rsvd7: [u8; 25],
    pub data_units_read: Counter128,
    pub data_units_written: Counter128,
    pub host_reads: Counter128,
    pub host_writes: Counter128,
    pub ctrl_busy_time: Counter128,
    pub power_cycles: Counter128,
    pub power_on_hours: Counter128,
    pub unsafe_shutdowns: Counter128,
    pub media_errors: Counter128,
    pub num_err_log_entries: Counter128,
    pub warning_temp_time: U32,
    pub critical_comp_time: U32,
    pub temp_sensor: [U16; 8],
    pub thm_temp1_trans_count: U32,
    pub thm_temp2_trans_count: U32,
    pub thm_temp1_total_time: U32,
    pub thm_temp2_total_time: U32,
    pub rsvd232: [u8; 280],
}

pub const SMART_LOG_LEN: usize = 512;
const_assert_eq!(size_of::<SmartLog>(), SMART_LOG_LEN);

impl SmartLog {
    /// Composite temperature in degrees Celsius. The log stores Kelvin.
    pub fn composite_temp_celsius(&self) -> i32 {
        self.composite_temp.get() as i32 - 273
    }
}

/// Command dwords 10 and 11 for a get log page command reading `len` bytes.
pub fn get_log_cdw10_11(lid: LogPageId, lsp: u8, rae: bool, len: usize) -> (u32, u32) {
    let numd = (len / 4) as u32 - 1;
    let cdw10 = lid.0 as u32
        | ((lsp & 0xf) as u32) << 8
        | (rae as u32) << 15
        | (numd & 0xffff) << 16;
    let cdw11 = numd >> 16 & 0xffff;
    (cdw10, cdw11)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;
    use zerocopy::FromZeros;

    #[test]
    fn smart_log_layout() {
        assert_eq!(offset_of!(SmartLog, composite_temp), 1);
        assert_eq!(offset_of!(SmartLog, data_units_read), 32);
        assert_eq!(offset_of!(SmartLog, warning_temp_time), 192);
        assert_eq!(offset_of!(SmartLog, temp_sensor), 200);
        assert_eq!(offset_of!(SmartLog, rsvd232), 232);
    }

    #[test]
    fn get_log_dwords() {
        let (cdw10, cdw11) = get_log_cdw10_11(LogPageId::SMART, 0, false, SMART_LOG_LEN);
        assert_eq!(cdw10, 0x02 | 127 << 16);
        assert_eq!(cdw11, 0);
    }

    #[test]
    fn kelvin_conversion() {
        let mut log = SmartLog::new_zeroed();
        log.composite_temp = U16::new(300);
        assert_eq!(log.composite_temp_celsius(), 27);
    }
}
