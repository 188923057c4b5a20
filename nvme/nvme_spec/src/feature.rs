// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Feature identifiers and the management interface metadata format.

/// Feature identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Feature(pub u8);

impl Feature {
    pub const LBA_RANGE: Self = Self(0x03);
    pub const AUTO_PST: Self = Self(0x0c);
    pub const HOST_MEM_BUF: Self = Self(0x0d);
    pub const TIMESTAMP: Self = Self(0x0e);
    pub const PLM_CONFIG: Self = Self(0x13);
    pub const HOST_BEHAVIOR: Self = Self(0x16);
    pub const MI_CTRL_METADATA: Self = Self(0x7e);
    pub const MI_NS_METADATA: Self = Self(0x7f);
    pub const HOST_ID: Self = Self(0x81);

    /// Data buffer length for features that carry one, or zero for
    /// dword-only features.
    pub fn buffer_len(&self) -> usize {
        match *self {
            Self::LBA_RANGE => 4096,
            Self::AUTO_PST => 256,
            Self::HOST_MEM_BUF => 256,
            Self::TIMESTAMP => 8,
            Self::PLM_CONFIG => 512,
            Self::HOST_BEHAVIOR => 512,
            Self::HOST_ID => 8,
            Self::MI_CTRL_METADATA => 4096,
            Self::MI_NS_METADATA => 4096,
            _ => 0,
        }
    }
}

/// Get features command dword 10.
pub fn get_cdw10(fid: Feature, sel: u8) -> u32 {
    fid.0 as u32 | (sel as u32) << 8
}

/// Set features command dword 10.
pub fn set_cdw10(fid: Feature, save: bool) -> u32 {
    fid.0 as u32 | (save as u32) << 31
}

/// Builds the metadata payload for the management interface metadata
/// features. The payload is a count byte, a reserved byte, then a series of
/// type/revision/length-prefixed elements.
#[derive(Default)]
pub struct MiMetadataBuilder {
    elements: Vec<(u8, u8, Vec<u8>)>,
}

impl MiMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, typ: u8, rev: u8, value: &[u8]) -> Self {
        self.elements.push((typ, rev, value.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buf = vec![0u8; 2];
        buf[0] = self.elements.len() as u8;
        for (typ, rev, value) in self.elements {
            buf.push(typ);
            buf.push(rev);
            buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
            buf.extend_from_slice(&value);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_elements_packed() {
        let buf = MiMetadataBuilder::new()
            .element(1, 0, b"linux")
            .element(2, 0, b"6.6")
            .build();
        // Only the packed prefix, no padding out to the feature buffer.
        assert_eq!(buf.len(), 18);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[2..6], &[1, 0, 5, 0]);
        assert_eq!(&buf[6..11], b"linux");
        assert_eq!(&buf[11..15], &[2, 0, 3, 0]);
        assert_eq!(&buf[15..18], b"6.6".as_ref());
    }

    #[test]
    fn feature_dwords() {
        assert_eq!(get_cdw10(Feature::TIMESTAMP, 0), 0x0e);
        assert_eq!(set_cdw10(Feature::TIMESTAMP, true), 0x0e | 1 << 31);
        assert_eq!(Feature::HOST_ID.buffer_len(), 8);
    }
}
