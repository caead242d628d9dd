//! Enum for the different FAT types (FAT12, FAT16, FAT32).
//!
//! The variant is decided by the number of data clusters only. Everything that
//! depends on it (entry width, end-of-chain threshold, entry decoding) hangs off
//! the enum so that the two can never disagree.

use std::fmt;

use crate::utils::{u16_at, u32_at};

/// Represents the different types of FAT filesystems.
///
/// # Values
/// - `FAT12`: 12-bit File Allocation Table entries
/// - `FAT16`: 16-bit File Allocation Table entries
/// - `FAT32`: 28-bit entries stored on 32 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FATType {
    FAT12,
    FAT16,
    FAT32,
}

impl FATType {
    /// Classifies a volume from its count of data clusters.
    ///
    /// - `FAT12` if cluster count < 4085
    /// - `FAT16` if cluster count < 65525
    /// - `FAT32` otherwise
    pub fn from_cluster_count(clus_cnt: u32) -> Self {
        if clus_cnt < 4085 {
            FATType::FAT12
        } else if clus_cnt < 65525 {
            FATType::FAT16
        } else {
            FATType::FAT32
        }
    }

    /// Smallest masked FAT value marking the end of a cluster chain.
    pub fn eoc(&self) -> u32 {
        match self {
            FATType::FAT12 => 0x0FF8,
            FATType::FAT16 => 0xFFF8,
            FATType::FAT32 => 0x0FFF_FFF8,
        }
    }

    /// Width of a FAT entry in bits, as stored on disk.
    pub fn entry_bit_sz(&self) -> u32 {
        match self {
            FATType::FAT12 => 12,
            FATType::FAT16 => 16,
            FATType::FAT32 => 32,
        }
    }

    /// Number of bytes to read at [`FATType::entry_offset`] to get one entry.
    pub fn entry_read_sz(&self) -> usize {
        match self {
            FATType::FAT12 | FATType::FAT16 => 2,
            FATType::FAT32 => 4,
        }
    }

    /// Byte offset of the entry of `cluster` from the start of the FAT.
    pub fn entry_offset(&self, cluster: u32) -> u64 {
        let cluster = cluster as u64;
        match self {
            FATType::FAT12 => cluster + cluster / 2,
            FATType::FAT16 => cluster * 2,
            FATType::FAT32 => cluster * 4,
        }
    }

    /// Decodes the entry of `cluster` from the bytes read at its entry offset.
    ///
    /// For FAT12, two entries share three bytes: odd clusters use the high
    /// 12 bits of the 16-bit word, even clusters the low 12 bits.
    ///
    /// # Panics
    /// Panics if `raw` is shorter than [`FATType::entry_read_sz`].
    pub fn decode_entry(&self, cluster: u32, raw: &[u8]) -> u32 {
        match self {
            FATType::FAT12 => {
                let val = u16_at(raw, 0) as u32;
                if cluster & 1 == 1 { val >> 4 } else { val & 0x0FFF }
            }
            FATType::FAT16 => u16_at(raw, 0) as u32,
            FATType::FAT32 => u32_at(raw, 0) & 0x0FFF_FFFF,
        }
    }
}

impl fmt::Display for FATType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FATType::FAT12 => "FAT12",
            FATType::FAT16 => "FAT16",
            FATType::FAT32 => "FAT32",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(FATType::from_cluster_count(0), FATType::FAT12);
        assert_eq!(FATType::from_cluster_count(4084), FATType::FAT12);
        assert_eq!(FATType::from_cluster_count(4085), FATType::FAT16);
        assert_eq!(FATType::from_cluster_count(65524), FATType::FAT16);
        assert_eq!(FATType::from_cluster_count(65525), FATType::FAT32);
    }

    #[test]
    fn fat12_nibble_selection() {
        // Clusters 2 and 3 share bytes 3..6 of the FAT: 0x009 and 0x005.
        let fat = [0u8, 0, 0, 0x09, 0x50, 0x00];

        let even = FATType::FAT12.entry_offset(2) as usize;
        let odd = FATType::FAT12.entry_offset(3) as usize;
        assert_eq!((even, odd), (3, 4));

        assert_eq!(FATType::FAT12.decode_entry(2, &fat[even..]), 9);
        assert_eq!(FATType::FAT12.decode_entry(3, &fat[odd..]), 5);
    }

    #[test]
    fn fat32_entries_are_masked_to_28_bits() {
        let raw = 0xF000_0007u32.to_le_bytes();
        assert_eq!(FATType::FAT32.decode_entry(5, &raw), 7);
        assert_eq!(FATType::FAT32.entry_offset(5), 20);
    }
}
