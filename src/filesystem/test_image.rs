//! In-memory FAT images for the unit tests.
//!
//! Images use 512-byte sectors and two FATs. Only the reserved, FAT and root
//! directory regions are allocated up front: the data region grows as clusters
//! are written, so even FAT32 images stay small.

use std::io::Cursor;

use super::fat_type::FATType;

pub(crate) const ATTR_READ_ONLY: u8 = 0x01;
pub(crate) const ATTR_VOLUME_ID: u8 = 0x08;
pub(crate) const ATTR_DIRECTORY: u8 = 0x10;
pub(crate) const ATTR_ARCHIVE: u8 = 0x20;
pub(crate) const ATTR_LONG_NAME: u8 = 0x0F;

const BYTES_PER_SEC: usize = 512;
const NUM_FAT: usize = 2;

pub(crate) struct TestImage {
    pub(crate) bytes: Vec<u8>,
    fat_type: FATType,
    sec_per_clus: usize,
    rsvd_sec_cnt: usize,
    fat_sz: usize,
    root_ent_cnt: usize,
}

impl TestImage {
    /// Creates a formatted image with one sector per cluster.
    pub(crate) fn new(fat_type: FATType, cluster_count: u32) -> Self {
        Self::with_sec_per_clus(fat_type, cluster_count, 1)
    }

    pub(crate) fn with_sec_per_clus(
        fat_type: FATType,
        cluster_count: u32,
        sec_per_clus: u8,
    ) -> Self {
        let (rsvd_sec_cnt, root_ent_cnt) = match fat_type {
            FATType::FAT32 => (32, 0),
            _ => (1, 512),
        };
        let entries = cluster_count as usize + 2;
        let fat_bytes = match fat_type {
            FATType::FAT12 => (entries * 3).div_ceil(2),
            FATType::FAT16 => entries * 2,
            FATType::FAT32 => entries * 4,
        };
        let fat_sz = fat_bytes.div_ceil(BYTES_PER_SEC);
        let root_secs = root_ent_cnt * 32 / BYTES_PER_SEC;
        let first_data = rsvd_sec_cnt + NUM_FAT * fat_sz + root_secs;
        let tot_sec = first_data + cluster_count as usize * sec_per_clus as usize;

        let mut image = TestImage {
            bytes: vec![0; first_data * BYTES_PER_SEC],
            fat_type,
            sec_per_clus: sec_per_clus as usize,
            rsvd_sec_cnt,
            fat_sz,
            root_ent_cnt,
        };
        image.write_boot_sector(tot_sec);

        image.set_fat(0, 0x0FFF_FFF8 & image.eoc_value());
        image.set_fat(1, image.eoc_value());
        if fat_type == FATType::FAT32 {
            image.write_fs_info();
            image.set_fat(2, image.eoc_value());
        }

        image
    }

    fn put(&mut self, offset: usize, data: &[u8]) {
        if self.bytes.len() < offset + data.len() {
            self.bytes.resize(offset + data.len(), 0);
        }
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn write_boot_sector(&mut self, tot_sec: usize) {
        let mut bs = [0u8; 512];
        bs[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        bs[3..11].copy_from_slice(b"MSWIN4.1");
        bs[11..13].copy_from_slice(&(BYTES_PER_SEC as u16).to_le_bytes());
        bs[13] = self.sec_per_clus as u8;
        bs[14..16].copy_from_slice(&(self.rsvd_sec_cnt as u16).to_le_bytes());
        bs[16] = NUM_FAT as u8;
        bs[17..19].copy_from_slice(&(self.root_ent_cnt as u16).to_le_bytes());
        bs[21] = 0xF8;
        bs[24..26].copy_from_slice(&63u16.to_le_bytes());
        bs[26..28].copy_from_slice(&255u16.to_le_bytes());

        if self.fat_type != FATType::FAT32 && tot_sec < 0x10000 {
            bs[19..21].copy_from_slice(&(tot_sec as u16).to_le_bytes());
        } else {
            bs[32..36].copy_from_slice(&(tot_sec as u32).to_le_bytes());
        }

        let ebr_start = match self.fat_type {
            FATType::FAT32 => {
                bs[36..40].copy_from_slice(&(self.fat_sz as u32).to_le_bytes());
                bs[44..48].copy_from_slice(&2u32.to_le_bytes());
                bs[48..50].copy_from_slice(&1u16.to_le_bytes());
                bs[50..52].copy_from_slice(&6u16.to_le_bytes());
                64
            }
            _ => {
                bs[22..24].copy_from_slice(&(self.fat_sz as u16).to_le_bytes());
                36
            }
        };
        bs[ebr_start] = 0x80;
        bs[ebr_start + 2] = 0x29;
        bs[ebr_start + 3..ebr_start + 7].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        bs[ebr_start + 7..ebr_start + 18].copy_from_slice(b"NO NAME    ");
        let fs_type: &[u8; 8] = match self.fat_type {
            FATType::FAT12 => b"FAT12   ",
            FATType::FAT16 => b"FAT16   ",
            FATType::FAT32 => b"FAT32   ",
        };
        bs[ebr_start + 18..ebr_start + 26].copy_from_slice(fs_type);

        bs[510] = 0x55;
        bs[511] = 0xAA;
        self.put(0, &bs);
    }

    fn write_fs_info(&mut self) {
        let mut sec = [0u8; 512];
        sec[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
        sec[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
        sec[488..492].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        sec[492..496].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        sec[508..512].copy_from_slice(&0xAA55_0000u32.to_le_bytes());
        self.put(BYTES_PER_SEC, &sec);
    }

    /// Overwrites the free-cluster count of the FSInfo sector.
    pub(crate) fn set_fs_info_free_count(&mut self, free_count: u32) {
        self.put(BYTES_PER_SEC + 488, &free_count.to_le_bytes());
    }

    /// Overwrites raw bytes of the boot sector.
    pub(crate) fn patch(&mut self, offset: usize, data: &[u8]) {
        self.put(offset, data);
    }

    pub(crate) fn eoc_value(&self) -> u32 {
        match self.fat_type {
            FATType::FAT12 => 0x0FFF,
            FATType::FAT16 => 0xFFFF,
            FATType::FAT32 => 0x0FFF_FFFF,
        }
    }

    pub(crate) fn cluster_size(&self) -> usize {
        self.sec_per_clus * BYTES_PER_SEC
    }

    fn first_data_sector(&self) -> usize {
        self.rsvd_sec_cnt + NUM_FAT * self.fat_sz + self.root_ent_cnt * 32 / BYTES_PER_SEC
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        (self.first_data_sector() + (cluster as usize - 2) * self.sec_per_clus) * BYTES_PER_SEC
    }

    /// Writes `value` in the entry of `cluster` of every FAT.
    pub(crate) fn set_fat(&mut self, cluster: u32, value: u32) {
        for i in 0..NUM_FAT {
            let fat_start = (self.rsvd_sec_cnt + i * self.fat_sz) * BYTES_PER_SEC;
            let off = fat_start + self.fat_type.entry_offset(cluster) as usize;
            match self.fat_type {
                FATType::FAT12 => {
                    let value = value & 0x0FFF;
                    if cluster & 1 == 1 {
                        self.bytes[off] = (self.bytes[off] & 0x0F) | ((value << 4) as u8 & 0xF0);
                        self.bytes[off + 1] = (value >> 4) as u8;
                    } else {
                        self.bytes[off] = value as u8;
                        self.bytes[off + 1] =
                            (self.bytes[off + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
                    }
                }
                FATType::FAT16 => self.put(off, &(value as u16).to_le_bytes()),
                FATType::FAT32 => self.put(off, &value.to_le_bytes()),
            }
        }
    }

    /// Links `clusters` in order and terminates the chain.
    pub(crate) fn chain(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(last) = clusters.last() {
            self.set_fat(*last, self.eoc_value());
        }
    }

    /// Writes `data` across `clusters`, one cluster-sized chunk each, and links them.
    pub(crate) fn write_chain(&mut self, clusters: &[u32], data: &[u8]) {
        assert!(data.len() <= clusters.len() * self.cluster_size());
        self.chain(clusters);
        let cluster_size = self.cluster_size();
        for (i, cluster) in clusters.iter().enumerate() {
            let off = self.cluster_offset(*cluster);
            let mut chunk = vec![0u8; cluster_size];
            let start = (i * cluster_size).min(data.len());
            let end = ((i + 1) * cluster_size).min(data.len());
            chunk[..end - start].copy_from_slice(&data[start..end]);
            self.put(off, &chunk);
        }
    }

    /// Writes directory records across `clusters`.
    pub(crate) fn write_dir(&mut self, clusters: &[u32], records: &[[u8; 32]]) {
        self.write_chain(clusters, &records.concat());
    }

    /// Writes the records of the root directory, in the fixed region or in cluster 2.
    pub(crate) fn write_root(&mut self, records: &[[u8; 32]]) {
        match self.fat_type {
            FATType::FAT32 => self.write_dir(&[2], records),
            _ => {
                assert!(records.len() <= self.root_ent_cnt);
                let off = (self.rsvd_sec_cnt + NUM_FAT * self.fat_sz) * BYTES_PER_SEC;
                self.put(off, &records.concat());
            }
        }
    }

    pub(crate) fn cursor(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.bytes)
    }
}

/// Builds an 11-byte space-padded short name from "NAME" and "EXT".
pub(crate) fn short_name(name: &str, ext: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    out
}

/// Builds a short-name record.
pub(crate) fn short_entry(name: [u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut rec = [0u8; 32];
    rec[0..11].copy_from_slice(&name);
    rec[11] = attr;
    // 2024-03-15 12:30:10
    rec[22..24].copy_from_slice(&((12u16 << 11) | (30 << 5) | 5).to_le_bytes());
    rec[24..26].copy_from_slice(&(((2024u16 - 1980) << 9) | (3 << 5) | 15).to_le_bytes());
    rec[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    rec[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    rec[28..32].copy_from_slice(&size.to_le_bytes());
    rec
}

/// Builds the "." and ".." records of a subdirectory.
pub(crate) fn dot_entries(cluster: u32, parent_cluster: u32) -> [[u8; 32]; 2] {
    [
        short_entry(*b".          ", ATTR_DIRECTORY, cluster, 0),
        short_entry(*b"..         ", ATTR_DIRECTORY, parent_cluster, 0),
    ]
}

fn lfn_checksum(short: &[u8; 11]) -> u8 {
    short
        .iter()
        .fold(0u8, |sum, b| (sum >> 1).wrapping_add(sum << 7).wrapping_add(*b))
}

/// Builds the long-name records of `long`, in physical order (last fragment first).
pub(crate) fn lfn_entries(long: &str, short: &[u8; 11]) -> Vec<[u8; 32]> {
    let mut units: Vec<u16> = long.encode_utf16().collect();
    if units.len() % 13 != 0 {
        units.push(0x0000);
        while units.len() % 13 != 0 {
            units.push(0xFFFF);
        }
    }

    let checksum = lfn_checksum(short);
    let count = units.len() / 13;
    let mut records: Vec<[u8; 32]> = units
        .chunks(13)
        .enumerate()
        .map(|(i, chunk)| {
            let mut rec = [0u8; 32];
            rec[0] = (i + 1) as u8 | if i + 1 == count { 0x40 } else { 0 };
            rec[11] = ATTR_LONG_NAME;
            rec[13] = checksum;
            let offsets = (0..5)
                .map(|k| 1 + 2 * k)
                .chain((0..6).map(|k| 14 + 2 * k))
                .chain((0..2).map(|k| 28 + 2 * k));
            for (unit, off) in chunk.iter().zip(offsets) {
                rec[off..off + 2].copy_from_slice(&unit.to_le_bytes());
            }
            rec
        })
        .collect();
    records.reverse();
    records
}

/// Builds a long-named entry: its long-name records followed by the short record.
pub(crate) fn named_entry(
    long: &str,
    short: [u8; 11],
    attr: u8,
    cluster: u32,
    size: u32,
) -> Vec<[u8; 32]> {
    let mut records = lfn_entries(long, &short);
    records.push(short_entry(short, attr, cluster, size));
    records
}

/// A deleted record.
pub(crate) fn deleted_entry() -> [u8; 32] {
    let mut rec = short_entry(short_name("GONE", "TXT"), ATTR_ARCHIVE, 0, 0);
    rec[0] = 0xE5;
    rec
}
