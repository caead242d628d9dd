//! Volume geometry.
//!
//! Every layout constant of an open volume is derived once from the boot
//! sector and stored in [`VolumeGeometry`], which never changes afterwards.

use getset::{CopyGetters, Getters};
use log::debug;
use std::fmt;
use std::io;

use super::bpb::BootSector;
use super::fat_error::FATError;
use super::fat_type::FATType;
use crate::constants::FSI_UNKNOWN_FREE_COUNT;
use crate::utils::read_at;

/// Number of FAT entries read at once by the free-space scan.
const SCAN_BATCH: u32 = 4096;

/// Where the root directory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLocation {
    /// FAT12/16: a fixed run of sectors right after the FATs.
    Region { first_sector: u32, sector_count: u32 },
    /// FAT32: a regular cluster chain.
    Cluster(u32),
}

/// Layout of a FAT volume.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct VolumeGeometry {
    /// Decoded boot sector, kept for display
    #[getset(get = "pub")]
    boot_sector: BootSector,
    #[getset(get_copy = "pub")]
    fat_type: FATType,
    #[getset(get_copy = "pub")]
    bytes_per_sec: u32,
    #[getset(get_copy = "pub")]
    sec_per_clus: u32,
    #[getset(get_copy = "pub")]
    bytes_per_clus: u32,
    #[getset(get_copy = "pub")]
    rsvd_sec_cnt: u32,
    #[getset(get_copy = "pub")]
    num_fat: u32,
    /// Size of one FAT in sectors
    #[getset(get_copy = "pub")]
    fat_sz: u32,
    /// Sectors of the FAT12/16 root directory region, 0 for FAT32
    #[getset(get_copy = "pub")]
    root_dir_sectors: u32,
    #[getset(get_copy = "pub")]
    root: RootLocation,
    #[getset(get_copy = "pub")]
    first_data_sector: u32,
    #[getset(get_copy = "pub")]
    tot_sec: u32,
    /// Number of clusters of the data region
    #[getset(get_copy = "pub")]
    cluster_count: u32,
    #[getset(get_copy = "pub")]
    free_space: u64,
    #[getset(get_copy = "pub")]
    total_space: u64,
}

impl VolumeGeometry {
    /// Reads the boot sector of `reader` and derives the volume layout.
    ///
    /// The free space is taken from FSInfo on FAT32 volumes when it is known,
    /// otherwise every FAT entry of the data region is scanned.
    ///
    /// # Errors
    /// - Any error of [`BootSector::from`]
    /// - `FATError::IOError` if the FAT cannot be read for the free-space scan
    pub fn from_reader<T: io::Read + io::Seek>(
        reader: &mut T,
        validate: bool,
    ) -> Result<Self, FATError> {
        let boot_sector = BootSector::from(reader, validate)?;
        let mut geometry = Self::from_boot_sector(boot_sector);
        geometry.free_space = geometry.compute_free_space(reader)?;
        Ok(geometry)
    }

    fn from_boot_sector(boot_sector: BootSector) -> Self {
        let bpb = boot_sector.bpb();
        let bytes_per_sec = bpb.bytes_per_sec() as u32;
        let sec_per_clus = bpb.sec_per_clus() as u32;
        let rsvd_sec_cnt = bpb.rsvd_sec_cnt() as u32;
        let num_fat = bpb.num_fat() as u32;
        let fat_sz = boot_sector.fat_sz();
        let root_dir_sectors = boot_sector.root_dir_sectors();
        let fat_type = boot_sector.fat_type();
        let cluster_count = boot_sector.cluster_count();

        let root_start = rsvd_sec_cnt + num_fat * fat_sz;
        let root = match boot_sector.root_clus() {
            Some(root_clus) if fat_type == FATType::FAT32 => RootLocation::Cluster(root_clus),
            _ => RootLocation::Region {
                first_sector: root_start,
                sector_count: root_dir_sectors,
            },
        };
        let bytes_per_clus = bytes_per_sec * sec_per_clus;

        VolumeGeometry {
            fat_type,
            bytes_per_sec,
            sec_per_clus,
            bytes_per_clus,
            rsvd_sec_cnt,
            num_fat,
            fat_sz,
            root_dir_sectors,
            root,
            first_data_sector: root_start + root_dir_sectors,
            tot_sec: boot_sector.tot_sec(),
            cluster_count,
            free_space: 0,
            total_space: cluster_count as u64 * bytes_per_clus as u64,
            boot_sector,
        }
    }

    fn compute_free_space<T: io::Read + io::Seek>(&self, reader: &mut T) -> Result<u64, FATError> {
        let fsi_free = self
            .boot_sector
            .fs_info()
            .as_ref()
            .map(|fs_info| fs_info.free_count())
            .filter(|free| *free != FSI_UNKNOWN_FREE_COUNT);

        let free_clusters = match fsi_free {
            Some(free) if free <= self.cluster_count => free,
            Some(free) => {
                debug!(
                    "FSInfo reports {free} free clusters out of {}, scanning the FAT instead",
                    self.cluster_count
                );
                self.count_free_clusters(reader)?
            }
            None => self.count_free_clusters(reader)?,
        };

        Ok(free_clusters as u64 * self.bytes_per_clus as u64)
    }

    /// Counts the data clusters whose FAT entry is 0, reading FAT #0 by batches
    /// of [`SCAN_BATCH`] entries.
    fn count_free_clusters<T: io::Read + io::Seek>(&self, reader: &mut T) -> Result<u32, FATError> {
        if self.cluster_count == 0 {
            return Ok(0);
        }

        let last = self.max_cluster();
        let mut fat = Vec::new();
        let mut free = 0;
        let mut first: u32 = 2;

        loop {
            let end = first.saturating_add(SCAN_BATCH - 1).min(last);
            let start = self.fat_type.entry_offset(first);
            let len = (self.fat_type.entry_offset(end) - start) as usize
                + self.fat_type.entry_read_sz();
            fat.resize(len, 0);
            read_at(reader, self.fat_start_byte() + start, &mut fat)?;

            free += (first..=end)
                .filter(|cluster| {
                    let off = (self.fat_type.entry_offset(*cluster) - start) as usize;
                    self.fat_type.decode_entry(*cluster, &fat[off..]) == 0
                })
                .count() as u32;

            if end == last {
                return Ok(free);
            }
            first = end + 1;
        }
    }

    /// Smallest FAT value marking the end of a cluster chain.
    pub fn eoc(&self) -> u32 {
        self.fat_type.eoc()
    }

    /// Highest valid data cluster number.
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count.saturating_add(1)
    }

    /// Whether `cluster` names a cluster of the data region.
    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        (2..=self.max_cluster()).contains(&cluster)
    }

    /// Absolute byte offset of FAT #0.
    pub fn fat_start_byte(&self) -> u64 {
        self.rsvd_sec_cnt as u64 * self.bytes_per_sec as u64
    }

    /// Absolute byte offset of the first byte of a data cluster.
    ///
    /// The caller must check `cluster` with [`VolumeGeometry::is_data_cluster`].
    pub fn cluster_start_byte(&self, cluster: u32) -> u64 {
        let sector =
            (cluster as u64 - 2) * self.sec_per_clus as u64 + self.first_data_sector as u64;
        sector * self.bytes_per_sec as u64
    }

    /// Byte range `[start, end)` of the FAT12/16 root directory region.
    pub fn root_region_bytes(&self) -> Option<(u64, u64)> {
        match self.root {
            RootLocation::Region { first_sector, .. } => Some((
                first_sector as u64 * self.bytes_per_sec as u64,
                self.first_data_sector as u64 * self.bytes_per_sec as u64,
            )),
            RootLocation::Cluster(_) => None,
        }
    }
}

impl fmt::Display for VolumeGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type of FAT: {}", self.fat_type)?;
        writeln!(f, "======= Space information =======")?;
        writeln!(f, "Free space (MB = 10^6 Bytes): {}", self.free_space / 1_000_000)?;
        writeln!(f, "Free space (MB = 2^20 Bytes): {}", self.free_space >> 20)?;
        writeln!(f, "Total space (MB = 10^6 Bytes): {}", self.total_space / 1_000_000)?;
        writeln!(f, "Total space (MB = 2^20 Bytes): {}", self.total_space >> 20)?;
        writeln!(f, "======= Geometry =======")?;
        writeln!(f, "  {:<20} {}", "bytes_per_clus", self.bytes_per_clus)?;
        writeln!(f, "  {:<20} {}", "fat_sz", self.fat_sz)?;
        writeln!(f, "  {:<20} {}", "root_dir_sectors", self.root_dir_sectors)?;
        match self.root {
            RootLocation::Region { first_sector, .. } => {
                writeln!(f, "  {:<20} {}", "root_dir_sector", first_sector)?
            }
            RootLocation::Cluster(cluster) => {
                writeln!(f, "  {:<20} {}", "root_dir_cluster", cluster)?
            }
        }
        writeln!(f, "  {:<20} {}", "first_data_sector", self.first_data_sector)?;
        writeln!(f, "  {:<20} {}", "cluster_count", self.cluster_count)?;
        writeln!(f, "  {:<20} {}", "fat_entry_bits", self.fat_type.entry_bit_sz())?;
        writeln!(f, "  {:<20} 0x{:X}", "eoc", self.eoc())?;
        write!(f, "{}", self.boot_sector)
    }
}
