//! FAT boot sector structures.
//!
//! This module implements:
//! - BIOS Parameter Block (Bpb) parsing and validation
//! - Reading of the FAT32 or FAT12/16 extension block, depending on the FAT type
//! - Reading of the FAT32 FSInfo sector
//! - FAT type detection (FAT12/16/32)

use binread::{BinRead, BinReaderExt};
use getset::{CopyGetters, Getters};
use log::debug;
use std::fmt;
use std::io;

use super::fat_error::FATError;
use super::fat_type::FATType;
use crate::constants::{BOOT_SECTOR_SIZE, BPB_SIZE};
use crate::utils;

/// Common BIOS Parameter Block, shared by FAT12, FAT16 and FAT32.
///
/// These are the first 36 bytes of the boot sector.
#[derive(BinRead, Debug, Clone, Getters, CopyGetters)]
#[br(little)]
pub struct Bpb {
    /// Jump instruction to boot code (must be 0xEB ?? 0x90 or 0xE9 ?? ??)
    #[getset(get = "pub")]
    jmp: [u8; 3],
    /// OEM identifier (e.g., "MSWIN4.1")
    #[getset(get = "pub")]
    oem_name: [u8; 8],
    /// Number of bytes per sector (512, 1024, 2048, or 4096)
    #[getset(get_copy = "pub")]
    bytes_per_sec: u16,
    /// Number of sectors per cluster (power of 2)
    #[getset(get_copy = "pub")]
    sec_per_clus: u8,
    /// Number of reserved sectors from start of volume
    #[getset(get_copy = "pub")]
    rsvd_sec_cnt: u16,
    /// Number of FAT copies
    #[getset(get_copy = "pub")]
    num_fat: u8,
    /// Maximum number of root directory entries (0 for FAT32)
    #[getset(get_copy = "pub")]
    root_ent_cnt: u16,
    /// Total sectors for small volumes (0 when `tot_sec_32` is used)
    #[getset(get_copy = "pub")]
    tot_sec_16: u16,
    /// Media descriptor (0xF8 for fixed disk)
    #[getset(get_copy = "pub")]
    media: u8,
    /// Sectors per FAT for FAT12/FAT16 (0 for FAT32)
    #[getset(get_copy = "pub")]
    fat_sz_16: u16,
    /// Sectors per track
    #[getset(get_copy = "pub")]
    sec_per_trk: u16,
    /// Number of heads
    #[getset(get_copy = "pub")]
    num_heds: u16,
    /// Number of hidden sectors preceding the partition
    #[getset(get_copy = "pub")]
    hidd_sec: u32,
    /// Total sectors for large volumes
    #[getset(get_copy = "pub")]
    tot_sec_32: u32,
}

/// Extended boot record, found at offset 36 on FAT12/16 and at offset 64 on FAT32.
///
/// Only used for display purposes.
#[derive(BinRead, Debug, Clone, Getters, CopyGetters)]
#[br(little)]
pub struct ExtBootRecord {
    /// Drive number (0x80 for hard disk)
    #[getset(get_copy = "pub")]
    drv_num: u8,
    /// Reserved (used by Windows NT)
    #[getset(get_copy = "pub")]
    reserved_1: u8,
    /// Extended boot signature (0x29)
    #[getset(get_copy = "pub")]
    boot_sig: u8,
    /// Volume serial number
    #[getset(get_copy = "pub")]
    vol_id: u32,
    /// Volume label (11 bytes)
    #[getset(get = "pub")]
    vol_lab: [u8; 11],
    /// Filesystem type label (e.g. "FAT16   ")
    #[getset(get = "pub")]
    fil_sys_type: [u8; 8],
}

/// FAT32-specific part of the BPB, located right after the common part.
#[derive(BinRead, Debug, Clone, Getters, CopyGetters)]
#[br(little)]
pub struct Fat32Ext {
    /// Sectors per FAT
    #[getset(get_copy = "pub")]
    fat_sz_32: u32,
    /// FAT flags (mirroring, active FAT)
    #[getset(get_copy = "pub")]
    ext_flags: u16,
    /// Filesystem version (should be 0:0)
    #[getset(get_copy = "pub")]
    fs_ver: u16,
    /// First cluster of root directory (typically 2)
    #[getset(get_copy = "pub")]
    root_clus: u32,
    /// Sector number of FSINFO structure
    #[getset(get_copy = "pub")]
    fs_info: u16,
    /// Sector number of backup boot sector
    #[getset(get_copy = "pub")]
    bk_boot_sec: u16,
    /// Reserved for future expansion
    reserved: [u8; 12],
    /// Extended boot record
    #[getset(get = "pub")]
    ebr: ExtBootRecord,
}

/// FAT32 FSInfo sector.
#[derive(BinRead, Debug, Clone, CopyGetters)]
#[br(little)]
pub struct FsInfo {
    /// Lead signature (0x41615252)
    #[getset(get_copy = "pub")]
    lead_sig: u32,
    #[br(count = 480)]
    _reserved_1: Vec<u8>,
    /// Structure signature (0x61417272)
    #[getset(get_copy = "pub")]
    struc_sig: u32,
    /// Last known free cluster count, 0xFFFFFFFF if unknown
    #[getset(get_copy = "pub")]
    free_count: u32,
    /// Hint for the next free cluster
    #[getset(get_copy = "pub")]
    nxt_free: u32,
    _reserved_2: [u8; 12],
    /// Trail signature (0xAA550000)
    #[getset(get_copy = "pub")]
    trail_sig: u32,
}

impl FsInfo {
    const LEAD_SIG: u32 = 0x4161_5252;
    const STRUC_SIG: u32 = 0x6141_7272;

    fn has_valid_signatures(&self) -> bool {
        self.lead_sig == Self::LEAD_SIG && self.struc_sig == Self::STRUC_SIG
    }
}

/// The variant-specific block following the common BPB.
#[derive(Debug, Clone)]
pub enum BootExtension {
    Fat32(Fat32Ext),
    Legacy(ExtBootRecord),
}

impl BootExtension {
    /// Returns the extended boot record, whatever the variant.
    pub fn ebr(&self) -> &ExtBootRecord {
        match self {
            BootExtension::Fat32(ext) => ext.ebr(),
            BootExtension::Legacy(ebr) => ebr,
        }
    }
}

/// Decoded boot sector: BPB, extension block and, for FAT32, FSInfo.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct BootSector {
    #[getset(get = "pub")]
    bpb: Bpb,
    #[getset(get = "pub")]
    ext: BootExtension,
    #[getset(get = "pub")]
    fs_info: Option<FsInfo>,
    /// Boot sector signature, `None` if the source is shorter than one sector
    #[getset(get_copy = "pub")]
    sig: Option<[u8; 2]>,
    #[getset(get_copy = "pub")]
    fat_type: FATType,
}

impl BootSector {
    /// Reads the boot sector at the start of `reader` and optionally validates it.
    ///
    /// # Parameters
    /// - `reader`: The volume, starting at byte 0
    /// - `validate`: Whether to perform the FAT specification checks on the BPB
    ///
    /// # Returns
    /// - `Ok(BootSector)`: The parsed and optionally validated boot sector
    /// - `Err(FATError)`: If reading fails or the layout is inconsistent
    ///
    /// # Errors
    /// - `FATError::Format` if the source is shorter than the BPB
    /// - `FATError::IOError` if reading from the source fails
    /// - Various validation variants if the layout is inconsistent, or if
    ///   `validate` is true and a check of the FAT specification fails
    pub fn from<T: io::Read + io::Seek>(
        reader: &mut T,
        validate: bool,
    ) -> Result<BootSector, FATError> {
        let mut buf = vec![0; BOOT_SECTOR_SIZE];
        let len = utils::read_up_to(reader, 0, &mut buf)?;
        if len < BPB_SIZE {
            return Err(FATError::Format(format!(
                "The volume is {len} bytes long, shorter than the {BPB_SIZE}-byte BIOS Parameter Block."
            )));
        }
        buf.truncate(len);

        let bpb: Bpb = io::Cursor::new(&buf[..]).read_le()?;
        if bpb.bytes_per_sec == 0 {
            return Err(FATError::InvalidBytesPerSec(0));
        }
        if bpb.sec_per_clus == 0 {
            return Err(FATError::InvalidSecPerClus(0));
        }

        // The FAT32 block is needed first to know the FAT size, hence the cluster count.
        let mut fat32_ext = if bpb.fat_sz_16 == 0 {
            Some(Self::read_ext::<Fat32Ext>(&buf)?)
        } else {
            None
        };

        let fat_sz = Self::compute_fat_sz(&bpb, fat32_ext.as_ref());
        if fat_sz == 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "Both BPB_FATSz16 and BPB_FATSz32 are 0.",
            )));
        }
        let cluster_count = Self::compute_cluster_count(&bpb, fat_sz)?;
        let fat_type = FATType::from_cluster_count(cluster_count);

        // Entries 0 and 1 are reserved, every data cluster needs its own entry.
        let fat_bytes = fat_sz as u64 * bpb.bytes_per_sec as u64;
        let needed = (cluster_count as u64 + 2) * fat_type.entry_bit_sz() as u64;
        if needed.div_ceil(8) > fat_bytes {
            return Err(FATError::InvalidFatSz(format!(
                "A FAT of {fat_bytes} bytes cannot hold the {} entries of {cluster_count} clusters.",
                cluster_count as u64 + 2
            )));
        }

        let ext = match fat_type {
            FATType::FAT32 => match fat32_ext.take() {
                Some(ext) => BootExtension::Fat32(ext),
                None => BootExtension::Fat32(Self::read_ext(&buf)?),
            },
            _ => BootExtension::Legacy(Self::read_ext(&buf)?),
        };

        let fs_info = match &ext {
            BootExtension::Fat32(ext) => Self::read_fs_info(reader, &bpb, ext.fs_info)?,
            BootExtension::Legacy(_) => None,
        };

        let sig = (len >= BOOT_SECTOR_SIZE).then(|| [buf[510], buf[511]]);

        let boot_sector = BootSector {
            bpb,
            ext,
            fs_info,
            sig,
            fat_type,
        };

        if validate {
            boot_sector.validate()
        } else {
            Ok(boot_sector)
        }
    }

    fn read_ext<E: BinRead<Args = ()>>(buf: &[u8]) -> Result<E, FATError> {
        let mut reader = io::Cursor::new(buf);
        reader.set_position(BPB_SIZE as u64);
        reader.read_le().map_err(|err| {
            FATError::Format(format!(
                "The boot sector is too short for its extension block: {err}"
            ))
        })
    }

    fn read_fs_info<T: io::Read + io::Seek>(
        reader: &mut T,
        bpb: &Bpb,
        fs_info_sec: u16,
    ) -> Result<Option<FsInfo>, FATError> {
        if fs_info_sec == 0 || fs_info_sec == 0xFFFF {
            return Ok(None);
        }

        let mut buf = vec![0; BOOT_SECTOR_SIZE];
        let offset = fs_info_sec as u64 * bpb.bytes_per_sec as u64;
        let len = utils::read_up_to(reader, offset, &mut buf)?;
        if len < BOOT_SECTOR_SIZE {
            debug!("FSInfo sector {fs_info_sec} lies past the end of the volume");
            return Ok(None);
        }

        let fs_info: FsInfo = io::Cursor::new(&buf[..]).read_le()?;
        if !fs_info.has_valid_signatures() {
            debug!("FSInfo sector {fs_info_sec} has invalid signatures, ignoring it");
            return Ok(None);
        }

        Ok(Some(fs_info))
    }

    fn compute_fat_sz(bpb: &Bpb, fat32_ext: Option<&Fat32Ext>) -> u32 {
        match (bpb.fat_sz_16, fat32_ext) {
            (0, Some(ext)) => ext.fat_sz_32,
            (fat_sz_16, _) => fat_sz_16 as u32,
        }
    }

    fn compute_root_dir_sectors(bpb: &Bpb) -> u32 {
        (bpb.root_ent_cnt as u32 * 32).div_ceil(bpb.bytes_per_sec as u32)
    }

    fn compute_tot_sec(bpb: &Bpb) -> u32 {
        if bpb.tot_sec_16 != 0 {
            bpb.tot_sec_16 as u32
        } else {
            bpb.tot_sec_32
        }
    }

    fn compute_cluster_count(bpb: &Bpb, fat_sz: u32) -> Result<u32, FATError> {
        let tot_sec = Self::compute_tot_sec(bpb) as u64;
        let meta_sec = bpb.rsvd_sec_cnt as u64
            + bpb.num_fat as u64 * fat_sz as u64
            + Self::compute_root_dir_sectors(bpb) as u64;

        if meta_sec > tot_sec {
            return Err(FATError::InvalidTotSec(format!(
                "{tot_sec} sectors cannot hold the {meta_sec} sectors of reserved, FAT and root directory regions."
            )));
        }

        Ok(((tot_sec - meta_sec) / bpb.sec_per_clus as u64) as u32)
    }

    /// Number of sectors of one FAT.
    pub fn fat_sz(&self) -> u32 {
        let fat32_ext = match &self.ext {
            BootExtension::Fat32(ext) => Some(ext),
            BootExtension::Legacy(_) => None,
        };
        Self::compute_fat_sz(&self.bpb, fat32_ext)
    }

    /// Total number of sectors on the volume.
    pub fn tot_sec(&self) -> u32 {
        Self::compute_tot_sec(&self.bpb)
    }

    /// Number of sectors of the FAT12/16 root directory region (0 for FAT32).
    pub fn root_dir_sectors(&self) -> u32 {
        Self::compute_root_dir_sectors(&self.bpb)
    }

    /// Number of clusters in the data region.
    pub fn cluster_count(&self) -> u32 {
        // The layout was checked when the boot sector was read.
        Self::compute_cluster_count(&self.bpb, self.fat_sz()).unwrap_or(0)
    }

    /// First cluster of the root directory for FAT32, `None` otherwise.
    pub fn root_clus(&self) -> Option<u32> {
        match &self.ext {
            BootExtension::Fat32(ext) => Some(ext.root_clus),
            BootExtension::Legacy(_) => None,
        }
    }

    /// Validates the boot sector according to the FAT specification.
    ///
    /// # Errors
    /// - `FATError::InvalidJmp`: If the jump instruction is invalid
    /// - `FATError::InvalidBytesPerSec`: If bytes per sector is not a valid value
    /// - `FATError::InvalidSecPerClus`: If sectors per cluster is not a valid value
    /// - `FATError::InvalidClusSz`: If cluster size exceeds 32 KiB
    /// - `FATError::InvalidRsvdSecCnt`: If reserved sector count is 0
    /// - `FATError::InvalidNumFat`: If number of FATs is 0
    /// - `FATError::InvalidSignature`: If boot sector signature is not 0x55AA
    /// - Variant-specific errors, see [`BootSector::validate_fat32`] and
    ///   [`BootSector::validate_fat12_16`]
    fn validate(self) -> Result<Self, FATError> {
        let bpb = &self.bpb;

        if !((bpb.jmp[0] == 0xEB && bpb.jmp[2] == 0x90) || bpb.jmp[0] == 0xE9) {
            return Err(FATError::InvalidJmp(format!(
                "0x{:02X}{:02X}{:02X}",
                bpb.jmp[0], bpb.jmp[1], bpb.jmp[2],
            )));
        }

        const VALID_BYTES_PER_SEC: [u16; 4] = [512, 1024, 2048, 4096];
        if !VALID_BYTES_PER_SEC.contains(&bpb.bytes_per_sec) {
            return Err(FATError::InvalidBytesPerSec(bpb.bytes_per_sec));
        }

        const VALID_SEC_PER_CLUS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
        if !VALID_SEC_PER_CLUS.contains(&bpb.sec_per_clus) {
            return Err(FATError::InvalidSecPerClus(bpb.sec_per_clus));
        }

        if bpb.bytes_per_sec as u32 * bpb.sec_per_clus as u32 > 32 * 1024 {
            return Err(FATError::InvalidClusSz(
                bpb.bytes_per_sec as u32 * bpb.sec_per_clus as u32,
            ));
        }

        if bpb.rsvd_sec_cnt == 0 {
            return Err(FATError::InvalidRsvdSecCnt(bpb.rsvd_sec_cnt));
        }

        if bpb.num_fat == 0 {
            return Err(FATError::InvalidNumFat(bpb.num_fat));
        }

        match self.sig {
            Some([0x55, 0xAA]) => {}
            Some(sig) => {
                return Err(FATError::InvalidSignature(format!(
                    "0x{:02X}{:02X}",
                    sig[0], sig[1]
                )));
            }
            None => {
                return Err(FATError::InvalidSignature(String::from("missing")));
            }
        }

        match self.fat_type {
            FATType::FAT32 => self.validate_fat32(),
            FATType::FAT12 | FATType::FAT16 => self.validate_fat12_16(),
        }
    }

    /// Performs FAT32-specific validation checks.
    ///
    /// # Errors
    /// - `FATError::InvalidRootEntCnt`: If root directory entries is not 0
    /// - `FATError::InvalidTotSec`: If total sector fields are invalid for FAT32
    /// - `FATError::InvalidFatSz`: If FAT size fields are invalid for FAT32
    /// - `FATError::InvalidRootClus`: If root directory cluster is less than 2
    fn validate_fat32(self) -> Result<Self, FATError> {
        if self.bpb.root_ent_cnt != 0 {
            return Err(FATError::InvalidRootEntCnt(self.bpb.root_ent_cnt));
        }

        if self.bpb.tot_sec_16 != 0 {
            return Err(FATError::InvalidTotSec(String::from(
                "BPB_TotSec16 should be 0 for a FAT32 volume.",
            )));
        }

        if self.bpb.fat_sz_16 != 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "BPB_FATSz16 should be 0 for a FAT32 volume.",
            )));
        }

        match self.root_clus() {
            Some(root_clus) if root_clus >= 2 => Ok(self),
            root_clus => Err(FATError::InvalidRootClus(root_clus.unwrap_or(0))),
        }
    }

    /// Performs FAT12/16-specific validation checks.
    ///
    /// # Errors
    /// - `FATError::InvalidRootEntCnt`: If the fixed root directory has no entry
    fn validate_fat12_16(self) -> Result<Self, FATError> {
        if self.bpb.root_ent_cnt == 0 {
            return Err(FATError::InvalidRootEntCnt(self.bpb.root_ent_cnt));
        }

        Ok(self)
    }
}

/// Implements the Display trait for BootSector
impl fmt::Display for BootSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;

        macro_rules! field {
            ($name:expr, $val:expr, $size:expr) => {{
                writeln!(f, "  {:<20} 0x{:>04X}: {}", $name, offset, $val)?;
                offset += $size;
            }};
        }

        let bpb = &self.bpb;
        writeln!(f, "BIOS Parameter Block (Bpb):")?;

        field!("jmp", format!("{:02X?}", bpb.jmp), 3);
        field!("oem_name", String::from_utf8_lossy(&bpb.oem_name), 8);
        field!("bytes_per_sec", bpb.bytes_per_sec, 2);
        field!("sec_per_clus", bpb.sec_per_clus, 1);
        field!("rsvd_sec_cnt", bpb.rsvd_sec_cnt, 2);
        field!("num_fat", bpb.num_fat, 1);
        field!("root_ent_cnt", bpb.root_ent_cnt, 2);
        field!("tot_sec_16", bpb.tot_sec_16, 2);
        field!("media", format!("0x{:X}", bpb.media), 1);
        field!("fat_sz_16", bpb.fat_sz_16, 2);
        field!("sec_per_trk", bpb.sec_per_trk, 2);
        field!("num_heds", bpb.num_heds, 2);
        field!("hidd_sec", bpb.hidd_sec, 4);
        field!("tot_sec_32", bpb.tot_sec_32, 4);

        if let BootExtension::Fat32(ext) = &self.ext {
            field!("fat_sz_32", ext.fat_sz_32, 4);
            field!("ext_flags", format!("0x{:X}", ext.ext_flags), 2);
            field!("fs_ver", ext.fs_ver, 2);
            field!("root_clus", ext.root_clus, 4);
            field!("fs_info", ext.fs_info, 2);
            field!("bk_boot_sec", ext.bk_boot_sec, 2);
            field!("reserved", format!("{:02X?}", &ext.reserved[..]), 12);
        }

        let ebr = self.ext.ebr();
        field!("drv_num", format!("0x{:X}", ebr.drv_num), 1);
        field!("reserved_1", ebr.reserved_1, 1);
        field!("boot_sig", format!("0x{:X}", ebr.boot_sig), 1);
        field!("vol_id", format!("0x{:X}", ebr.vol_id), 4);
        field!("vol_lab", String::from_utf8_lossy(&ebr.vol_lab), 11);
        field!("fil_sys_type", String::from_utf8_lossy(&ebr.fil_sys_type), 8);
        writeln!(f, "\nBoot code starts at 0x{offset:04X}")?;

        if let Some(fs_info) = &self.fs_info {
            writeln!(f, "\nFSInfo:")?;
            writeln!(f, "  {:<20} {}", "free_count", fs_info.free_count)?;
            writeln!(f, "  {:<20} {}", "nxt_free", fs_info.nxt_free)?;
        }

        match self.sig {
            Some(sig) => writeln!(f, "\nSignature 0x01FE: {sig:02X?}"),
            None => writeln!(f, "\nSignature 0x01FE: missing"),
        }
    }
}
