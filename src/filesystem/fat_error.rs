//! Error types for FAT volume decoding and traversal.
//!
//! Every failure of the boot-sector parser, the cluster-chain reader, the
//! directory-entry decoder and the directory tree is reported through
//! [`FATError`]. Nothing is logged or swallowed on the way up.

use std::io;
use thiserror::Error;

/// Errors that can occur while decoding or traversing a FAT volume.
#[derive(Error, Debug)]
pub enum FATError {
    /// The volume is structurally inconsistent or too short to be decoded.
    #[error("Format error: {0}")]
    Format(String),

    /// The first three bytes of a FAT volume must contain a valid x86 jump instruction.
    #[error("Invalid jump instruction `{0}`")]
    InvalidJmp(String),

    /// Bytes per sector must be 512, 1024, 2048 or 4096.
    #[error("Invalid count of bytes per sector: `{0}`. Legal values: 512, 1024, 2048 or 4096")]
    InvalidBytesPerSec(u16),

    /// Sectors per cluster must be a power of 2: 1, 2, 4, 8, 16, 32, 64, or 128.
    #[error(
        "Invalid number of sector per cluster: `{0}`. Legal values: 1, 2, 4, 8, 16, 32, 64, 128"
    )]
    InvalidSecPerClus(u8),

    /// Total cluster size (bytes per sector × sectors per cluster) must not exceed 32 KiB.
    #[error("Invalid cluster size: `{0}`. Any value greater than 32K is invalid.")]
    InvalidClusSz(u32),

    /// The count of reserved sectors must be greater than 0.
    #[error("Invalid count of reserved sectors: `{0}`. Any value greater than 0 is valid.")]
    InvalidRsvdSecCnt(u16),

    /// The number of File Allocation Tables must be greater than 0.
    #[error("Invalid number of FATs on this volume: `{0}`.")]
    InvalidNumFat(u8),

    /// FAT32 keeps its root directory in a cluster chain, FAT12/16 in a fixed region.
    #[error("Invalid count of directory entries in the root directory: `{0}`.")]
    InvalidRootEntCnt(u16),

    /// The total sector count must be valid for the volume size.
    #[error("Invalid total count of sectors on the volume: `{0}`")]
    InvalidTotSec(String),

    /// The FAT size in sectors must be valid and consistent with the volume layout.
    #[error("Invalid FAT size: `{0}`")]
    InvalidFatSz(String),

    /// Clusters 0 and 1 are reserved, the data area starts at cluster 2.
    #[error(
        "Invalid cluster number of the first cluster of the root directory: `{0}`. This value should be at least 2."
    )]
    InvalidRootClus(u32),

    /// The boot sector signature must be 0x55AA.
    #[error("Invalid BPB signature: `{0}`. Expected signature: 0x55AA")]
    InvalidSignature(String),

    /// Underlying I/O errors that occur while reading the volume.
    #[error("IO Error: `{0}`")]
    IOError(io::Error),

    /// Parsing error occured during structure initialization
    #[error("BinRead Error: `{0}`")]
    BinReadError(binread::Error),

    /// No entry matches the requested path.
    #[error("No such path: `{0}`")]
    PathNotFound(String),

    /// A directory operation was requested on a regular file.
    #[error("Not a directory: `{0}`")]
    NotADirectory(String),

    /// A file operation was requested on a directory.
    #[error("Is a directory: `{0}`")]
    IsADirectory(String),

    /// The cluster chain ended before the declared file size was read.
    #[error("Truncated file `{name}`: {written} of {expected} bytes reachable")]
    TruncatedFile {
        name: String,
        expected: u64,
        written: u64,
    },

    /// The cluster chain ended in the middle of a directory entry run.
    #[error("Truncated directory `{0}`: the cluster chain ends inside an entry")]
    TruncatedDirectory(String),
}

impl FATError {
    /// Returns `true` for the errors caused by a malformed volume.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            FATError::Format(_)
                | FATError::InvalidJmp(_)
                | FATError::InvalidBytesPerSec(_)
                | FATError::InvalidSecPerClus(_)
                | FATError::InvalidClusSz(_)
                | FATError::InvalidRsvdSecCnt(_)
                | FATError::InvalidNumFat(_)
                | FATError::InvalidRootEntCnt(_)
                | FATError::InvalidTotSec(_)
                | FATError::InvalidFatSz(_)
                | FATError::InvalidRootClus(_)
                | FATError::InvalidSignature(_)
                | FATError::BinReadError(_)
        )
    }
}

/// Converts standard I/O errors into FATError.
impl From<io::Error> for FATError {
    fn from(err: io::Error) -> Self {
        FATError::IOError(err)
    }
}

/// Converts BinRead errors into FATError.
impl From<binread::Error> for FATError {
    fn from(err: binread::Error) -> Self {
        FATError::BinReadError(err)
    }
}
