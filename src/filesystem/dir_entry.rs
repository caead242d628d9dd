//! FAT directory entry structure and parsing.
//!
//! A logical directory entry is stored as a run of 32-byte records: zero or
//! more VFAT long-name records carrying UTF-16 fragments of the name, followed
//! by one short-name record holding the 8.3 name, attributes, timestamps, first
//! cluster and size. [`decode_at`] walks such a run and rebuilds the entry.

use binread::{BinRead, BinReaderExt};
use getset::{CopyGetters, Getters};
use log::{debug, trace};
use std::fmt;
use std::io;

use super::chain::{ChainCursor, ClusterReader};
use super::fat_error::FATError;
use crate::constants::{DELETED_MARKER, DIR_ENTRY_SIZE, END_OF_DIR_MARKER, KANJI_ESCAPE, NO_NAME};

/// Short-name directory record.
///
/// Each record is exactly 32 bytes and follows Microsoft's FAT specification.
#[derive(BinRead, Debug, Clone)]
#[br(little)]
struct RawDirEntry {
    /// Filename in 8.3 format (8 characters for the name, 3 for the extension)
    name: [u8; 11],
    attr: u8,
    /// NT reserved (unused)
    _n_t_res: u8,
    /// Creation time, count of tenths of a second
    _crt_time_tenth: u8,
    crt_time: u16,
    crt_date: u16,
    lst_acc_date: u16,
    /// High 16 bits of first cluster number
    fst_clus_hi: u16,
    wrt_time: u16,
    wrt_date: u16,
    /// Low 16 bits of first cluster number
    fst_clus_lo: u16,
    /// File size in bytes (0 for directories)
    file_size: u32,
}

impl RawDirEntry {
    fn cluster_number(&self) -> u32 {
        ((self.fst_clus_hi as u32) << 16) | self.fst_clus_lo as u32
    }
}

/// VFAT long-name record.
#[derive(BinRead, Debug, Clone)]
#[br(little)]
struct LfnEntry {
    /// Sequence number, 0x40 set on the last fragment
    _ord: u8,
    name1: [u16; 5],
    _attr: u8,
    _kind: u8,
    _checksum: u8,
    name2: [u16; 6],
    _fst_clus_lo: u16,
    name3: [u16; 2],
}

impl LfnEntry {
    /// Characters of this fragment, in logical order, without padding.
    fn units(&self) -> impl Iterator<Item = u16> + '_ {
        self.name1
            .iter()
            .chain(self.name2.iter())
            .chain(self.name3.iter())
            .copied()
            .filter(|unit| *unit != 0xFFFF && *unit != 0x0000)
    }
}

/// Attribute byte of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes(pub u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;

    /// Returns `true` if every bit of `mask` is set.
    pub fn is(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    pub fn is_long_name(&self) -> bool {
        self.is(Self::LONG_NAME)
    }
}

/// A date and time in the FAT on-disk format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct FatTimestamp {
    date: u16,
    time: u16,
}

impl FatTimestamp {
    pub fn new(date: u16, time: u16) -> Self {
        FatTimestamp { date, time }
    }

    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }

    pub fn month(&self) -> u16 {
        (self.date >> 5) & 0x0F
    }

    pub fn day(&self) -> u16 {
        self.date & 0x1F
    }

    pub fn hour(&self) -> u16 {
        self.time >> 11
    }

    pub fn minute(&self) -> u16 {
        (self.time >> 5) & 0x3F
    }

    /// Seconds, stored with a 2-second granularity.
    pub fn second(&self) -> u16 {
        (self.time & 0x1F) * 2
    }
}

impl fmt::Display for FatTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.date == 0 {
            return write!(f, "-");
        }
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// A decoded logical directory entry.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct DirectoryEntry {
    /// 11-byte space-padded short name, 0x05 escape already resolved
    #[getset(get = "pub")]
    short_name: [u8; 11],
    /// Rebuilt VFAT long name, empty if the entry has none
    #[getset(get = "pub")]
    long_name: String,
    #[getset(get_copy = "pub")]
    attr: Attributes,
    #[getset(get_copy = "pub")]
    first_cluster: u32,
    #[getset(get_copy = "pub")]
    file_size: u32,
    #[getset(get_copy = "pub")]
    is_root: bool,
    #[getset(get_copy = "pub")]
    created: FatTimestamp,
    #[getset(get_copy = "pub")]
    modified: FatTimestamp,
    #[getset(get_copy = "pub")]
    accessed: FatTimestamp,
}

impl DirectoryEntry {
    /// The pseudo-entry of the root directory.
    ///
    /// # Parameters
    /// - `first_cluster`: First cluster of the FAT32 root chain, 0 for a fixed root region
    pub fn root(first_cluster: u32) -> Self {
        DirectoryEntry {
            short_name: [b' '; 11],
            long_name: String::new(),
            attr: Attributes(Attributes::DIRECTORY),
            first_cluster,
            file_size: 0,
            is_root: true,
            created: FatTimestamp::default(),
            modified: FatTimestamp::default(),
            accessed: FatTimestamp::default(),
        }
    }

    fn from_raw(raw: RawDirEntry, long_name: String) -> Self {
        let mut short_name = raw.name;
        if short_name[0] == KANJI_ESCAPE {
            short_name[0] = DELETED_MARKER;
        }

        DirectoryEntry {
            short_name,
            long_name,
            attr: Attributes(raw.attr),
            first_cluster: raw.cluster_number(),
            file_size: raw.file_size,
            is_root: false,
            created: FatTimestamp::new(raw.crt_date, raw.crt_time),
            modified: FatTimestamp::new(raw.wrt_date, raw.wrt_time),
            accessed: FatTimestamp::new(raw.lst_acc_date, 0),
        }
    }

    /// Formats the short name as "NAME.EXT", padding removed.
    ///
    /// Bytes are mapped one to one to characters (Latin-1), which is exact
    /// for ASCII names and keeps every other byte visible.
    pub fn formatted_short_name(&self) -> String {
        let name: String = self.short_name[0..8].iter().map(|b| *b as char).collect();
        let ext: String = self.short_name[8..11].iter().map(|b| *b as char).collect();
        let name = name.trim_end_matches(' ');
        let ext = ext.trim_end_matches(' ');

        if ext.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{ext}")
        }
    }

    /// Name shown to users: the long name, else the 8.3 name, else "No name".
    pub fn display_name(&self) -> String {
        if !self.long_name.is_empty() {
            return self.long_name.clone();
        }

        let short = self.formatted_short_name();
        if short.is_empty() {
            NO_NAME.to_string()
        } else {
            short
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_root || self.attr.is(Attributes::DIRECTORY)
    }

    /// Returns `true` for the volume label record of a root directory.
    pub fn is_volume_label(&self) -> bool {
        !self.is_root && self.attr.is(Attributes::VOLUME_ID) && !self.attr.is_long_name()
    }

    /// Returns `true` for the "." and ".." entries.
    pub fn is_dot(&self) -> bool {
        &self.short_name == b".          " || &self.short_name == b"..         "
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}B", self.display_name(), self.file_size)
    }
}

/// Position of the next record of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirCursor {
    /// Inside the fixed FAT12/16 root region, `end` excluded
    Region { offset: u64, end: u64 },
    /// Inside a cluster chain
    Chain(ChainCursor),
    /// Past the last record
    End,
}

/// Result of [`decode_at`].
#[derive(Debug, Clone)]
pub enum Decoded {
    /// A complete entry, and where the next one starts
    Entry { entry: DirectoryEntry, next: DirCursor },
    /// The directory has no more entries
    End,
    /// The records ran out in the middle of an entry run
    Truncated,
    /// More records than the record budget allows
    Overflow,
}

/// Reads the 32-byte record at `cursor`, `None` if there is none.
fn read_record<T: io::Read + io::Seek>(
    reader: &mut ClusterReader<'_, T>,
    cursor: DirCursor,
) -> Result<Option<([u8; DIR_ENTRY_SIZE], DirCursor)>, FATError> {
    let mut record = [0u8; DIR_ENTRY_SIZE];

    match cursor {
        DirCursor::Region { offset, end } => {
            if offset + DIR_ENTRY_SIZE as u64 > end {
                return Ok(None);
            }
            reader.read_at(offset, &mut record)?;
            let next = DirCursor::Region {
                offset: offset + DIR_ENTRY_SIZE as u64,
                end,
            };
            Ok(Some((record, next)))
        }
        DirCursor::Chain(chain_cursor) => {
            let result = reader.read_range(chain_cursor, &mut record)?;
            if result.read < DIR_ENTRY_SIZE {
                return Ok(None);
            }
            let next = result.next.map_or(DirCursor::End, DirCursor::Chain);
            Ok(Some((record, next)))
        }
        DirCursor::End => Ok(None),
    }
}

/// Decodes the logical directory entry starting at `cursor`.
///
/// Deleted records met before the run are skipped. Long-name fragments are
/// collected until the short-name record, then joined in logical order.
///
/// Every record read, skipped ones included, is taken from `budget`. Reading
/// a record once the budget is spent yields `Decoded::Overflow`.
///
/// # Parameters
/// - `reader`: Reader over the volume
/// - `cursor`: Position of the first record to look at
/// - `budget`: Number of records the directory may still hold
///
/// # Returns
/// - `Decoded::Entry` with the entry and the position following its run
/// - `Decoded::End` if the directory has no more entries
/// - `Decoded::Truncated` if the records end before the short-name record
/// - `Decoded::Overflow` if the directory goes on past `budget`
///
/// # Errors
/// - `FATError::IOError` if a record cannot be read
/// - `FATError::BinReadError` if a record cannot be parsed
pub fn decode_at<T: io::Read + io::Seek>(
    reader: &mut ClusterReader<'_, T>,
    cursor: DirCursor,
    budget: &mut u64,
) -> Result<Decoded, FATError> {
    let mut fragments: Vec<Vec<u16>> = Vec::new();
    let mut cursor = cursor;

    loop {
        let started = !fragments.is_empty();
        let Some((record, next)) = read_record(reader, cursor)? else {
            return Ok(if started { Decoded::Truncated } else { Decoded::End });
        };
        cursor = next;

        if *budget == 0 {
            return Ok(Decoded::Overflow);
        }
        *budget -= 1;

        match record[0] {
            END_OF_DIR_MARKER if started => return Ok(Decoded::Truncated),
            END_OF_DIR_MARKER => return Ok(Decoded::End),
            DELETED_MARKER => {
                if started {
                    debug!(
                        "Deleted record inside a long-name run, dropping {} fragments",
                        fragments.len()
                    );
                    fragments.clear();
                }
                continue;
            }
            _ => {}
        }

        if Attributes(record[11]).is_long_name() {
            let lfn: LfnEntry = io::Cursor::new(&record[..]).read_le()?;
            fragments.push(lfn.units().collect());
            continue;
        }

        let raw: RawDirEntry = io::Cursor::new(&record[..]).read_le()?;
        let units: Vec<u16> = fragments.into_iter().rev().flatten().collect();
        let entry = DirectoryEntry::from_raw(raw, String::from_utf16_lossy(&units));
        trace!("Decoded {entry}");

        return Ok(Decoded::Entry { entry, next: cursor });
    }
}
