/// The size in bytes of the boot sector read when opening a volume.
pub const BOOT_SECTOR_SIZE: usize = 512;

/// The size in bytes of the common part of the BIOS Parameter Block.
pub const BPB_SIZE: usize = 36;

/// The size in bytes of one physical directory record.
pub const DIR_ENTRY_SIZE: usize = 32;

/// First byte of a deleted directory record.
pub const DELETED_MARKER: u8 = 0xE5;

/// First byte of a short name whose real first byte is 0xE5.
pub const KANJI_ESCAPE: u8 = 0x05;

/// First byte of the record that terminates a directory.
pub const END_OF_DIR_MARKER: u8 = 0x00;

/// Free-cluster count stored in FSInfo when the count is unknown.
pub const FSI_UNKNOWN_FREE_COUNT: u32 = 0xFFFF_FFFF;

/// Name displayed for an entry without any name.
pub const NO_NAME: &str = "No name";
