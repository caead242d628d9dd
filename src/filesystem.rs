//! Read-only decoding of FAT12, FAT16 and FAT32 volumes.
//!
//! The volume layout is derived from the boot sector ([`geometry`]), cluster
//! chains are followed through the FAT ([`chain`]), directory records are
//! decoded into entries ([`dir_entry`]) and assembled into a lazily built
//! directory tree ([`volume`], [`tree`]).
pub mod bpb;
pub mod chain;
pub mod dir_entry;
pub mod fat_error;
pub mod fat_type;
pub mod geometry;
pub mod tree;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_image;
