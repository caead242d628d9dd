//!
//! FAT Explorer: A library and CLI for browsing FAT12/16/32 volume images.
//!
//! This crate provides tools for:
//! - Decoding the boot sector and the volume geometry
//! - Following cluster chains through the File Allocation Table
//! - Decoding directory entries, VFAT long names included
//! - Browsing the directory tree, reading files and extracting subtrees
//!
//! Volumes are only ever read. The library can be used both as a CLI tool
//! and as a Rust library.
//!
//! # Re-exports
//! - [`Volume`]: An open FAT volume and its directory tree
//! - [`DirNode`]: A node of the directory tree
//! - [`FATError`]: Errors raised while decoding a volume

pub mod commands;
pub mod constants;
pub mod filesystem;
pub mod render;
pub mod traits;
pub mod utils;

/// An open FAT volume (see [`filesystem::volume::Volume`]).
pub use crate::filesystem::volume::{Volume, VolumeInfo};
/// A node of the directory tree (see [`filesystem::tree::DirNode`]).
pub use crate::filesystem::tree::DirNode;
/// Errors raised while decoding a volume (see [`filesystem::fat_error::FATError`]).
pub use crate::filesystem::fat_error::FATError;
pub use crate::filesystem::fat_type::FATType;
pub use crate::filesystem::geometry::VolumeGeometry;
