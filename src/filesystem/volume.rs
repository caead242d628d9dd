//! FAT volume and directory tree operations.
//!
//! This module implements the functions to interact with an open FAT volume:
//! - Resolving paths to tree nodes
//! - Listing directories, decoding their entries on first access
//! - Reading files and extracting whole subtrees to the host filesystem
//! - Displaying the volume layout

use getset::{CopyGetters, Getters};
use log::debug;
use std::cell::RefCell;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use super::chain::{ChainCursor, ClusterReader};
use super::dir_entry::{decode_at, Decoded, DirCursor, DirectoryEntry};
use super::fat_error::FATError;
use super::fat_type::FATType;
use super::geometry::{RootLocation, VolumeGeometry};
use super::tree::{DirNode, Listing};
use crate::constants::DIR_ENTRY_SIZE;
use crate::traits::LayoutDisplay;

/// Summary of a volume.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct VolumeInfo {
    #[getset(get_copy = "pub")]
    fat_type: FATType,
    /// Label from the root directory, else from the boot sector
    #[getset(get = "pub")]
    label: Option<String>,
    #[getset(get = "pub")]
    oem_name: String,
    #[getset(get_copy = "pub")]
    volume_id: u32,
    #[getset(get_copy = "pub")]
    bytes_per_clus: u32,
    #[getset(get_copy = "pub")]
    cluster_count: u32,
    #[getset(get_copy = "pub")]
    free_space: u64,
    #[getset(get_copy = "pub")]
    total_space: u64,
}

/// An open FAT volume.
///
/// Every read goes through a single handle, borrowed for the duration of one
/// operation. The directory tree is built lazily from [`Volume::root`].
pub struct Volume<T: Read + Seek> {
    reader: RefCell<T>,
    geometry: VolumeGeometry,
    root: DirNode,
}

impl Volume<File> {
    /// Opens the volume image at `path` read-only.
    ///
    /// # Errors
    /// - `FATError::IOError` if the file cannot be opened
    /// - Any error of [`Volume::open_with`]
    pub fn from_path(path: &Path, validate: bool) -> Result<Self, FATError> {
        let file = File::open(path)?;
        Self::open_with(file, validate)
    }
}

impl<T: Read + Seek> Volume<T> {
    /// Opens a volume, validating its boot sector.
    pub fn open(source: T) -> Result<Self, FATError> {
        Self::open_with(source, true)
    }

    /// Opens a volume.
    ///
    /// # Parameters
    /// - `source`: The volume, starting at byte 0
    /// - `validate`: Whether to perform the FAT specification checks on the boot sector
    ///
    /// # Errors
    /// - Any error of [`VolumeGeometry::from_reader`]
    pub fn open_with(mut source: T, validate: bool) -> Result<Self, FATError> {
        let geometry = VolumeGeometry::from_reader(&mut source, validate)?;
        debug!(
            "Opened {} volume: {} clusters of {} bytes",
            geometry.fat_type(),
            geometry.cluster_count(),
            geometry.bytes_per_clus()
        );

        let root_cluster = match geometry.root() {
            RootLocation::Cluster(cluster) => cluster,
            RootLocation::Region { .. } => 0,
        };

        Ok(Volume {
            reader: RefCell::new(source),
            geometry,
            root: DirNode::new(DirectoryEntry::root(root_cluster)),
        })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn root(&self) -> &DirNode {
        &self.root
    }

    /// Returns the node at `path`.
    ///
    /// Segments are separated by runs of '/' or '\\'. Empty paths and "/"
    /// resolve to the root.
    ///
    /// # Errors
    /// - `FATError::PathNotFound` if a segment is missing or goes through a file
    /// - Any error raised while decoding the directories on the way
    pub fn resolve(&self, path: &str) -> Result<&DirNode, FATError> {
        let mut node = &self.root;

        for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
            if !node.is_dir() {
                return Err(FATError::PathNotFound(path.to_string()));
            }
            node = self
                .children(node)?
                .entries
                .get(segment)
                .ok_or_else(|| FATError::PathNotFound(path.to_string()))?;
        }

        Ok(node)
    }

    /// Lists the children of a directory, ordered by name, without "." and "..".
    ///
    /// # Errors
    /// - `FATError::NotADirectory` if `node` is a file
    /// - `FATError::TruncatedDirectory` if an entry run is cut short
    /// - `FATError::Format` if the directory chain loops
    pub fn list_children<'a>(
        &'a self,
        node: &'a DirNode,
    ) -> Result<Vec<(&'a str, &'a DirNode)>, FATError> {
        let listing = self.children(node)?;

        Ok(listing
            .entries
            .iter()
            .filter(|(_, child)| !child.entry().is_dot())
            .map(|(name, child)| (name.as_str(), child))
            .collect())
    }

    /// Number of children of a directory, "." and ".." excluded.
    pub fn children_count(&self, node: &DirNode) -> Result<usize, FATError> {
        Ok(self.list_children(node)?.len())
    }

    /// Returns the children of `node`, decoding them on first access.
    fn children<'a>(&'a self, node: &'a DirNode) -> Result<&'a Listing, FATError> {
        if !node.is_dir() {
            return Err(FATError::NotADirectory(node.name()));
        }
        if let Some(listing) = node.listing() {
            return Ok(listing);
        }

        let listing = self.retrieve_children(node)?;
        Ok(node.set_listing(listing))
    }

    /// Whether `entry` designates the root directory.
    ///
    /// ".." entries of first-level directories point to the root with cluster 0,
    /// or with the root cluster itself on some FAT32 volumes.
    fn is_root_dir(&self, entry: &DirectoryEntry) -> bool {
        entry.is_root()
            || entry.first_cluster() == 0
            || self.geometry.root() == RootLocation::Cluster(entry.first_cluster())
    }

    /// First record of a directory and the most records it can hold.
    fn dir_start(&self, entry: &DirectoryEntry) -> (DirCursor, u64) {
        let geometry = &self.geometry;
        let chain_capacity = geometry.cluster_count() as u64 * geometry.bytes_per_clus() as u64
            / DIR_ENTRY_SIZE as u64;

        if self.is_root_dir(entry) {
            if let Some((offset, end)) = geometry.root_region_bytes() {
                let capacity = (end - offset) / DIR_ENTRY_SIZE as u64;
                return (DirCursor::Region { offset, end }, capacity);
            }
            if let RootLocation::Cluster(cluster) = geometry.root() {
                return (DirCursor::Chain(ChainCursor::start(cluster)), chain_capacity);
            }
        }

        (
            DirCursor::Chain(ChainCursor::start(entry.first_cluster())),
            chain_capacity,
        )
    }

    fn retrieve_children(&self, node: &DirNode) -> Result<Listing, FATError> {
        let mut reader = self.reader.borrow_mut();
        let mut clusters = ClusterReader::new(&mut *reader, &self.geometry);
        let (mut cursor, capacity) = self.dir_start(node.entry());
        let reads_root = self.is_root_dir(node.entry());
        let mut listing = Listing::default();
        let mut budget = capacity;

        loop {
            let (entry, next) = match decode_at(&mut clusters, cursor, &mut budget)? {
                Decoded::Entry { entry, next } => (entry, next),
                Decoded::End => break,
                Decoded::Truncated => return Err(FATError::TruncatedDirectory(node.name())),
                Decoded::Overflow => {
                    return Err(FATError::Format(format!(
                        "Directory `{}` has more than {capacity} records, its cluster chain loops.",
                        node.name()
                    )));
                }
            };
            cursor = next;

            if reads_root && entry.is_volume_label() {
                debug!("Volume label: {}", entry.formatted_short_name());
                listing.volume_label = Some(entry);
                continue;
            }

            let name = entry.display_name();
            if listing
                .entries
                .insert(name.clone(), DirNode::new(entry))
                .is_some()
            {
                debug!("Duplicate entry `{name}` in `{}`, keeping the last one", node.name());
            }
        }

        Ok(listing)
    }

    /// Copies the content of a file into `sink`.
    ///
    /// # Returns
    /// - `Ok(u64)`: The number of bytes written, equal to the file size
    ///
    /// # Errors
    /// - `FATError::IsADirectory` if `node` is a directory
    /// - `FATError::TruncatedFile` if the cluster chain is shorter than the
    ///   file size, after every reachable byte has been written
    /// - `FATError::IOError` if reading the volume or writing the sink fails
    pub fn read_file<W: Write>(&self, node: &DirNode, sink: &mut W) -> Result<u64, FATError> {
        if node.is_dir() {
            return Err(FATError::IsADirectory(node.name()));
        }

        let entry = node.entry();
        let expected = entry.file_size() as u64;
        let mut reader = self.reader.borrow_mut();
        let mut clusters = ClusterReader::new(&mut *reader, &self.geometry);
        let mut buf = vec![0; self.geometry.bytes_per_clus() as usize];
        let mut cursor = Some(ChainCursor::start(entry.first_cluster()));
        let mut written = 0u64;

        while written < expected {
            let Some(at) = cursor else { break };
            let want = (buf.len() as u64).min(expected - written) as usize;
            let result = clusters.read_range(at, &mut buf[..want])?;

            sink.write_all(&buf[..result.read])?;
            written += result.read as u64;
            cursor = result.next;
        }

        if written < expected {
            return Err(FATError::TruncatedFile {
                name: node.name(),
                expected,
                written,
            });
        }

        Ok(written)
    }

    /// Recreates `node` at `destination` on the host filesystem.
    ///
    /// Directories are created with their whole subtree, files are copied.
    ///
    /// # Errors
    /// - `FATError::IOError` if a destination cannot be created or written
    /// - Any error of [`Volume::list_children`] or [`Volume::read_file`]
    pub fn write_tree(&self, node: &DirNode, destination: &Path) -> Result<(), FATError> {
        if !node.is_dir() {
            let mut file = io::BufWriter::new(File::create(destination)?);
            self.read_file(node, &mut file)?;
            file.flush()?;
            return Ok(());
        }

        fs::create_dir_all(destination)?;
        for (name, child) in self.list_children(node)? {
            if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
                debug!("Skipping `{name}`: not usable as a file name");
                continue;
            }
            self.write_tree(child, &destination.join(name))?;
        }

        Ok(())
    }

    /// Summarizes the volume, retrieving the root directory for its label.
    ///
    /// # Errors
    /// - Any error raised while decoding the root directory
    pub fn describe(&self) -> Result<VolumeInfo, FATError> {
        self.children(&self.root)?;

        let boot_sector = self.geometry.boot_sector();
        let ebr = boot_sector.ext().ebr();
        let label = match self.root.volume_label() {
            Some(_) => Some(self.root.name()),
            None => {
                let text = String::from_utf8_lossy(ebr.vol_lab()).trim_end().to_string();
                (!text.is_empty() && text != "NO NAME").then_some(text)
            }
        };

        Ok(VolumeInfo {
            fat_type: self.geometry.fat_type(),
            label,
            oem_name: String::from_utf8_lossy(boot_sector.bpb().oem_name())
                .trim_end()
                .to_string(),
            volume_id: ebr.vol_id(),
            bytes_per_clus: self.geometry.bytes_per_clus(),
            cluster_count: self.geometry.cluster_count(),
            free_space: self.geometry.free_space(),
            total_space: self.geometry.total_space(),
        })
    }
}

/// Implements the LayoutDisplay trait for Volume, in sectors
impl<T: Read + Seek> LayoutDisplay for Volume<T> {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        let geometry = &self.geometry;
        let mut out = String::new();
        let indent = " ".repeat(indent.into());
        let title = format!(" {} Volume Layout ", geometry.fat_type());

        writeln!(out, "{}┌{:─^55}┐", indent, title)?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;

        let mut row = |region: &str, start: u32, end: u32, description: &str| {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent, region, start, end, description
            )
        };

        let fat_start = geometry.rsvd_sec_cnt();
        row("Reserved", 0, fat_start, "Boot + Reserved")?;
        for i in 0..geometry.num_fat() {
            let fat_i_start = fat_start + i * geometry.fat_sz();
            row(
                &format!("FAT #{i}"),
                fat_i_start,
                fat_i_start + geometry.fat_sz(),
                "FAT Tables",
            )?;
        }
        if let RootLocation::Region { first_sector, sector_count } = geometry.root() {
            row("Root Dir", first_sector, first_sector + sector_count, "Root Directory")?;
        }
        let data_end =
            geometry.first_data_sector() + geometry.cluster_count() * geometry.sec_per_clus();
        row("Data", geometry.first_data_sector(), data_end, "Cluster Data")?;
        if data_end < geometry.tot_sec() {
            row("", data_end, geometry.tot_sec(), "Volume Slack")?;
        }

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}
