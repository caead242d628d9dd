//! Text rendering of the directory tree.
//!
//! [`TreePrinter`] walks the tree through the public [`Volume`] API and writes
//! one indented block per node: the name only, or every attribute in verbose
//! mode. Each level is indented by three spaces.

use std::io::{Read, Seek, Write};

use crate::filesystem::dir_entry::Attributes;
use crate::filesystem::fat_error::FATError;
use crate::filesystem::tree::DirNode;
use crate::filesystem::volume::Volume;

/// Prints a subtree, down to `depth` levels below the starting node.
///
/// A negative depth means unlimited, 0 prints the starting node only.
#[derive(Debug, Clone, Copy)]
pub struct TreePrinter {
    pub verbose: bool,
    pub depth: i32,
}

impl TreePrinter {
    pub fn new(verbose: bool, depth: i32) -> Self {
        TreePrinter { verbose, depth }
    }

    /// Writes `node` and its descendants to `out`.
    ///
    /// # Errors
    /// - Any error raised while retrieving the children of a directory
    /// - `FATError::IOError` if writing to `out` fails
    pub fn print<T: Read + Seek, W: Write>(
        &self,
        volume: &Volume<T>,
        node: &DirNode,
        out: &mut W,
    ) -> Result<(), FATError> {
        let max_depth = if self.depth < 0 {
            u32::MAX
        } else {
            self.depth as u32
        };
        self.print_node(volume, node, max_depth, 0, out)
    }

    fn print_node<T: Read + Seek, W: Write>(
        &self,
        volume: &Volume<T>,
        node: &DirNode,
        max_depth: u32,
        level: u32,
        out: &mut W,
    ) -> Result<(), FATError> {
        let indent = "   ".repeat(level as usize);

        if self.verbose {
            Self::print_details(node, &indent, out)?;
        } else {
            writeln!(out, "{indent}{}", node.name())?;
        }

        if !node.is_dir() {
            return Ok(());
        }

        let children = volume.list_children(node)?;
        if self.verbose {
            writeln!(out, "{indent}Children count: {}", children.len())?;
        }
        if children.is_empty() || level >= max_depth {
            return Ok(());
        }

        if self.verbose {
            writeln!(out, "{indent}Children:")?;
        }
        for (_, child) in children {
            self.print_node(volume, child, max_depth, level + 1, out)?;
        }

        Ok(())
    }

    fn print_details<W: Write>(node: &DirNode, indent: &str, out: &mut W) -> Result<(), FATError> {
        let entry = node.entry();
        let attr = entry.attr();
        let short_name: String = entry.short_name().iter().map(|b| *b as char).collect();
        let size = entry.file_size() as f64;

        writeln!(out, "{indent}----------------------")?;
        writeln!(out, "{indent}Short name: {short_name}")?;
        writeln!(out, "{indent}Long name: {}", entry.long_name())?;
        writeln!(out, "{indent}Read only: {}", attr.is(Attributes::READ_ONLY))?;
        writeln!(out, "{indent}Hidden: {}", attr.is(Attributes::HIDDEN))?;
        writeln!(out, "{indent}System: {}", attr.is(Attributes::SYSTEM))?;
        writeln!(out, "{indent}Directory: {}", attr.is(Attributes::DIRECTORY))?;
        writeln!(out, "{indent}Archive: {}", attr.is(Attributes::ARCHIVE))?;
        writeln!(out, "{indent}Size (KB = 2^10 Bytes): {}", size / 1024.0)?;
        writeln!(out, "{indent}Size (KB = 10^3 Bytes): {}", size / 1000.0)?;
        if !entry.is_root() {
            writeln!(out, "{indent}Created: {}", entry.created())?;
            writeln!(out, "{indent}Modified: {}", entry.modified())?;
        }

        Ok(())
    }
}
