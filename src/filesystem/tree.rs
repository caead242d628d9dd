//! Nodes of the directory tree.
//!
//! A [`DirNode`] owns its decoded [`DirectoryEntry`] and, once retrieved, its
//! children. Children are decoded the first time they are asked for and then
//! kept for the lifetime of the node, see [`crate::Volume`].

use std::cell::OnceCell;
use std::collections::BTreeMap;

use super::dir_entry::DirectoryEntry;
use crate::constants::NO_NAME;

/// Children of a directory, keyed by display name.
#[derive(Debug, Default)]
pub(crate) struct Listing {
    /// Every decoded child, "." and ".." included
    pub(crate) entries: BTreeMap<String, DirNode>,
    /// Volume label record, only found in the root directory
    pub(crate) volume_label: Option<DirectoryEntry>,
}

/// A node of the directory tree.
#[derive(Debug)]
pub struct DirNode {
    entry: DirectoryEntry,
    children: OnceCell<Listing>,
}

impl DirNode {
    pub fn new(entry: DirectoryEntry) -> Self {
        DirNode {
            entry,
            children: OnceCell::new(),
        }
    }

    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    pub fn is_dir(&self) -> bool {
        self.entry.is_dir()
    }

    /// Display name of the node.
    ///
    /// The root is named after the volume label once its children have been
    /// retrieved, "No name" otherwise.
    pub fn name(&self) -> String {
        if !self.entry.is_root() {
            return self.entry.display_name();
        }

        match self.volume_label() {
            Some(label) => {
                let text: String = label.short_name().iter().map(|b| *b as char).collect();
                match text.trim_end_matches(' ') {
                    "" => NO_NAME.to_string(),
                    text => text.to_string(),
                }
            }
            None => NO_NAME.to_string(),
        }
    }

    /// Returns `true` once the children of this node have been decoded.
    pub fn is_retrieved(&self) -> bool {
        self.children.get().is_some()
    }

    /// Volume label record folded into the root, if any.
    pub fn volume_label(&self) -> Option<&DirectoryEntry> {
        self.children.get()?.volume_label.as_ref()
    }

    pub(crate) fn listing(&self) -> Option<&Listing> {
        self.children.get()
    }

    /// Stores the decoded children, keeping the first value if already set.
    pub(crate) fn set_listing(&self, listing: Listing) -> &Listing {
        self.children.get_or_init(|| listing)
    }
}
