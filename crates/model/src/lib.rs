//! Page-collection model for quire.
//!
//! The working set is the ordered list of page references slated for the
//! next output document. It is a plain value type owned by a session
//! controller; the UI (or CLI) layer only reads it and asks for mutations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier for a loaded source document, unique per load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u64);

/// Identifier for one entry in the working set.
///
/// Derived from the source, the original page index, and an insertion
/// counter, so the same source page can appear in the set more than once
/// without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRefId {
    pub source: SourceId,
    pub page: u32,
    pub seq: u64,
}

/// One page slated for output: which source, and which page of it.
///
/// `original_page_index` is 1-based; the registry guarantees it stays
/// within `1..=page_count` of the source for the lifetime of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub id: PageRefId,
    pub source_id: SourceId,
    pub original_page_index: u32,
}

/// Ordered sequence of page references; insertion order is output order.
///
/// All operations are total: an id that is not in the set is a no-op, not
/// an error, because the surface driving this is tolerant of stale
/// references (a page deleted while a drag is still in flight).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    refs: Vec<PageRef>,
    next_seq: u64,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reference per page of a source, in ascending original
    /// index order, to the end of the set.
    pub fn append_all_pages(&mut self, source_id: SourceId, page_count: u32) {
        self.refs.reserve(page_count as usize);
        for page in 1..=page_count {
            self.next_seq += 1;
            self.refs.push(PageRef {
                id: PageRefId { source: source_id, page, seq: self.next_seq },
                source_id,
                original_page_index: page,
            });
        }
    }

    /// Remove the reference with this id. Idempotent.
    pub fn remove(&mut self, id: PageRefId) {
        self.refs.retain(|page_ref| page_ref.id != id);
    }

    /// Batch removal for multi-select delete. Survivor order is preserved.
    pub fn remove_many(&mut self, ids: &HashSet<PageRefId>) {
        self.refs.retain(|page_ref| !ids.contains(&page_ref.id));
    }

    /// Move one reference to `target_index`, shifting the others.
    ///
    /// Models a drag-and-drop reorder: the dragged element is spliced out
    /// first, then the drop position is clamped against the shortened
    /// sequence and the element is spliced back in. The relative order of
    /// every other element is unchanged.
    pub fn move_to(&mut self, id: PageRefId, target_index: usize) {
        let Some(from) = self.refs.iter().position(|page_ref| page_ref.id == id) else {
            return;
        };

        let page_ref = self.refs.remove(from);
        let target = target_index.min(self.refs.len());
        self.refs.insert(target, page_ref);
    }

    /// Empty the set. Leaves loaded sources untouched.
    pub fn clear(&mut self) {
        self.refs.clear();
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRef> {
        self.refs.iter()
    }

    pub fn get(&self, index: usize) -> Option<&PageRef> {
        self.refs.get(index)
    }

    /// Sources currently referenced by at least one entry, in first-use order.
    pub fn referenced_sources(&self) -> Vec<SourceId> {
        let mut seen = Vec::new();
        for page_ref in &self.refs {
            if !seen.contains(&page_ref.source_id) {
                seen.push(page_ref.source_id);
            }
        }
        seen
    }
}

/// Quality/scale pair governing a rasterized rebuild.
///
/// `quality` is a fraction in (0, 1] fed to the JPEG encoder; `scale` is a
/// positive multiplier applied on top of the baseline render scale. The
/// profile is fixed for a whole build, never varied per page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionProfile {
    pub quality: f32,
    pub scale: f32,
}

impl CompressionProfile {
    /// Clamp into the valid domain. Out-of-range inputs come from CLI
    /// flags, not from presets.
    pub fn clamped(self) -> Self {
        Self { quality: self.quality.clamp(0.01, 1.0), scale: self.scale.max(0.01) }
    }
}

impl Default for CompressionProfile {
    fn default() -> Self {
        CompressionPreset::Standard.profile()
    }
}

/// The fixed preset menu. Selecting a preset replaces the whole profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionPreset {
    /// Aggressive size reduction, still legible for text-heavy pages.
    Standard,
    /// Larger output, closer to the source rendering.
    HighFidelity,
}

impl CompressionPreset {
    pub fn profile(self) -> CompressionProfile {
        match self {
            CompressionPreset::Standard => CompressionProfile { quality: 0.6, scale: 1.0 },
            CompressionPreset::HighFidelity => CompressionProfile { quality: 0.85, scale: 1.5 },
        }
    }
}
