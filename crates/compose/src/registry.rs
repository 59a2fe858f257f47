//! Loaded source documents, keyed by id, deduplicated by filename.

use crate::compositor::ComposeError;
use lopdf::Document;
use quire_model::SourceId;
use std::collections::BTreeMap;

/// One successfully parsed input file. Immutable after load; dropped only
/// when the registry is cleared wholesale.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    id: SourceId,
    name: String,
    bytes: Vec<u8>,
    page_count: u32,
}

impl SourceDocument {
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

/// Result of offering a file to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(SourceId),
    /// A source with the same filename already exists; the new bytes were
    /// discarded. Filenames, not content hashes, key identity.
    AlreadyLoaded(SourceId),
}

impl LoadOutcome {
    pub fn source_id(self) -> SourceId {
        match self {
            LoadOutcome::Loaded(id) | LoadOutcome::AlreadyLoaded(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, SourceDocument>,
    next_id: u64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `bytes` and register them under `name`.
    ///
    /// An unparseable or encrypted buffer fails; a duplicate `name` is
    /// skipped, not re-added. Zero-page documents are rejected here so
    /// every registered source can satisfy page-index invariants.
    pub fn load(&mut self, name: &str, bytes: Vec<u8>) -> Result<LoadOutcome, ComposeError> {
        if let Some(existing) = self.get_by_name(name) {
            log::warn!("{name:?} is already loaded; skipping duplicate upload");
            return Ok(LoadOutcome::AlreadyLoaded(existing.id()));
        }

        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(ComposeError::Encrypted);
        }

        let doc = Document::load_mem(&bytes).map_err(|err| ComposeError::Parse(err.to_string()))?;
        let page_count = doc.get_pages().len() as u32;
        if page_count == 0 {
            return Err(ComposeError::Parse("document has no pages".to_owned()));
        }

        self.next_id += 1;
        let id = SourceId(self.next_id);
        self.sources.insert(
            id,
            SourceDocument { id, name: name.to_owned(), bytes, page_count },
        );
        log::debug!("loaded {name:?} as {id:?} ({page_count} pages)");

        Ok(LoadOutcome::Loaded(id))
    }

    pub fn resolve(&self, id: SourceId) -> Option<&SourceDocument> {
        self.sources.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&SourceDocument> {
        self.sources.values().find(|source| source.name == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDocument> {
        self.sources.values()
    }

    /// Drop every source. There is no per-source removal: sources live as
    /// long as any working set may reference them.
    pub fn clear(&mut self) {
        self.sources.clear();
    }
}
