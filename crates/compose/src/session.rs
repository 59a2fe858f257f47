//! Session-scoped controller owning one registry and one working set.
//!
//! Collection logic lives here, not in whatever surface drives it; the
//! surface holds a reference and re-renders after mutations. Tying the
//! two lifetimes together also enforces the referential invariant: a
//! source can only disappear when the whole session resets, so a live
//! `PageRef` never dangles.

use crate::compositor::{build_by_copy, build_by_rasterize, ComposeError};
use crate::progress::BuildProgress;
use crate::registry::{LoadOutcome, SourceRegistry};
use quire_engine::RenderEngine;
use quire_model::{CompressionProfile, WorkingSet};

/// Per-file result of a batch load. One bad file does not abort the rest.
#[derive(Debug)]
pub struct FileOutcome {
    pub name: String,
    pub result: Result<LoadOutcome, ComposeError>,
}

#[derive(Debug, Default)]
pub struct Session {
    registry: SourceRegistry,
    working_set: WorkingSet,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a batch of `(name, bytes)` pairs.
    ///
    /// Each successful load appends all of its pages to the working set;
    /// a file that fails to parse is reported in its outcome and simply
    /// excluded. Duplicate names are skipped without error.
    pub fn load_files(
        &mut self,
        files: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Vec<FileOutcome> {
        files
            .into_iter()
            .map(|(name, bytes)| {
                let result = self.registry.load(&name, bytes);
                if let Ok(LoadOutcome::Loaded(id)) = result {
                    let page_count = self
                        .registry
                        .resolve(id)
                        .map(|source| source.page_count())
                        .unwrap_or(0);
                    self.working_set.append_all_pages(id, page_count);
                }
                FileOutcome { name, result }
            })
            .collect()
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    /// Working-set mutations (select/delete/reorder) go through here.
    /// Sources are not reachable mutably, so references stay valid.
    pub fn working_set_mut(&mut self) -> &mut WorkingSet {
        &mut self.working_set
    }

    /// Structural-copy build of the current working set.
    ///
    /// Takes `&mut self`: while a build is running, no other session
    /// operation can start, which is the required busy gate.
    pub fn build_copy(&mut self) -> Result<Vec<u8>, ComposeError> {
        build_by_copy(&self.working_set, &self.registry)
    }

    /// Rasterized rebuild of the current working set.
    pub fn build_rasterize(
        &mut self,
        profile: &CompressionProfile,
        engine: &mut dyn RenderEngine,
        progress: &mut dyn BuildProgress,
    ) -> Result<Vec<u8>, ComposeError> {
        build_by_rasterize(&self.working_set, &self.registry, profile, engine, progress)
    }

    /// Drop all sources and references together.
    pub fn reset(&mut self) {
        self.working_set.clear();
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::tests_support::{page_widths, pdf_with_page_widths};

    #[test]
    fn load_files_appends_pages_in_argument_order() {
        let mut session = Session::new();
        let outcomes = session.load_files(vec![
            ("a.pdf".to_owned(), pdf_with_page_widths(&[101.0, 102.0])),
            ("b.pdf".to_owned(), pdf_with_page_widths(&[201.0])),
        ]);

        assert!(outcomes.iter().all(|outcome| outcome.result.is_ok()));
        assert_eq!(session.working_set().len(), 3);

        let bytes = session.build_copy().expect("build should succeed");
        assert_eq!(page_widths(&bytes), vec![101.0, 102.0, 201.0]);
    }

    #[test]
    fn one_bad_file_does_not_abort_the_rest() {
        let mut session = Session::new();
        let outcomes = session.load_files(vec![
            ("good.pdf".to_owned(), pdf_with_page_widths(&[101.0])),
            ("bad.pdf".to_owned(), b"not a pdf".to_vec()),
            ("also-good.pdf".to_owned(), pdf_with_page_widths(&[201.0])),
        ]);

        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].result.is_ok());

        assert_eq!(session.registry().len(), 2);
        assert_eq!(session.working_set().len(), 2);
    }

    #[test]
    fn duplicate_file_does_not_append_pages_twice() {
        let mut session = Session::new();
        session.load_files(vec![
            ("a.pdf".to_owned(), pdf_with_page_widths(&[101.0])),
            ("a.pdf".to_owned(), pdf_with_page_widths(&[101.0])),
        ]);

        assert_eq!(session.registry().len(), 1);
        assert_eq!(session.working_set().len(), 1);
    }

    #[test]
    fn reset_clears_sources_and_references_together() {
        let mut session = Session::new();
        session.load_files(vec![("a.pdf".to_owned(), pdf_with_page_widths(&[101.0]))]);

        session.reset();

        assert!(session.registry().is_empty());
        assert!(session.working_set().is_empty());
    }
}
