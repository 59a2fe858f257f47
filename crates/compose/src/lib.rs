//! Page composition pipeline.
//!
//! Sources are loaded once into the [`registry::SourceRegistry`], the user
//! shapes a [`quire_model::WorkingSet`], and the [`compositor`] turns that
//! set into one output document: a structural copy for merge/split, or a
//! rasterized rebuild for compression.

pub mod compositor;
pub mod progress;
pub mod raster;
pub mod registry;
pub mod session;

pub use compositor::{build_by_copy, build_by_rasterize, ComposeError};
pub use progress::{BuildProgress, NoProgress};
pub use raster::{Rasterizer, RASTER_BASELINE_SCALE};
pub use registry::{LoadOutcome, SourceDocument, SourceRegistry};
pub use session::{FileOutcome, Session};

/// Which kind of output a build produces, for naming purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Merge,
    Split,
    Compress,
}

/// Suggested filename for an output document.
///
/// The names are a literal contract with download/collaborator code:
/// `merged.pdf`, `split-<original-name>`, `compressed-<original-name>`.
pub fn suggested_filename(kind: OutputKind, original_name: Option<&str>) -> String {
    let original = original_name.unwrap_or("output.pdf");
    match kind {
        OutputKind::Merge => "merged.pdf".to_owned(),
        OutputKind::Split => format!("split-{original}"),
        OutputKind::Compress => format!("compressed-{original}"),
    }
}
