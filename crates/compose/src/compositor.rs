//! Builds one output document from a working set.
//!
//! Two modes share the same ordering rule: output pages follow working-set
//! order exactly. `build_by_copy` transplants page objects (merge and
//! split are the same algorithm with different sets); `build_by_rasterize`
//! replaces each page with a flattened JPEG of itself.

use crate::progress::BuildProgress;
use crate::raster::Rasterizer;
use crate::registry::SourceRegistry;
use lopdf::{dictionary, Document, Object, ObjectId};
use quire_engine::{DocumentHandle, EngineError, RenderEngine};
use quire_model::{CompressionProfile, SourceId, WorkingSet};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("the working set is empty; nothing to build")]
    EmptyInput,
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    #[error("encrypted PDFs are not supported")]
    Encrypted,
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("failed to serialize output: {0}")]
    Save(String),
    #[error(transparent)]
    Render(#[from] EngineError),
    #[error("failed to encode page image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Copy the referenced pages, in working-set order, into a new document.
///
/// Page content is transferred structurally, so text, fonts, and vector
/// graphics survive untouched. Each source is parsed at most once per
/// build regardless of how many pages it contributes.
pub fn build_by_copy(
    set: &WorkingSet,
    registry: &SourceRegistry,
) -> Result<Vec<u8>, ComposeError> {
    if set.is_empty() {
        return Err(ComposeError::EmptyInput);
    }

    let mut output = Document::with_version("1.7");
    let mut max_id = 1;
    let mut pages_by_source: HashMap<SourceId, BTreeMap<u32, ObjectId>> = HashMap::new();

    // Fold every referenced source into one shared object-id space.
    for source_id in set.referenced_sources() {
        let source = registry.resolve(source_id).ok_or_else(|| {
            ComposeError::Integrity(format!("working set references unknown source {source_id:?}"))
        })?;

        let mut doc = Document::load_mem(source.bytes())
            .map_err(|err| ComposeError::Parse(err.to_string()))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages = doc.get_pages();
        output.objects.extend(doc.objects);
        pages_by_source.insert(source_id, pages);
    }
    output.max_id = max_id - 1;

    let pages_root = output.new_object_id();
    let mut kids = Vec::with_capacity(set.len());

    for page_ref in set.iter() {
        let pages = pages_by_source.get(&page_ref.source_id).ok_or_else(|| {
            ComposeError::Integrity(format!(
                "working set references unknown source {:?}",
                page_ref.source_id
            ))
        })?;
        let page_id =
            pages.get(&page_ref.original_page_index).copied().ok_or_else(|| {
                ComposeError::Integrity(format!(
                    "page {} is out of range for source {:?}",
                    page_ref.original_page_index, page_ref.source_id
                ))
            })?;

        if let Ok(dict) = output
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
        {
            dict.set("Parent", Object::Reference(pages_root));
        }
        kids.push(Object::Reference(page_id));
    }

    finalize(output, pages_root, kids)
}

/// Re-render every referenced page as a lossy JPEG and rebuild a document
/// of image-only pages, in working-set order.
///
/// This is an irreversible transform: text layout, embedded fonts, and
/// vector paths are not preserved; only the visual raster survives.
/// Pages are processed strictly sequentially and `progress` is notified
/// after each one, so a caller can show "page i of N" liveness.
pub fn build_by_rasterize(
    set: &WorkingSet,
    registry: &SourceRegistry,
    profile: &CompressionProfile,
    engine: &mut dyn RenderEngine,
    progress: &mut dyn BuildProgress,
) -> Result<Vec<u8>, ComposeError> {
    if set.is_empty() {
        return Err(ComposeError::EmptyInput);
    }

    let mut handles: HashMap<SourceId, DocumentHandle> = HashMap::new();
    let result = rasterize_set(set, registry, profile, engine, progress, &mut handles);

    // Engine documents are per-build; release them on every exit path.
    for handle in handles.into_values() {
        let _ = engine.close(handle);
    }

    result
}

fn rasterize_set(
    set: &WorkingSet,
    registry: &SourceRegistry,
    profile: &CompressionProfile,
    engine: &mut dyn RenderEngine,
    progress: &mut dyn BuildProgress,
    handles: &mut HashMap<SourceId, DocumentHandle>,
) -> Result<Vec<u8>, ComposeError> {
    let rasterizer = Rasterizer::new(*profile);
    let total = set.len();

    let mut output = Document::with_version("1.7");
    let pages_root = output.new_object_id();
    let mut kids = Vec::with_capacity(total);

    for (done, page_ref) in set.iter().enumerate() {
        let handle = match handles.entry(page_ref.source_id) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let source = registry.resolve(page_ref.source_id).ok_or_else(|| {
                    ComposeError::Integrity(format!(
                        "working set references unknown source {:?}",
                        page_ref.source_id
                    ))
                })?;
                *entry.insert(engine.open(source.bytes())?)
            }
        };

        let page_index = page_ref.original_page_index - 1;
        // A stale index is a broken working-set invariant, not a render
        // failure, and classifies the same as on the copy path.
        let size = engine.page_size(handle, page_index).map_err(|err| match err {
            EngineError::PageOutOfRange { .. } => ComposeError::Integrity(format!(
                "page {} is out of range for source {:?}",
                page_ref.original_page_index, page_ref.source_id
            )),
            other => ComposeError::Render(other),
        })?;
        if size.width_pt <= 0.0 || size.height_pt <= 0.0 {
            return Err(ComposeError::Integrity(format!(
                "page {} of source {:?} has a degenerate size",
                page_ref.original_page_index, page_ref.source_id
            )));
        }

        let encoded = rasterizer.rasterize_page(engine, handle, page_index)?;
        append_image_page(&mut output, pages_root, &mut kids, &encoded)?;

        log::debug!("rasterized page {} of {total}", done + 1);
        progress.page_done(done + 1, total);
    }

    finalize(output, pages_root, kids)
}

/// Append one page whose content is a single full-bleed image.
///
/// The page is sized to the raster viewport (one pixel = one point) and
/// the image is drawn at the origin to fill it exactly.
fn append_image_page(
    output: &mut Document,
    pages_root: ObjectId,
    kids: &mut Vec<Object>,
    encoded: &crate::raster::EncodedPage,
) -> Result<(), ComposeError> {
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    let width = encoded.width_px as f32;
    let height = encoded.height_px as f32;

    let image_id = output.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => encoded.width_px as i64,
            "Height" => encoded.height_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        encoded.jpeg.clone(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    0.into(),
                    0.into(),
                    Object::Real(height),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|err| ComposeError::Save(err.to_string()))?;
    let content_id = output.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = output.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_root),
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
        },
        "Contents" => Object::Reference(content_id),
    });
    kids.push(Object::Reference(page_id));

    Ok(())
}

/// Install the page tree and catalog, drop everything unreachable, and
/// serialize. Shared tail of both build modes.
fn finalize(
    mut output: Document,
    pages_root: ObjectId,
    kids: Vec<Object>,
) -> Result<Vec<u8>, ComposeError> {
    let count = kids.len() as i64;
    output.objects.insert(
        pages_root,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = output.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_root),
    });
    output.trailer.set("Root", Object::Reference(catalog_id));

    output.prune_objects();
    output.adjust_zero_pages();
    output.renumber_objects();
    output.compress();

    let mut bytes = Vec::new();
    output.save_to(&mut bytes).map_err(|err| ComposeError::Save(err.to_string()))?;

    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF whose page widths encode their identity, so ordering
    /// assertions can read dimensions instead of raw content.
    pub fn pdf_with_page_widths(widths: &[f32]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = widths
            .iter()
            .map(|&width| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => Object::Reference(pages_id),
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), 500.into()],
                    "Contents" => Object::Reference(content_id),
                });
                Object::Reference(page_id)
            })
            .collect();

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture save should succeed");
        bytes
    }

    /// Page widths of a serialized document, in page order.
    pub fn page_widths(bytes: &[u8]) -> Vec<f32> {
        let doc = Document::load_mem(bytes).expect("output should parse");
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let dict = doc.get_dictionary(page_id).expect("page dict expected");
                let media_box =
                    dict.get(b"MediaBox").and_then(|obj| obj.as_array()).expect("MediaBox");
                let x0 = media_box[0].as_float().expect("number");
                let x1 = media_box[2].as_float().expect("number");
                (x1 - x0).abs()
            })
            .collect()
    }
}
