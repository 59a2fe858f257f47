//! Render/parse engine boundary.
//!
//! The compositor talks to PDF internals only through [`RenderEngine`]:
//! open a byte buffer, ask for page counts and sizes, render a page to a
//! pixel buffer at a scale, close. The default [`LopdfEngine`] backend
//! reads structure with lopdf and paints a placeholder raster, so the
//! whole pipeline runs without a native library; the `pdfium` feature
//! swaps in real rendering.

use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::collections::HashMap;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Native page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSizePt {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("encrypted PDFs are not supported")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// The external decode/paint dependency, seen from the compositor.
///
/// Page indices are 0-based here; the page model's 1-based indices are
/// converted at the call site.
pub trait RenderEngine {
    fn open(&mut self, bytes: &[u8]) -> Result<DocumentHandle, EngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSizePt, EngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        scale: f32,
    ) -> Result<RgbaImage, EngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSizePt>,
}

/// Structure-only backend: sizes from lopdf, placeholder raster output.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSizePt>, EngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(EngineError::Encrypted);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSizePt { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(PageSizePt { width_pt: 612.0, height_pt: 792.0 });

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(EngineError::NoPages);
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, EngineError> {
        self.docs.get(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

impl RenderEngine for LopdfEngine {
    fn open(&mut self, bytes: &[u8]) -> Result<DocumentHandle, EngineError> {
        let page_sizes = Self::parse_sizes(bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSizePt, EngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(EngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        scale: f32,
    ) -> Result<RgbaImage, EngineError> {
        let page_size = self.page_size(handle, page_index)?;
        let scale = if scale <= 0.0 { 1.0 } else { scale };

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;

        // White page with a grey frame, so the output is visibly a page.
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    //! Real rasterization via pdfium.
    //!
    //! Document buffers are leaked to satisfy pdfium's borrow of the byte
    //! slice for the document's lifetime; engines are expected to live for
    //! the whole session.

    use super::*;
    use pdfium_render::prelude::*;

    pub struct PdfiumEngine {
        pdfium: &'static Pdfium,
        next_handle: u64,
        docs: HashMap<DocumentHandle, PdfDocument<'static>>,
    }

    impl PdfiumEngine {
        /// Bind to a pdfium library next to the executable first, then the
        /// working directory, then the system library path.
        pub fn from_system_library() -> Result<Self, EngineError> {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

            let bindings = exe_dir
                .and_then(|dir| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)).ok()
                })
                .map(Ok)
                .unwrap_or_else(|| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                        .or_else(|_| Pdfium::bind_to_system_library())
                })
                .map_err(|err| EngineError::Backend(format!("failed to bind pdfium: {err}")))?;

            let pdfium: &'static Pdfium = Box::leak(Box::new(Pdfium::new(bindings)));

            Ok(Self { pdfium, next_handle: 0, docs: HashMap::new() })
        }

        fn document(&self, handle: DocumentHandle) -> Result<&PdfDocument<'static>, EngineError> {
            self.docs.get(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
        }

        fn page(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PdfPage<'_>, EngineError> {
            let document = self.document(handle)?;
            let page_count = document.pages().len() as u32;

            document
                .pages()
                .get(page_index as u16)
                .map_err(|_| EngineError::PageOutOfRange { page: page_index, page_count })
        }
    }

    impl RenderEngine for PdfiumEngine {
        fn open(&mut self, bytes: &[u8]) -> Result<DocumentHandle, EngineError> {
            let leaked: &'static [u8] = Box::leak(bytes.to_vec().into_boxed_slice());

            let document =
                self.pdfium.load_pdf_from_byte_slice(leaked, None).map_err(|err| match err {
                    PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                        EngineError::Encrypted
                    }
                    other => EngineError::Backend(other.to_string()),
                })?;

            if document.pages().len() == 0 {
                return Err(EngineError::NoPages);
            }

            self.next_handle += 1;
            let handle = DocumentHandle(self.next_handle);
            self.docs.insert(handle, document);

            Ok(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
            Ok(self.document(handle)?.pages().len() as u32)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSizePt, EngineError> {
            let page = self.page(handle, page_index)?;

            Ok(PageSizePt { width_pt: page.width().value, height_pt: page.height().value })
        }

        fn render_page(
            &self,
            handle: DocumentHandle,
            page_index: u32,
            scale: f32,
        ) -> Result<RgbaImage, EngineError> {
            let scale = if scale <= 0.0 { 1.0 } else { scale };
            let page = self.page(handle, page_index)?;

            let bitmap = page
                .render_with_config(&PdfRenderConfig::new().scale_page_by_factor(scale))
                .map_err(|err| EngineError::Backend(err.to_string()))?;

            Ok(bitmap.as_image().to_rgba8())
        }

        fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
            self.docs.remove(&handle).map(|_| ()).ok_or(EngineError::InvalidHandle(handle.raw()))
        }
    }
}

/// The backend used when nothing native is linked.
pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}
