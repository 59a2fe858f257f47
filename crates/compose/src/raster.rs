//! Scale and quality policy for rasterized rebuilds.

use crate::compositor::ComposeError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};
use quire_engine::{DocumentHandle, RenderEngine};
use quire_model::CompressionProfile;

/// Baseline multiplier applied to every render before the profile's own
/// scale. Chosen to keep body text legible after JPEG re-encoding; a
/// tunable default, not a derived constant.
pub const RASTER_BASELINE_SCALE: f32 = 1.5;

/// One page, rendered and encoded, ready to become an output page.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub jpeg: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

/// Turns pages into JPEGs under one fixed profile.
///
/// Quality and scale are per-build, never per-page, and the codec is
/// fixed: there is no format negotiation.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    profile: CompressionProfile,
}

impl Rasterizer {
    pub fn new(profile: CompressionProfile) -> Self {
        Self { profile: profile.clamped() }
    }

    /// Effective render scale: baseline x profile.
    pub fn render_scale(&self) -> f32 {
        RASTER_BASELINE_SCALE * self.profile.scale
    }

    /// The profile's quality fraction mapped onto the encoder's 1-100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.profile.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Render one page at the effective scale and encode it as JPEG.
    pub fn rasterize_page(
        &self,
        engine: &dyn RenderEngine,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<EncodedPage, ComposeError> {
        let rgba = engine.render_page(handle, page_index, self.render_scale())?;
        let (width_px, height_px) = rgba.dimensions();
        if width_px == 0 || height_px == 0 {
            return Err(ComposeError::Integrity(format!(
                "page {} rendered to a zero-area viewport",
                page_index + 1
            )));
        }

        // JPEG has no alpha; pages render onto an opaque background anyway.
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality());
        encoder.encode(rgb.as_raw(), width_px, height_px, ExtendedColorType::Rgb8)?;

        Ok(EncodedPage { jpeg, width_px, height_px })
    }
}
