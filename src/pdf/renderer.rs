//! The rendering contract and its lopdf/qpdf implementation

use crate::error::Result;
use crate::pdf::document::{load_document, save_document};
use crate::pdf::image::{render_images, PdfImage};
use crate::pdf::template::{read_template, read_template_path, render_template};
use crate::pdf::text::{replace_text, TextReplacer};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Provides PDF creation, interpolation and rendering capabilities.
///
/// Every operation produces a new byte vector; input PDF bytes are only
/// borrowed.
pub trait PdfRenderer {
    /// Renders a PDF document by consuming the template at the given path.
    fn render_from_template(&self, template: &Path) -> Result<Vec<u8>>;

    /// Renders a PDF document by consuming the given template stream.
    fn render_from_reader(&self, template: &mut dyn Read) -> Result<Vec<u8>>;

    /// Performs text interpolation using a map of search-replace pairs.
    fn render_search_and_replace_text(
        &self,
        pdf: &[u8],
        text: &HashMap<String, String>,
    ) -> Result<Vec<u8>>;

    /// Renders the given images into the document, in list order.
    fn render_images(&self, pdf: &[u8], images: &[PdfImage]) -> Result<Vec<u8>>;
}

/// Options shared by all rendering operations
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Password for encrypted templates
    pub password: Option<String>,
    /// Compress streams in the output (default: true)
    pub compress: bool,
    /// Maximum decoded pixel area per image (default: 100_000_000)
    pub max_image_pixels: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            password: None,
            compress: true,
            max_image_pixels: 100_000_000,
        }
    }
}

/// [`PdfRenderer`] backed by qpdf for templates and lopdf for content edits
#[derive(Debug, Clone, Default)]
pub struct DocumentRenderer {
    options: RenderOptions,
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render template bytes already held in memory
    pub fn render_template_bytes(&self, template: &[u8]) -> Result<Vec<u8>> {
        render_template(
            template,
            self.options.password.as_deref(),
            self.options.compress,
        )
    }

    /// Text interpolation returning the output and the number of replacements
    pub fn replace_text(
        &self,
        pdf: &[u8],
        text: &HashMap<String, String>,
    ) -> Result<(Vec<u8>, usize)> {
        let replacer = TextReplacer::new(text)?;
        let mut doc = load_document(pdf)?;
        let count = replace_text(&mut doc, &replacer)?;
        tracing::debug!(count, patterns = text.len(), "text interpolation done");
        Ok((save_document(doc, self.options.compress)?, count))
    }

    /// Image rendering returning the output and the number of placements
    pub fn place_images(&self, pdf: &[u8], images: &[PdfImage]) -> Result<(Vec<u8>, usize)> {
        let mut doc = load_document(pdf)?;
        let count = render_images(&mut doc, images, self.options.max_image_pixels)?;
        Ok((save_document(doc, self.options.compress)?, count))
    }
}

impl PdfRenderer for DocumentRenderer {
    fn render_from_template(&self, template: &Path) -> Result<Vec<u8>> {
        let data = read_template_path(template)?;
        self.render_template_bytes(&data)
    }

    fn render_from_reader(&self, template: &mut dyn Read) -> Result<Vec<u8>> {
        let data = read_template(template)?;
        self.render_template_bytes(&data)
    }

    fn render_search_and_replace_text(
        &self,
        pdf: &[u8],
        text: &HashMap<String, String>,
    ) -> Result<Vec<u8>> {
        self.replace_text(pdf, text).map(|(output, _)| output)
    }

    fn render_images(&self, pdf: &[u8], images: &[PdfImage]) -> Result<Vec<u8>> {
        self.place_images(pdf, images).map(|(output, _)| output)
    }
}
