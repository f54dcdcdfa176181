//! PDF processing layer
//!
//! This module provides the rendering contract and its implementation:
//! template normalization with qpdf, text interpolation and image
//! compositing with lopdf.

pub mod document;
mod image;
mod pages;
mod qpdf;
mod renderer;
mod template;
mod text;

pub use self::image::PdfImage;
pub use pages::parse_page_range;
pub use qpdf::QpdfWrapper;
pub use renderer::{DocumentRenderer, PdfRenderer, RenderOptions};
pub use text::{encode_single_byte, TextReplacer};
