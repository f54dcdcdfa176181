//! PDF Renderer Library
//!
//! Renders PDF templates into standalone documents and personalizes them:
//! - `render_template`: Render a (possibly encrypted) template into a plain PDF
//! - `replace_text`: Interpolate text with search/replace pairs
//! - `render_images`: Draw images onto pages at given positions
//! - `list_templates`: List PDF templates in a directory
//!
//! The [`pdf::PdfRenderer`] trait is usable on its own; [`server`] exposes
//! the same operations as MCP tools.

pub mod error;
pub mod pdf;
pub mod server;
pub mod source;

pub use error::{Error, Result};
pub use pdf::{DocumentRenderer, PdfImage, PdfRenderer, RenderOptions};
pub use server::{
    run_server, run_server_with_config, ListTemplatesParams,
    ListTemplatesResult, PdfServer, RenderResult, ServerConfig, Source, TemplateFileInfo,
};
