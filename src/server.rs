//! MCP Server implementation using rmcp

use crate::error::Error;
use crate::pdf::document::ensure_pdf;
use crate::pdf::{
    parse_page_range, DocumentRenderer, PdfImage, PdfRenderer, QpdfWrapper, RenderOptions,
};
use crate::source::{
    resolve_base64, resolve_cache, resolve_path, resolve_url, OutputCache, ResolvedSource,
};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Input source for templates, documents and images
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Source {
    /// File path (absolute or relative)
    Path {
        /// Path to the file
        path: String,
    },
    /// Base64 encoded content (data URLs accepted)
    Base64 {
        /// Base64 encoded content
        base64: String,
    },
    /// URL to download from
    Url {
        /// URL of the file
        url: String,
    },
    /// Reference to a document rendered earlier
    CacheRef {
        /// Cache key from a previous operation
        cache_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for Source {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        const KEYS: [&str; 4] = ["path", "base64", "url", "cache_key"];

        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            let kind = match &value {
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Null => "null",
                serde_json::Value::Object(_) => "an object",
            };
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", \"url\", or \"cache_key\", but got {}",
                kind
            )));
        };

        for key in KEYS {
            let Some(v) = obj.get(key) else { continue };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => Source::Path { path: s },
                "base64" => Source::Base64 { base64: s },
                "url" => Source::Url { url: s },
                _ => Source::CacheRef { cache_key: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\", \"url\", or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// Security and resource configuration for the PDF renderer server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories that path sources and output paths must live in
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum total bytes in the output cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cached outputs (default: 100)
    pub cache_max_entries: usize,
    /// Maximum decoded pixel area per placed image (default: 100_000_000)
    pub max_image_pixels: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            cache_max_bytes: 512 * 1024 * 1024,    // 512MB
            cache_max_entries: 100,
            max_image_pixels: 100_000_000,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from `PDF_RENDERER_*` environment variables,
    /// falling back to the defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, "ignoring invalid configuration value");
                    default
                }),
                None => default,
            }
        }

        let defaults = Self::default();
        let resource_dirs = lookup("PDF_RENDERER_RESOURCE_DIRS")
            .map(|dirs| {
                std::env::split_paths(&dirs)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| p.to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            resource_dirs,
            allow_private_urls: parsed(
                &lookup,
                "PDF_RENDERER_ALLOW_PRIVATE_URLS",
                defaults.allow_private_urls,
            ),
            max_download_bytes: parsed(
                &lookup,
                "PDF_RENDERER_MAX_DOWNLOAD_BYTES",
                defaults.max_download_bytes,
            ),
            cache_max_bytes: parsed(
                &lookup,
                "PDF_RENDERER_CACHE_MAX_BYTES",
                defaults.cache_max_bytes,
            ),
            cache_max_entries: parsed(
                &lookup,
                "PDF_RENDERER_CACHE_MAX_ENTRIES",
                defaults.cache_max_entries,
            ),
            max_image_pixels: parsed(
                &lookup,
                "PDF_RENDERER_MAX_IMAGE_PIXELS",
                defaults.max_image_pixels,
            ),
        }
    }
}

/// PDF renderer MCP server
#[derive(Clone)]
pub struct PdfServer {
    cache: Arc<RwLock<OutputCache>>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for list_templates
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTemplatesParams {
    /// Directory to search for PDF templates
    pub directory: String,
    /// Search subdirectories as well
    #[serde(default)]
    pub recursive: bool,
    /// Glob pattern for file names (e.g., "invoice-*.pdf")
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TemplateFileInfo {
    /// Full path, usable as {"path": ...} in other tools
    pub path: String,
    /// File name
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Last modification time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListTemplatesResult {
    pub directory: String,
    pub files: Vec<TemplateFileInfo>,
    pub total_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for render_template
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderTemplateParams {
    /// Template PDF to render
    pub source: Source,
    /// Password for encrypted templates
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional). If provided, saves the PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Shared result shape for all rendering tools
#[derive(Debug, Serialize, JsonSchema)]
pub struct RenderResult {
    /// Source identifier
    pub source: String,
    /// Cache key of the rendered PDF for chaining operations (absent if the
    /// output exceeds the cache budget)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    /// Number of pages in the output PDF
    pub output_page_count: u32,
    /// Size of the output PDF in bytes
    pub output_size: u64,
    /// Path where the PDF was saved (if output_path was specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Number of text replacements made (replace_text only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements_applied: Option<u32>,
    /// Number of images drawn (render_images only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_placed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderResult {
    fn failed(source: String, error: &Error) -> Self {
        Self {
            source,
            output_cache_key: None,
            output_page_count: 0,
            output_size: 0,
            output_path: None,
            replacements_applied: None,
            images_placed: None,
            error: Some(error.client_message()),
        }
    }
}

// ============================================================================
// Request types for replace_text
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReplaceTextParams {
    /// PDF to interpolate in (typically the cache_key of a rendered template)
    pub source: Source,
    /// Search string to replacement string
    pub replacements: HashMap<String, String>,
    /// Output file path (optional). If provided, saves the PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Request types for render_images
// ============================================================================

fn default_pages() -> String {
    "1".to_string()
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImagePlacementParams {
    /// Image to draw (PNG, JPEG, GIF, BMP, TIFF, WebP)
    pub image: Source,
    /// Pages to draw on, e.g. "1", "1-z", "2,4", "1-z:odd" (default: "1")
    #[serde(default = "default_pages")]
    pub pages: String,
    /// Left edge in points from the page's left side
    pub x: f32,
    /// Bottom edge in points from the page's bottom
    pub y: f32,
    /// Size multiplier; one image pixel is one point at scale 1.0 (default: 1.0)
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Explicit width in points (overrides scale)
    #[serde(default)]
    pub width: Option<f32>,
    /// Explicit height in points (overrides scale)
    #[serde(default)]
    pub height: Option<f32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderImagesParams {
    /// PDF to draw on
    pub source: Source,
    /// Images to draw, in order; later images cover earlier ones
    pub images: Vec<ImagePlacementParams>,
    /// Output file path (optional). If provided, saves the PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new PdfServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let cache = OutputCache::new(config.cache_max_entries, config.cache_max_bytes);
        Self {
            cache: Arc::new(RwLock::new(cache)),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Render a PDF template
    #[tool(
        description = "Render a PDF template into a standalone, unencrypted PDF. Encrypted templates need their password. The output is always cached (output_cache_key) for chaining with replace_text and render_images.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn render_template(
        &self,
        Parameters(params): Parameters<RenderTemplateParams>,
    ) -> String {
        let result = self
            .process_render_template(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "render_template failed");
                RenderResult::failed(Self::source_name(&params.source), &e)
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Replace text in a PDF
    #[tool(
        description = "Replace text in a PDF using search/replace pairs, e.g. {\"${customer}\": \"ACME Corp\"}. Matches literal text in page content and form XObjects; the longest search string wins where several match. Works with fonts using single-byte encodings (standard Latin text). The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn replace_text(&self, Parameters(params): Parameters<ReplaceTextParams>) -> String {
        let result = self
            .process_replace_text(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "replace_text failed");
                RenderResult::failed(Self::source_name(&params.source), &e)
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Draw images onto a PDF
    #[tool(
        description = "Draw images (logos, signatures, stamps) onto PDF pages. Positions are in points (1/72 inch) from the page's lower-left corner. Images are drawn in the given order, so later images cover earlier ones. Each distinct image is embedded once. The output is always cached (output_cache_key).

Page selection per image: \"1\", \"1-3\", \"z\" (last page), \"1-z\" (all pages), \"1-z:odd\", \"2,4\".

Source format (PDF and images): must be one of {\"path\": \"/absolute/path\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn render_images(&self, Parameters(params): Parameters<RenderImagesParams>) -> String {
        let result = self
            .process_render_images(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "render_images failed");
                RenderResult::failed(Self::source_name(&params.source), &e)
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// List PDF templates in a directory
    #[tool(
        description = "List PDF templates in a directory. Returns full path, file name, size in bytes and last modified time for each file. Supports recursive search and glob pattern filtering."
    )]
    async fn list_templates(&self, Parameters(params): Parameters<ListTemplatesParams>) -> String {
        let result = self.process_list_templates(&params).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "list_templates failed");
            ListTemplatesResult {
                directory: params.directory.clone(),
                files: vec![],
                total_count: 0,
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }
}

/// Run a rendering step on the blocking thread pool
async fn run_blocking<T, F>(f: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin {
            reason: format!("Task join error: {}", e),
        })?
}

impl PdfServer {
    fn source_name(source: &Source) -> String {
        match source {
            Source::Path { path } => path.clone(),
            Source::Base64 { .. } => "<base64>".to_string(),
            Source::Url { url } => url.clone(),
            Source::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    fn render_options(&self, password: Option<String>) -> RenderOptions {
        RenderOptions {
            password,
            max_image_pixels: self.config.max_image_pixels,
            ..RenderOptions::default()
        }
    }

    async fn resolve_source(&self, source: &Source) -> crate::error::Result<ResolvedSource> {
        match source {
            Source::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path)
            }
            Source::Base64 { base64 } => resolve_base64(base64),
            Source::Url { url } => {
                resolve_url(
                    url,
                    self.config.allow_private_urls,
                    self.config.max_download_bytes,
                )
                .await
            }
            Source::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache).await,
        }
    }

    /// Resolve a source that must be a PDF
    async fn resolve_pdf(&self, source: &Source) -> crate::error::Result<ResolvedSource> {
        let resolved = self.resolve_source(source).await?;
        ensure_pdf(&resolved.data)?;
        Ok(resolved)
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        if self.is_within_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(Error::PathAccessDenied {
                path: path.to_string(),
            })
        }
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = path_obj.file_name().ok_or_else(|| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
                path: path.to_string(),
            })?;
        let canonical_target = canonical_parent.join(file_name);

        if self.is_within_resource_dirs(&canonical_target) {
            Ok(canonical_target)
        } else {
            Err(Error::PathAccessDenied {
                path: path.to_string(),
            })
        }
    }

    fn is_within_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|cd| canonical.starts_with(&cd))
                .unwrap_or(false)
        })
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };

        let path = self.validate_output_path_access(path_str)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, data)?;
        tracing::info!(path = %path.display(), bytes = data.len(), "wrote rendered PDF");

        Ok(Some(path_str.clone()))
    }

    /// Cache a rendered PDF, optionally save it, and build the result
    async fn finish_render(
        &self,
        source: String,
        output: Vec<u8>,
        output_path: &Option<String>,
    ) -> crate::error::Result<RenderResult> {
        let (output, output_page_count) = run_blocking(move || {
            let count = QpdfWrapper::get_page_count(&output, None)?;
            Ok((output, count))
        })
        .await?;

        let output_path = self.write_output(output_path, &output)?;
        let output_size = output.len() as u64;
        let output_cache_key = self.cache.write().await.insert(output);

        Ok(RenderResult {
            source,
            output_cache_key,
            output_page_count,
            output_size,
            output_path,
            replacements_applied: None,
            images_placed: None,
            error: None,
        })
    }

    async fn process_render_template(
        &self,
        params: &RenderTemplateParams,
    ) -> crate::error::Result<RenderResult> {
        let renderer = DocumentRenderer::with_options(self.render_options(params.password.clone()));

        let (source_name, output) = match &params.source {
            // Paths go through the renderer's own file handling
            Source::Path { path } => {
                let path = self.validate_path_access(path)?;
                let name = path.display().to_string();
                let output = run_blocking(move || renderer.render_from_template(&path)).await?;
                (name, output)
            }
            other => {
                let resolved = self.resolve_pdf(other).await?;
                let output = run_blocking(move || {
                    renderer.render_from_reader(&mut Cursor::new(resolved.data))
                })
                .await?;
                (resolved.source_name, output)
            }
        };

        self.finish_render(source_name, output, &params.output_path)
            .await
    }

    async fn process_replace_text(
        &self,
        params: &ReplaceTextParams,
    ) -> crate::error::Result<RenderResult> {
        let resolved = self.resolve_pdf(&params.source).await?;
        let source_name = resolved.source_name;
        let data = resolved.data;
        let replacements = params.replacements.clone();
        let renderer = DocumentRenderer::with_options(self.render_options(None));

        let (output, count) =
            run_blocking(move || renderer.replace_text(&data, &replacements)).await?;

        let mut result = self
            .finish_render(source_name, output, &params.output_path)
            .await?;
        result.replacements_applied = Some(count as u32);
        Ok(result)
    }

    async fn process_render_images(
        &self,
        params: &RenderImagesParams,
    ) -> crate::error::Result<RenderResult> {
        let resolved = self.resolve_pdf(&params.source).await?;
        let source_name = resolved.source_name;
        let data = resolved.data;

        let mut image_data = Vec::with_capacity(params.images.len());
        for placement in &params.images {
            image_data.push(self.resolve_source(&placement.image).await?.data);
        }

        let placements: Vec<(String, f32, f32, f32, Option<f32>, Option<f32>)> = params
            .images
            .iter()
            .map(|p| (p.pages.clone(), p.x, p.y, p.scale, p.width, p.height))
            .collect();
        let renderer = DocumentRenderer::with_options(self.render_options(None));

        let (output, count) = run_blocking(move || {
            let page_count = QpdfWrapper::get_page_count(&data, None)?;

            let mut images = Vec::new();
            for (bytes, (pages, x, y, scale, width, height)) in
                image_data.into_iter().zip(placements)
            {
                for page in parse_page_range(&pages, page_count)? {
                    images.push(
                        PdfImage::new(bytes.clone(), page, x, y)
                            .with_scale(scale)
                            .with_size(width, height),
                    );
                }
            }

            renderer.place_images(&data, &images)
        })
        .await?;

        let mut result = self
            .finish_render(source_name, output, &params.output_path)
            .await?;
        result.images_placed = Some(count as u32);
        Ok(result)
    }

    fn process_list_templates(
        &self,
        params: &ListTemplatesParams,
    ) -> crate::error::Result<ListTemplatesResult> {
        if !self.config.resource_dirs.is_empty() {
            let canonical =
                std::fs::canonicalize(&params.directory).map_err(|_| Error::PathAccessDenied {
                    path: params.directory.clone(),
                })?;
            if !self.is_within_resource_dirs(&canonical) {
                return Err(Error::PathAccessDenied {
                    path: params.directory.clone(),
                });
            }
        }

        let dir_path = Path::new(&params.directory);
        if !dir_path.is_dir() {
            return Err(Error::SourceResolution {
                reason: format!("{} is not a directory", params.directory),
            });
        }

        let pattern = match &params.pattern {
            Some(p) => Some(glob::Pattern::new(p).map_err(|e| Error::SourceResolution {
                reason: format!("Invalid pattern {:?}: {}", p, e),
            })?),
            None => None,
        };

        let mut files = Vec::new();
        Self::collect_templates(dir_path, params.recursive, pattern.as_ref(), &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let total_count = files.len() as u32;
        Ok(ListTemplatesResult {
            directory: params.directory.clone(),
            files,
            total_count,
            error: None,
        })
    }

    fn collect_templates(
        dir: &Path,
        recursive: bool,
        pattern: Option<&glob::Pattern>,
        files: &mut Vec<TemplateFileInfo>,
    ) -> crate::error::Result<()> {
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            // Symlinked directories are not followed; they can form loops
            if file_type.is_symlink() && path.is_dir() {
                tracing::debug!(dir = %path.display(), "skipping symlinked directory");
                continue;
            }

            if file_type.is_dir() {
                if recursive {
                    if let Err(e) = Self::collect_templates(&path, recursive, pattern, files) {
                        tracing::debug!(dir = %path.display(), error = %e, "skipping directory");
                    }
                }
                continue;
            }

            let is_pdf = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if !path.is_file() || !is_pdf {
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if pattern.map(|pat| !pat.matches(&name)).unwrap_or(false) {
                continue;
            }

            let metadata = entry.metadata().ok();
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

            files.push(TemplateFileInfo {
                path: path.to_string_lossy().to_string(),
                name,
                size,
                modified,
            });
        }

        Ok(())
    }
}

impl Default for PdfServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Renderer provides tools for rendering PDF templates, replacing text in \
                 them, and drawing images onto their pages. Every output is cached; pass \
                 {\"cache_key\": ...} as the source of the next tool to chain operations."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with the default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        resource_dirs = ?config.resource_dirs,
        allow_private_urls = config.allow_private_urls,
        "PDF renderer configured"
    );
    let server = PdfServer::with_config(config);

    tracing::info!("PDF renderer ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
