//! Error types for the PDF renderer
//!
//! Every rendering operation fails with the single [`Error`] type; the
//! variants describe what went wrong during rendering.

use thiserror::Error;

/// Result type alias for the PDF renderer
pub type Result<T> = std::result::Result<T, Error>;

/// Render failure
#[derive(Error, Debug)]
pub enum Error {
    /// Template file not found
    #[error("Template not found: {path}")]
    TemplateNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDF is password protected and no password was provided
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Incorrect password provided
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Invalid page range
    #[error("Invalid page range: {range}")]
    InvalidPageRange { range: String },

    /// Page out of bounds
    #[error("Page {page} out of bounds (total: {total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// Image placement with unusable position or size
    #[error("Invalid image placement #{index}: {reason}")]
    InvalidImagePlacement { index: usize, reason: String },

    /// Replacement text cannot be written with a single-byte font encoding
    #[error("Text cannot be encoded for PDF content: {text:?}")]
    UnencodableText { text: String },

    /// Image dimension exceeded
    #[error("Image dimension exceeded: {detail}")]
    ImageDimensionExceeded { detail: String },

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// lopdf error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Blocking render task failed to complete
    #[error("Render task failed: {reason}")]
    TaskJoin { reason: String },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::TemplateNotFound { .. } => "Template not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::PasswordRequired => "PDF is password protected".to_string(),
            Error::IncorrectPassword => "Incorrect password".to_string(),
            Error::InvalidPageRange { range } => format!("Invalid page range: {}", range),
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} out of bounds (total: {})", page, total)
            }
            Error::InvalidImagePlacement { index, reason } => {
                format!("Invalid image placement #{}: {}", index, reason)
            }
            Error::UnencodableText { .. } => {
                "Replacement text contains characters that cannot be encoded".to_string()
            }
            Error::ImageDimensionExceeded { detail } => {
                format!("Image dimension exceeded: {}", detail)
            }
            Error::Image(_) => "Unsupported or corrupt image".to_string(),
            Error::Pdf(_) => "PDF processing error".to_string(),
            Error::QpdfError { .. } => "PDF processing error".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::TaskJoin { .. } => "Internal rendering error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_paths() {
        let err = Error::TemplateNotFound {
            path: "/secret/templates/invoice.pdf".to_string(),
        };
        assert_eq!(err.client_message(), "Template not found");
        assert!(err.to_string().contains("/secret/templates/invoice.pdf"));
    }

    #[test]
    fn test_client_message_keeps_placement_detail() {
        let err = Error::InvalidImagePlacement {
            index: 2,
            reason: "scale must be positive".to_string(),
        };
        assert_eq!(
            err.client_message(),
            "Invalid image placement #2: scale must be positive"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.client_message(), "I/O error");
    }
}
