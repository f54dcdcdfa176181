//! qpdf FFI wrapper for template normalization
//!
//! Templates pass through qpdf once: it decrypts them, drops unreferenced
//! objects and rewrites the cross-reference structure so the lopdf based
//! engines always see a clean, unencrypted document.

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Helper: open a QPdf from memory, optionally with password
fn open_qpdf(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd).map_err(map_qpdf_error),
        // Without a password only files with an empty user password open
        None => QPdf::read_from_memory(data).map_err(|e| match map_qpdf_error(e) {
            Error::IncorrectPassword => Error::PasswordRequired,
            other => other,
        }),
    }
}

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::IncorrectPassword,
        _ => Error::QpdfError {
            reason: e.to_string(),
        },
    }
}

impl QpdfWrapper {
    /// Rewrite a template as a standalone, unencrypted PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Optional password for encrypted templates
    /// * `compress` - Compress streams and pack objects into object streams
    ///
    /// # Returns
    /// The normalized PDF and its page count
    pub fn normalize(
        input_data: &[u8],
        password: Option<&str>,
        compress: bool,
    ) -> Result<(Vec<u8>, u32)> {
        let qpdf = open_qpdf(input_data, password)?;

        let num_pages = qpdf.get_num_pages().map_err(map_qpdf_error)?;
        if num_pages == 0 {
            return Err(Error::InvalidPdf {
                reason: "Template has no pages".to_string(),
            });
        }

        let os_mode = if compress {
            ObjectStreamMode::Generate
        } else {
            ObjectStreamMode::Disable
        };

        let mut writer = qpdf.writer();
        writer
            .object_stream_mode(os_mode)
            .compress_streams(compress)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        let output = writer.write_to_memory().map_err(map_qpdf_error)?;

        Ok((output, num_pages))
    }

    /// Get the page count of a PDF
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Optional password for encrypted PDFs
    ///
    /// # Returns
    /// The number of pages in the PDF
    pub fn get_page_count(input_data: &[u8], password: Option<&str>) -> Result<u32> {
        let qpdf = open_qpdf(input_data, password)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }
}
