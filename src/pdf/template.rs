//! Template loading and normalization

use crate::error::{Error, Result};
use crate::pdf::document::ensure_pdf;
use crate::pdf::QpdfWrapper;
use std::io::Read;
use std::path::Path;

/// Read a template file from disk
pub fn read_template_path(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::TemplateNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(std::fs::read(path)?)
}

/// Consume a template stream to its end
pub fn read_template<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

/// Render template bytes into a standalone, unencrypted PDF
pub fn render_template(data: &[u8], password: Option<&str>, compress: bool) -> Result<Vec<u8>> {
    ensure_pdf(data)?;

    let (output, page_count) = QpdfWrapper::normalize(data, password, compress)?;
    tracing::debug!(
        page_count,
        input_bytes = data.len(),
        output_bytes = output.len(),
        "rendered template"
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_template_path_not_found() {
        let result = read_template_path(Path::new("/nonexistent/path/template.pdf"));
        assert!(matches!(result, Err(Error::TemplateNotFound { .. })));
    }

    #[test]
    fn test_read_template_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_template_path(dir.path());
        assert!(matches!(result, Err(Error::TemplateNotFound { .. })));
    }

    #[test]
    fn test_read_template_consumes_stream() {
        let mut cursor = Cursor::new(b"%PDF-1.4 stream".to_vec());
        let data = read_template(&mut cursor).unwrap();
        assert_eq!(data, b"%PDF-1.4 stream");
        assert_eq!(cursor.position(), 15);
    }

    #[test]
    fn test_render_template_rejects_non_pdf() {
        let result = render_template(b"<html></html>", None, true);
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }
}
