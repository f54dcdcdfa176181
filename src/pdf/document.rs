//! lopdf document helpers shared by the text and image engines

use crate::error::{Error, Result};
use crate::pdf::qpdf::QpdfWrapper;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Maximum depth when walking up the page tree for inherited attributes
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Check that the data starts with a PDF header
pub fn ensure_pdf(data: &[u8]) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

/// Parse PDF bytes into an editable document.
///
/// Encrypted documents are rejected; they have to be rendered as a template
/// (with their password) first.
pub fn load_document(data: &[u8]) -> Result<Document> {
    ensure_pdf(data)?;

    let doc = match Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            // lopdf can refuse encrypted files outright; qpdf tells them apart
            if let Err(Error::PasswordRequired) = QpdfWrapper::get_page_count(data, None) {
                return Err(Error::PasswordRequired);
            }
            return Err(Error::InvalidPdf {
                reason: format!("Failed to parse PDF: {}", e),
            });
        }
    };

    if doc.is_encrypted() {
        return Err(Error::PasswordRequired);
    }

    Ok(doc)
}

/// Serialize a document, dropping objects orphaned by the edits.
pub fn save_document(mut doc: Document, compress: bool) -> Result<Vec<u8>> {
    let pruned = doc.prune_objects();
    if !pruned.is_empty() {
        tracing::debug!(count = pruned.len(), "pruned unreferenced objects");
    }
    if compress {
        doc.compress();
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    Ok(output)
}

/// Look up a page object by its 1-indexed page number
pub fn page_id(doc: &Document, page: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    pages
        .get(&page)
        .copied()
        .ok_or(Error::PageOutOfBounds {
            page,
            total: pages.len() as u32,
        })
}

/// Resolve a possibly indirect object to a dictionary
pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// Effective resource dictionary of a page.
///
/// Follows `/Parent` links for inherited resources and returns an owned copy
/// so callers can modify it and store it inline on the page.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = doc.get_dictionary(page_id)?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(resources) = current.get(b"Resources") {
            return Ok(resolve_dict(doc, resources).cloned().unwrap_or_default());
        }
        match current.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => current = doc.get_dictionary(parent_id)?,
            Err(_) => break,
        }
    }

    Ok(Dictionary::new())
}

/// Wrap the page's existing content in `q … Q` and append a new content stream.
///
/// The wrapping isolates the appended content from any graphics state the
/// original content leaves behind.
pub fn wrap_and_append_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Array(arr)) => arr.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            // An indirect array of streams
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(_) | Err(_) => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 3);
    if !existing.is_empty() {
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        contents.push(Object::Reference(open_id));
        contents.extend(existing);
        contents.push(Object::Reference(close_id));
    }

    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.push(Object::Reference(content_id));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Array(contents));

    Ok(())
}

/// Replace all content streams of a page with a single stream
pub fn replace_page_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Reference(content_id));
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory PDFs for unit tests

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    /// Build a document with one page per entry; each page shows its text
    /// with a single `Tj`.
    pub fn text_document(page_texts: &[&str]) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = vec![];
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            text.as_bytes().to_vec(),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            });
            page_ids.push(page_id.into());
        }

        // Resources live on the page tree node and are inherited by every page
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => page_texts.len() as i64,
            "Resources" => resources_id,
        };
        doc.objects.insert(pages_id, pages_dict.into());

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        doc
    }

    /// Serialize a fixture document
    pub fn to_bytes(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }
}
