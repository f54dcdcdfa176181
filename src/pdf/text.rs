//! Text interpolation in PDF content streams
//!
//! Search strings are matched against the string operands of the
//! text-showing operators (`Tj`, `'`, `"` and `TJ`). Matching happens on the
//! encoded bytes, so it works for simple fonts with a single-byte encoding
//! (WinAnsi, Standard, Latin-1 subsets). Strings shown while a composite
//! (`Type0`) font is selected hold multi-byte codes and are skipped.

use crate::error::{Error, Result};
use crate::pdf::document::{page_resources, replace_page_content, resolve_dict};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::{HashMap, HashSet};

/// WinAnsiEncoding codes 0x80..=0x9F; `None` marks unused codes.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('€'),
    None,
    Some('‚'),
    Some('ƒ'),
    Some('„'),
    Some('…'),
    Some('†'),
    Some('‡'),
    Some('ˆ'),
    Some('‰'),
    Some('Š'),
    Some('‹'),
    Some('Œ'),
    None,
    Some('Ž'),
    None,
    None,
    Some('‘'),
    Some('’'),
    Some('“'),
    Some('”'),
    Some('•'),
    Some('–'),
    Some('—'),
    Some('˜'),
    Some('™'),
    Some('š'),
    Some('›'),
    Some('œ'),
    None,
    Some('ž'),
    Some('Ÿ'),
];

/// Encode text for a single-byte font encoding.
///
/// Latin-1 characters map to themselves, the WinAnsi punctuation block maps
/// into 0x80..=0x9F. Returns `None` if any character has no code.
pub fn encode_single_byte(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code < 0x80 || (0xA0..=0xFF).contains(&code) {
                Some(code as u8)
            } else {
                WIN_ANSI_HIGH
                    .iter()
                    .position(|&w| w == Some(c))
                    .map(|i| 0x80 + i as u8)
            }
        })
        .collect()
}

/// Compiled set of search/replace pairs
#[derive(Debug, Clone)]
pub struct TextReplacer {
    /// Sorted longest search string first, then lexicographically
    patterns: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TextReplacer {
    /// Compile a substitution map.
    ///
    /// Empty search strings and search strings without a single-byte encoding
    /// are skipped (they can never occur in a simple-font string). A
    /// replacement that cannot be encoded is an error.
    pub fn new(text: &HashMap<String, String>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(text.len());

        for (search, replace) in text {
            if search.is_empty() {
                tracing::debug!("skipping empty search string");
                continue;
            }
            let Some(search_bytes) = encode_single_byte(search) else {
                tracing::debug!(search = %search, "skipping search string without single-byte encoding");
                continue;
            };
            let replace_bytes =
                encode_single_byte(replace).ok_or_else(|| Error::UnencodableText {
                    text: replace.clone(),
                })?;
            patterns.push((search_bytes, replace_bytes));
        }

        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self { patterns })
    }

    /// True if there is nothing to search for
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Replace all matches in one left-to-right pass.
    ///
    /// Returns the new bytes and the number of replacements, or `None` if
    /// nothing matched.
    pub fn replace(&self, input: &[u8]) -> Option<(Vec<u8>, usize)> {
        let mut output = Vec::with_capacity(input.len());
        let mut count = 0;
        let mut pos = 0;

        while pos < input.len() {
            let rest = &input[pos..];
            match self
                .patterns
                .iter()
                .find(|(search, _)| rest.starts_with(search))
            {
                Some((search, replace)) => {
                    output.extend_from_slice(replace);
                    pos += search.len();
                    count += 1;
                }
                None => {
                    output.push(input[pos]);
                    pos += 1;
                }
            }
        }

        (count > 0).then_some((output, count))
    }
}

/// Apply the replacer to a single text-showing operation
fn replace_in_operation(replacer: &TextReplacer, op: &mut Operation) -> usize {
    match op.operator.as_str() {
        "Tj" | "'" => op
            .operands
            .last_mut()
            .map(|operand| replace_in_string(replacer, operand))
            .unwrap_or(0),
        "\"" => op
            .operands
            .get_mut(2)
            .map(|operand| replace_in_string(replacer, operand))
            .unwrap_or(0),
        "TJ" => match op.operands.first_mut() {
            Some(Object::Array(elements)) => replace_in_array(replacer, elements),
            _ => 0,
        },
        _ => 0,
    }
}

fn replace_in_string(replacer: &TextReplacer, operand: &mut Object) -> usize {
    if let Object::String(bytes, _) = operand {
        if let Some((replaced, count)) = replacer.replace(bytes.as_slice()) {
            *bytes = replaced;
            return count;
        }
    }
    0
}

/// `TJ` arrays often split words between kerning adjustments, so the string
/// pieces are matched as one run. On a match the array collapses into a
/// single string and its kerning is lost.
fn replace_in_array(replacer: &TextReplacer, elements: &mut Vec<Object>) -> usize {
    let mut joined = Vec::new();
    let mut format = None;
    for element in elements.iter() {
        if let Object::String(bytes, fmt) = element {
            joined.extend_from_slice(bytes);
            format.get_or_insert(fmt.clone());
        }
    }

    match replacer.replace(&joined) {
        Some((replaced, count)) => {
            let format = format.unwrap_or(StringFormat::Literal);
            *elements = vec![Object::String(replaced, format)];
            count
        }
        None => 0,
    }
}

/// Resource names of the composite fonts in a resource dictionary
fn composite_fonts(doc: &Document, resources: &Dictionary) -> HashSet<Vec<u8>> {
    let Some(fonts) = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return HashSet::new();
    };

    fonts
        .iter()
        .filter(|(_, font)| {
            resolve_dict(doc, font)
                .and_then(|dict| dict.get(b"Subtype").ok())
                .and_then(|subtype| subtype.as_name().ok())
                .map(|name| name == b"Type0")
                .unwrap_or(false)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Run the replacer over decoded content. Returns the re-encoded content if
/// anything changed. Streams that fail to parse are left as they are.
///
/// The selected font is followed through `Tf` and `q`/`Q`; text shown with
/// one of the `composite` fonts is not touched.
fn replace_in_content(
    replacer: &TextReplacer,
    data: &[u8],
    composite: &HashSet<Vec<u8>>,
) -> Result<Option<(Vec<u8>, usize)>> {
    let mut content = match Content::decode(data) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparsable content stream");
            return Ok(None);
        }
    };

    let mut font: Option<Vec<u8>> = None;
    let mut saved_fonts = Vec::new();
    let mut count = 0;
    for op in content.operations.iter_mut() {
        match op.operator.as_str() {
            "q" => saved_fonts.push(font.clone()),
            "Q" => {
                if let Some(saved) = saved_fonts.pop() {
                    font = saved;
                }
            }
            "Tf" => {
                font = op
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .map(<[u8]>::to_vec);
            }
            _ if font.as_ref().is_some_and(|name| composite.contains(name)) => {}
            _ => count += replace_in_operation(replacer, op),
        }
    }

    if count == 0 {
        return Ok(None);
    }
    Ok(Some((content.encode()?, count)))
}

/// Form XObjects referenced from a resource dictionary
fn form_xobjects(doc: &Document, resources: &Dictionary) -> Vec<ObjectId> {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| obj.as_reference().ok())
        .filter(|id| {
            doc.get_object(*id)
                .and_then(Object::as_stream)
                .and_then(|stream| stream.dict.get(b"Subtype"))
                .and_then(Object::as_name)
                .map(|name| name == b"Form")
                .unwrap_or(false)
        })
        .collect()
}

/// Replace text inside a Form XObject and every form nested in it
fn replace_in_form(
    doc: &mut Document,
    replacer: &TextReplacer,
    form_id: ObjectId,
    inherited_composite: &HashSet<Vec<u8>>,
    visited: &mut HashSet<ObjectId>,
) -> Result<usize> {
    if !visited.insert(form_id) {
        return Ok(0);
    }

    let (data, nested, composite) = {
        let stream = doc.get_object(form_id)?.as_stream()?;
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        // Forms without their own resources use the resources of their user
        match stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
        {
            Some(resources) => (
                data,
                form_xobjects(doc, resources),
                composite_fonts(doc, resources),
            ),
            None => (data, Vec::new(), inherited_composite.clone()),
        }
    };

    let mut count = 0;
    if let Some((content, replaced)) = replace_in_content(replacer, &data, &composite)? {
        let stream = doc.get_object_mut(form_id)?.as_stream_mut()?;
        stream.set_plain_content(content);
        tracing::debug!(form = ?form_id, replaced, "replaced text in form");
        count += replaced;
    }

    for nested_id in nested {
        count += replace_in_form(doc, replacer, nested_id, &composite, visited)?;
    }

    Ok(count)
}

/// Replace text on every page of a document and in the forms those pages use.
///
/// Returns the total number of replacements.
pub fn replace_text(doc: &mut Document, replacer: &TextReplacer) -> Result<usize> {
    if replacer.is_empty() {
        return Ok(0);
    }

    let mut total = 0;
    let mut visited = HashSet::new();

    for (page_number, page_id) in doc.get_pages() {
        let resources = page_resources(doc, page_id)?;
        let composite = composite_fonts(doc, &resources);

        let data = doc.get_page_content(page_id)?;
        if let Some((content, replaced)) = replace_in_content(replacer, &data, &composite)? {
            replace_page_content(doc, page_id, content)?;
            tracing::debug!(page = page_number, replaced, "replaced text on page");
            total += replaced;
        }

        for form_id in form_xobjects(doc, &resources) {
            total += replace_in_form(doc, replacer, form_id, &composite, &mut visited)?;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::fixtures::text_document;
    use lopdf::{dictionary, Stream};

    fn replacer(pairs: &[(&str, &str)]) -> TextReplacer {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TextReplacer::new(&map).unwrap()
    }

    /// String operands with a flag for hex format
    fn string_runs(obj: &Object) -> Vec<(Vec<u8>, bool)> {
        match obj {
            Object::String(bytes, fmt) => {
                vec![(bytes.clone(), matches!(fmt, StringFormat::Hexadecimal))]
            }
            Object::Array(items) => items.iter().flat_map(string_runs).collect(),
            _ => Vec::new(),
        }
    }

    fn page_text(doc: &Document, page: u32) -> String {
        let page_id = doc.get_pages()[&page];
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string()
    }

    #[test]
    fn test_encode_single_byte() {
        assert_eq!(encode_single_byte("abc"), Some(b"abc".to_vec()));
        assert_eq!(encode_single_byte("Grüße"), Some(vec![b'G', b'r', 0xFC, 0xDF, b'e']));
        assert_eq!(encode_single_byte("5 €"), Some(vec![b'5', b' ', 0x80]));
        assert_eq!(encode_single_byte("“x”"), Some(vec![0x93, b'x', 0x94]));
        assert_eq!(encode_single_byte("漢字"), None);
        assert_eq!(encode_single_byte("\u{81}"), None);
    }

    #[test]
    fn test_replace_longest_match_wins() {
        let r = replacer(&[("$name", "Bob"), ("$name_full", "Bob Builder")]);
        let (out, count) = r.replace(b"Hi $name_full and $name").unwrap();
        assert_eq!(out, b"Hi Bob Builder and Bob");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_replace_does_not_rescan_output() {
        let r = replacer(&[("a", "b"), ("b", "c")]);
        let (out, count) = r.replace(b"ab").unwrap();
        assert_eq!(out, b"bc");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_replace_no_match() {
        let r = replacer(&[("missing", "x")]);
        assert!(r.replace(b"nothing here").is_none());
    }

    #[test]
    fn test_empty_and_unencodable_keys_skipped() {
        let r = replacer(&[("", "x"), ("漢", "y")]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_unencodable_value_is_error() {
        let mut map = HashMap::new();
        map.insert("name".to_string(), "漢字".to_string());
        assert!(matches!(
            TextReplacer::new(&map),
            Err(Error::UnencodableText { .. })
        ));
    }

    #[test]
    fn test_replace_text_on_pages() {
        let mut doc = text_document(&["Dear ${name},", "Untouched page", "Bye ${name}"]);
        let r = replacer(&[("${name}", "Alice")]);

        let count = replace_text(&mut doc, &r).unwrap();
        assert_eq!(count, 2);
        assert!(page_text(&doc, 1).contains("Dear Alice,"));
        assert!(page_text(&doc, 2).contains("Untouched page"));
        assert!(page_text(&doc, 3).contains("Bye Alice"));
    }

    #[test]
    fn test_replace_text_leaves_unmatched_pages_alone() {
        let mut doc = text_document(&["first", "second"]);
        let page_two = doc.get_pages()[&2];
        let before = doc.get_dictionary(page_two).unwrap().get(b"Contents").unwrap().clone();

        let r = replacer(&[("first", "1st")]);
        replace_text(&mut doc, &r).unwrap();

        let after = doc.get_dictionary(page_two).unwrap().get(b"Contents").unwrap().clone();
        assert_eq!(before.as_reference().unwrap(), after.as_reference().unwrap());
    }

    #[test]
    fn test_tj_array_collapses_on_match() {
        let mut op = Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::String(b"He".to_vec(), StringFormat::Literal),
                Object::Integer(-120),
                Object::String(b"llo".to_vec(), StringFormat::Literal),
            ])],
        );
        let r = replacer(&[("Hello", "Howdy")]);
        assert_eq!(replace_in_operation(&r, &mut op), 1);
        assert_eq!(string_runs(&op.operands[0]), vec![(b"Howdy".to_vec(), false)]);
    }

    #[test]
    fn test_tj_array_kept_without_match() {
        let mut op = Operation::new(
            "TJ",
            vec![Object::Array(vec![
                Object::String(b"Wor".to_vec(), StringFormat::Hexadecimal),
                Object::Integer(-80),
                Object::String(b"ld".to_vec(), StringFormat::Hexadecimal),
            ])],
        );
        let r = replacer(&[("Hello", "Howdy")]);
        assert_eq!(replace_in_operation(&r, &mut op), 0);
        assert_eq!(op.operands[0].as_array().unwrap().len(), 3);
        assert_eq!(
            string_runs(&op.operands[0]),
            vec![(b"Wor".to_vec(), true), (b"ld".to_vec(), true)]
        );
    }

    #[test]
    fn test_quote_operators() {
        let r = replacer(&[("old", "new")]);

        let mut quote = Operation::new(
            "'",
            vec![Object::String(b"old line".to_vec(), StringFormat::Literal)],
        );
        assert_eq!(replace_in_operation(&r, &mut quote), 1);

        let mut double_quote = Operation::new(
            "\"",
            vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::String(b"old".to_vec(), StringFormat::Hexadecimal),
            ],
        );
        assert_eq!(replace_in_operation(&r, &mut double_quote), 1);
        assert_eq!(
            string_runs(&double_quote.operands[2]),
            vec![(b"new".to_vec(), true)]
        );
    }

    /// Page 1 of a text document, with a second font `F2` that is an
    /// `Identity-H` Type0 font, showing the given content
    fn composite_font_document(content: &[u8]) -> Document {
        let mut doc = text_document(&["placeholder"]);
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "NotoSansCJK",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
        });
        let type0 = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSansCJK",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![descendant.into()],
        });

        let page_id = doc.get_pages()[&1];
        let mut resources = page_resources(&doc, page_id).unwrap();
        let mut fonts = resources.get(b"Font").unwrap().as_dict().unwrap().clone();
        fonts.set("F2", type0);
        resources.set("Font", fonts);
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", resources);
        replace_page_content(&mut doc, page_id, content.to_vec()).unwrap();
        doc
    }

    fn shown_strings(doc: &Document, page: u32) -> Vec<(Vec<u8>, bool)> {
        let page_id = doc.get_pages()[&page];
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .flat_map(|op| op.operands.iter().flat_map(string_runs))
            .collect()
    }

    #[test]
    fn test_composite_font_strings_untouched() {
        let mut doc = composite_font_document(
            b"BT /F2 12 Tf 72 700 Td <00410042> Tj ET BT /F1 12 Tf 72 680 Td (A) Tj ET",
        );
        let r = replacer(&[("A", "xyz")]);

        let count = replace_text(&mut doc, &r).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            shown_strings(&doc, 1),
            vec![(vec![0x00, 0x41, 0x00, 0x42], true), (b"xyz".to_vec(), false)]
        );
    }

    #[test]
    fn test_font_selection_restored_by_q() {
        let mut doc = composite_font_document(
            b"BT /F1 12 Tf ET q BT /F2 12 Tf <0041> Tj ET Q BT (A) Tj ET",
        );
        let r = replacer(&[("A", "B")]);

        assert_eq!(replace_text(&mut doc, &r).unwrap(), 1);
        assert_eq!(
            shown_strings(&doc, 1),
            vec![(vec![0x00, 0x41], true), (b"B".to_vec(), false)]
        );
    }

    #[test]
    fn test_replace_text_in_form_xobject() {
        let mut doc = text_document(&["page body"]);
        let form_content = b"BT /F1 10 Tf 10 10 Td (Footer {{date}}) Tj ET".to_vec();
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 200.into(), 50.into()],
            },
            form_content,
        ));

        let page_id = doc.get_pages()[&1];
        let mut resources = page_resources(&doc, page_id).unwrap();
        resources.set("XObject", dictionary! { "Fm1" => form_id });
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", resources);

        let r = replacer(&[("{{date}}", "2024-01-31")]);
        let count = replace_text(&mut doc, &r).unwrap();
        assert_eq!(count, 1);

        let stream = doc.get_object(form_id).unwrap().as_stream().unwrap();
        let content = String::from_utf8_lossy(&stream.content).to_string();
        assert!(content.contains("Footer 2024-01-31"));
    }
}
