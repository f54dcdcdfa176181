//! Page selection syntax for multi-page placements

use crate::error::{Error, Result};

/// Parse a page range string into 1-indexed page numbers, in the order given.
///
/// Supports:
/// - `N` (single page)
/// - `N-M` (range; `M-N` walks backwards)
/// - `z` (last page), `rN` (N-th from last)
/// - `N-M:odd`, `N-M:even` (odd/even filter)
/// - Comma-separated combinations
pub fn parse_page_range(range: &str, num_pages: u32) -> Result<Vec<u32>> {
    if num_pages == 0 {
        return Err(Error::InvalidPdf {
            reason: "PDF has no pages".to_string(),
        });
    }

    let mut pages: Vec<u32> = Vec::new();
    for part in range.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        pages.extend(select_part(part, num_pages)?);
    }

    if pages.is_empty() {
        return Err(Error::InvalidPageRange {
            range: range.to_string(),
        });
    }

    Ok(pages)
}

/// `:odd` / `:even` suffix of a range part
#[derive(Debug, Clone, Copy, PartialEq)]
enum Parity {
    Odd,
    Even,
}

impl Parity {
    /// Split a range part into its span and optional parity filter
    fn split(part: &str) -> (&str, Option<Parity>) {
        match part.rsplit_once(':') {
            Some((span, "odd")) => (span, Some(Parity::Odd)),
            Some((span, "even")) => (span, Some(Parity::Even)),
            _ => (part, None),
        }
    }

    fn keeps(self, page: u32) -> bool {
        (page % 2 == 1) == (self == Parity::Odd)
    }
}

/// Pages selected by one comma-separated part, in walking order
fn select_part(part: &str, num_pages: u32) -> Result<Vec<u32>> {
    let (span, parity) = Parity::split(part);
    let (first, last) = match span.split_once('-') {
        Some((first, last)) => (
            resolve_page_ref(first, num_pages)?,
            resolve_page_ref(last, num_pages)?,
        ),
        None => {
            let page = resolve_page_ref(span, num_pages)?;
            (page, page)
        }
    };

    let keep = |page: &u32| parity.map_or(true, |parity| parity.keeps(*page));
    let pages = if first <= last {
        (first..=last).filter(keep).collect()
    } else {
        (last..=first).rev().filter(keep).collect()
    };
    Ok(pages)
}

/// Resolve a single page reference: numeric "N", "z" (last), "rN" (N-th from last)
fn resolve_page_ref(s: &str, num_pages: u32) -> Result<u32> {
    let s = s.trim();
    if s == "z" {
        return Ok(num_pages);
    }
    if let Some(r_num) = s.strip_prefix('r') {
        let n: u32 = r_num.parse().map_err(|_| Error::InvalidPageRange {
            range: s.to_string(),
        })?;
        if n == 0 || n > num_pages {
            return Err(Error::InvalidPageRange {
                range: s.to_string(),
            });
        }
        return Ok(num_pages - n + 1);
    }
    let page: u32 = s.parse().map_err(|_| Error::InvalidPageRange {
        range: s.to_string(),
    })?;
    if page == 0 || page > num_pages {
        return Err(Error::InvalidPageRange {
            range: format!("page {} out of range (1-{})", page, num_pages),
        });
    }
    Ok(page)
}
