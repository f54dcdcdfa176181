//! Image compositing onto existing pages
//!
//! Each distinct image is embedded once as an Image XObject and drawn on its
//! target pages through an appended content stream. Placements are drawn in
//! list order, so later images cover earlier ones.

use crate::error::{Error, Result};
use crate::pdf::document::{page_id, page_resources, resolve_dict, wrap_and_append_content};
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, ImageDecoder, ImageFormat, ImageReader};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::Cursor;

/// An image to draw onto a page.
///
/// Coordinates are PDF user space points with the origin at the lower-left
/// corner of the page. Without an explicit size one image pixel maps to one
/// point, multiplied by `scale`.
#[derive(Debug, Clone)]
pub struct PdfImage {
    /// Encoded image (PNG, JPEG, GIF, BMP, TIFF, WebP)
    pub data: Vec<u8>,
    /// Target page (1-indexed)
    pub page: u32,
    /// Left edge in points
    pub x: f32,
    /// Bottom edge in points
    pub y: f32,
    /// Multiplier on the natural size
    pub scale: f32,
    /// Explicit width in points
    pub width: Option<f32>,
    /// Explicit height in points
    pub height: Option<f32>,
}

impl PdfImage {
    pub fn new(data: Vec<u8>, page: u32, x: f32, y: f32) -> Self {
        Self {
            data,
            page,
            x,
            y,
            scale: 1.0,
            width: None,
            height: None,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Set an explicit size; a missing side keeps the image's aspect ratio
    pub fn with_size(mut self, width: Option<f32>, height: Option<f32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn validate(&self, index: usize, page_count: u32) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidImagePlacement {
            index,
            reason: reason.to_string(),
        };

        if self.page == 0 || self.page > page_count {
            return Err(Error::PageOutOfBounds {
                page: self.page,
                total: page_count,
            });
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(invalid("position must be finite"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid("scale must be positive"));
        }
        for side in [self.width, self.height].into_iter().flatten() {
            if !side.is_finite() || side <= 0.0 {
                return Err(invalid("width and height must be positive"));
            }
        }
        if self.data.is_empty() {
            return Err(invalid("image data is empty"));
        }
        Ok(())
    }

    /// Size on the page in points for an image of the given pixel size
    fn draw_size(&self, pixel_width: u32, pixel_height: u32) -> (f32, f32) {
        let (pw, ph) = (pixel_width as f32, pixel_height as f32);
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * ph / pw),
            (None, Some(h)) => (h * pw / ph, h),
            (None, None) => (pw * self.scale, ph * self.scale),
        }
    }
}

/// An Image XObject added to the document
#[derive(Debug, Clone, Copy)]
struct EmbeddedImage {
    id: ObjectId,
    width: u32,
    height: u32,
}

fn check_pixels(width: u32, height: u32, max_pixels: u64) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::ImageDimensionExceeded {
            detail: "image has no pixels".to_string(),
        });
    }
    let pixels = width as u64 * height as u64;
    if pixels > max_pixels {
        return Err(Error::ImageDimensionExceeded {
            detail: format!(
                "{}x{} = {} pixels exceeds maximum {}",
                width, height, pixels, max_pixels
            ),
        });
    }
    Ok(())
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    }
}

/// Embed a gray or RGB JPEG without re-encoding. Returns `None` for JPEGs
/// that need conversion (CMYK and friends).
fn embed_jpeg(doc: &mut Document, data: &[u8], max_pixels: u64) -> Result<Option<EmbeddedImage>> {
    let decoder = JpegDecoder::new(Cursor::new(data))?;
    let (width, height) = decoder.dimensions();
    check_pixels(width, height, max_pixels)?;

    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 => "DeviceGray",
        ExtendedColorType::Rgb8 => "DeviceRGB",
        _ => return Ok(None),
    };

    let mut dict = image_dict(width, height, color_space);
    dict.set("Filter", "DCTDecode");
    let id = doc.add_object(Stream::new(dict, data.to_vec()));

    Ok(Some(EmbeddedImage { id, width, height }))
}

/// Decode an image and store it as 8-bit samples, alpha as a soft mask
fn embed_raster(doc: &mut Document, data: &[u8], max_pixels: u64) -> Result<EmbeddedImage> {
    let format = image::guess_format(data)?;
    // Only the header is read here; the budget applies before any decoding
    let (width, height) = ImageReader::with_format(Cursor::new(data), format).into_dimensions()?;
    check_pixels(width, height, max_pixels)?;

    let decoded = image::load_from_memory_with_format(data, format)?;
    let (width, height) = (decoded.width(), decoded.height());

    let color = decoded.color();
    let (color_space, samples) = if color.has_color() {
        ("DeviceRGB", decoded.to_rgb8().into_raw())
    } else {
        ("DeviceGray", decoded.to_luma8().into_raw())
    };

    let mut dict = image_dict(width, height, color_space);

    if color.has_alpha() {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
        let mut mask = Stream::new(image_dict(width, height, "DeviceGray"), alpha);
        mask.compress()?;
        dict.set("SMask", Object::Reference(doc.add_object(mask)));
    }

    let mut stream = Stream::new(dict, samples);
    stream.compress()?;
    let id = doc.add_object(stream);

    Ok(EmbeddedImage { id, width, height })
}

fn embed_image(doc: &mut Document, data: &[u8], max_pixels: u64) -> Result<EmbeddedImage> {
    if image::guess_format(data)? == ImageFormat::Jpeg {
        if let Some(embedded) = embed_jpeg(doc, data, max_pixels)? {
            return Ok(embedded);
        }
    }
    embed_raster(doc, data, max_pixels)
}

/// Register XObjects on a page under fresh names.
///
/// The page's effective resources (possibly inherited or shared) are copied
/// onto the page so other pages are not affected.
fn register_xobjects(
    doc: &mut Document,
    page_id: ObjectId,
    ids: &[ObjectId],
) -> Result<HashMap<ObjectId, String>> {
    let mut resources = page_resources(doc, page_id)?;
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .cloned()
        .unwrap_or_default();

    let mut names = HashMap::new();
    let mut counter = 1;
    for id in ids {
        if names.contains_key(id) {
            continue;
        }
        let mut name = format!("Im{}", counter);
        while xobjects.has(name.as_bytes()) {
            counter += 1;
            name = format!("Im{}", counter);
        }
        xobjects.set(name.as_bytes(), Object::Reference(*id));
        names.insert(*id, name);
    }

    resources.set("XObject", xobjects);
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", resources);

    Ok(names)
}

/// Draw the images onto their pages. Returns the number of placements drawn.
///
/// All placements are validated before the document is touched.
pub fn render_images(doc: &mut Document, images: &[PdfImage], max_pixels: u64) -> Result<usize> {
    let page_count = doc.get_pages().len() as u32;
    for (index, image) in images.iter().enumerate() {
        image.validate(index, page_count)?;
    }

    let mut embedded: HashMap<&[u8], EmbeddedImage> = HashMap::new();
    let mut by_page: BTreeMap<u32, Vec<(&PdfImage, EmbeddedImage)>> = BTreeMap::new();

    for image in images {
        let xobject = match embedded.get(image.data.as_slice()) {
            Some(xobject) => *xobject,
            None => {
                let xobject = embed_image(doc, &image.data, max_pixels)?;
                tracing::debug!(
                    width = xobject.width,
                    height = xobject.height,
                    "embedded image"
                );
                embedded.insert(image.data.as_slice(), xobject);
                xobject
            }
        };
        by_page.entry(image.page).or_default().push((image, xobject));
    }

    for (page, placements) in &by_page {
        let page_id = page_id(doc, *page)?;
        let ids: Vec<ObjectId> = placements.iter().map(|(_, xobject)| xobject.id).collect();
        let names = register_xobjects(doc, page_id, &ids)?;

        let mut content = String::new();
        for (image, xobject) in placements {
            let (w, h) = image.draw_size(xobject.width, xobject.height);
            let _ = write!(
                content,
                "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                w, h, image.x, image.y, names[&xobject.id]
            );
        }

        wrap_and_append_content(doc, page_id, content.into_bytes())?;
        tracing::debug!(page, count = placements.len(), "placed images on page");
    }

    Ok(images.len())
}
