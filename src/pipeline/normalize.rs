//! Image normalisation: any supported image → a one-page A4 PDF.
//!
//! The engine only accepts PDFs, so uploaded images are wrapped in one. The
//! image is flattened onto white first: an alpha channel carried into the PDF
//! as-is would render transparent regions black in the engine. It is then
//! scaled by a single factor so it fits the page, and centred.

use super::PageDocument;
use crate::error::OcrError;
use image::{DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

/// A4 width in PDF points.
pub const PAGE_WIDTH: f32 = 595.2756;
/// A4 height in PDF points.
pub const PAGE_HEIGHT: f32 = 841.8898;

/// Where the image lands on the page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fit a `width × height` image into the page, preserving aspect ratio.
///
/// Uses the smaller of the two axis ratios, so the image touches the page on
/// one axis and is centred on the other. Small images are scaled up.
pub fn fit_to_page(width: u32, height: u32) -> Placement {
    let (w, h) = (width as f32, height as f32);
    let scale = (PAGE_WIDTH / w).min(PAGE_HEIGHT / h);
    let (sw, sh) = (w * scale, h * scale);
    Placement {
        x: (PAGE_WIDTH - sw) / 2.0,
        y: (PAGE_HEIGHT - sh) / 2.0,
        width: sw,
        height: sh,
    }
}

/// Decode image bytes. Fails with [`OcrError::Decode`].
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, OcrError> {
    let img = image::load_from_memory(bytes).map_err(|e| OcrError::Decode {
        detail: e.to_string(),
    })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(OcrError::Decode {
            detail: "image has no pixels".into(),
        });
    }
    Ok(img)
}

/// Composite onto opaque white, using alpha as the mask.
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Turn image bytes into a one-page PDF.
pub fn image_to_page(bytes: &[u8]) -> Result<PageDocument, OcrError> {
    let img = decode_image(bytes)?;
    let rgb = flatten_alpha(&img);
    let placement = fit_to_page(rgb.width(), rgb.height());
    debug!(
        "Normalising {}x{} image → {:.1}x{:.1}pt at ({:.1}, {:.1})",
        rgb.width(),
        rgb.height(),
        placement.width,
        placement.height,
        placement.x,
        placement.y
    );
    let pdf = build_pdf(&rgb, placement)?;
    Ok(PageDocument::new(1, pdf))
}

fn build_pdf(rgb: &RgbImage, at: Placement) -> Result<Vec<u8>, OcrError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => rgb.width() as i64,
            "Height" => rgb.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.as_raw().clone(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(at.width),
                    0.into(),
                    0.into(),
                    Object::Real(at.height),
                    Object::Real(at.x),
                    Object::Real(at.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| OcrError::Internal(format!("encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| OcrError::Internal(format!("serialise image PDF: {e}")))?;
    Ok(buf)
}
