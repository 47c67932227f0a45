//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use mineru_ocr::engine::device::{CudaStatus, DeviceDetector, DeviceSlot};
use mineru_ocr::pipeline::parse::ParseInvoker;
use mineru_ocr::{Engine, EngineError, EngineRequest, OcrService, ServiceConfig};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A PDF whose pages show the given lines of text, one per page.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(Object::from(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// A small RGBA PNG with a transparent left half.
pub fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_fn(64, 32, |x, _| {
        if x < 32 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([20, 40, 60, 255])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub struct NoAccelerators;

impl DeviceDetector for NoAccelerators {
    fn cuda(&self) -> CudaStatus {
        CudaStatus::DriverMissing
    }
    fn mps_available(&self) -> bool {
        false
    }
}

/// Stand-in for the real engine.
///
/// Reads the staged one-page PDF and writes `# <page text>` as Markdown.
/// Pages whose text contains `FAIL` make it error out; pages that only draw
/// an image produce `# image`.
#[derive(Default)]
pub struct ScriptedEngine {
    pub calls: Mutex<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Engine for ScriptedEngine {
    fn parse(&self, request: &EngineRequest) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(request.clone());

        let doc = Document::load(&request.input)
            .map_err(|e| EngineError::Other(format!("unreadable input: {e}")))?;
        let pages = doc.get_pages();
        if pages.len() != 1 {
            return Err(EngineError::Other(format!("expected 1 page, got {}", pages.len())));
        }
        let (_, page_id) = pages.into_iter().next().unwrap();
        let content = doc
            .get_page_content(page_id)
            .map_err(|e| EngineError::Other(e.to_string()))?;
        let content = String::from_utf8_lossy(&content);

        if content.contains("FAIL") {
            return Err(EngineError::Other("scripted failure".into()));
        }
        let markdown = match (content.find('('), content.find(')')) {
            (Some(start), Some(end)) if start < end => {
                format!("# {}\n\n", &content[start + 1..end])
            }
            _ => "# image\n".to_string(),
        };

        let path = request.markdown_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, markdown).unwrap();
        Ok(())
    }
}

/// A service over `engine` with no accelerators and a private device slot.
pub fn service(engine: Arc<ScriptedEngine>, work_root: &Path) -> OcrService {
    let config = ServiceConfig::builder()
        .work_root(work_root)
        .build()
        .unwrap();
    let invoker = ParseInvoker::new(engine, &config)
        .with_detector(Arc::new(NoAccelerators))
        .with_slot(Arc::new(DeviceSlot::new(None)));
    OcrService::with_invoker(config, invoker)
}

/// Entries left behind in a work root.
pub fn leftovers(work_root: &Path) -> usize {
    std::fs::read_dir(work_root).unwrap().count()
}
