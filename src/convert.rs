//! OCR entry points and the per-page batch orchestrator.
//!
//! [`OcrService`] is what the HTTP layer talks to. Each call validates the
//! declared content type, creates a fresh [`WorkingArea`], runs the pipeline
//! and drops the area on every exit path. If the call is cancelled while the
//! engine runs, the area goes away when the engine returns.
//!
//! ## Failure isolation
//!
//! On the PDF path a failing engine call costs one page, never the document:
//! the page is reported with empty Markdown and the loop moves on. Failures
//! before the loop (unparseable PDF, staging I/O) abort the whole request.

use crate::config::ServiceConfig;
use crate::engine::device::DeviceHint;
use crate::engine::{CommandEngine, Engine};
use crate::error::OcrError;
use crate::output::PageResult;
use crate::pipeline::normalize;
use crate::pipeline::parse::ParseInvoker;
use crate::pipeline::split::PdfSource;
use crate::pipeline::workspace::WorkingArea;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The only content type the PDF endpoint accepts.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Reject anything whose content type is not `image/*`.
pub fn check_image_type(content_type: Option<&str>) -> Result<(), OcrError> {
    match content_type {
        Some(ct) if ct.trim().to_ascii_lowercase().starts_with("image/") => Ok(()),
        _ => Err(OcrError::invalid_input("File must be an image")),
    }
}

/// Reject anything whose content type is not exactly `application/pdf`.
pub fn check_pdf_type(content_type: Option<&str>) -> Result<(), OcrError> {
    match content_type {
        Some(ct) if ct.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE) => Ok(()),
        _ => Err(OcrError::invalid_input("File must be a PDF")),
    }
}

/// Image and PDF OCR over a shared [`ParseInvoker`].
#[derive(Debug, Clone)]
pub struct OcrService {
    config: Arc<ServiceConfig>,
    invoker: ParseInvoker,
}

impl OcrService {
    /// Service running the engine program named in `config`.
    pub fn from_config(config: ServiceConfig) -> Self {
        let engine = Arc::new(CommandEngine::from_config(&config));
        Self::new(config, engine)
    }

    pub fn new(config: ServiceConfig, engine: Arc<dyn Engine>) -> Self {
        let invoker = ParseInvoker::new(engine, &config);
        Self::with_invoker(config, invoker)
    }

    pub fn with_invoker(config: ServiceConfig, invoker: ParseInvoker) -> Self {
        Self {
            config: Arc::new(config),
            invoker,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn device_hint(&self) -> Option<&DeviceHint> {
        self.config.device.as_ref()
    }

    /// OCR a single image. All-or-nothing: any failure is an error.
    pub async fn ocr_image(
        &self,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<PageResult, OcrError> {
        check_image_type(content_type)?;
        let start = Instant::now();
        let area = WorkingArea::create(self.config.work_root.as_deref())?;

        let page = tokio::task::spawn_blocking(move || normalize::image_to_page(&bytes))
            .await
            .map_err(|e| OcrError::Internal(format!("Normalise task panicked: {}", e)))??;

        let dir = area.page_dir(1)?;
        let markdown = self.invoker.parse_page(page, &dir, self.device_hint()).await?;
        drop(dir);
        area.release();

        info!(
            "Image OCR complete: {} chars in {}ms",
            markdown.len(),
            start.elapsed().as_millis()
        );
        Ok(PageResult::new(1, markdown))
    }

    /// OCR every page of a PDF. Returns one result per page, in page order.
    pub async fn ocr_pdf(
        &self,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Vec<PageResult>, OcrError> {
        check_pdf_type(content_type)?;
        let start = Instant::now();
        let area = WorkingArea::create(self.config.work_root.as_deref())?;
        let staged = area.stage("input.pdf", &bytes).await?;
        drop(bytes);

        let source = tokio::task::spawn_blocking(move || PdfSource::load(&staged))
            .await
            .map_err(|e| OcrError::Internal(format!("PDF parse task panicked: {}", e)))??;
        info!("PDF has {} pages", source.page_count());

        let results =
            process_pages(&self.invoker, Arc::new(source), &area, self.device_hint()).await?;
        area.release();

        let blank = results.iter().filter(|r| r.is_empty()).count();
        info!(
            "PDF OCR complete: {} pages ({} blank), {}ms total",
            results.len(),
            blank,
            start.elapsed().as_millis()
        );
        Ok(results)
    }
}

/// Split `source` page by page and parse each page in isolation.
///
/// Pages run strictly in ascending order. An engine failure yields an
/// empty-text result for that page; the returned list always has exactly
/// one entry per page.
pub async fn process_pages(
    invoker: &ParseInvoker,
    source: Arc<PdfSource>,
    area: &WorkingArea,
    hint: Option<&DeviceHint>,
) -> Result<Vec<PageResult>, OcrError> {
    let total = source.page_count();
    let mut results = Vec::with_capacity(total);

    for page_num in 1..=total {
        let src = Arc::clone(&source);
        let page = tokio::task::spawn_blocking(move || src.extract_page(page_num))
            .await
            .map_err(|e| OcrError::Internal(format!("Split task panicked: {}", e)))??;
        let dir = area.page_dir(page_num)?;

        match invoker.parse_page(page, &dir, hint).await {
            Ok(markdown) => {
                debug!("Page {}/{}: {} chars", page_num, total, markdown.len());
                results.push(PageResult::new(page_num, markdown));
            }
            Err(e) => {
                warn!("Page {}/{}: OCR failed, returning empty text: {}", page_num, total, e);
                results.push(PageResult::failed(page_num));
            }
        }
    }

    Ok(results)
}
