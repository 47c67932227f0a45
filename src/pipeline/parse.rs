//! Engine invocation: one single-page PDF in, its Markdown out.
//!
//! ## Critical section
//!
//! The engine reads its device from process-wide state, so each call
//! temporarily overrides that state. The sequence
//!
//! ```text
//! acquire lock → resolve device → apply override → engine → restore → release
//! ```
//!
//! runs inside a single `spawn_blocking` task that owns the lock guard and a
//! [`PageDir`] handle. If the request awaiting it is cancelled, the task
//! still runs to completion and only then restores the device, releases the
//! lock and lets go of the working area. A second call can never observe a
//! half-finished override, and an abandoned area is still removed.

use crate::config::ServiceConfig;
use crate::engine::device::{resolve_device, DeviceHint, DeviceDetector, DeviceSlot, SystemDetector};
use crate::engine::{Engine, EngineRequest, OutputFlags};
use crate::error::EngineError;
use crate::pipeline::workspace::PageDir;
use crate::pipeline::PageDocument;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs pages through the engine, one at a time process-wide.
#[derive(Clone)]
pub struct ParseInvoker {
    engine: Arc<dyn Engine>,
    detector: Arc<dyn DeviceDetector>,
    slot: Arc<DeviceSlot>,
    doc_id: String,
    lang: String,
}

impl std::fmt::Debug for ParseInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseInvoker")
            .field("engine", &"<dyn Engine>")
            .field("slot", &self.slot)
            .field("doc_id", &self.doc_id)
            .field("lang", &self.lang)
            .finish()
    }
}

impl ParseInvoker {
    /// Invoker using the host detector and the process-wide device slot.
    pub fn new(engine: Arc<dyn Engine>, config: &ServiceConfig) -> Self {
        Self {
            engine,
            detector: Arc::new(SystemDetector),
            slot: DeviceSlot::process(),
            doc_id: config.doc_id.clone(),
            lang: config.lang.clone(),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn DeviceDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Use `slot` for the lock and the override. Engines read the device
    /// from the same slot through [`EngineRequest::device_slot`].
    pub fn with_slot(mut self, slot: Arc<DeviceSlot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn slot(&self) -> &Arc<DeviceSlot> {
        &self.slot
    }

    /// Parse one page.
    ///
    /// The page is staged as `<dir>/<doc_id>.pdf` and the engine writes
    /// into `<dir>/output`. Returns the Markdown with trailing whitespace
    /// removed. Every failure is returned; nothing is swallowed.
    pub async fn parse_page(
        &self,
        page: PageDocument,
        dir: &PageDir,
        hint: Option<&DeviceHint>,
    ) -> Result<String, EngineError> {
        let page_num = page.page_num;
        let request = EngineRequest {
            input: dir.path().join(format!("{}.pdf", self.doc_id)),
            output_dir: dir.path().join("output"),
            doc_id: self.doc_id.clone(),
            lang: self.lang.clone(),
            outputs: OutputFlags::markdown_only(),
            device_slot: Arc::clone(&self.slot),
        };
        stage(&page, &request).await?;
        drop(page);

        let permit = self.slot.acquire().await;
        debug!("Page {}: acquired engine lock", page_num);

        let engine = Arc::clone(&self.engine);
        let detector = Arc::clone(&self.detector);
        let slot = Arc::clone(&self.slot);
        let hint = hint.cloned();
        let dir = dir.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _dir = dir;
            run_engine(engine.as_ref(), detector.as_ref(), &slot, hint.as_ref(), &request, page_num)
        })
        .await
        .map_err(|e| EngineError::Panicked(e.to_string()))?
    }
}

async fn stage(page: &PageDocument, request: &EngineRequest) -> Result<(), EngineError> {
    if let Err(source) = tokio::fs::create_dir_all(&request.output_dir).await {
        return Err(EngineError::Stage {
            path: request.output_dir.clone(),
            source,
        });
    }
    tokio::fs::write(&request.input, &page.bytes)
        .await
        .map_err(|source| EngineError::Stage {
            path: request.input.clone(),
            source,
        })
}

/// Body of the critical section. Caller holds the invocation lock.
fn run_engine(
    engine: &dyn Engine,
    detector: &dyn DeviceDetector,
    slot: &Arc<DeviceSlot>,
    hint: Option<&DeviceHint>,
    request: &EngineRequest,
    page_num: usize,
) -> Result<String, EngineError> {
    let base = slot.current();
    let device = resolve_device(hint, base.as_deref(), detector);
    info!("Page {}: parsing on device {}", page_num, device);

    let start = Instant::now();
    {
        let _override = slot.apply(&device);
        engine.parse(request)?;
    }
    debug!("Page {}: engine finished in {:?}", page_num, start.elapsed());

    let path = request.markdown_path();
    match std::fs::read_to_string(&path) {
        Ok(md) => Ok(md.trim_end().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(EngineError::MissingArtifact { path }),
        Err(source) => Err(EngineError::ReadArtifact { path, source }),
    }
}
