//! Boundary to the external document-parsing engine.
//!
//! The engine is a black box: hand it a single-page PDF and an output
//! directory, and it writes `<output_dir>/<doc_id>/auto/<doc_id>.md`. It
//! reads its compute device from the [`device::DeviceSlot`] the request
//! points at, at the moment it runs. The invoker holds that slot's lock and
//! override for the whole call, so the engine sees the resolved device.
//!
//! ```text
//! EngineRequest ──▶ Engine::parse ──▶ <output_dir>/<doc_id>/auto/<doc_id>.md
//!                        ▲
//!                        └── device from DeviceSlot (MINERU_DEVICE_MODE)
//! ```

pub mod command;
pub mod device;

pub use command::CommandEngine;

use crate::error::EngineError;
use self::device::DeviceSlot;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which artifacts the engine should write.
///
/// The service only ever reads the Markdown file; everything else is
/// switched off by [`OutputFlags::markdown_only`]. In-process engines can
/// honour these. [`CommandEngine`] ignores them: the `mineru` CLI has no
/// switches for them, and whatever extra it writes is removed with the
/// working area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
    pub draw_layout_bbox: bool,
    pub draw_span_bbox: bool,
    pub dump_md: bool,
    pub dump_middle_json: bool,
    pub dump_model_output: bool,
    pub dump_orig_pdf: bool,
    pub dump_content_list: bool,
}

impl OutputFlags {
    pub const fn markdown_only() -> Self {
        Self {
            draw_layout_bbox: false,
            draw_span_bbox: false,
            dump_md: true,
            dump_middle_json: false,
            dump_model_output: false,
            dump_orig_pdf: false,
            dump_content_list: false,
        }
    }
}

impl Default for OutputFlags {
    fn default() -> Self {
        Self::markdown_only()
    }
}

/// One engine call: a staged single-page PDF and where to put the results.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// Path of the staged page document; its file stem is `doc_id`.
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub doc_id: String,
    pub lang: String,
    pub outputs: OutputFlags,
    /// Where the engine reads its device from.
    pub device_slot: Arc<DeviceSlot>,
}

impl EngineRequest {
    /// Where the engine leaves the Markdown for this request.
    pub fn markdown_path(&self) -> PathBuf {
        markdown_path(&self.output_dir, &self.doc_id)
    }
}

/// `<output_dir>/<doc_id>/auto/<doc_id>.md`
pub fn markdown_path(output_dir: &Path, doc_id: &str) -> PathBuf {
    output_dir
        .join(doc_id)
        .join("auto")
        .join(format!("{doc_id}.md"))
}

/// The external parsing capability.
///
/// `parse` blocks until the engine is done. Callers run it on a blocking
/// thread while holding the device slot's invocation lock.
pub trait Engine: Send + Sync {
    fn parse(&self, request: &EngineRequest) -> Result<(), EngineError>;
}
