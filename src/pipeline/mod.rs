//! Pipeline stages for image/PDF OCR.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the engine can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! image ──▶ normalize ──────────────┐
//!                                   ├──▶ parse ──▶ Markdown
//! PDF ────▶ split ──▶ page × N ─────┘
//! ```
//!
//! 1. [`workspace`] — request-scoped temp directory, removed on drop
//! 2. [`normalize`] — decode an image, flatten alpha, fit it onto an A4 PDF page
//! 3. [`split`]     — structural one-page extraction with lopdf
//! 4. [`parse`]     — one serialized engine call with device override/restore

pub mod normalize;
pub mod parse;
pub mod split;
pub mod workspace;

/// A self-contained single-page PDF, consumed once by the parse stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    /// 1-indexed position in the uploaded document.
    pub page_num: usize,
    pub bytes: Vec<u8>,
}

impl PageDocument {
    pub fn new(page_num: usize, bytes: Vec<u8>) -> Self {
        Self { page_num, bytes }
    }
}
