//! # mineru-ocr-server
//!
//! HTTP OCR service that turns images and PDFs into Markdown by driving an
//! external document-parsing engine (the `mineru` CLI by default).
//!
//! ## Why this crate?
//!
//! The engine parses whole documents in one go, reads its compute device from
//! process-wide state and gives no per-page failure reporting. This crate puts
//! a small service around it: every upload is normalised to PDF, split into
//! one-page documents, and each page is parsed on its own, so a page the
//! engine chokes on costs that page only. Engine calls are serialised
//! process-wide so concurrent requests cannot fight over the device setting.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Workspace  per-request temp directory, removed on every exit path
//!  ├─ 2. Normalise  image → A4 one-page PDF (alpha flattened onto white)
//!  ├─ 3. Split      PDF → one standalone PDF per page (lopdf, structural)
//!  ├─ 4. Parse      lock → resolve device → engine → restore → unlock
//!  └─ 5. Output     [{"md_content": "...", "page": n}, ...]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mineru_ocr::{server, OcrService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().port(8000).device("auto").build()?;
//!     let service = OcrService::from_config(config.clone());
//!     server::serve(&config, service).await?;
//!     Ok(())
//! }
//! ```
//!
//! The library entry points can also be used without HTTP:
//!
//! ```rust,no_run
//! # async fn run(bytes: Vec<u8>) -> Result<(), mineru_ocr::OcrError> {
//! use mineru_ocr::{OcrService, ServiceConfig};
//!
//! let service = OcrService::from_config(ServiceConfig::default());
//! for page in service.ocr_pdf(Some("application/pdf"), bytes).await? {
//!     println!("--- page {} ---\n{}", page.page_num, page.markdown);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use convert::{process_pages, OcrService};
pub use engine::device::{Device, DeviceHint, DeviceSlot};
pub use engine::{CommandEngine, Engine, EngineRequest, OutputFlags};
pub use error::{EngineError, OcrError};
pub use output::PageResult;
