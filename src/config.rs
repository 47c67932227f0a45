//! Configuration types for the OCR service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. The binary maps CLI flags and environment
//! variables onto the builder; tests set only the fields they care about.

use crate::engine::device::DeviceHint;
use crate::error::OcrError;
use std::path::PathBuf;

/// Stable document id handed to the engine. The engine names its output
/// directory and Markdown file after it.
pub const DEFAULT_DOC_ID: &str = "parsed";

/// Language hint passed to the engine.
pub const DEFAULT_LANG: &str = "ch";

/// Argument template for the `mineru` CLI.
pub const DEFAULT_ENGINE_ARGS: [&str; 10] = [
    "-p", "{input}", "-o", "{output}", "-l", "{lang}", "-b", "pipeline", "-m", "auto",
];

/// Configuration for the OCR service.
///
/// # Example
/// ```rust
/// use mineru_ocr::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(9000)
///     .device("cpu")
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 9000);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: 8000.
    pub port: u16,

    /// Device hint passed to every engine call. Default: `None`.
    ///
    /// `None` defers to the process-wide device value and then to
    /// auto-detection; see [`crate::engine::device`].
    pub device: Option<DeviceHint>,

    /// Language hint for the engine. Default: `ch`.
    pub lang: String,

    /// Parent directory for per-request working areas. Default: system temp dir.
    pub work_root: Option<PathBuf>,

    /// Maximum accepted request body size in bytes. Default: 200 MiB.
    pub max_upload_bytes: usize,

    /// Engine program run by [`crate::engine::CommandEngine`]. Default: `mineru`.
    pub engine_program: String,

    /// Engine argument template.
    ///
    /// The default pins the `pipeline` backend: only that backend writes its
    /// Markdown under `<output>/<doc_id>/auto/`.
    ///
    /// Placeholders: `{input}`, `{output}`, `{lang}`, `{doc_id}`.
    pub engine_args: Vec<String>,

    /// Stable document id for staged pages. Default: `parsed`.
    pub doc_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            device: None,
            lang: DEFAULT_LANG.to_string(),
            work_root: None,
            max_upload_bytes: 200 * 1024 * 1024,
            engine_program: "mineru".to_string(),
            engine_args: DEFAULT_ENGINE_ARGS.iter().map(|s| s.to_string()).collect(),
            doc_id: DEFAULT_DOC_ID.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Parse and set the device hint (`cpu`, `cuda`, `cuda:1`, `mps`, `auto`, …).
    pub fn device(mut self, device: impl AsRef<str>) -> Self {
        self.config.device = Some(DeviceHint::parse(device.as_ref()));
        self
    }

    pub fn device_hint(mut self, hint: Option<DeviceHint>) -> Self {
        self.config.device = hint;
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.config.lang = lang.into();
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn engine_program(mut self, program: impl Into<String>) -> Self {
        self.config.engine_program = program.into();
        self
    }

    pub fn engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.engine_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn doc_id(mut self, id: impl Into<String>) -> Self {
        self.config.doc_id = id.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, OcrError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(OcrError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.engine_program.trim().is_empty() {
            return Err(OcrError::InvalidConfig(
                "engine_program must not be empty".into(),
            ));
        }
        if c.lang.trim().is_empty() {
            return Err(OcrError::InvalidConfig("lang must not be empty".into()));
        }
        // The id becomes a file stem and a directory name.
        if c.doc_id.is_empty()
            || c.doc_id.contains(['/', '\\'])
            || c.doc_id == "."
            || c.doc_id == ".."
        {
            return Err(OcrError::InvalidConfig(format!(
                "doc_id must be a plain file stem, got {:?}",
                c.doc_id
            )));
        }
        Ok(self.config)
    }
}
