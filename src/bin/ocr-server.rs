//! CLI binary for mineru-ocr-server.
//!
//! Maps flags and environment variables onto `ServiceConfig`, sets up
//! logging and serves until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use mineru_ocr::{server, DeviceSlot, OcrService, ServiceConfig};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = "\
ENDPOINTS:
  GET  /            liveness check
  POST /ocr/image   multipart field `file` (image/*)        → {\"md_content\", \"page\"}
  POST /ocr/pdf     multipart field `file` (application/pdf) → [{\"md_content\", \"page\"}, ...]

DEVICES:
  auto, cpu, cuda, cuda:N, mps. Unavailable accelerators fall back to cpu.

EXAMPLES:
  ocr-server --port 9000 --device cuda:0
  curl -F file=@scan.pdf;type=application/pdf http://localhost:9000/ocr/pdf";

#[derive(Parser, Debug)]
#[command(
    name = "ocr-server",
    version,
    about = "HTTP OCR service: images and PDFs to Markdown, page by page",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "OCR_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "OCR_PORT", default_value_t = 8000)]
    port: u16,

    /// Compute device for every engine call (auto, cpu, cuda, cuda:N, mps).
    ///
    /// When unset, the engine runs on the process-wide device value and
    /// then on whatever auto-detection finds.
    #[arg(short, long)]
    device: Option<String>,

    /// Language hint passed to the engine.
    #[arg(long, env = "OCR_LANG", default_value = "ch")]
    lang: String,

    /// Parent directory for per-request working areas.
    #[arg(long, env = "OCR_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Maximum upload size in MiB.
    #[arg(long, env = "OCR_MAX_UPLOAD_MB", default_value_t = 200,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_upload_mb: u64,

    /// Engine program to run for each page.
    #[arg(long, env = "MINERU_BIN", default_value = "mineru")]
    engine: String,

    /// Enable debug logging.
    #[arg(short, long, env = "OCR_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .host(&self.host)
            .port(self.port)
            .lang(&self.lang)
            .max_upload_bytes((self.max_upload_mb as usize).saturating_mul(1024 * 1024))
            .engine_program(&self.engine);
        if let Some(device) = &self.device {
            builder = builder.device(device);
        }
        if let Some(dir) = &self.work_dir {
            builder = builder.work_root(dir);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.to_config()?;
    if let Some(dir) = &config.work_root {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create work directory {}", dir.display()))?;
    }

    let slot = DeviceSlot::process();
    tracing::info!(
        "Engine '{}', lang '{}', device hint {:?}, process device {:?}",
        config.engine_program,
        config.lang,
        config.device,
        slot.current()
    );

    let service = OcrService::from_config(config.clone());
    server::serve(&config, service)
        .await
        .with_context(|| format!("Server on {} failed", config.bind_addr()))?;
    Ok(())
}
