//! Run the engine as a child process (the `mineru` CLI by default).
//!
//! The child inherits the service's environment except for
//! `MINERU_DEVICE_MODE`, which is replaced by the value of the request's
//! device slot at spawn time. That is how a per-call device override reaches
//! an engine that only reads its device from the environment.

use super::device::DEVICE_ENV_VAR;
use super::{Engine, EngineRequest};
use crate::config::ServiceConfig;
use crate::error::EngineError;
use std::process::Command;
use tracing::debug;

/// Bytes of stderr kept in [`EngineError::Failed`].
const STDERR_TAIL: usize = 2000;

/// An [`Engine`] backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    /// `args` may contain `{input}`, `{output}`, `{lang}` and `{doc_id}`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.engine_program.clone(), config.engine_args.clone())
    }

    fn render_args(&self, request: &EngineRequest) -> Vec<String> {
        let input = request.input.to_string_lossy();
        let output = request.output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|a| {
                a.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{lang}", &request.lang)
                    .replace("{doc_id}", &request.doc_id)
            })
            .collect()
    }
}

impl Engine for CommandEngine {
    fn parse(&self, request: &EngineRequest) -> Result<(), EngineError> {
        let args = self.render_args(request);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        match request.device_slot.current() {
            Some(device) => cmd.env(DEVICE_ENV_VAR, device),
            None => cmd.env_remove(DEVICE_ENV_VAR),
        };
        debug!("Running {} {:?}", self.program, args);

        let out = cmd.output().map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !out.status.success() {
            return Err(EngineError::Failed {
                status: out.status,
                stderr: tail(&String::from_utf8_lossy(&out.stderr), STDERR_TAIL),
            });
        }
        Ok(())
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> String {
    let s = s.trim_end();
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("\u{2026}{}", &s[start..])
}
