//! Compute-device selection for the engine.
//!
//! The engine does not take its device as an argument: it reads the
//! `MINERU_DEVICE_MODE` variable from its environment. This module resolves
//! which device a call should use and owns the process-wide device value
//! ([`DeviceSlot`]) together with the lock that serialises every engine call
//! that mutates it.
//!
//! ## Resolution order
//!
//! 1. explicit per-call hint (`auto` jumps straight to detection)
//! 2. the process-wide value, seeded from `MINERU_DEVICE_MODE` at startup
//! 3. auto-detection: CUDA, then Apple MPS, else CPU
//! 4. validation: a requested accelerator that is not present right now
//!    falls back to CPU with a warning; resolution never fails

use once_cell::sync::Lazy;
use std::fmt;
use std::process::Command;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Environment variable the engine reads its device from.
pub const DEVICE_ENV_VAR: &str = "MINERU_DEVICE_MODE";

/// A concrete compute device, spelled the way the engine expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Cpu,
    /// NVIDIA GPU, optionally pinned to an index (`cuda:1`).
    Cuda(Option<u32>),
    /// Apple Metal Performance Shaders.
    Mps,
    /// Any other engine-supported device string, passed through unvalidated.
    Other(String),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(None) => f.write_str("cuda"),
            Device::Cuda(Some(idx)) => write!(f, "cuda:{idx}"),
            Device::Mps => f.write_str("mps"),
            Device::Other(s) => f.write_str(s),
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceHint {
    Auto,
    Explicit(Device),
}

impl DeviceHint {
    /// Parse a device string. Empty and `auto` mean [`DeviceHint::Auto`].
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        let device = match lower.as_str() {
            "" | "auto" => return DeviceHint::Auto,
            "cpu" => Device::Cpu,
            "cuda" => Device::Cuda(None),
            "mps" => Device::Mps,
            other => match other.strip_prefix("cuda:").map(str::parse::<u32>) {
                Some(Ok(idx)) => Device::Cuda(Some(idx)),
                _ => Device::Other(s.to_string()),
            },
        };
        DeviceHint::Explicit(device)
    }

    fn into_device(self) -> Option<Device> {
        match self {
            DeviceHint::Auto => None,
            DeviceHint::Explicit(d) => Some(d),
        }
    }
}

// ── Probing ──────────────────────────────────────────────────────────────

/// Outcome of looking for NVIDIA GPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CudaStatus {
    /// At least one GPU is visible.
    Available { devices: u32 },
    /// Driver tooling is installed but reports no usable GPU.
    NoDevice,
    /// No driver tooling at all; CUDA cannot even be checked.
    DriverMissing,
}

/// Detects which accelerators exist at call time.
pub trait DeviceDetector: Send + Sync {
    fn cuda(&self) -> CudaStatus;
    fn mps_available(&self) -> bool;
}

/// Inspects the host: `nvidia-smi -L` for CUDA, target platform for MPS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDetector;

impl DeviceDetector for SystemDetector {
    fn cuda(&self) -> CudaStatus {
        match Command::new("nvidia-smi").arg("-L").output() {
            Ok(out) if out.status.success() => {
                let devices = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .filter(|l| l.starts_with("GPU "))
                    .count() as u32;
                if devices == 0 {
                    CudaStatus::NoDevice
                } else {
                    CudaStatus::Available { devices }
                }
            }
            Ok(_) => CudaStatus::NoDevice,
            Err(e) => {
                debug!("nvidia-smi not runnable: {}", e);
                CudaStatus::DriverMissing
            }
        }
    }

    fn mps_available(&self) -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve the device for one engine call.
///
/// `process_value` is the process-wide device value as seen before this
/// call overrides it.
pub fn resolve_device(
    explicit: Option<&DeviceHint>,
    process_value: Option<&str>,
    detector: &dyn DeviceDetector,
) -> Device {
    let requested = match explicit {
        Some(DeviceHint::Explicit(d)) => Some(d.clone()),
        Some(DeviceHint::Auto) => None,
        None => process_value.map(DeviceHint::parse).and_then(DeviceHint::into_device),
    };

    match requested {
        Some(device) => validate(device, detector),
        None => detect(detector),
    }
}

fn detect(detector: &dyn DeviceDetector) -> Device {
    match detector.cuda() {
        CudaStatus::Available { devices } => {
            info!("Auto-detected {} CUDA device(s)", devices);
            return Device::Cuda(None);
        }
        CudaStatus::NoDevice => info!("NVIDIA driver present but no GPU visible"),
        CudaStatus::DriverMissing => debug!("No NVIDIA driver tooling found"),
    }
    if detector.mps_available() {
        info!("Auto-detected Apple MPS");
        return Device::Mps;
    }
    Device::Cpu
}

fn validate(device: Device, detector: &dyn DeviceDetector) -> Device {
    match device {
        Device::Cuda(idx) => match detector.cuda() {
            CudaStatus::Available { devices } => match idx {
                Some(i) if i >= devices => {
                    warn!(
                        "Configured device cuda:{} is out of range ({} GPU(s) visible), falling back to CPU",
                        i, devices
                    );
                    Device::Cpu
                }
                _ => Device::Cuda(idx),
            },
            CudaStatus::NoDevice => {
                warn!(
                    "Configured device {} is unavailable (no NVIDIA GPU detected), falling back to CPU",
                    Device::Cuda(idx)
                );
                Device::Cpu
            }
            CudaStatus::DriverMissing => {
                warn!(
                    "Cannot verify device {}: NVIDIA driver tooling not found, falling back to CPU",
                    Device::Cuda(idx)
                );
                Device::Cpu
            }
        },
        Device::Mps if !detector.mps_available() => {
            warn!("Configured device mps is unavailable on this host, falling back to CPU");
            Device::Cpu
        }
        other => other,
    }
}

// ── Process-wide slot ────────────────────────────────────────────────────

static PROCESS_SLOT: Lazy<Arc<DeviceSlot>> = Lazy::new(|| {
    let initial = std::env::var(DEVICE_ENV_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty());
    Arc::new(DeviceSlot::new(initial))
});

/// The process-wide device value and the lock serialising engine calls.
///
/// Engine calls mutate the value for their duration, so two calls must never
/// overlap. Hold the guard from [`DeviceSlot::acquire`] for the whole
/// resolve → apply → engine → restore sequence.
#[derive(Debug)]
pub struct DeviceSlot {
    value: RwLock<Option<String>>,
    invocation: Arc<Mutex<()>>,
}

impl DeviceSlot {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            value: RwLock::new(initial),
            invocation: Arc::new(Mutex::new(())),
        }
    }

    /// The shared slot, seeded from `MINERU_DEVICE_MODE` on first use.
    pub fn process() -> Arc<DeviceSlot> {
        Arc::clone(&PROCESS_SLOT)
    }

    /// Current value; `None` means unset.
    pub fn current(&self) -> Option<String> {
        self.value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, value: Option<String>) -> Option<String> {
        let mut guard = self
            .value
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, value)
    }

    /// Wait for exclusive use of the engine.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.invocation).lock_owned().await
    }

    /// Set the value to `device` until the returned guard drops.
    pub fn apply(self: &Arc<Self>, device: &Device) -> DeviceOverride {
        let previous = self.replace(Some(device.to_string()));
        DeviceOverride {
            slot: Arc::clone(self),
            previous,
        }
    }
}

/// Restores the slot's previous value (including "unset") on drop.
#[derive(Debug)]
pub struct DeviceOverride {
    slot: Arc<DeviceSlot>,
    previous: Option<String>,
}

impl Drop for DeviceOverride {
    fn drop(&mut self) {
        self.slot.replace(self.previous.take());
    }
}
