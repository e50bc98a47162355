//! Runtime configuration
//!
//! Settings come from three places, lowest priority first: `Default`, a JSON
//! document (`from_json_str`), and `PIC_*` environment variables
//! (`from_env`, which starts from the defaults).
//!
//! | variable | field |
//! |---|---|
//! | `PIC_BACKEND` | `backend` (`cpu`, `cuda`, `auto`) |
//! | `PIC_VIRTUAL_DEVICES` | `virtual_devices` |
//! | `PIC_DEVICE_MEMORY_LIMIT` | `device_memory_limit` (bytes) |
//! | `PIC_DEFAULT_TPB` | `default_tpb` |

use crate::error::{Error, Result};
use crate::executor::BackendType;
use pic_backends::DEFAULT_TPB_1D;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub backend: BackendType,
    /// Devices exposed by the host backend.
    pub virtual_devices: usize,
    /// Byte cap on host backend device memory. `None` is unbounded.
    pub device_memory_limit: Option<usize>,
    /// Threads per block used when a kernel is launched over a unit count.
    pub default_tpb: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Cpu,
            virtual_devices: 1,
            device_memory_limit: None,
            default_tpb: DEFAULT_TPB_1D,
        }
    }
}

impl ExecutorConfig {
    /// Defaults overridden by any `PIC_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(backend) = env_var::<BackendType>("PIC_BACKEND")? {
            config.backend = backend;
        }
        if let Some(devices) = env_var("PIC_VIRTUAL_DEVICES")? {
            config.virtual_devices = devices;
        }
        if let Some(limit) = env_var("PIC_DEVICE_MEMORY_LIMIT")? {
            config.device_memory_limit = Some(limit);
        }
        if let Some(tpb) = env_var("PIC_DEFAULT_TPB")? {
            config.default_tpb = tpb;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Configuration(format!("invalid executor config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_tpb == 0 {
            return Err(Error::Configuration("default_tpb must be positive".into()));
        }
        Ok(())
    }
}

/// Time-stepping settings of a [`Simulation`](crate::simulation::Simulation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Timestep in seconds.
    pub dt: f64,
    /// Keep fields and particles on the accelerator while stepping.
    pub use_device: bool,
    pub show_progress: bool,
    /// Iterations between progress reports.
    pub progress_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0e-15,
            use_device: false,
            show_progress: true,
            progress_interval: 100,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Configuration(format!("invalid simulation config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(Error::Configuration(format!("dt must be positive and finite, got {}", self.dt)));
        }
        if self.progress_interval == 0 {
            return Err(Error::Configuration("progress_interval must be positive".into()));
        }
        Ok(())
    }
}

fn env_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{key}={raw:?}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Configuration(format!("{key}: {e}"))),
    }
}
