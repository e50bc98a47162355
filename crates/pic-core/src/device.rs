//! Accelerator model detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GPU family, as far as the performance defaults care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuModel {
    P100,
    V100,
    Other,
}

impl GpuModel {
    /// Classify a device by its reported name, e.g. `"Tesla V100-SXM2-16GB"`.
    pub fn from_device_name(name: &str) -> Self {
        if name.contains("P100") {
            GpuModel::P100
        } else if name.contains("V100") {
            GpuModel::V100
        } else {
            GpuModel::Other
        }
    }
}

impl fmt::Display for GpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuModel::P100 => f.write_str("P100"),
            GpuModel::V100 => f.write_str("V100"),
            GpuModel::Other => f.write_str("other"),
        }
    }
}
