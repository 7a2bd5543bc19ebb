//! Rig configuration loaded from JSON.
//!
//! Every field falls back to the built-in patch rig defaults, so an empty object `{}` is a
//! valid configuration. A typical file only overrides the wiring:
//!
//! ```json
//! {
//!     "channels": {
//!         "patch-command": "Dev2/ao0",
//!         "patch-voltage": "Dev1/ai22",
//!         "patch-current": "Dev1/ai20",
//!         "clock-1": "/Dev1/PFI1",
//!         "clock-2": "/Dev2/PFI7"
//!     },
//!     "stage_port": "/dev/ttyUSB0"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::channel::{ChannelRoles, ChannelTable};
use crate::error::{Result, SessionError};

/// Seal test block wave parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConstants {
    pub samp_rate: f64,
    pub freq: f64,
    pub v_min: f64,
    pub v_max: f64,
    pub duty: f64,
}

impl Default for MeasurementConstants {
    fn default() -> Self {
        Self {
            samp_rate: 10_000.,
            freq: 100.,
            v_min: 0.,
            v_max: 0.1,
            duty: 0.5,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub channels: ChannelTable,
    pub roles: ChannelRoles,
    pub constants: MeasurementConstants,
    pub stage_port: Option<String>,
}

impl RigConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            SessionError::Configuration(format!("Invalid rig configuration: {}", err))
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            SessionError::Configuration(format!(
                "Cannot read rig configuration {}: {}",
                path.display(),
                err
            ))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            SessionError::Configuration(format!("Cannot serialize rig configuration: {}", err))
        })
    }
}
