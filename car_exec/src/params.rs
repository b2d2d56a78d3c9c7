//! # Car Executable Parameters
//!
//! This module provides parameters for the car executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;
use util::logger::LevelFilter;

use crate::remote_ctrl::RemoteCtrlParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarExecParams {

    /// Frequency of the drive loop
    pub loop_hz: f64,

    /// Number of cycles after which the drive loop stops, runs until interrupted if not given
    pub max_loops: Option<u64>,

    /// Minimum level of log messages, must be at least `info`
    pub log_level: LevelFilter,

    /// Remote control link
    pub remote_ctrl: RemoteCtrlParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CarExecParams {
    /// Target period of one drive loop cycle, or `None` if `loop_hz` is not a positive number.
    pub fn cycle_period(&self) -> Option<Duration> {
        if self.loop_hz.is_finite() && self.loop_hz > 0.0 {
            util::time::seconds_to_duration(1.0 / self.loop_hz)
        }
        else {
            None
        }
    }
}

impl Default for CarExecParams {
    fn default() -> Self {
        Self {
            loop_hz: 20.0,
            max_loops: None,
            log_level: LevelFilter::Info,
            remote_ctrl: RemoteCtrlParams::default(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
