//! # Drive command module
//!
//! This module defines the drive command sent by the operator to the car, and its wire format.
//!
//! A command is a UTF-8 JSON object with two optional numeric fields:
//!
//! ```json
//! {"steering": 0.5, "throttle": 0.3}
//! ```
//!
//! Absent fields default to `0.0`, unrecognised fields are ignored. Any other payload (non UTF-8,
//! invalid JSON, a JSON value which is not an object, or a recognised field which is not a
//! number) is rejected with a [`DecodeError`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A steering and throttle demand for the car.
///
/// No range is enforced on either value here, clamping to the drivetrain's limits is done
/// downstream.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveCmd {
    /// Steering demand, negative is left and positive is right.
    pub steering: f64,

    /// Throttle demand, negative is reverse and positive is forward.
    pub throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while decoding a command payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Command is not valid UTF-8: {0}")]
    NonUtf8(std::str::Utf8Error),

    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command is not a JSON object")]
    NotAnObject,

    #[error("Command field \"{0}\" is not a number")]
    NonNumeric(&'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveCmd {
    /// The neutral command, stops the car.
    pub const NEUTRAL: DriveCmd = DriveCmd {
        steering: 0.0,
        throttle: 0.0,
    };

    /// Create a new command.
    pub fn new(steering: f64, throttle: f64) -> Self {
        Self { steering, throttle }
    }

    /// Return true if this is the neutral command.
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Return the command as a `(steering, throttle)` pair.
    pub fn as_pair(&self) -> (f64, f64) {
        (self.steering, self.throttle)
    }

    /// Decode a command from a raw payload as received from the network.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, DecodeError> {
        let json_str = std::str::from_utf8(payload).map_err(DecodeError::NonUtf8)?;

        Self::from_json(json_str)
    }

    /// Decode a command from a JSON string.
    ///
    /// Both fields are read before the command is built, so a failure never yields a partially
    /// filled command.
    pub fn from_json(json_str: &str) -> Result<Self, DecodeError> {
        let val: Value = serde_json::from_str(json_str).map_err(DecodeError::InvalidJson)?;

        let obj = match val.as_object() {
            Some(o) => o,
            None => return Err(DecodeError::NotAnObject),
        };

        Ok(Self {
            steering: get_number(obj, "steering")?,
            throttle: get_number(obj, "throttle")?,
        })
    }

    /// Encode the command into its JSON wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<(f64, f64)> for DriveCmd {
    fn from((steering, throttle): (f64, f64)) -> Self {
        Self::new(steering, throttle)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read an optional numeric field, defaulting to zero when it's absent.
fn get_number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match obj.get(field) {
        None => Ok(0.0),
        Some(v) => v.as_f64().ok_or(DecodeError::NonNumeric(field)),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
