//! # Communications interface crate.
//!
//! Provides the communications interfaces shared by the car and the operator.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Drive command definition and wire format
pub mod cmd;

/// Network module
pub mod net;
