//! # Car library.
//!
//! This library allows other crates in the workspace, and the tests, to access items defined
//! inside the car executable.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Remote control - receives drive commands from the operator over the network
pub mod remote_ctrl;

/// Drive loop - polls the remote control at a fixed rate and feeds the drivetrain
pub mod drive;

/// Parameters for the car executable
pub mod params;
