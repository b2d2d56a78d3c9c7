//! # Shared command state
//!
//! The latest successfully decoded command and the instant it was received. The receiver worker
//! is the only writer, the control loop is the only reader.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::DriveCmd;
use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A consistent view of the command state.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct CmdSnapshot {
    /// The last command received, or neutral if the link has been dropped.
    pub cmd: DriveCmd,

    /// When the last command was received, `None` if no command has been received yet.
    pub last_receipt: Option<Instant>,
}

/// Command state shared between the receiver worker and the control loop.
///
/// Both fields sit behind one lock so a reader can never see a new command paired with an old
/// receipt time or the other way around.
#[derive(Debug, Default)]
pub struct CmdState {
    inner: Mutex<CmdSnapshot>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a newly received command along with the time it was received.
    pub fn set(&self, cmd: DriveCmd, receipt: Instant) {
        let mut inner = self.lock();
        inner.cmd = cmd;
        inner.last_receipt = Some(receipt);
    }

    /// Replace the stored command with the neutral command.
    ///
    /// The receipt time is left untouched, it only ever moves when a command is received.
    pub fn reset_cmd(&self) {
        self.lock().cmd = DriveCmd::NEUTRAL;
    }

    /// Take a consistent copy of the state.
    pub fn snapshot(&self) -> CmdSnapshot {
        *self.lock()
    }

    /// The lock is only ever held for a copy, so a panic while holding it can't leave the
    /// snapshot half written and poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, CmdSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
