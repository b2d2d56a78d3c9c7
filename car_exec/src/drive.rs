//! # Drive loop
//!
//! Fixed rate loop which polls a command source once per cycle and forwards the result to the
//! drivetrain. Converting the demands into PWM signals is the drivetrain's business.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::DriveCmd;
use log::{debug, info, warn};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use crate::remote_ctrl::RemoteCtrl;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which provides a `(steering, throttle)` pair each cycle.
pub trait CmdSource {
    fn poll(&self, now: Instant) -> (f64, f64);
}

/// Consumer of the demands produced by the drive loop.
pub trait Drivetrain {
    fn set_demands(&mut self, steering: f64, throttle: f64);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A drivetrain which only logs the demands it's given.
#[derive(Debug)]
pub struct LogDrivetrain {
    last: Option<(f64, f64)>,
    safe: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdSource for RemoteCtrl {
    fn poll(&self, now: Instant) -> (f64, f64) {
        RemoteCtrl::poll(self, now)
    }
}

impl LogDrivetrain {
    pub fn new() -> Self {
        Self {
            last: None,
            safe: true,
        }
    }

    /// The last demands given to the drivetrain.
    pub fn last_demands(&self) -> Option<(f64, f64)> {
        self.last
    }

    /// True while the drivetrain is being held at neutral.
    pub fn is_safe(&self) -> bool {
        self.safe
    }
}

impl Default for LogDrivetrain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drivetrain for LogDrivetrain {
    fn set_demands(&mut self, steering: f64, throttle: f64) {
        let neutral = DriveCmd::from((steering, throttle)).is_neutral();

        if neutral && !self.safe {
            warn!("Neutral demand, entering safe mode");
            self.safe = true;
        }
        else if !neutral && self.safe {
            info!("Recieved valid demand, exiting safe mode");
            self.safe = false;
        }

        if self.last != Some((steering, throttle)) {
            debug!("Demands: steering {:+.3}, throttle {:+.3}", steering, throttle);
            self.last = Some((steering, throttle));
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the drive loop with the given cycle period.
///
/// The loop ends once `max_loops` cycles have run, if given, or when `running` is cleared. Returns
/// the number of cycles executed.
pub fn run_loop<S, D>(
    source: &S,
    drivetrain: &mut D,
    cycle_period: Duration,
    max_loops: Option<u64>,
    running: &AtomicBool,
) -> u64
where
    S: CmdSource,
    D: Drivetrain,
{
    let mut num_cycles: u64 = 0;

    while running.load(Ordering::Relaxed) && max_loops.map_or(true, |max| num_cycles < max) {
        let cycle_start_instant = Instant::now();

        let (steering, throttle) = source.poll(cycle_start_instant);
        drivetrain.set_demands(steering, throttle);

        num_cycles += 1;

        let cycle_dur = cycle_start_instant.elapsed();

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                (cycle_dur - cycle_period).as_secs_f64()
            ),
        }
    }

    num_cycles
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
