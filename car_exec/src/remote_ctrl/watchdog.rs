//! # Failsafe watchdog
//!
//! If the operator's commands stop arriving (client crash, Wi-Fi drop, cable pulled) the car must
//! come to a stop within one watchdog period rather than carry on with the last throttle.

use comms_if::cmd::DriveCmd;
use std::time::{Duration, Instant};

use super::state::CmdSnapshot;

/// Return the command the car should act on at `now`.
///
/// This is the stored command if it was received no more than `threshold` before `now`, otherwise
/// the neutral command. A state which has never received a command is always neutral.
pub fn effective_cmd(now: Instant, snapshot: &CmdSnapshot, threshold: Duration) -> DriveCmd {
    match snapshot.last_receipt {
        Some(receipt) if now.saturating_duration_since(receipt) <= threshold => snapshot.cmd,
        _ => DriveCmd::NEUTRAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_millis(500);

    fn snapshot_at(receipt: Instant) -> CmdSnapshot {
        CmdSnapshot {
            cmd: DriveCmd::new(0.5, 0.3),
            last_receipt: Some(receipt),
        }
    }

    #[test]
    fn test_fresh_command_passes() {
        let t = Instant::now();
        let snap = snapshot_at(t);

        assert_eq!(effective_cmd(t, &snap, THRESHOLD), DriveCmd::new(0.5, 0.3));
        assert_eq!(
            effective_cmd(t + Duration::from_millis(250), &snap, THRESHOLD),
            DriveCmd::new(0.5, 0.3)
        );
        // Inclusive at the threshold
        assert_eq!(
            effective_cmd(t + THRESHOLD, &snap, THRESHOLD),
            DriveCmd::new(0.5, 0.3)
        );
    }

    #[test]
    fn test_stale_command_is_neutral() {
        let t = Instant::now();
        let snap = snapshot_at(t);

        assert_eq!(
            effective_cmd(t + THRESHOLD + Duration::from_micros(1), &snap, THRESHOLD),
            DriveCmd::NEUTRAL
        );
        assert_eq!(
            effective_cmd(t + Duration::from_secs(60), &snap, THRESHOLD),
            DriveCmd::NEUTRAL
        );
    }

    #[test]
    fn test_never_received_is_neutral() {
        let snap = CmdSnapshot::default();
        let t = Instant::now();

        for offset_ms in &[0, 1, 500, 10_000] {
            assert_eq!(
                effective_cmd(t + Duration::from_millis(*offset_ms), &snap, THRESHOLD),
                DriveCmd::NEUTRAL
            );
        }
    }

    #[test]
    fn test_poll_time_before_receipt() {
        // A poll time taken just before the worker stamped the command counts as fresh
        let t = Instant::now();
        let snap = snapshot_at(t + Duration::from_millis(5));

        assert_eq!(effective_cmd(t, &snap, THRESHOLD), DriveCmd::new(0.5, 0.3));
    }

    #[test]
    fn test_zero_threshold() {
        let t = Instant::now();
        let snap = snapshot_at(t);

        assert_eq!(effective_cmd(t, &snap, Duration::ZERO), DriveCmd::new(0.5, 0.3));
        assert_eq!(
            effective_cmd(t + Duration::from_nanos(1), &snap, Duration::ZERO),
            DriveCmd::NEUTRAL
        );
    }
}
