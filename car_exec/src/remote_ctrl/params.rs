//! # Remote control parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::{Transport, DEFAULT_BIND_HOST, DEFAULT_CMD_PORT, MAX_CMD_LEN};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use util::time::seconds_to_duration;

use super::RemoteCtrlError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest accepted value for any of the link's timeouts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the remote control link, loaded from the `[remote_ctrl]` table of the
/// executable's parameter file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCtrlParams {
    /// Transport the commands are received over
    pub transport: Transport,

    /// Host to bind the receiver to
    pub bind_host: String,

    /// Port to bind the receiver to
    pub bind_port: u16,

    /// Maximum age of the last command before the neutral command is output instead
    pub watchdog_timeout_s: f64,

    /// Timeout of a single receive call, bounds how long shutdown can take
    pub recv_timeout_s: f64,

    /// Timeout of a single accept attempt (TCP only)
    pub accept_timeout_s: f64,

    /// Size of the receive buffer, which is also the largest command that can be received
    pub recv_buffer_size: usize,
}

/// Validated durations derived from [`RemoteCtrlParams`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Timeouts {
    pub watchdog: Duration,
    pub recv: Duration,
    pub accept: Duration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RemoteCtrlParams {
    /// Validate the parameters, returning the timeouts the receivers should use.
    pub(crate) fn timeouts(&self) -> Result<Timeouts, RemoteCtrlError> {
        if self.recv_buffer_size == 0 {
            return Err(RemoteCtrlError::InvalidParams(
                "recv_buffer_size must be greater than zero".into(),
            ));
        }

        Ok(Timeouts {
            watchdog: duration(self.watchdog_timeout_s, "watchdog_timeout_s", true)?,
            // Sockets reject a zero read timeout
            recv: duration(self.recv_timeout_s, "recv_timeout_s", false)?,
            accept: duration(self.accept_timeout_s, "accept_timeout_s", false)?,
        })
    }

    /// The address the receiver binds to, as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

impl Default for RemoteCtrlParams {
    fn default() -> Self {
        Self {
            transport: Transport::Udp,
            bind_host: DEFAULT_BIND_HOST.into(),
            bind_port: DEFAULT_CMD_PORT,
            watchdog_timeout_s: 0.5,
            recv_timeout_s: 0.1,
            accept_timeout_s: 1.0,
            recv_buffer_size: MAX_CMD_LEN,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn duration(seconds: f64, name: &str, allow_zero: bool) -> Result<Duration, RemoteCtrlError> {
    match seconds_to_duration(seconds) {
        Some(d) if d > MAX_TIMEOUT => Err(RemoteCtrlError::InvalidParams(format!(
            "{} must be at most {} s, found {}",
            name,
            MAX_TIMEOUT.as_secs(),
            seconds
        ))),
        Some(d) if allow_zero || d > Duration::ZERO => Ok(d),
        _ => Err(RemoteCtrlError::InvalidParams(format!(
            "{} must be a positive number of seconds, found {}",
            name, seconds
        ))),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = RemoteCtrlParams::default();
        let timeouts = params.timeouts().unwrap();

        assert_eq!(params.bind_addr(), "0.0.0.0:5001");
        assert_eq!(params.transport, Transport::Udp);
        assert_eq!(timeouts.watchdog, Duration::from_millis(500));
        assert_eq!(timeouts.recv, Duration::from_millis(100));
        assert_eq!(timeouts.accept, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_table() {
        let params: RemoteCtrlParams =
            util::params::from_str("transport = \"tcp\"\nbind_port = 6000\n").unwrap();

        assert_eq!(params.transport, Transport::Tcp);
        assert_eq!(params.bind_port, 6000);
        assert_eq!(params.bind_host, "0.0.0.0");
        assert_eq!(params.watchdog_timeout_s, 0.5);
    }

    #[test]
    fn test_invalid_timeouts_rejected() {
        let zero_recv = RemoteCtrlParams {
            recv_timeout_s: 0.0,
            ..Default::default()
        };
        let negative_watchdog = RemoteCtrlParams {
            watchdog_timeout_s: -0.5,
            ..Default::default()
        };
        let nan_accept = RemoteCtrlParams {
            accept_timeout_s: f64::NAN,
            ..Default::default()
        };
        let no_buffer = RemoteCtrlParams {
            recv_buffer_size: 0,
            ..Default::default()
        };

        for params in &[zero_recv, negative_watchdog, nan_accept, no_buffer] {
            assert!(matches!(
                params.timeouts(),
                Err(RemoteCtrlError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_huge_timeouts_rejected() {
        let huge_accept = RemoteCtrlParams {
            accept_timeout_s: 1e19,
            ..Default::default()
        };
        let huge_recv = RemoteCtrlParams {
            recv_timeout_s: 3600.5,
            ..Default::default()
        };
        let huge_watchdog = RemoteCtrlParams {
            watchdog_timeout_s: 1e9,
            ..Default::default()
        };

        for params in &[huge_accept, huge_recv, huge_watchdog] {
            assert!(matches!(
                params.timeouts(),
                Err(RemoteCtrlError::InvalidParams(_))
            ));
        }

        // The limit itself is allowed
        let at_limit = RemoteCtrlParams {
            accept_timeout_s: 3600.0,
            ..Default::default()
        };
        assert_eq!(at_limit.timeouts().unwrap().accept, MAX_TIMEOUT);
    }
}
