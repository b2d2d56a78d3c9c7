//! # Network Module
//!
//! This module provides the networking definitions shared by the car and the operator: the
//! transports a command can travel over, default endpoints, and a classification of socket
//! errors which both ends use to decide whether a connection is still usable.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod sender;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::{fmt, io, str::FromStr};

pub use sender::{CmdSender, SendError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default host the car binds its command receiver to (all interfaces).
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default port for the command channel, for both transports.
pub const DEFAULT_CMD_PORT: u16 = 5001;

/// Maximum size of a single command message.
///
/// Each datagram, or each chunk read from a stream, is treated as one message of at most this
/// many bytes.
pub const MAX_CMD_LEN: usize = 1024;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Transport used for the command channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Connectionless, each datagram is an independent command.
    Udp,

    /// Connection oriented, a single operator connection at a time.
    Tcp,
}

/// Coarse classification of an `io::Error` raised by a socket operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IoErrorClass {
    /// The operation's timeout elapsed with no data, this is the normal idle condition.
    Timeout,

    /// The peer closed or reset the connection.
    Disconnected,

    /// The socket can no longer be used and must be discarded.
    Unusable,

    /// Any other error, the socket may be used again.
    Transient,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown transport \"{0}\", expected \"udp\" or \"tcp\"")]
pub struct ParseTransportError(String);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Transport {
    fn default() -> Self {
        Transport::Udp
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for Transport {
    type Err = ParseTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            _ => Err(ParseTransportError(s.into())),
        }
    }
}

impl IoErrorClass {
    /// Classify the given socket error.
    ///
    /// Read timeouts surface as `WouldBlock` on unix and `TimedOut` on windows, both are treated
    /// as a timeout.
    pub fn of(err: &io::Error) -> Self {
        use io::ErrorKind::*;

        match err.kind() {
            WouldBlock | TimedOut => IoErrorClass::Timeout,
            ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof => {
                IoErrorClass::Disconnected
            }
            NotConnected | InvalidInput => IoErrorClass::Unusable,
            _ => IoErrorClass::Transient,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
