//! # Command sender
//!
//! Operator side of the command channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{self, Write},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
};

use super::Transport;
use crate::cmd::DriveCmd;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Sends drive commands to a car over either transport.
///
/// Each call to [`CmdSender::send`] writes exactly one JSON message.
pub enum CmdSender {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// Errors which can occur while sending a command.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Could not resolve the endpoint {0}")]
    ResolveError(String),

    #[error("Could not connect to {0}: {1}")]
    ConnectError(String, io::Error),

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not send the command: {0}")]
    SendError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdSender {
    /// Connect to the car's command receiver at `endpoint` (e.g. `"192.168.0.10:5001"`).
    ///
    /// For UDP this only fixes the destination of the datagrams, no packets are exchanged.
    pub fn connect(transport: Transport, endpoint: &str) -> Result<Self, SendError> {
        let addr = resolve(endpoint)?;

        match transport {
            Transport::Udp => {
                let local = match addr {
                    SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
                    SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
                };
                let socket = UdpSocket::bind(local)
                    .and_then(|s| s.connect(addr).map(|_| s))
                    .map_err(|e| SendError::ConnectError(endpoint.into(), e))?;

                Ok(CmdSender::Udp(socket))
            }
            Transport::Tcp => {
                let stream = TcpStream::connect(addr)
                    .map_err(|e| SendError::ConnectError(endpoint.into(), e))?;

                // Commands are tiny and latency sensitive
                stream
                    .set_nodelay(true)
                    .map_err(|e| SendError::ConnectError(endpoint.into(), e))?;

                Ok(CmdSender::Tcp(stream))
            }
        }
    }

    /// Send a single command.
    pub fn send(&mut self, cmd: &DriveCmd) -> Result<(), SendError> {
        let json = cmd.to_json().map_err(SendError::SerializationError)?;

        self.send_raw(json.as_bytes())
    }

    /// Send a raw payload as one message, without any validation.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let result = match self {
            CmdSender::Udp(s) => s.send(payload).map(|_| ()),
            CmdSender::Tcp(s) => s.write_all(payload).and_then(|_| s.flush()),
        };

        result.map_err(SendError::SendError)
    }

    /// The transport this sender uses.
    pub fn transport(&self) -> Transport {
        match self {
            CmdSender::Udp(_) => Transport::Udp,
            CmdSender::Tcp(_) => Transport::Tcp,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn resolve(endpoint: &str) -> Result<SocketAddr, SendError> {
    endpoint
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SendError::ResolveError(endpoint.into()))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
