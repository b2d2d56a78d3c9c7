//! # UDP command receiver
//!
//! Each datagram is one command. No peer is tracked, datagrams from any source are accepted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::IoErrorClass;
use log::{error, info};
use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use super::{apply_payload, state::CmdState, CmdReceiver, ERROR_BACKOFF};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Connectionless command receiver.
pub(crate) struct UdpReceiver {
    socket: UdpSocket,
    state: Arc<CmdState>,
    running: Arc<AtomicBool>,
    buf: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UdpReceiver {
    /// Bind the receiver's socket.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        recv_timeout: Duration,
        buffer_size: usize,
        state: Arc<CmdState>,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(recv_timeout))?;

        Ok(Self {
            socket,
            state,
            running,
            buf: vec![0; buffer_size],
        })
    }

    /// Receive and handle at most one datagram.
    fn recv_once(&mut self) {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, source)) => {
                apply_payload(&self.state, &self.buf[..len], source);
            }
            Err(e) => match IoErrorClass::of(&e) {
                // Silence is for the watchdog to deal with
                IoErrorClass::Timeout => (),
                _ => {
                    error!("UDP receive error: {}", e);
                    thread::sleep(ERROR_BACKOFF);
                }
            },
        }
    }
}

impl CmdReceiver for UdpReceiver {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn run(mut self) {
        info!("UDP receiver listening on {:?}", self.socket.local_addr());

        while self.running.load(Ordering::Relaxed) {
            self.recv_once();
        }

        info!("UDP receiver stopped");
    }
}
