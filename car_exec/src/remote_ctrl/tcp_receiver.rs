//! # TCP command receiver
//!
//! Serves a single operator connection at a time. The receiver alternates between two states:
//!
//! ```text
//!              accept (bounded by accept_timeout)
//!   Accepting ------------------------------------> Connected
//!       ^                                               |
//!       |   peer closed / reset / socket unusable       |
//!       +-----------------------------------------------+
//!           (stored command zeroed immediately)
//! ```
//!
//! While connected no further connections are accepted, they wait in the listen backlog until the
//! current peer goes away.
//!
//! There is no framing on the stream, every chunk returned by a read is decoded as one command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::IoErrorClass;
use log::{error, info, warn};
use std::{
    io::{self, Read},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use super::{apply_payload, state::CmdState, CmdReceiver, ERROR_BACKOFF};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval between polls of the non-blocking listener while waiting for a connection.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Connection oriented command receiver.
pub(crate) struct TcpReceiver {
    listener: TcpListener,

    /// The connected operator, `None` while accepting
    peer: Option<Peer>,

    state: Arc<CmdState>,
    running: Arc<AtomicBool>,

    accept_timeout: Duration,
    recv_timeout: Duration,

    buf: Vec<u8>,
}

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TcpReceiver {
    /// Bind the listening socket.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        accept_timeout: Duration,
        recv_timeout: Duration,
        buffer_size: usize,
        state: Arc<CmdState>,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;

        // std has no accept timeout, the listener is polled instead
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            peer: None,
            state,
            running,
            accept_timeout,
            recv_timeout,
            buf: vec![0; buffer_size],
        })
    }

    /// Wait up to the accept timeout for an operator to connect.
    fn accept(&mut self) -> Option<Peer> {
        // No deadline if the timeout can't be represented, shutdown still ends the wait
        let deadline = Instant::now().checked_add(self.accept_timeout);

        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => return self.on_connect(stream, addr),
                Err(e) if IoErrorClass::of(&e) == IoErrorClass::Timeout => {
                    let expired = deadline.map_or(false, |d| Instant::now() >= d);
                    if !self.running.load(Ordering::Relaxed) || expired {
                        return None;
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    thread::sleep(ERROR_BACKOFF);
                    return None;
                }
            }
        }
    }

    /// Configure a newly accepted stream. If the stream can't be given a read timeout it is
    /// dropped, as it could otherwise block the worker forever.
    fn on_connect(&mut self, stream: TcpStream, addr: SocketAddr) -> Option<Peer> {
        let configured = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_read_timeout(Some(self.recv_timeout)));

        match configured {
            Ok(()) => {
                info!("Client connected: {}", addr);
                Some(Peer { stream, addr })
            }
            Err(e) => {
                error!("Could not configure connection from {}, dropping it: {}", addr, e);
                None
            }
        }
    }

    /// Read and handle at most one chunk from the peer.
    ///
    /// Returns the peer if it's still connected afterwards.
    fn recv(&mut self, mut peer: Peer) -> Option<Peer> {
        match peer.stream.read(&mut self.buf) {
            Ok(0) => {
                info!("Client disconnected: {}", peer.addr);
                self.disconnect(peer);
                None
            }
            Ok(len) => {
                apply_payload(&self.state, &self.buf[..len], peer.addr);
                Some(peer)
            }
            Err(e) => match IoErrorClass::of(&e) {
                IoErrorClass::Timeout => Some(peer),
                IoErrorClass::Disconnected => {
                    info!("Client disconnected: {} ({})", peer.addr, e);
                    self.disconnect(peer);
                    None
                }
                IoErrorClass::Unusable => {
                    error!("Connection to {} is unusable, dropping it: {}", peer.addr, e);
                    self.disconnect(peer);
                    None
                }
                IoErrorClass::Transient => {
                    error!("Receive error from {}: {}", peer.addr, e);
                    thread::sleep(ERROR_BACKOFF);
                    Some(peer)
                }
            },
        }
    }

    /// Close the peer's connection and stop the car straight away. A closed connection is a
    /// known loss of the operator, there's no need to wait for the watchdog.
    fn disconnect(&self, peer: Peer) {
        if let Err(e) = peer.stream.shutdown(Shutdown::Both) {
            // Already closed by the other end
            if e.kind() != io::ErrorKind::NotConnected {
                warn!("Error shutting down connection to {}: {}", peer.addr, e);
            }
        }

        self.state.reset_cmd();
    }
}

impl CmdReceiver for TcpReceiver {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn run(mut self) {
        info!("TCP receiver listening on {:?}", self.listener.local_addr());

        while self.running.load(Ordering::Relaxed) {
            self.peer = match self.peer.take() {
                None => self.accept(),
                Some(peer) => self.recv(peer),
            };
        }

        if let Some(peer) = self.peer.take() {
            info!("Closing connection to {}", peer.addr);
            self.disconnect(peer);
        }

        info!("TCP receiver stopped");
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver(accept_timeout: Duration) -> TcpReceiver {
        TcpReceiver::bind(
            "127.0.0.1:0",
            accept_timeout,
            Duration::from_millis(50),
            64,
            Arc::new(CmdState::new()),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap()
    }

    #[test]
    fn test_accept_times_out() {
        let mut rx = receiver(Duration::from_millis(50));

        let start = Instant::now();
        assert!(rx.accept().is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_unrepresentable_accept_timeout() {
        let mut rx = receiver(Duration::MAX);
        let addr = rx.listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).unwrap();
        assert!(rx.accept().is_some());

        // Nobody else is connecting, only the running flag can end the wait
        rx.running.store(false, Ordering::Relaxed);
        assert!(rx.accept().is_none());
    }
}
