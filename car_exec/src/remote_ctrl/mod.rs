//! # Remote control
//!
//! Receives steering and throttle commands from a remote operator and provides them to the
//! vehicle's control loop.
//!
//! A background worker owns the network socket and writes every successfully decoded command into
//! a shared [`state::CmdState`]. The control loop calls [`RemoteCtrl::poll`] once per cycle, which
//! reads the state and passes it through the failsafe [`watchdog`], so that a command older than
//! the watchdog timeout is replaced by the neutral command.
//!
//! Two interchangeable transports are provided, see [`comms_if::net::Transport`]:
//! - UDP: each datagram is a command, from any source.
//! - TCP: a single operator connection at a time. Losing the connection stops the car straight
//!   away rather than waiting for the watchdog.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
pub mod state;
mod tcp_receiver;
mod udp_receiver;
pub mod watchdog;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{cmd::DriveCmd, net::Transport};
use log::{error, info, trace, warn};
use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub use params::{RemoteCtrlParams, MAX_TIMEOUT};
use state::{CmdSnapshot, CmdState};
use tcp_receiver::TcpReceiver;
use udp_receiver::UdpReceiver;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pause after an unexpected socket error, so a persistent error can't spin the worker.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A receive loop which can be run on the remote control's worker thread.
pub(crate) trait CmdReceiver: Send + 'static {
    /// The address the receiver's socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Run the receive loop until the running flag is cleared.
    ///
    /// The receiver, and so every socket it owns, is dropped when this returns.
    fn run(self);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Remote control link.
///
/// The link is started by [`RemoteCtrl::new`] and stopped by [`RemoteCtrl::shutdown`], which is
/// also called on drop.
pub struct RemoteCtrl {
    state: Arc<CmdState>,

    running: Arc<AtomicBool>,

    join_handle: Option<JoinHandle<()>>,

    watchdog_timeout: Duration,

    transport: Transport,

    local_addr: SocketAddr,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while starting the remote control link.
#[derive(Debug, thiserror::Error)]
pub enum RemoteCtrlError {
    #[error("Invalid remote control parameters: {0}")]
    InvalidParams(String),

    #[error("Could not bind the {0} receiver to {1}: {2}")]
    BindError(Transport, String, io::Error),

    #[error("Could not query the receiver's socket: {0}")]
    SocketError(io::Error),

    #[error("Could not spawn the receiver thread: {0}")]
    SpawnError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RemoteCtrl {
    /// Bind the receiver and start the background worker.
    ///
    /// This function does not wait for an operator to connect.
    pub fn new(params: &RemoteCtrlParams) -> Result<Self, RemoteCtrlError> {
        let timeouts = params.timeouts()?;

        let state = Arc::new(CmdState::new());
        let running = Arc::new(AtomicBool::new(true));

        let bind_addr = (params.bind_host.as_str(), params.bind_port);
        let bind_err =
            |e: io::Error| RemoteCtrlError::BindError(params.transport, params.bind_addr(), e);

        let (local_addr, join_handle) = match params.transport {
            Transport::Udp => spawn(
                UdpReceiver::bind(
                    bind_addr,
                    timeouts.recv,
                    params.recv_buffer_size,
                    state.clone(),
                    running.clone(),
                )
                .map_err(bind_err)?,
                params.transport,
            )?,
            Transport::Tcp => spawn(
                TcpReceiver::bind(
                    bind_addr,
                    timeouts.accept,
                    timeouts.recv,
                    params.recv_buffer_size,
                    state.clone(),
                    running.clone(),
                )
                .map_err(bind_err)?,
                params.transport,
            )?,
        };

        info!(
            "Remote control started ({} on {}, watchdog {:?})",
            params.transport, local_addr, timeouts.watchdog
        );

        Ok(Self {
            state,
            running,
            join_handle: Some(join_handle),
            watchdog_timeout: timeouts.watchdog,
            transport: params.transport,
            local_addr,
        })
    }

    /// Get the `(steering, throttle)` pair the car should act on at `now`.
    ///
    /// This never waits on the network and can be called at any rate.
    pub fn poll(&self, now: Instant) -> (f64, f64) {
        self.effective_cmd(now).as_pair()
    }

    /// Same as [`RemoteCtrl::poll`] at the current instant.
    pub fn poll_now(&self) -> (f64, f64) {
        self.poll(Instant::now())
    }

    /// Get the command the car should act on at `now`.
    pub fn effective_cmd(&self, now: Instant) -> DriveCmd {
        watchdog::effective_cmd(now, &self.state.snapshot(), self.watchdog_timeout)
    }

    /// Get the raw command state, without the watchdog applied.
    pub fn snapshot(&self) -> CmdSnapshot {
        self.state.snapshot()
    }

    /// Stop the worker and release the sockets.
    ///
    /// Blocks until the worker has exited, which takes at most one receive or accept timeout.
    /// Calling this more than once has no further effect.
    pub fn shutdown(&mut self) {
        let join_handle = match self.join_handle.take() {
            Some(jh) => jh,
            None => return,
        };

        info!("Remote control shutting down");

        self.running.store(false, Ordering::Relaxed);

        if join_handle.join().is_err() {
            error!("Remote control worker panicked");
        }

        self.state.reset_cmd();

        info!("Remote control shut down");
    }

    /// Return true if the worker is running, false once it has been shut down or has exited on its
    /// own.
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(false, |jh| !jh.is_finished())
    }

    /// The address the receiver is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn watchdog_timeout(&self) -> Duration {
        self.watchdog_timeout
    }
}

impl Drop for RemoteCtrl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Start the receiver on its own thread.
fn spawn<R: CmdReceiver>(
    receiver: R,
    transport: Transport,
) -> Result<(SocketAddr, JoinHandle<()>), RemoteCtrlError> {
    let local_addr = receiver
        .local_addr()
        .map_err(RemoteCtrlError::SocketError)?;

    let join_handle = thread::Builder::new()
        .name(format!("remote_ctrl_{}", transport))
        .spawn(move || receiver.run())
        .map_err(RemoteCtrlError::SpawnError)?;

    Ok((local_addr, join_handle))
}

/// Decode a received payload and store it if it's a valid command.
///
/// Invalid payloads are logged and leave the state untouched.
pub(crate) fn apply_payload(state: &CmdState, payload: &[u8], source: SocketAddr) {
    match DriveCmd::from_bytes(payload) {
        Ok(cmd) => {
            trace!("Command from {}: {:?}", source, cmd);
            state.set(cmd, Instant::now());
        }
        Err(e) => warn!("Discarding command from {}: {}", source, e),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use comms_if::net::CmdSender;
    use std::{
        io::Read,
        net::{TcpListener, TcpStream, UdpSocket},
    };

    const NEUTRAL: (f64, f64) = (0.0, 0.0);

    fn start(transport: Transport, watchdog_timeout_s: f64) -> RemoteCtrl {
        RemoteCtrl::new(&RemoteCtrlParams {
            transport,
            bind_host: "127.0.0.1".into(),
            bind_port: 0,
            watchdog_timeout_s,
            recv_timeout_s: 0.05,
            accept_timeout_s: 0.2,
            ..Default::default()
        })
        .unwrap()
    }

    fn connect(ctrl: &RemoteCtrl) -> CmdSender {
        CmdSender::connect(ctrl.transport(), &ctrl.local_addr().to_string()).unwrap()
    }

    /// Poll `cond` until it's true or two seconds have passed.
    fn wait_until<F: FnMut() -> bool>(mut cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_apply_payload() {
        let state = CmdState::new();
        let source: SocketAddr = ([127, 0, 0, 1], 5001).into();

        apply_payload(&state, br#"{"steering": 0.5, "throttle": 0.3}"#, source);
        let before = state.snapshot();
        assert_eq!(before.cmd, DriveCmd::new(0.5, 0.3));
        assert!(before.last_receipt.is_some());

        apply_payload(&state, br#"{"steering": "abc"}"#, source);
        apply_payload(&state, b"\x00\x01garbage", source);
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_neutral_before_any_command() {
        for &transport in &[Transport::Udp, Transport::Tcp] {
            let ctrl = start(transport, 0.5);
            let now = Instant::now();

            assert_eq!(ctrl.poll(now), NEUTRAL);
            assert_eq!(ctrl.poll(now + Duration::from_secs(3600)), NEUTRAL);
            assert_eq!(ctrl.snapshot().last_receipt, None);
        }
    }

    #[test]
    fn test_udp_command_then_watchdog() {
        let ctrl = start(Transport::Udp, 0.5);
        let mut sender = connect(&ctrl);

        sender.send_raw(br#"{"steering": 0.5, "throttle": 0.3}"#).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.5, 0.3)));

        // No further commands, the watchdog must take over
        thread::sleep(ctrl.watchdog_timeout() + Duration::from_millis(100));
        assert_eq!(ctrl.poll_now(), NEUTRAL);

        // The stored command is still there, only its output is overridden
        assert_eq!(ctrl.snapshot().cmd, DriveCmd::new(0.5, 0.3));
    }

    #[test]
    fn test_udp_malformed_payload_ignored() {
        let ctrl = start(Transport::Udp, 10.0);
        let mut sender = connect(&ctrl);

        sender.send(&DriveCmd::new(0.2, 0.4)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.2, 0.4)));
        let before = ctrl.snapshot();

        sender.send_raw(br#"{"steering": "abc"}"#).unwrap();
        sender.send_raw(b"not json at all").unwrap();
        sender.send_raw(&[0xff; 64]).unwrap();
        thread::sleep(Duration::from_millis(200));

        assert_eq!(ctrl.snapshot(), before);

        // The worker is still alive and accepting commands
        sender.send(&DriveCmd::new(-0.1, 0.1)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (-0.1, 0.1)));
    }

    #[test]
    fn test_tcp_command_then_watchdog() {
        let ctrl = start(Transport::Tcp, 0.5);
        let mut sender = connect(&ctrl);

        sender.send(&DriveCmd::new(0.5, 0.3)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.5, 0.3)));

        // Still connected but silent
        thread::sleep(ctrl.watchdog_timeout() + Duration::from_millis(100));
        assert_eq!(ctrl.poll_now(), NEUTRAL);
    }

    #[test]
    fn test_tcp_disconnect_zeroes_command() {
        // The watchdog is far longer than the test, only the disconnect can stop the car
        let ctrl = start(Transport::Tcp, 60.0);
        let mut sender = connect(&ctrl);

        sender.send(&DriveCmd::new(0.3, 0.9)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.3, 0.9)));
        let receipt = ctrl.snapshot().last_receipt;

        drop(sender);

        assert!(wait_until(|| ctrl.poll_now() == NEUTRAL));
        // A disconnect is not a received command
        assert_eq!(ctrl.snapshot().last_receipt, receipt);
    }

    #[test]
    fn test_tcp_reset_zeroes_command() {
        let ctrl = start(Transport::Tcp, 60.0);

        let peer = TcpStream::connect(ctrl.local_addr()).unwrap();
        CmdSender::Tcp(peer.try_clone().unwrap())
            .send(&DriveCmd::new(0.3, 0.9))
            .unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.3, 0.9)));

        // A zero linger time makes closing the socket send a reset rather than a FIN
        let peer = socket2::Socket::from(peer);
        peer.set_linger(Some(Duration::ZERO)).unwrap();
        drop(peer);

        assert!(wait_until(|| ctrl.poll_now() == NEUTRAL));

        // The receiver is back to accepting connections
        let mut sender = connect(&ctrl);
        sender.send(&DriveCmd::new(0.1, 0.1)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.1, 0.1)));
    }

    #[test]
    fn test_tcp_malformed_payload_ignored() {
        let ctrl = start(Transport::Tcp, 60.0);
        let mut sender = connect(&ctrl);

        sender.send(&DriveCmd::new(0.1, 0.2)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.1, 0.2)));
        let before = ctrl.snapshot();

        sender.send_raw(br#"{"steering": "abc"}"#).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(ctrl.snapshot(), before);

        // Connection survives a bad message
        sender.send(&DriveCmd::new(0.7, 0.0)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.7, 0.0)));
    }

    #[test]
    fn test_tcp_single_peer() {
        let ctrl = start(Transport::Tcp, 60.0);

        let mut first = connect(&ctrl);
        first.send(&DriveCmd::new(0.1, 0.1)).unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.1, 0.1)));

        // The second connection completes in the backlog but is not served
        let mut second = connect(&ctrl);
        second.send(&DriveCmd::new(0.9, 0.9)).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(ctrl.poll_now(), (0.1, 0.1));

        // Once the first peer leaves the second is accepted and its command read
        drop(first);
        assert!(wait_until(|| ctrl.poll_now() == (0.9, 0.9)));
    }

    #[test]
    fn test_tcp_shutdown_closes_sockets() {
        let mut ctrl = start(Transport::Tcp, 60.0);
        let addr = ctrl.local_addr();

        let mut peer = TcpStream::connect(addr).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        CmdSender::Tcp(peer.try_clone().unwrap())
            .send(&DriveCmd::new(0.4, 0.4))
            .unwrap();
        assert!(wait_until(|| ctrl.poll_now() == (0.4, 0.4)));

        let shutdown_start = Instant::now();
        ctrl.shutdown();
        assert!(shutdown_start.elapsed() < Duration::from_secs(2));
        assert!(!ctrl.is_running());

        // Peer sees the connection closed
        let mut buf = [0u8; 16];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);

        // Listener has been released
        assert!(TcpListener::bind(addr).is_ok());

        // Output is neutral after shutdown
        assert_eq!(ctrl.poll_now(), NEUTRAL);
    }

    #[test]
    fn test_udp_shutdown_releases_socket() {
        let mut ctrl = start(Transport::Udp, 0.5);
        let addr = ctrl.local_addr();

        assert!(ctrl.is_running());
        ctrl.shutdown();
        assert!(!ctrl.is_running());
        assert!(UdpSocket::bind(addr).is_ok());

        // Second call is a no-op
        ctrl.shutdown();
    }

    #[test]
    fn test_shutdown_without_peer() {
        let mut ctrl = start(Transport::Tcp, 0.5);
        let addr = ctrl.local_addr();

        ctrl.shutdown();
        assert!(TcpListener::bind(addr).is_ok());
    }

    #[test]
    fn test_bind_error() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = RemoteCtrl::new(&RemoteCtrlParams {
            transport: Transport::Udp,
            bind_host: "127.0.0.1".into(),
            bind_port: port,
            ..Default::default()
        });

        assert!(matches!(
            result,
            Err(RemoteCtrlError::BindError(Transport::Udp, _, _))
        ));
    }

    /// A receiver which exits as soon as it's started.
    struct ExitingReceiver(SocketAddr);

    impl CmdReceiver for ExitingReceiver {
        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.0)
        }

        fn run(self) {}
    }

    #[test]
    fn test_is_running_false_after_worker_exits() {
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let (local_addr, join_handle) = spawn(ExitingReceiver(addr), Transport::Udp).unwrap();

        let mut ctrl = RemoteCtrl {
            state: Arc::new(CmdState::new()),
            running: Arc::new(AtomicBool::new(true)),
            join_handle: Some(join_handle),
            watchdog_timeout: Duration::from_millis(500),
            transport: Transport::Udp,
            local_addr,
        };

        assert!(wait_until(|| !ctrl.is_running()));

        // Shutting down a dead worker still works
        ctrl.shutdown();
        assert!(!ctrl.is_running());
    }

    #[test]
    fn test_huge_accept_timeout_rejected() {
        let result = RemoteCtrl::new(&RemoteCtrlParams {
            transport: Transport::Tcp,
            bind_host: "127.0.0.1".into(),
            bind_port: 0,
            accept_timeout_s: 1e19,
            ..Default::default()
        });

        assert!(matches!(result, Err(RemoteCtrlError::InvalidParams(_))));
    }

    #[test]
    fn test_invalid_params() {
        let result = RemoteCtrl::new(&RemoteCtrlParams {
            bind_host: "127.0.0.1".into(),
            bind_port: 0,
            recv_timeout_s: 0.0,
            ..Default::default()
        });

        assert!(matches!(result, Err(RemoteCtrlError::InvalidParams(_))));
    }
}
