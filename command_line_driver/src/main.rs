//! # Command line driver
//!
//! Interactive operator client for the car. Demands entered at the prompt are re-sent to the car at
//! a fixed rate in the background, so the car's watchdog stays fed while the operator is typing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use comms_if::{
    cmd::DriveCmd,
    net::{CmdSender, Transport, DEFAULT_CMD_PORT},
};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};
use structopt::{clap::AppSettings, StructOpt};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Car $ ";
const HISTORY_PATH: &str = "data/driver_history.txt";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "command_line_driver", about = "Drive the RC car from the command line")]
struct Opt {
    /// Transport to send commands over (udp or tcp)
    #[structopt(long, default_value = "udp")]
    transport: Transport,

    /// Address of the car's command receiver
    #[structopt(long)]
    endpoint: Option<String>,

    /// Rate at which the current demand is re-sent
    #[structopt(long, default_value = "10")]
    repeat_hz: f64,
}

/// A command typed at the prompt.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(name = "driver", setting = AppSettings::DisableVersion)]
enum LineCmd {
    /// Set the steering and throttle demands, both usually in [-1, 1]
    #[structopt(setting = AppSettings::AllowNegativeNumbers)]
    Drive { steering: f64, throttle: f64 },

    /// Set the neutral demand
    Stop,

    /// Show the current demand
    Show,

    /// Stop the car and exit
    #[structopt(alias = "exit")]
    Quit,
}

/// The demand shared between the prompt and the sender thread.
struct Demand {
    cmd: Mutex<DriveCmd>,
    running: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Demand {
    fn new() -> Self {
        Self {
            cmd: Mutex::new(DriveCmd::NEUTRAL),
            running: AtomicBool::new(true),
        }
    }

    fn get(&self) -> DriveCmd {
        *self.cmd.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, cmd: DriveCmd) {
        *self.cmd.lock().unwrap_or_else(PoisonError::into_inner) = cmd;
    }
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let endpoint = opt
        .endpoint
        .clone()
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_CMD_PORT));

    let period = send_period(opt.repeat_hz)
        .ok_or_else(|| eyre!("repeat-hz must be a positive number, found {}", opt.repeat_hz))?;

    println!(
        "Sending commands to {} over {} at {} Hz",
        endpoint, opt.transport, opt.repeat_hz
    );

    // ---- SENDER ----

    let demand = Arc::new(Demand::new());
    let sender_handle = {
        let demand = demand.clone();
        let transport = opt.transport;
        let endpoint = endpoint.clone();
        thread::spawn(move || sender_thread(&demand, transport, &endpoint, period))
    };

    // ---- PROMPT ----

    let mut rl = DefaultEditor::new().wrap_err("Failed to create the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(line.as_str()).ok();

                match parse(&line) {
                    Ok(LineCmd::Quit) => break,
                    Ok(cmd) => exec(&demand, cmd),
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled Error: {:?}", err);
                break;
            }
        }
    }

    // ---- SHUTDOWN ----

    println!("Exiting...");

    demand.set(DriveCmd::NEUTRAL);
    demand.running.store(false, Ordering::Relaxed);
    if sender_handle.join().is_err() {
        println!("Sender thread panicked");
    }

    if let Some(dir) = Path::new(HISTORY_PATH).parent() {
        std::fs::create_dir_all(dir).ok();
    }
    if let Err(e) = rl.save_history(HISTORY_PATH) {
        println!("Could not save history: {}", e);
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a line typed at the prompt.
fn parse(line: &str) -> Result<LineCmd, structopt::clap::Error> {
    LineCmd::from_iter_safe(std::iter::once("driver").chain(line.split_whitespace()))
}

/// Execute a prompt command.
fn exec(demand: &Demand, cmd: LineCmd) {
    match cmd {
        LineCmd::Drive { steering, throttle } => demand.set(DriveCmd::new(steering, throttle)),
        LineCmd::Stop => demand.set(DriveCmd::NEUTRAL),
        LineCmd::Show => {
            let cmd = demand.get();
            println!("steering {:+.3}, throttle {:+.3}", cmd.steering, cmd.throttle);
        }
        LineCmd::Quit => (),
    }
}

fn send_period(repeat_hz: f64) -> Option<Duration> {
    if repeat_hz.is_finite() && repeat_hz > 0.0 {
        util::time::seconds_to_duration(1.0 / repeat_hz)
    }
    else {
        None
    }
}

/// Send the current demand every `period` until the demand's running flag is cleared, then send a
/// final neutral command.
///
/// The connection is re-made whenever a send fails, so the car can be restarted under a running
/// client.
fn sender_thread(demand: &Demand, transport: Transport, endpoint: &str, period: Duration) {
    let mut sender: Option<CmdSender> = None;
    let mut connect_error_reported = false;

    while demand.running.load(Ordering::Relaxed) {
        if sender.is_none() {
            match CmdSender::connect(transport, endpoint) {
                Ok(s) => {
                    println!("\nConnected to {}", endpoint);
                    connect_error_reported = false;
                    sender = Some(s);
                }
                Err(e) => {
                    if !connect_error_reported {
                        println!("\n{}, retrying", e);
                        connect_error_reported = true;
                    }
                }
            }
        }

        if let Some(ref mut s) = sender {
            if let Err(e) = s.send(&demand.get()) {
                println!("\n{}, reconnecting", e);
                sender = None;
            }
        }

        thread::sleep(period);
    }

    if let Some(mut s) = sender {
        s.send(&DriveCmd::NEUTRAL).ok();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
