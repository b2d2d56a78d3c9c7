//! # Car Executable
//!
//! Vehicle side entry point. Receives drive commands from the operator over the network and feeds
//! them to the drivetrain at a fixed rate.
//!
//! # Architecture
//!
//!     - Initialise session, logging and parameters
//!     - Start the remote control link (background receiver worker)
//!     - Drive loop, once per cycle:
//!         - Poll the remote control (failsafe watchdog applied)
//!         - Send the demands to the drivetrain
//!     - On Ctrl-C or after `max_loops` cycles, shut the link down

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::{eyre, WrapErr}, Result};
use comms_if::net::Transport;
use log::info;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use structopt::StructOpt;

// Internal
use car_lib::{
    drive::{run_loop, LogDrivetrain},
    params::CarExecParams,
    remote_ctrl::RemoteCtrl,
};
use util::{host, logger::logger_init, session::Session};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "car_exec", about = "RC car executable")]
struct Opt {
    /// Path to the parameter file, defaults to $RC_SW_ROOT/params/car_exec.toml
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,

    /// Override the transport used by the remote control (udp or tcp)
    #[structopt(long)]
    transport: Option<Transport>,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("car_exec", "sessions").wrap_err("Failed to create the session")?;

    // ---- LOAD PARAMETERS ----

    let mut params: CarExecParams = match opt.params {
        Some(ref path) => util::params::load_from_path(path),
        None => util::params::load("car_exec.toml"),
    }
    .wrap_err("Could not load car_exec params")?;

    if let Some(transport) = opt.transport {
        params.remote_ctrl.transport = transport;
    }

    let cycle_period = params
        .cycle_period()
        .ok_or_else(|| eyre!("loop_hz must be a positive number, found {}", params.loop_hz))?;

    // Initialise logger
    logger_init(params.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("RC Car Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    info!("Parameters loaded: {:#?}", params);

    // ---- INITIALISE REMOTE CONTROL ----

    let mut remote_ctrl =
        RemoteCtrl::new(&params.remote_ctrl).wrap_err("Failed to initialise RemoteCtrl")?;
    info!("RemoteCtrl initialised, listening on {}", remote_ctrl.local_addr());

    // Stop the drive loop on Ctrl-C
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::Relaxed);
        })
        .wrap_err("Failed to set the Ctrl-C handler")?;
    }

    // ---- MAIN LOOP ----

    info!("Beginning drive loop at {} Hz\n", params.loop_hz);

    let mut drivetrain = LogDrivetrain::new();
    let num_cycles = run_loop(
        &remote_ctrl,
        &mut drivetrain,
        cycle_period,
        params.max_loops,
        &running,
    );

    // ---- SHUTDOWN ----

    info!("Drive loop stopped after {} cycles", num_cycles);

    remote_ctrl.shutdown();

    info!("End of execution");

    Ok(())
}
