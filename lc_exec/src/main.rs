//! Main lane change harness executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, parameters and the command source
//!     - Spawn the ego vehicle, its navigation agent and cameras, and enter synchronous mode
//!     - Main loop, once per simulated frame:
//!         - Command processing
//!         - Tick the world and acquire the frame's camera images
//!         - Scenario actions: traffic lights, rerouting, the static obstacle
//!         - Lane change planning
//!         - Vehicle control: agent, agent with lateral control, or manual
//!         - HUD
//!         - Image collection
//!     - Shutdown: finish writing images, restore the world settings and destroy all actors
//!
//! Shutdown runs however the main loop ends, whether by a quit command, the end of a script, an
//! interrupt (Ctrl-C) or an error.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::net::NetParams;
use lc_lib::{
    console::Console,
    harness::{run, shutdown, Resources, TcSource},
    lane_change,
    params::LcExecParams,
    sim_client::SimClient,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{error, info};
use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use structopt::StructOpt;

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    script_interpreter::ScriptInterpreter,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const CONSOLE_HISTORY_FILE: &str = "console_history.txt";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "lc_exec", about = "Lane change data collection harness")]
struct Args {
    /// Collection script to run. Without a script commands are read from the console.
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,

    /// Terminal log level, one of info, debug or trace
    #[structopt(short, long, default_value = "info")]
    log_level: LevelFilter,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "lc_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(args.log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Lane Change Data Collection Harness\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load(
        "net.toml"
    ).wrap_err("Could not load net params")?;

    let exec_params: LcExecParams = util::params::load(
        "lc_exec.toml"
    ).wrap_err("Could not load exec params")?;

    let lc_params: lane_change::Params = util::params::load(
        "lane_change.toml"
    ).wrap_err("Could not load lane change params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE TC SOURCE ----

    let mut tc_source = match args.script {
        Some(ref path) => {
            info!("Loading script from {:?}", path);

            let si = ScriptInterpreter::new(path).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} TCs\n",
                si.get_duration(),
                si.get_num_tcs()
            );

            TcSource::Script(si)
        },
        None => {
            info!("No script provided, commands will be read from the console\n");

            let history = host::get_harness_root()
                .ok()
                .map(|r| r.join(CONSOLE_HISTORY_FILE));

            TcSource::Console(Console::start(history).wrap_err("Failed to start the console")?)
        }
    };

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let mut client = SimClient::connect(&zmq_ctx, &net_params)
        .wrap_err("Failed to connect to the simulator bridge")?;
    info!("SimClient initialised");

    // ---- INTERRUPT HANDLER ----

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping");
        stop_handler.store(true, Ordering::Relaxed);
    }).wrap_err("Failed to install the interrupt handler")?;

    // ---- RUN ----

    let mut res = Resources::default();

    let result = run(
        &mut client,
        &session,
        &exec_params,
        &lc_params,
        &mut tc_source,
        &mut res,
        &stop
    );

    if let Err(ref e) = result {
        error!("Harness stopped by an error: {:#}", e);
    }

    // ---- SHUTDOWN ----

    shutdown(&mut client, &mut res);

    session.exit();

    info!("End of execution");

    result
}
