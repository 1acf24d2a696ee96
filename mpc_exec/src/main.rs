//! Data collection executable entry point.
//!
//! # Architecture
//!
//! The execution consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the MPC controller
//!     - Run a rollout on each of the training paths, recording observation/control pairs
//!     - Archive the dataset as CSV and save the per-path summaries and trajectories as JSON in
//!       the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use structopt::StructOpt;

// Internal
use mpc_lib::{
    mpc::MpcSolver,
    params::MpcExecParams,
    path::generators,
    rollout::{run_batch, MpcController, NamedPath},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Collect MPC demonstrations over the standard set of training paths.
#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(short, long, default_value = "mpc_exec.toml")]
    params: String,

    /// Only run the first N training paths
    #[structopt(short = "n", long)]
    max_paths: Option<usize>,

    /// Log every solver iteration
    #[structopt(long)]
    solver_trace: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let solver_level = if opt.solver_trace {
        LevelFilter::Trace
    }
    else {
        LevelFilter::Info
    };
    logger_init(LevelFilter::Debug, solver_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Data Collection Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let params: MpcExecParams =
        util::params::load(&opt.params).wrap_err("Could not load exec params")?;
    session.save_or_warn("params.json", &params);

    info!("Exec parameters loaded");

    // ---- MODULE INIT ----

    let model = params.model().wrap_err("Invalid model parameters")?;
    let solver = MpcSolver::new(model, params.mpc).wrap_err("Failed to initialise the solver")?;
    let mut controller = MpcController::new(solver, params.limits);

    let mut paths: Vec<NamedPath> = generators::training_paths()
        .into_iter()
        .map(NamedPath::from)
        .collect();
    if let Some(n) = opt.max_paths {
        paths.truncate(n);
    }

    info!("Collecting data over {} paths\n", paths.len());

    // ---- COLLECTION ----

    let output = run_batch(&paths, model, &mut controller, &params.collect)
        .wrap_err("Data collection failed")?;

    // ---- ARCHIVING ----

    let mut archiver =
        Archiver::from_path(&session, "dataset.csv").wrap_err("Failed to create the archive")?;
    archiver
        .serialise_all(output.dataset.records())
        .wrap_err("Failed to archive the dataset")?;

    session
        .save("summaries.json", &output.summaries)
        .wrap_err("Failed to save the path summaries")?;
    session
        .save("trajectories.json", &output.trajectories)
        .wrap_err("Failed to save the trajectories")?;

    // ---- REPORT ----

    let num_aborted = output.summaries.iter().filter(|s| s.reason.is_abort()).count();
    if num_aborted > 0 {
        warn!("{} of {} paths were aborted", num_aborted, output.summaries.len());
    }

    info!(
        "Collected {} samples over {} paths ({} skipped), archived to {:?}",
        output.dataset.len(),
        output.summaries.len(),
        output.num_skipped,
        archiver.path()
    );

    Ok(())
}
