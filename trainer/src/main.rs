//! main.rs — GA trainer entry point
//!
//! Startup order: CLI → logging → state (checkpoint, or interactive scratch
//! init) → optional offline exports (session dump, replay) → TCP server +
//! event loop. The looper task owns the state; server tasks only post jobs.

mod ga;
mod generation;
mod handlers;
mod looper;
mod persistence;
mod results;
mod server;
mod session;
mod setup;
mod state;

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use lander_core::rng::SharedRng;
use lander_core::uid::UidSource;
use lander_proto::{Message, MSG_CASES, MSG_OUTCOMES};

use crate::ga::{Crossover, Mutation};
use crate::looper::Looper;
use crate::persistence::{load_checkpoint, persist_in_background, Checkpoint, TRAINING_FILENAME};
use crate::results::ResultsTable;
use crate::server::{handler, HandlerMap};
use crate::state::AppState;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lander-trainer", about = "Genetic algorithm-based trainer for Mars Lander AI")]
struct Args {
    /// Begin the training process from the very beginning, optionally seeding
    /// cases from a JSON file
    #[arg(long, value_name = "cases_json", num_args = 0..=1, default_missing_value = "")]
    init: Option<String>,

    /// TCP port to accept runner connections on
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Export a replay for "<gene_id>;<case_id>" (prompts for missing ids)
    #[arg(long, value_name = "gid;cid", num_args = 0..=1, default_missing_value = "")]
    replay: Option<String>,

    /// Dump the whole session as JSON to a path (stdout when omitted)
    #[arg(long, value_name = "path", num_args = 0..=1, default_missing_value = "")]
    dump_session: Option<String>,

    /// Keep running the trainer after an export
    #[arg(long)]
    no_exit: bool,

    /// Working directory for training.dat and exports
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,
}

fn parse_replay_ids(optarg: &str) -> (u64, u64) {
    let mut parts = optarg.split(';');
    let gene = parts.next().and_then(|v| v.trim().parse().ok()).unwrap_or(0);
    let case = parts.next().and_then(|v| v.trim().parse().ok()).unwrap_or(0);
    (gene, case)
}

// ── State bootstrap ───────────────────────────────────────────────────────────

fn state_from_checkpoint(cp: Checkpoint, directory: PathBuf) -> AppState {
    let xvr = match Crossover::from_args(&cp.crossover.name, &cp.crossover.values) {
        Ok(op) => op,
        Err(_) => {
            eprintln!(
                "'{}' unrecognized crossover algorithm; is it no longer supported?\n{}",
                cp.crossover.name, cp.crossover
            );
            exit(-3);
        }
    };
    let mtn = match Mutation::from_args(&cp.mutation.name, &cp.mutation.values) {
        Ok(op) => op,
        Err(_) => {
            eprintln!(
                "'{}' unrecognized mutation algorithm; is it no longer supported?\n{}",
                cp.mutation.name, cp.mutation
            );
            exit(-3);
        }
    };

    let mut state = AppState {
        check: cp.check,
        generation: cp.generation,
        cases_count: cp.cases_count as usize,
        population_size: cp.population_size as usize,
        elite_count: cp.elite_count as usize,
        tournament_size: cp.tournament_size as usize,
        crossover: cp.crossover,
        mutation: cp.mutation,
        uids: UidSource::new(cp.last_genome_id),
        cases: cp.cases,
        population: cp.population,
        rng: SharedRng::trainer_grade(StdRng::from_entropy()),
        xvr,
        mtn,
        cases_index: Default::default(),
        population_index: Default::default(),
        index: 0,
        timeouts: Vec::new(),
        results: ResultsTable::default(),
        directory,
    };
    state.on_generation_changed();
    println!("Recovered training state!\n{}", state.digest());
    state
}

/// Recover or create the session; the flag says whether it is brand new and
/// still unpersisted.
fn bootstrap_state(args: &Args) -> (AppState, bool) {
    let training_path = args.directory.join(TRAINING_FILENAME);
    let will_export = args.dump_session.is_some() || args.replay.is_some();
    let mut init_from_scratch = args.init.is_some();

    if training_path.exists() {
        if init_from_scratch {
            println!(
                "There's a '{TRAINING_FILENAME}' file found in the working directory!\n\
                 Proceeding with initialization will result in OVERWRITING it."
            );
            init_from_scratch = setup::wait_answer(
                "Would you like to begin training process over entirely (y/[N])?",
            )
            .unwrap_or(false);
        }
        if !init_from_scratch {
            match load_checkpoint(&training_path) {
                Ok(cp) => return (state_from_checkpoint(cp, args.directory.clone()), false),
                Err(e) => {
                    eprintln!("{TRAINING_FILENAME}: {e}");
                    exit(-3);
                }
            }
        }
    } else if (will_export && !init_from_scratch) || args.replay.is_some() {
        eprintln!(
            "No '{TRAINING_FILENAME}' file found. There's no session to export data from!"
        );
        exit(-2);
    }

    let cases_path = args
        .init
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    match setup::init_from_scratch(cases_path.as_deref(), args.directory.clone()) {
        Ok(state) => {
            println!("Initialized training state!\n{}", state.digest());
            (state, true)
        }
        Err(e) => {
            eprintln!("{e:#}");
            exit(-2);
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn build_handlers() -> Arc<HandlerMap> {
    let mut map = HandlerMap::new();
    map.insert(
        MSG_CASES,
        handler(|state, msg, sink| {
            if let Message::Cases(request) = msg {
                handlers::on_cases(state, &request, &sink);
            }
        }),
    );
    map.insert(
        MSG_OUTCOMES,
        handler(|state, msg, sink| {
            if let Message::Outcomes(request) = msg {
                let advanced = handlers::on_outcomes(state, &request, Instant::now(), &sink);
                if advanced {
                    persist_in_background(state);
                }
            }
        }),
    );
    Arc::new(map)
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lander_trainer=info".into()),
        )
        .init();

    let args = Args::parse();
    let (mut state, fresh) = bootstrap_state(&args);

    // Fresh sessions hit the disk once before serving anything.
    if fresh {
        let training_path = args.directory.join(TRAINING_FILENAME);
        persistence::write_checkpoint(&training_path, &persistence::encode_body(&state))?;
    }

    if args.dump_session.is_some() || args.replay.is_some() {
        let mut last_error = 0;
        if let Some(optarg) = &args.replay {
            let (gene_id, case_id) = parse_replay_ids(optarg);
            last_error = session::make_replay(&mut state, gene_id, case_id);
        }
        if let Some(optarg) = &args.dump_session {
            let path = (!optarg.is_empty()).then(|| PathBuf::from(optarg));
            let code = session::dump_session(&mut state, path.as_ref());
            if code != 0 {
                last_error = code;
            }
        }
        if !args.no_exit {
            exit(last_error);
        }
    }

    let looper = Arc::new(Looper::new());
    server::start(args.port, looper.clone(), build_handlers()).await?;
    info!("🚀 Trainer v{} ready — session check {}", env!("CARGO_PKG_VERSION"), state.check);

    looper.run(&mut state).await;
    Ok(())
}
