//! session.rs — offline exports: session dump and single-flight replay
//!
//! Both run before the server starts and read the recovered state directly.
//! The dump is the JSON mirror of the checkpoint (with optional population
//! sampling for huge sessions); a replay re-simulates one (genome, case)
//! pair with the controller in the loop and records every turn.

use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::json;

use lander_core::adapter::GameAdapter;
use lander_core::constants::STEPS_LIMIT;
use lander_core::nn::Dff;
use lander_core::sim::{simulate, Outcome};
use lander_core::state::LanderState;
use lander_core::uid::Uid;

use crate::setup;
use crate::state::AppState;

const DUMP_SAMPLE_THRESHOLD: usize = 1000;

// ── Session dump ──────────────────────────────────────────────────────────────

/// Dump parameters + cases + population as JSON to `path`, or stdout when no
/// path was given. Returns the process exit code contribution (0 or -2).
pub fn dump_session(state: &mut AppState, path: Option<&PathBuf>) -> i32 {
    let mut sample = state.population.len();
    if sample > DUMP_SAMPLE_THRESHOLD {
        println!("Population output gotta be HUGE ({sample} entries)!");
        let trim = setup::wait_answer_yes(&format!(
            "Would you like to sample it down to {DUMP_SAMPLE_THRESHOLD} entries ([Y]/n)?"
        ))
        .unwrap_or(false);
        if trim {
            sample = DUMP_SAMPLE_THRESHOLD;
            println!("{sample} population entries.");
        }
    }

    let population: Vec<_> = if sample < state.population.len() {
        // Uniform sample without replacement, ascending order.
        let mut inds: Vec<usize> = Vec::with_capacity(sample);
        while inds.len() < sample {
            let i = state.rng.gen_range(0..state.population.len());
            if let Err(at) = inds.binary_search(&i) {
                inds.insert(at, i);
            }
        }
        inds.iter().map(|&i| &state.population[i]).collect()
    } else {
        state.population.iter().collect()
    };

    let dump = json!({
        "check": state.check,
        "generation": state.generation,
        "cases_count": state.cases_count,
        "population_size": state.population_size,
        "elite_count": state.elite_count,
        "tournament_size": state.tournament_size,
        "crossover": state.crossover,
        "mutation": state.mutation,
        "cases": state.cases,
        "population": population,
    });

    match path {
        Some(path) => {
            let path = if path.is_relative() { state.directory.join(path) } else { path.clone() };
            let Ok(mut f) = std::fs::File::create(&path) else {
                eprintln!("Can't write a session dump into {}", path.display());
                return -2;
            };
            if serde_json::to_writer(&mut f, &dump).is_err() {
                eprintln!("Can't write a session dump into {}", path.display());
                return -2;
            }
        }
        None => {
            let out = serde_json::to_string_pretty(&dump).expect("serializable dump");
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(out.as_bytes());
            let _ = stdout.write_all(b"\n");
        }
    }
    println!("Done dumping the session.");
    0
}

// ── Replay export ─────────────────────────────────────────────────────────────

fn read_id(title: &str) -> Uid {
    setup::read_uid(title).unwrap_or(1)
}

/// Simulate one (genome, case) pair and write
/// `replay_<gen>_<gid>_<cid>_<epoch>.json`. Returns 0, -1 (missing target)
/// or -2 (unwritable path).
pub fn make_replay(state: &mut AppState, gene_id: Uid, case_id: Uid) -> i32 {
    let mut gene_id = gene_id;
    let mut case_id = case_id;
    let may_swap_ids = gene_id > 0 && case_id > 0;

    if gene_id == 0 {
        gene_id = read_id("Enter Genome ID [1]:");
    } else {
        println!("Genome ID: {gene_id}");
    }
    if case_id == 0 {
        case_id = read_id("Enter Case ID [1]:");
    } else {
        println!("Case ID:   {case_id}");
    }

    let mut case_ind = state.cases_index.get(&case_id).copied();
    if may_swap_ids && case_ind.is_none() {
        println!(
            "Hmm, Case with ID {case_id} is not found; let us swap incoming IDs and try again.\n"
        );
        std::mem::swap(&mut gene_id, &mut case_id);
        println!("Genome ID: {gene_id}");
        println!("Case ID:   {case_id}");
        case_ind = state.cases_index.get(&case_id).copied();
    }
    let Some(case_ind) = case_ind else {
        eprintln!("There is no Case with ID {case_id}");
        return -1;
    };
    let Some(&gene_ind) = state.population_index.get(&gene_id) else {
        eprintln!("There is no Genome with ID {gene_id}");
        return -1;
    };

    let case = &state.cases[case_ind];
    let Ok(mut sim_state) = LanderState::from_case(case) else {
        eprintln!("Case {case_id} is not playable");
        return -1;
    };
    let Ok(brain) = Dff::from_genes(&state.population[gene_ind].genes) else {
        eprintln!("Genome {gene_id} has a malformed gene vector");
        return -1;
    };
    let adapter = GameAdapter::new(&brain, &sim_state);

    let state_base64 = sim_state.to_base64();
    let mut turns = vec![sim_state.turn_input()];
    let mut outcome = Outcome::Aerial;
    let mut steps = 0;
    while outcome == Outcome::Aerial && steps < STEPS_LIMIT {
        sim_state.out = adapter.output(&sim_state.turn_input());
        outcome = match simulate(&mut sim_state) {
            Ok(o) => o,
            Err(_) => Outcome::Lost,
        };
        turns.push(sim_state.turn_input());
        steps += 1;
    }

    let epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let path = state.directory.join(format!(
        "replay_{}_{}_{}_{}.json",
        state.generation, gene_id, case_id, epoch
    ));

    let replay = json!({
        "case_id": case_id,
        "gene_id": gene_id,
        "outcome": outcome.as_str(),
        "state": state_base64,
        "init": { "surface": case.surface, "safe_area": case.safe_area },
        "turns": turns,
    });

    let Ok(f) = std::fs::File::create(&path) else {
        eprintln!("Can't write a replay into {}", path.display());
        return -2;
    };
    if serde_json::to_writer_pretty(f, &replay).is_err() {
        eprintln!("Can't write a replay into {}", path.display());
        return -2;
    }

    println!("Done exporting the replay.");
    0
}
