//! state.rs — the authoritative training session state
//!
//! Everything above the "serialised" line round-trips through the checkpoint;
//! the rest is rebuilt on load: operator instances, id indices, the result
//! matrix, and the timeout vector. All mutation happens on the looper task.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use lander_core::genome::{Genome, LandingCase};
use lander_core::rng::SharedRng;
use lander_core::uid::{Uid, UidSource};

use crate::ga::{Crossover, Mutation};
use crate::results::ResultsTable;

/// An individual whose rating is older than this is eligible to be handed
/// out again.
pub const RESULTS_TIMEOUT: Duration = Duration::from_secs(30);

// ── Algorithm naming ──────────────────────────────────────────────────────────

/// `(name, values)` pair behind the operator factory; stored verbatim in the
/// checkpoint and the session dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmArgs {
    pub name: String,
    pub values: Vec<f64>,
}

impl fmt::Display for AlgorithmArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.name)?;
        for (i, v) in self.values.iter().enumerate() {
            write!(f, "{}{v:.6}", if i == 0 { " " } else { ", " })?;
        }
        Ok(())
    }
}

// ── Timeout stamps ────────────────────────────────────────────────────────────

/// Last-update time of one individual. `Never` is "long ago" (immediately
/// eligible), `Done` pins a completed row to the far future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Never,
    At(Instant),
    Done,
}

impl Stamp {
    pub fn eligible(&self, now: Instant) -> bool {
        match *self {
            Stamp::Never => true,
            Stamp::At(t) => now.saturating_duration_since(t) >= RESULTS_TIMEOUT,
            Stamp::Done => false,
        }
    }
}

// ── App state ─────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Session-creation epoch seconds; rejects checkpoints of another session.
    pub check: u64,
    pub generation: u64,
    pub cases_count: usize,
    pub population_size: usize,
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover: AlgorithmArgs,
    pub mutation: AlgorithmArgs,
    pub uids: UidSource,
    pub cases: Vec<LandingCase>,
    pub population: Vec<Genome>,
    // Serialised data above this line.
    pub rng: SharedRng,
    pub xvr: Crossover,
    pub mtn: Mutation,
    pub cases_index: HashMap<Uid, usize>,
    pub population_index: HashMap<Uid, usize>,
    /// Round-robin hand-out position, persistent across requests.
    pub index: usize,
    pub timeouts: Vec<Stamp>,
    pub results: ResultsTable,
    /// Working directory for `training.dat` and exports.
    pub directory: PathBuf,
}

impl AppState {
    /// Rebuild the id → offset maps after any population/case change.
    pub fn rebuild_indices(&mut self) {
        self.cases_index.clear();
        for (i, case) in self.cases.iter().enumerate() {
            if self.cases_index.insert(case.id, i).is_some() {
                debug!("cases index conflict! id: {}", case.id);
            }
        }
        self.population_index.clear();
        for (i, genome) in self.population.iter().enumerate() {
            if self.population_index.insert(genome.id, i).is_some() {
                debug!("population index conflict! id: {}", genome.id);
            }
        }
    }

    /// Fresh scoreboard for the current generation: every cell unreported,
    /// every individual immediately eligible, hand-out restarts at 0.
    pub fn reset_results(&mut self) {
        self.index = 0;
        self.timeouts.clear();
        self.timeouts.resize(self.population.len(), Stamp::Never);
        self.results.resize(self.cases.len(), self.population.len());
    }

    pub fn on_generation_changed(&mut self) {
        self.rebuild_indices();
        self.reset_results();
        debug!("==== GENERATION {} ====", self.generation);
    }

    /// Multi-line parameter digest logged at init and recovery.
    pub fn digest(&self) -> String {
        format!(
            " check:           {}\n generation:      {}\n cases count:     {}\n population size: {}\n elite count:     {}\n tournament size: {}\n crossover:       {}\n mutation:        {}",
            self.check,
            self.generation,
            self.cases_count,
            self.population_size,
            self.elite_count,
            self.tournament_size,
            self.crossover,
            self.mutation,
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use lander_core::geometry::{FPoint, IPoint, Span};
    use lander_core::nn::GENOME_LEN;

    pub fn flat_case(id: Uid) -> LandingCase {
        LandingCase {
            id,
            fuel: 550,
            thrust: 0,
            tilt: 0,
            safe_area: Span { start: 0, end: 1 },
            position: IPoint::new(3500, 2700),
            velocity: FPoint::new(0.0, 0.0),
            surface: vec![IPoint::new(0, 150), IPoint::new(6999, 150)],
        }
    }

    pub fn genome(id: Uid, fill: f64) -> Genome {
        Genome { id, genes: vec![fill; GENOME_LEN] }
    }

    /// A ready-to-run state with `population` genomes over `cases` cases.
    pub fn app_state(cases: usize, population: usize) -> AppState {
        let uids = UidSource::default();
        let cases: Vec<LandingCase> = (0..cases).map(|_| flat_case(uids.next_uid())).collect();
        let population: Vec<Genome> = (0..population)
            .map(|i| genome(uids.next_uid(), i as f64))
            .collect();
        let mut state = AppState {
            check: 1,
            generation: 0,
            cases_count: cases.len(),
            population_size: population.len(),
            elite_count: 0,
            tournament_size: 1,
            crossover: AlgorithmArgs { name: "scattered".into(), values: vec![1.0] },
            mutation: AlgorithmArgs { name: "uniform".into(), values: vec![0.0, -1.0, 1.0] },
            uids,
            cases,
            population,
            rng: SharedRng::seeded(7, 64),
            xvr: Crossover::Scattered { p: 1.0 },
            mtn: Mutation::Uniform { rate: 0.0, a: -1.0, b: 1.0 },
            cases_index: HashMap::new(),
            population_index: HashMap::new(),
            index: 0,
            timeouts: Vec::new(),
            results: ResultsTable::default(),
            directory: PathBuf::from("."),
        };
        state.on_generation_changed();
        state
    }
}
