//! app.rs — the runner's two-phase work loop
//!
//! Phase "init" binds the case set: it asks the trainer for `cases` and
//! retries with a 5 s backoff until it has at least one playable case.
//! Phase "simulate" then cycles: send `outcomes` (empty on the first round),
//! receive a `population`, fly every (genome, case) pair through the
//! deterministic simulator, and queue the ratings for the next request. Any
//! transfer failure drops the runner back to "init".
//!
//! The advisory batch capacity self-tunes so one full batch costs about
//! 300 ms of simulation time, never below the base of 16.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, trace, warn};

use lander_core::adapter::GameAdapter;
use lander_core::constants::{STEPS_LIMIT, ZONE_WIDTH};
use lander_core::nn::Dff;
use lander_core::sim::{simulate, Outcome};
use lander_core::state::LanderState;
use lander_core::uid::Uid;
use lander_proto::{Cases, Message, OutcomeRating, Outcomes};

use crate::client::{self, RequestError};
use crate::replay::ReplayExporter;

pub const CAPACITY_BASE: u32 = 16;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const BATCH_TARGET: Duration = Duration::from_millis(300);

pub struct App {
    addr: String,
    req: Outcomes,
    states: Vec<(Uid, LanderState)>,
    exporter: Option<ReplayExporter>,
}

impl App {
    pub fn new(
        host: &str,
        port: u16,
        client_name: String,
        replays: Option<(PathBuf, usize)>,
    ) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            req: Outcomes {
                client_name,
                generation: 0,
                capacity: CAPACITY_BASE,
                data: Vec::new(),
            },
            states: Vec::new(),
            exporter: replays.map(|(dir, count)| ReplayExporter::new(dir, count)),
        }
    }

    pub async fn run(&mut self) {
        info!("Ready!");
        loop {
            self.do_init().await;
            self.do_simulation().await;
        }
    }

    async fn repeat(&self, reason: impl std::fmt::Display) {
        info!("{reason} Next attempt in {}s.", RETRY_DELAY.as_secs());
        tokio::time::sleep(RETRY_DELAY).await;
    }

    // ── Phase: bind the case set ──────────────────────────────────────────────

    async fn do_init(&mut self) {
        self.req.data.clear();
        self.req.capacity = CAPACITY_BASE;

        loop {
            let bag = match client::request(&self.addr, &[Message::Cases(Cases::default())]).await
            {
                Ok(bag) => bag,
                Err(e) => {
                    self.repeat(e).await;
                    continue;
                }
            };
            let Some(cases) = bag.iter().find_map(|m| match m {
                Message::Cases(c) => Some(c),
                _ => None,
            }) else {
                self.repeat("No cases message in the response.").await;
                continue;
            };
            if cases.data.is_empty() {
                self.repeat("No cases obtained.").await;
                continue;
            }

            self.states.clear();
            self.states.reserve(cases.data.len());
            for case in &cases.data {
                match LanderState::from_case(case) {
                    Ok(state) => self.states.push((case.id, state)),
                    Err(e) => warn!("Case {} is unplayable: {e}; skipping.", case.id),
                }
            }
            if self.states.is_empty() {
                self.repeat("No playable cases obtained.").await;
                continue;
            }

            trace!("Received {} cases.", self.states.len());
            return;
        }
    }

    // ── Phase: simulate population batches ────────────────────────────────────

    async fn do_simulation(&mut self) {
        loop {
            let bag = match client::request(
                &self.addr,
                &[Message::Outcomes(self.req.clone())],
            )
            .await
            {
                Ok(bag) => bag,
                Err(RequestError::EmptyResponse) => {
                    self.repeat("Empty response unacceptable.").await;
                    continue;
                }
                Err(RequestError::Transfer(e)) => {
                    warn!("Simulation process interrupted: {e}");
                    return;
                }
            };

            let Some(population) = bag.iter().find_map(|m| match m {
                Message::Population(p) => Some(p),
                _ => None,
            }) else {
                self.repeat("No population message in the response.").await;
                continue;
            };

            self.req.data.clear();
            self.req.generation = population.generation;

            if population.data.is_empty() {
                self.repeat("No population's been given.").await;
                continue;
            }

            let mut brains: Vec<(Uid, Dff)> = Vec::with_capacity(population.data.len());
            for genome in &population.data {
                match Dff::from_genes(&genome.genes) {
                    Ok(brain) => brains.push((genome.id, brain)),
                    Err(e) => warn!("Genome {} rejected: {e}; skipping.", genome.id),
                }
            }
            trace!("Received population of {} individuals.", brains.len());

            let start = Instant::now();
            for (genome_id, brain) in &brains {
                for (case_id, initial) in &self.states {
                    if let Some(exporter) = &mut self.exporter {
                        exporter.reset(initial);
                    }
                    let (steps, outcome, final_state) =
                        fly(brain, initial, self.exporter.as_mut());
                    let rating =
                        eval_outcome_rating(steps, outcome, &final_state, initial);
                    self.req.data.push(OutcomeRating {
                        case_id: *case_id,
                        genome_id: *genome_id,
                        rating,
                    });

                    if outcome == Outcome::Landed {
                        info!(
                            "#{} {outcome}! {genome_id}@{case_id}\n scr: {rating}\n pos: {{ {}, {} }}\n vel: {{ {}, {} }}\n tlt: {}",
                            self.req.generation,
                            final_state.position.x,
                            final_state.position.y,
                            final_state.velocity.x,
                            final_state.velocity.y,
                            final_state.tilt,
                        );
                    }
                    if let Some(exporter) = &mut self.exporter {
                        exporter.export(self.req.generation, *case_id, *genome_id, outcome);
                    }
                }
            }
            let duration = start.elapsed();
            trace!(
                "Processed {} individuals @ {} cases in {duration:?}.",
                brains.len(),
                self.states.len()
            );

            self.req.capacity = adjust_capacity(duration);
            trace!("New capacity is {}.", self.req.capacity);
        }
    }
}

// ── Simulation of one (genome, case) pair ─────────────────────────────────────

/// At most 256 turns of controller + physics; returns steps taken, the
/// terminal outcome (Aerial means the step limit ran out), and the final
/// state. A domain failure aborts the case as Lost.
fn fly(
    brain: &Dff,
    initial: &LanderState,
    mut exporter: Option<&mut ReplayExporter>,
) -> (usize, Outcome, LanderState) {
    let adapter = GameAdapter::new(brain, initial);
    let mut state = initial.clone();
    let mut outcome = Outcome::Aerial;
    let mut steps = 0;
    while outcome == Outcome::Aerial && steps < STEPS_LIMIT {
        state.out = adapter.output(&state.turn_input());
        outcome = match simulate(&mut state) {
            Ok(o) => o,
            Err(e) => {
                warn!("Simulation aborted: {e}");
                outcome = Outcome::Lost;
                break;
            }
        };
        if let Some(exporter) = exporter.as_deref_mut() {
            exporter.push_turn(state.turn_input());
        }
        steps += 1;
    }
    (steps, outcome, state)
}

// ── Rating ────────────────────────────────────────────────────────────────────

/// Lower is better. Landed flights are scored on speed, fuel economy, and
/// centering; crashes additionally on how far from the strip they ended;
/// Lost and timed-out flights sit on a 200-point floor.
pub fn eval_outcome_rating(
    steps: usize,
    outcome: Outcome,
    state: &LanderState,
    initial: &LanderState,
) -> f64 {
    let steps_ratio = steps as f64 / STEPS_LIMIT as f64;
    let fuel_spent = 1.0 - state.fuel as f64 / initial.fuel as f64;
    match outcome {
        Outcome::Landed => {
            let safe_width = 0.5 * (state.safe_area_x.end - state.safe_area_x.start) as f64;
            let safe_center = state.safe_area_x.start as f64 + safe_width;
            10.0 * steps_ratio
                + 60.0 * fuel_spent
                + 30.0 * ((state.position.x as f64 - safe_center).abs() / safe_width)
        }
        Outcome::Crashed => {
            let safe_center =
                0.5 * (state.safe_area_x.start + state.safe_area_x.end) as f64;
            100.0
                + 20.0 * steps_ratio
                + 20.0 * fuel_spent
                + 35.0 * ((state.position.x as f64 - safe_center).abs() / ZONE_WIDTH as f64)
                + 25.0
                    * ((state.position.y - state.safe_area_alt).abs() as f64
                        / (initial.position.y - state.safe_area_alt) as f64)
        }
        _ => 200.0 + 100.0 * steps_ratio,
    }
}

// ── Capacity targeting ────────────────────────────────────────────────────────

/// Aim the next batch at ~300 ms of simulation; the base both floors the
/// result and guards the division for very short batches.
pub fn adjust_capacity(duration: Duration) -> u32 {
    let millis = duration.as_millis().max(1) as u64;
    let scaled = (CAPACITY_BASE as u64 * BATCH_TARGET.as_millis() as u64) / millis;
    scaled.clamp(CAPACITY_BASE as u64, u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use lander_core::genome::LandingCase;
    use lander_core::geometry::{FPoint, IPoint, Span};
    use lander_core::nn::GENOME_LEN;

    fn strip_case() -> LandingCase {
        LandingCase {
            id: 1,
            fuel: 550,
            thrust: 0,
            tilt: 0,
            safe_area: Span { start: 1, end: 2 },
            position: IPoint::new(4750, 2700),
            velocity: FPoint::new(0.0, 0.0),
            surface: vec![
                IPoint::new(0, 1000),
                IPoint::new(4000, 150),
                IPoint::new(5500, 150),
                IPoint::new(6999, 1000),
            ],
        }
    }

    #[test]
    fn landed_dead_center_scores_only_time_and_fuel() {
        let initial = LanderState::from_case(&strip_case()).unwrap();
        let mut landed = initial.clone();
        landed.position = IPoint::new(4750, 150); // strip center
        landed.fuel = 275; // half the tank left
        let rating = eval_outcome_rating(64, Outcome::Landed, &landed, &initial);
        // 10·(64/256) + 60·0.5 + 30·0
        assert!((rating - (2.5 + 30.0)).abs() < 1e-9);
    }

    #[test]
    fn crashes_rank_behind_every_landing() {
        let initial = LanderState::from_case(&strip_case()).unwrap();
        let mut stopped = initial.clone();
        stopped.fuel = 0;
        stopped.position = IPoint::new(100, 900);
        let crash = eval_outcome_rating(256, Outcome::Crashed, &stopped, &initial);
        let worst_landing = eval_outcome_rating(256, Outcome::Landed, &stopped, &initial);
        assert!(crash > 100.0);
        assert!(crash > worst_landing.min(100.0));
    }

    #[test]
    fn lost_flights_sit_on_the_two_hundred_floor() {
        let initial = LanderState::from_case(&strip_case()).unwrap();
        assert_eq!(eval_outcome_rating(0, Outcome::Lost, &initial, &initial), 200.0);
        assert_eq!(
            eval_outcome_rating(STEPS_LIMIT, Outcome::Aerial, &initial, &initial),
            300.0
        );
    }

    #[test]
    fn capacity_targets_300ms_with_a_floor() {
        assert_eq!(adjust_capacity(Duration::from_millis(150)), 32);
        assert_eq!(adjust_capacity(Duration::from_millis(300)), CAPACITY_BASE);
        // Slow batches floor at the base instead of shrinking to zero.
        assert_eq!(adjust_capacity(Duration::from_secs(10)), CAPACITY_BASE);
        // Instant batches do not overflow.
        assert_eq!(adjust_capacity(Duration::ZERO), 4800);
    }

    #[test]
    fn zero_genome_free_falls_to_a_terminal_outcome() {
        let initial = LanderState::from_case(&strip_case()).unwrap();
        let brain = Dff::from_genes(&[0.0; GENOME_LEN]).unwrap();
        let (steps, outcome, _) = fly(&brain, &initial, None);
        assert!(steps > 0);
        assert_ne!(outcome, Outcome::Aerial);
    }
}
