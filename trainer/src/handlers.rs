//! handlers.rs — protocol state of the master: `cases` and `outcomes`
//!
//! Handlers run as looper jobs with exclusive access to [`AppState`]; each
//! writes its responses into the per-request [`ResponseSink`] it was posted
//! with. `on_outcomes` returns whether the generation advanced so the caller
//! can kick off persistence outside the hot path.

use std::time::Instant;

use tracing::{info, warn};

use lander_proto::{Cases, Message, Outcomes, Population};

use crate::generation::next_generation;
use crate::server::ResponseSink;
use crate::state::{AppState, Stamp};

/// `cases` request → the current case list, verbatim.
pub fn on_cases(state: &mut AppState, _request: &Cases, sink: &ResponseSink) {
    sink.append(Message::Cases(Cases { data: state.cases.clone() }));
}

/// `outcomes` request: ingest ratings, advance the generation when the
/// matrix fills, and hand out the next work batch.
pub fn on_outcomes(
    state: &mut AppState,
    request: &Outcomes,
    now: Instant,
    sink: &ResponseSink,
) -> bool {
    if !request.data.is_empty() && request.generation != state.generation {
        warn!("{} > unexpected generation {}!", request.client_name, request.generation);
    } else {
        for src in &request.data {
            let Some(&case) = state.cases_index.get(&src.case_id) else {
                warn!("{} > unknown case id: {}, skipping.", request.client_name, src.case_id);
                continue;
            };
            let Some(&genome) = state.population_index.get(&src.genome_id) else {
                warn!(
                    "{} > unknown genome id: {}, skipping.",
                    request.client_name, src.genome_id
                );
                continue;
            };
            state.timeouts[genome] = Stamp::At(now);
            state.results.set(genome, case, src.rating);
        }
    }

    let mut advanced = false;
    {
        let mut ready_count = 0;
        for genome in 0..state.results.genomes() {
            if state.results.row_complete(genome) {
                state.timeouts[genome] = Stamp::Done;
                ready_count += 1;
            }
        }

        if ready_count == state.population.len() {
            let stats = next_generation(state);
            info!(
                "Generation #{} is complete!\n Scores: {}; {}.",
                stats.generation, stats.score_best, stats.score_worst
            );
            state.on_generation_changed();
            advanced = true;
        }
    }

    // Round-robin hand-out from the persistent index, debouncing anything
    // younger than the resend timeout.
    let mut out = Population { generation: state.generation, data: Vec::new() };
    let mut out_size = (request.capacity as usize).min(state.population_size);
    let mut resent = 0usize;
    for _ in 0..state.population.len() {
        if out_size == 0 {
            break;
        }
        if state.timeouts[state.index].eligible(now) {
            if state.timeouts[state.index] != Stamp::Never {
                resent += 1;
            }
            state.timeouts[state.index] = Stamp::At(now);
            out.data.push(state.population[state.index].clone());
            out_size -= 1;
        }
        state.index = (state.index + 1) % state.population.len();
    }
    if resent > 0 {
        tracing::debug!("{} individuals resent due to timeout.", resent);
    }

    sink.append(Message::Population(out));
    advanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ResponseBarrier;
    use crate::state::test_support::app_state;
    use lander_proto::OutcomeRating;
    use std::time::Duration;

    fn sink_of(n: usize) -> (std::sync::Arc<ResponseBarrier>, ResponseSink) {
        let barrier = ResponseBarrier::new(n);
        let sink = ResponseSink::new(barrier.clone(), 0);
        (barrier, sink)
    }

    fn outcomes(generation: u64, capacity: u32, data: Vec<OutcomeRating>) -> Outcomes {
        Outcomes { client_name: "test-runner".into(), generation, capacity, data }
    }

    fn handed_out(barrier: &ResponseBarrier) -> Vec<u64> {
        match &barrier.take_messages()[..] {
            [Message::Population(p)] => p.data.iter().map(|g| g.id).collect(),
            other => panic!("expected one population message, got {other:?}"),
        }
    }

    #[test]
    fn cases_handler_echoes_the_case_list() {
        let mut state = app_state(2, 1);
        let (barrier, sink) = sink_of(1);
        on_cases(&mut state, &Cases::default(), &sink);
        drop(sink);
        match &barrier.take_messages()[..] {
            [Message::Cases(c)] => assert_eq!(c.data, state.cases),
            other => panic!("expected one cases message, got {other:?}"),
        }
    }

    #[test]
    fn filling_the_last_cell_advances_exactly_one_generation() {
        let mut state = app_state(1, 2);
        let now = Instant::now();
        let ratings = state
            .population
            .iter()
            .enumerate()
            .map(|(i, g)| OutcomeRating {
                case_id: state.cases[0].id,
                genome_id: g.id,
                rating: 1.0 + i as f64,
            })
            .collect();

        let (_barrier, sink) = sink_of(1);
        let advanced = on_outcomes(&mut state, &outcomes(0, 0, ratings), now, &sink);
        assert!(advanced);
        assert_eq!(state.generation, 1);
        // Matrix reset before the next handler runs.
        assert!(!state.results.all_complete());
        assert!(state.timeouts.iter().all(|t| *t == Stamp::Never));
    }

    #[test]
    fn stale_generation_data_is_not_applied() {
        let mut state = app_state(1, 1);
        let now = Instant::now();
        let ratings = vec![OutcomeRating {
            case_id: state.cases[0].id,
            genome_id: state.population[0].id,
            rating: 1.0,
        }];
        let (_barrier, sink) = sink_of(1);
        let advanced = on_outcomes(&mut state, &outcomes(99, 0, ratings), now, &sink);
        assert!(!advanced);
        assert_eq!(state.generation, 0);
        assert!(!state.results.all_complete());
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let mut state = app_state(1, 1);
        let now = Instant::now();
        let ratings = vec![
            OutcomeRating { case_id: 777, genome_id: state.population[0].id, rating: 1.0 },
            OutcomeRating { case_id: state.cases[0].id, genome_id: 888, rating: 1.0 },
        ];
        let (_barrier, sink) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 0, ratings), now, &sink);
        assert!(!state.results.all_complete());
    }

    #[test]
    fn capacity_caps_the_batch_and_stamps_debounce() {
        let mut state = app_state(1, 3);
        let t0 = Instant::now();

        let (b1, s1) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 2, vec![]), t0, &s1);
        drop(s1);
        assert_eq!(handed_out(&b1).len(), 2);

        // Immediately after, only the third individual is still eligible.
        let (b2, s2) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 3, vec![]), t0, &s2);
        drop(s2);
        assert_eq!(handed_out(&b2).len(), 1);
    }

    #[test]
    fn silent_individual_is_resent_after_the_timeout() {
        let mut state = app_state(1, 1);
        let t0 = Instant::now();

        let (b1, s1) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 1, vec![]), t0, &s1);
        drop(s1);
        let first = handed_out(&b1);
        assert_eq!(first.len(), 1);

        // 10 s later: debounced, nothing offered.
        let (b2, s2) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 1, vec![]), t0 + Duration::from_secs(10), &s2);
        drop(s2);
        assert!(handed_out(&b2).is_empty());

        // 31 s later: the same genome id comes back.
        let (b3, s3) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 1, vec![]), t0 + Duration::from_secs(31), &s3);
        drop(s3);
        assert_eq!(handed_out(&b3), first);
    }

    #[test]
    fn completed_rows_are_pinned_done() {
        let mut state = app_state(1, 2);
        let now = Instant::now();
        let ratings = vec![OutcomeRating {
            case_id: state.cases[0].id,
            genome_id: state.population[0].id,
            rating: 1.0,
        }];
        let (_barrier, sink) = sink_of(1);
        on_outcomes(&mut state, &outcomes(0, 0, ratings), now, &sink);
        assert_eq!(state.timeouts[0], Stamp::Done);
        assert_ne!(state.timeouts[1], Stamp::Done);
    }
}
