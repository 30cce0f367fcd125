//! generation.rs — the generation-advance pipeline
//!
//! Runs on the looper task once every result-matrix row is complete:
//! score rows, argsort, carry the elite, fill the rest by tournament
//! crossover, mutate the newcomers, bump the generation.

use std::cmp::Ordering;

use rand::Rng;

use lander_core::fsum::fsum;
use lander_core::rng::SharedRng;

use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct GenerationStats {
    pub generation: u64,
    pub score_best: f64,
    pub score_worst: f64,
}

/// Minimum sorted index across `size` uniform draws from the non-elite range
/// `[offset, total)`; the two parents of one crossover may coincide.
fn tournament(rng: &mut SharedRng, offset: usize, total: usize, size: usize) -> usize {
    (0..size.max(1))
        .map(|_| rng.gen_range(offset..total))
        .min()
        .unwrap_or(offset)
}

/// Advance to the next generation. The result matrix must be complete.
pub fn next_generation(state: &mut AppState) -> GenerationStats {
    // Reduce each row to its mean score; the compensated sum keeps the value
    // independent of the order ratings arrived in.
    let scores: Vec<f64> = state
        .results
        .rows()
        .map(|row| fsum(row.iter().copied()) / state.cases.len() as f64)
        .collect();

    let mut inds: Vec<usize> = (0..state.population.len()).collect();
    inds.sort_by(|&u, &v| scores[u].partial_cmp(&scores[v]).unwrap_or(Ordering::Equal));

    let stats = GenerationStats {
        generation: state.generation,
        score_best: scores[inds[0]],
        score_worst: scores[*inds.last().expect("non-empty population")],
    };

    let growth = state.xvr.growth();
    let elite_count = state.elite_count.min(state.population_size);
    let crossover_count =
        (state.population_size - elite_count).div_ceil(growth) * growth;

    let mut new_pop = Vec::with_capacity(elite_count + crossover_count);
    for &i in &inds[..elite_count] {
        new_pop.push(state.population[i].clone());
    }

    if crossover_count > 0 {
        while new_pop.len() < elite_count + crossover_count {
            let x1 = tournament(
                &mut state.rng,
                elite_count,
                state.population_size,
                state.tournament_size,
            );
            let x2 = tournament(
                &mut state.rng,
                elite_count,
                state.population_size,
                state.tournament_size,
            );
            state.xvr.exec(
                &mut state.rng,
                &state.population[inds[x1]],
                &state.population[inds[x2]],
                x1.cmp(&x2),
                &mut new_pop,
            );
        }
        new_pop.truncate(state.population_size);

        for child in new_pop.iter_mut().skip(elite_count) {
            state.mtn.exec(&mut state.rng, child);
            child.id = state.uids.next_uid();
        }
    }

    state.population = new_pop;
    state.generation += 1;
    stats
}
