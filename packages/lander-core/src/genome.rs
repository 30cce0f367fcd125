//! genome.rs — genomes, landing cases, and their randomizers
//!
//! A genome is 66 real genes (the dense-layer layout of `nn.rs`) with a
//! session-unique id. A landing case is a genome-independent test setup:
//! surface, flat strip, and turn-zero input. Both are synthesized here:
//! genomes from activation-matched weight distributions, cases from a
//! terrain generator that grows a jittered skyline around a random strip.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::geometry::{FPoint, IPoint, Span};
use crate::nn::{Activation, GENOME_LEN, LAYER_SHAPES};
use crate::sim::surface_level;
use crate::uid::{Uid, NO_ID};
use crate::{Fnum, Inum};

// ── Data model ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    #[serde(default)]
    pub id: Uid,
    pub genes: Vec<Fnum>,
}

/// A fully-specified initial flight setup against which genomes are scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandingCase {
    #[serde(default)]
    pub id: Uid,
    pub fuel: Inum,
    pub thrust: Inum,
    pub tilt: Inum,
    pub safe_area: Span<u32>,
    pub position: IPoint,
    pub velocity: FPoint,
    pub surface: Vec<IPoint>,
}

// ── Genome randomizers ────────────────────────────────────────────────────────

/// Activation-matched initialisation: bias slots zero, weight slots drawn
/// from He normal (ReLU) or Xavier uniform (sigmoid/tanh).
pub fn randomize_genes<R: Rng + ?Sized>(rng: &mut R, activation: Activation) -> Vec<Fnum> {
    let mut genes = Vec::with_capacity(GENOME_LEN);
    for (inputs, neurons) in LAYER_SHAPES {
        genes.extend(std::iter::repeat(0.0).take(neurons));
        match activation {
            Activation::ReLU => {
                let d = Normal::new(0.0, (2.0 / inputs as Fnum).sqrt()).unwrap();
                genes.extend((0..neurons * inputs).map(|_| d.sample(rng)));
            }
            Activation::Sigmoid | Activation::Tanh => {
                let l = (6.0 / (inputs + neurons) as Fnum).sqrt();
                genes.extend((0..neurons * inputs).map(|_| rng.gen_range(-l..=l)));
            }
        }
    }
    genes
}

/// Every gene uniform in `[-sway, sway]`; the interactive scratch init uses
/// this with a configurable sway.
pub fn randomize_genes_naive<R: Rng + ?Sized>(rng: &mut R, sway: Fnum) -> Vec<Fnum> {
    (0..GENOME_LEN).map(|_| rng.gen_range(-sway..=sway)).collect()
}

// ── Landing case synthesis ────────────────────────────────────────────────────

const ELEVATION_C: Fnum = 2.2;

const FUEL_B: Inum = 550;
const FUEL_D: Fnum = 200.0;
const FUEL_K: Fnum = 23.07;
const FUEL_MIN: Inum = 100;

const INITIAL_SPEED_MAX: Inum = 100; // m/s

const START_POSITION_ALTITUDE_MAX: Inum = 2800; // m
const START_POSITION_ALTITUDE_MIN: Inum = 2700; // m
const SURFACE_ELEVATION_MAX: Inum = 2800; // m
const SURFACE_FLAT_ELEVATION_MAX: Inum = 2100; // m
const SURFACE_FLAT_ELEVATION_MIN: Inum = 100; // m
const SURFACE_FLAT_WIDTH_MAX: Inum = 2000; // m
const SURFACE_FLAT_WIDTH_STEP: Inum = 500; // m
const SURFACE_POINTS_COUNT_MIN: Inum = 4;
const SURFACE_POINTS_COUNT_MAX: Inum = 25;

const ZONE_HORZ_PADDING: Inum = 500; // m

/// Skyline falloff around the strip: 0 at the strip edge, approaching 1
/// toward `t1`.
fn elevation_curve(t0: Inum, t1: Inum, v: Fnum) -> Fnum {
    let v = ELEVATION_C * (v - t0 as Fnum) / (t1 - t0) as Fnum + 1.0;
    1.0 - 1.0 / (v * v)
}

fn get_flat<R: Rng + ?Sized>(rng: &mut R) -> (Inum, Inum, Inum) {
    let steps = (SURFACE_FLAT_WIDTH_MAX - SURFACE_FLAT_WIDTH_MIN) / SURFACE_FLAT_WIDTH_STEP;
    let flat_width =
        SURFACE_FLAT_WIDTH_MIN + SURFACE_FLAT_WIDTH_STEP * rng.gen_range(0..=steps);

    let ofs = (flat_width >> 1) + (flat_width & 1);
    let cx = rng.gen_range(ofs..=ZONE_X_MAX - ofs);

    let (flat_start, flat_end) = if cx <= ZONE_X_MAX / 2 {
        (cx - ofs, cx - ofs + flat_width)
    } else {
        (cx + ofs - flat_width, cx + ofs)
    };

    let flat_elevation =
        rng.gen_range(SURFACE_FLAT_ELEVATION_MIN..=SURFACE_FLAT_ELEVATION_MAX);
    (flat_start, flat_end, flat_elevation)
}

fn fill_surface<R: Rng + ?Sized>(
    rng: &mut R,
    case: &mut LandingCase,
    flat_start: Inum,
    flat_end: Inum,
    flat_elevation: Inum,
) {
    case.surface.clear();

    let surface_size = rng.gen_range(SURFACE_POINTS_COUNT_MIN + 1..=SURFACE_POINTS_COUNT_MAX);
    let step = ZONE_X_MAX as Fnum / (surface_size - 1) as Fnum;
    let step_2 = step / 2.0;
    let jitter = Normal::new(0.0, step / 6.0).unwrap();

    #[derive(Clone, Copy)]
    enum Phase {
        Start,
        Flat,
        End,
    }
    let mut phase = Phase::Start;

    let imax = surface_size - 1;
    for i in 0..=imax {
        let x = (step * i as Fnum
            + if i > 0 && i < imax && step_2 > 1.0 {
                jitter.sample(rng).clamp(-step_2 + 1.0, step_2 - 1.0)
            } else {
                0.0
            })
        .round() as Inum;

        match phase {
            Phase::Start if x >= flat_start => {
                phase = Phase::Flat;
                case.safe_area.start = case.surface.len() as u32;
                case.surface.push(IPoint::new(flat_start, flat_elevation));
                if i == imax {
                    case.safe_area.end = case.surface.len() as u32;
                    case.surface.push(IPoint::new(flat_end, flat_elevation));
                    if x <= flat_end {
                        continue;
                    }
                    // x overshoots the strip on the last step: the skyline
                    // point below closes the zone.
                } else {
                    continue;
                }
            }
            Phase::Flat => {
                if x >= flat_end {
                    phase = Phase::End;
                    case.safe_area.end = case.surface.len() as u32;
                    case.surface.push(IPoint::new(flat_end, flat_elevation));
                    if !(i == imax && x > flat_end) {
                        continue;
                    }
                } else {
                    continue;
                }
            }
            _ => {}
        }

        let y = (SURFACE_ELEVATION_MAX as Fnum
            * rng.gen::<Fnum>()
            * if x < flat_start {
                elevation_curve(flat_start, 0, x as Fnum)
            } else if x > flat_end {
                elevation_curve(flat_start, ZONE_X_MAX, x as Fnum)
            } else {
                0.0
            })
        .round() as Inum;

        case.surface.push(IPoint::new(x, y));
    }
}

fn fill_position<R: Rng + ?Sized>(
    rng: &mut R,
    case: &mut LandingCase,
    flat_start: Inum,
    flat_end: Inum,
) {
    let mut steps = 0;
    loop {
        steps += 1;
        let x = if steps > 16 {
            // tie-break: drop straight over the strip
            rng.gen_range(flat_start..=flat_end)
        } else {
            rng.gen_range(ZONE_HORZ_PADDING..=ZONE_X_MAX - ZONE_HORZ_PADDING)
        };
        let y = rng.gen_range(START_POSITION_ALTITUDE_MIN..=START_POSITION_ALTITUDE_MAX);

        let (h, _, _) = surface_level(&case.surface, x).expect("generated surface");
        if y as Fnum > h {
            case.position = IPoint::new(x, y);
            return;
        }
    }
}

impl LandingCase {
    /// Synthesize a random, playable landing case. The caller mints the id.
    pub fn randomize<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut case = LandingCase { id: NO_ID, thrust: THRUST_POWER_MIN, ..Default::default() };

        let (flat_start, flat_end, flat_elevation) = get_flat(rng);
        fill_surface(rng, &mut case, flat_start, flat_end, flat_elevation);
        fill_position(rng, &mut case, flat_start, flat_end);

        let fuel_jitter: Fnum = Normal::new(0.0, FUEL_D).unwrap().sample(rng);
        case.fuel = (FUEL_B
            + (FUEL_K * (case.surface.len() as Fnum - 7.0) + fuel_jitter) as Inum)
            .clamp(FUEL_MIN, FUEL_AMOUNT_MAX);

        const TILT_SPEC: [Inum; 6] = [TILT_ANGLE_MIN, 0, 0, 0, 0, TILT_ANGLE_MAX];
        case.tilt = TILT_SPEC[rng.gen_range(0..TILT_SPEC.len())];

        let px = case.position.x;
        case.velocity = FPoint::new(
            if !(flat_start <= px && px <= flat_end) && rng.gen_bool(0.8) {
                let toward = ((flat_start + flat_end) / 2 - px).signum() as Fnum;
                toward * rng.gen_range(0..=INITIAL_SPEED_MAX) as Fnum
            } else {
                0.0
            },
            0.0,
        );

        case
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LanderState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn relu_init_zeroes_biases_and_fills_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let genes = randomize_genes(&mut rng, Activation::ReLU);
        assert_eq!(genes.len(), GENOME_LEN);
        // hidden0: 5 biases then 35 weights
        assert!(genes[..5].iter().all(|&g| g == 0.0));
        assert!(genes[5..40].iter().any(|&g| g != 0.0));
        // hidden1 biases
        assert!(genes[40..43].iter().all(|&g| g == 0.0));
    }

    #[test]
    fn xavier_init_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let genes = randomize_genes(&mut rng, Activation::Tanh);
        let l0 = (6.0 / 12.0_f64).sqrt();
        assert!(genes[5..40].iter().all(|&g| g.abs() <= l0));
    }

    #[test]
    fn naive_init_respects_sway() {
        let mut rng = StdRng::seed_from_u64(7);
        let genes = randomize_genes_naive(&mut rng, 3.0);
        assert_eq!(genes.len(), GENOME_LEN);
        assert!(genes.iter().all(|&g| g.abs() <= 3.0));
        assert!(genes.iter().any(|&g| g != 0.0));
    }

    #[test]
    fn random_cases_are_playable() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..64 {
            let case = LandingCase::randomize(&mut rng);

            // Surface sorted strictly by x, spanning the zone.
            assert!(case.surface.len() >= 2);
            assert!(case.surface.windows(2).all(|w| w[0].x < w[1].x));
            assert_eq!(case.surface[0].x, 0);
            assert_eq!(case.surface.last().unwrap().x, ZONE_X_MAX);

            // Flat strip of at least the mandated width.
            let (s, e) = (case.safe_area.start as usize, case.safe_area.end as usize);
            assert_eq!(e, s + 1);
            assert_eq!(case.surface[s].y, case.surface[e].y);
            assert!(case.surface[e].x - case.surface[s].x >= SURFACE_FLAT_WIDTH_MIN);

            // Start position strictly above ground, state derivable.
            let state = LanderState::from_case(&case).unwrap();
            let (h, _, _) = surface_level(&case.surface, case.position.x).unwrap();
            assert!(case.position.y as Fnum > h);
            assert!(state.fuel >= FUEL_MIN && state.fuel <= FUEL_AMOUNT_MAX);
        }
    }

    #[test]
    fn case_json_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let case = LandingCase::randomize(&mut rng);
        let json = serde_json::to_string(&case).unwrap();
        let back: LandingCase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, case);
    }
}
