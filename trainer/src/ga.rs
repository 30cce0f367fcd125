//! ga.rs — crossover and mutation operator library
//!
//! Operators are tagged variants built by a factory from an
//! `(name, values)` pair, so a checkpoint can name its algorithm and the
//! interactive setup can validate before committing. A crossover knows its
//! `growth` (children per invocation) and receives the parents' index
//! comparison so algorithms that care can tell which parent scored better
//! (lower index = better after the generation argsort).
//!
//! Laplace crossover and power mutation follow Deep et al., "A real coded
//! genetic algorithm for solving integer and mixed integer optimization
//! problems".

use std::cmp::Ordering;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use lander_core::genome::Genome;
use lander_core::geometry::lerp;
use lander_core::rng::SharedRng;
use lander_core::uid::NO_ID;

// ── Crossover ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Crossover {
    Heuristic { ratio: f64 },
    Intermediate { ratio: f64 },
    Laplace { a: f64, b: f64 },
    Scattered { p: f64 },
}

impl Crossover {
    /// Children emitted per invocation.
    pub fn growth(&self) -> usize {
        match self {
            Crossover::Laplace { .. } => 2,
            _ => 1,
        }
    }

    /// Parse a named operator; errors list every problem found.
    pub fn from_args(name: &str, values: &[f64]) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let arg = |i: usize, what: &str, errors: &mut Vec<String>| -> f64 {
            match values.get(i) {
                Some(v) if v.is_finite() => *v,
                Some(_) => {
                    errors.push(format!("{what} must be finite"));
                    0.0
                }
                None => {
                    errors.push(format!("missing {what}"));
                    0.0
                }
            }
        };

        let op = match name {
            "heuristic" => Crossover::Heuristic { ratio: arg(0, "ratio", &mut errors) },
            "intermediate" => Crossover::Intermediate { ratio: arg(0, "ratio", &mut errors) },
            "laplace" => Crossover::Laplace {
                a: arg(0, "location a", &mut errors),
                b: arg(1, "scale b", &mut errors),
            },
            "scattered" => {
                let p = arg(0, "pick probability", &mut errors);
                if !(0.0..=1.0).contains(&p) {
                    errors.push("pick probability must be within [0; 1]".into());
                }
                Crossover::Scattered { p }
            }
            other => return Err(vec![format!("unknown crossover algorithm '{other}'")]),
        };
        if values.len() > xvr_arity(name) {
            errors.push(format!("too many values for '{name}'"));
        }
        if errors.is_empty() {
            Ok(op)
        } else {
            Err(errors)
        }
    }

    /// Emit `growth()` children into `out`. `cmp` compares the parents'
    /// sorted positions; Less/Equal means `x1` is the better one.
    pub fn exec(
        &self,
        rng: &mut SharedRng,
        x1: &Genome,
        x2: &Genome,
        cmp: Ordering,
        out: &mut Vec<Genome>,
    ) {
        debug_assert_eq!(x1.genes.len(), x2.genes.len());
        match *self {
            Crossover::Heuristic { ratio } => {
                let (better, worse) = order_parents(x1, x2, cmp);
                let genes = better
                    .genes
                    .iter()
                    .zip(&worse.genes)
                    .map(|(&b, &w)| lerp(b, w, ratio))
                    .collect();
                out.push(Genome { id: NO_ID, genes });
            }
            Crossover::Intermediate { ratio } => {
                let t = ratio * rng.gen::<f64>();
                let genes = x1
                    .genes
                    .iter()
                    .zip(&x2.genes)
                    .map(|(&a, &b)| lerp(a, b, t))
                    .collect();
                out.push(Genome { id: NO_ID, genes });
            }
            Crossover::Laplace { a, b } => {
                let beta: Vec<f64> = x1
                    .genes
                    .iter()
                    .zip(&x2.genes)
                    .map(|(&g1, &g2)| {
                        let u: f64 = rng.gen();
                        let r = 1.0 - rng.gen::<f64>(); // (0; 1]
                        let sign = if u > 0.5 { 1.0 } else { -1.0 };
                        (g1 - g2).abs() * (a + sign * b * r.ln())
                    })
                    .collect();
                out.push(Genome {
                    id: NO_ID,
                    genes: x1.genes.iter().zip(&beta).map(|(&g, &d)| g + d).collect(),
                });
                out.push(Genome {
                    id: NO_ID,
                    genes: x2.genes.iter().zip(&beta).map(|(&g, &d)| g + d).collect(),
                });
            }
            Crossover::Scattered { p } => {
                let (better, worse) = order_parents(x1, x2, cmp);
                let genes = better
                    .genes
                    .iter()
                    .zip(&worse.genes)
                    .map(|(&b, &w)| if rng.gen::<f64>() <= p { b } else { w })
                    .collect();
                out.push(Genome { id: NO_ID, genes });
            }
        }
    }
}

fn order_parents<'a>(x1: &'a Genome, x2: &'a Genome, cmp: Ordering) -> (&'a Genome, &'a Genome) {
    if cmp == Ordering::Greater {
        (x2, x1)
    } else {
        (x1, x2)
    }
}

fn xvr_arity(name: &str) -> usize {
    match name {
        "laplace" => 2,
        _ => 1,
    }
}

// ── Mutation ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    None,
    Gaussian { t: f64, mean: f64, stddev: f64 },
    Power { p: f64, xl: f64, xu: f64 },
    Uniform { rate: f64, a: f64, b: f64 },
}

impl Mutation {
    pub fn from_args(name: &str, values: &[f64]) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let arg = |i: usize, what: &str, errors: &mut Vec<String>| -> f64 {
            match values.get(i) {
                Some(v) if v.is_finite() => *v,
                Some(_) => {
                    errors.push(format!("{what} must be finite"));
                    0.0
                }
                None => {
                    errors.push(format!("missing {what}"));
                    0.0
                }
            }
        };

        let op = match name {
            "none" => {
                if !values.is_empty() {
                    errors.push("'none' takes no values".into());
                }
                Mutation::None
            }
            "gaussian" => {
                let (t, mean, stddev) = (
                    arg(0, "threshold t", &mut errors),
                    arg(1, "mean", &mut errors),
                    arg(2, "stddev", &mut errors),
                );
                if stddev <= 0.0 {
                    errors.push("stddev must be positive".into());
                }
                Mutation::Gaussian { t, mean, stddev }
            }
            "power" => {
                let (p, xl, xu) = (
                    arg(0, "power p", &mut errors),
                    arg(1, "lower bound xl", &mut errors),
                    arg(2, "upper bound xu", &mut errors),
                );
                if xu <= xl {
                    errors.push("xu must exceed xl".into());
                }
                Mutation::Power { p, xl, xu }
            }
            "uniform" => {
                let (rate, a, b) = (
                    arg(0, "rate", &mut errors),
                    arg(1, "lower bound a", &mut errors),
                    arg(2, "upper bound b", &mut errors),
                );
                if !(0.0..=1.0).contains(&rate) {
                    errors.push("rate must be within [0; 1]".into());
                }
                if b < a {
                    errors.push("upper bound must not be below the lower one".into());
                }
                Mutation::Uniform { rate, a, b }
            }
            other => return Err(vec![format!("unknown mutation algorithm '{other}'")]),
        };
        if errors.is_empty() {
            Ok(op)
        } else {
            Err(errors)
        }
    }

    pub fn exec(&self, rng: &mut SharedRng, child: &mut Genome) {
        match *self {
            Mutation::None => {}
            Mutation::Gaussian { t, mean, stddev } => {
                let normal = Normal::new(mean, stddev).expect("validated stddev");
                for gene in &mut child.genes {
                    let x = normal.sample(rng);
                    if x.abs() >= mean + t * stddev {
                        *gene += x;
                    }
                }
            }
            Mutation::Power { p, xl, xu } => {
                let s = rng.gen::<f64>().powf(p);
                for gene in &mut child.genes {
                    let v = *gene;
                    let (vxl, xuv) = (v - xl, xu - v);
                    let t = vxl / xuv;
                    let r: f64 = rng.gen();
                    // NaN t (v at a bound) makes both indicators false: no-op.
                    let up = (t >= r) as u8 as f64;
                    let down = (t < r) as u8 as f64;
                    *gene = v + s * (up * xuv - down * vxl);
                }
            }
            Mutation::Uniform { rate, a, b } => {
                let span = b - a;
                for gene in &mut child.genes {
                    if rng.gen::<f64>() <= rate {
                        *gene = a + span * rng.gen::<f64>();
                    }
                }
            }
        }
    }
}
