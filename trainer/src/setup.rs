//! setup.rs — interactive scratch initialisation
//!
//! Asks for the GA parameters the way a fresh session expects them:
//! population size, elite share (amount or percentage), tournament size,
//! crossover and mutation as `<name>[; <value>[, <value>]]` pairs, case
//! count, and the genome randomizer sway. Bad input re-prompts with the
//! factory's own validation errors; EOF on stdin means batch-mode misuse and
//! aborts the setup.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use lander_core::genome::{randomize_genes_naive, Genome, LandingCase};
use lander_core::rng::SharedRng;
use lander_core::uid::UidSource;

use crate::ga::{Crossover, Mutation};
use crate::results::ResultsTable;
use crate::state::{AlgorithmArgs, AppState};

const DEFAULT_GENOME_SWAY: f64 = 1e4;

// ── Prompt plumbing ───────────────────────────────────────────────────────────

/// One line from stdin; `Ok(None)` is EOF (no terminal — batch misuse).
fn prompt_line(prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{prompt} ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask until `parse` accepts; an empty line takes the default.
fn read_input<T>(
    title: &str,
    help: &str,
    default: T,
    mut parse: impl FnMut(&str) -> Option<T>,
) -> anyhow::Result<T> {
    loop {
        let Some(line) = prompt_line(title)? else {
            bail!("no interactive terminal; cannot configure a new session");
        };
        if line.is_empty() {
            return Ok(default);
        }
        match parse(&line) {
            Some(v) => return Ok(v),
            None => println!("{help}"),
        }
    }
}

/// Prompt for an id; defaults to 1.
pub fn read_uid(title: &str) -> anyhow::Result<u64> {
    read_input(title, "ID is a positive number.", 1u64, |s| {
        s.parse().ok().filter(|&v| v >= 1)
    })
}

/// y/Y confirms; anything else declines.
pub fn wait_answer(prompt: &str) -> anyhow::Result<bool> {
    Ok(matches!(
        prompt_line(prompt)?.as_deref(),
        Some("y") | Some("Y") | Some("yes")
    ))
}

/// Like [`wait_answer`], but an empty answer confirms ([Y]/n prompts).
pub fn wait_answer_yes(prompt: &str) -> anyhow::Result<bool> {
    Ok(!matches!(
        prompt_line(prompt)?.as_deref(),
        Some("n") | Some("N") | Some("no")
    ))
}

/// `"25%"` of `total`, or a plain amount.
fn parse_unit(input: &str, total: usize) -> Option<usize> {
    if let Some(percent) = input.strip_suffix('%') {
        let p: f64 = percent.trim().parse().ok()?;
        if !(0.0..=100.0).contains(&p) {
            return None;
        }
        Some((total as f64 * p / 100.0).round() as usize)
    } else {
        input.parse().ok()
    }
}

/// `<name>[; <value>[, <value>]]` → the checkpointable args pair.
fn parse_algorithm(input: &str) -> Option<AlgorithmArgs> {
    let (name, rest) = match input.split_once(';') {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    let mut values = Vec::new();
    if !rest.is_empty() {
        for part in rest.split(',') {
            values.push(part.trim().parse().ok()?);
        }
    }
    Some(AlgorithmArgs { name, values })
}

fn read_crossover() -> anyhow::Result<(AlgorithmArgs, Crossover)> {
    loop {
        let args = read_input(
            "Crossover:",
            "Enter <alg name>[; <value>[, <value>]]",
            AlgorithmArgs { name: "scattered".into(), values: vec![0.5] },
            parse_algorithm,
        )?;
        match Crossover::from_args(&args.name, &args.values) {
            Ok(op) => return Ok((args, op)),
            Err(errors) => {
                for e in errors {
                    eprintln!("{}: {e}", args.name);
                }
                eprintln!();
            }
        }
    }
}

fn read_mutation() -> anyhow::Result<(AlgorithmArgs, Mutation)> {
    loop {
        let args = read_input(
            "Mutation:",
            "Enter <alg name>[; <value>[, <value>]]",
            AlgorithmArgs { name: "none".into(), values: vec![] },
            parse_algorithm,
        )?;
        match Mutation::from_args(&args.name, &args.values) {
            Ok(op) => return Ok((args, op)),
            Err(errors) => {
                for e in errors {
                    eprintln!("{}: {e}", args.name);
                }
                eprintln!();
            }
        }
    }
}

// ── Case file ─────────────────────────────────────────────────────────────────

fn read_cases_file(path: &Path) -> Vec<LandingCase> {
    let parse = || -> anyhow::Result<Vec<LandingCase>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    };
    match parse() {
        Ok(cases) => cases,
        Err(e) => {
            warn!("{e:#}");
            Vec::new()
        }
    }
}

// ── Scratch init ──────────────────────────────────────────────────────────────

/// Build a generation-0 session from interactive answers and an optional
/// predefined-cases JSON file.
pub fn init_from_scratch(
    cases_path: Option<&Path>,
    directory: PathBuf,
) -> anyhow::Result<AppState> {
    let predefined = cases_path.map(read_cases_file).unwrap_or_default();

    let population_size = read_input(
        "Population size [1]:",
        "Enter a positive number greater than or equal 1.",
        1usize,
        |s| s.parse().ok().filter(|&v| v >= 1),
    )?;

    let elite_count = loop {
        let elite = read_input(
            "Elite individuals count [0]:",
            &format!(
                "Enter percentage or a non-negative number less than or equal {population_size}."
            ),
            0usize,
            |s| parse_unit(s, population_size).filter(|&v| v <= population_size),
        )?;
        if elite > 0 && elite * 20 >= population_size {
            // 5% or more of the population.
            let keep = wait_answer(
                "Elite count of choice may be SUBOPTIMAL. Do you want to keep this value anyway (y/[N])?",
            )?;
            if !keep {
                continue;
            }
        }
        break elite;
    };

    let tournament_size_max = population_size - elite_count;
    let (tournament_size, has_crossover) = match tournament_size_max {
        0 => {
            println!("Crossover pass is skipped.");
            (1, false)
        }
        1 => {
            println!("Tournament size is: 1");
            (1, true)
        }
        max => (
            read_input(
                "Selection tournament size [1]:",
                &format!("Enter a number in range [1; {max}]."),
                1usize,
                |s| s.parse().ok().filter(|&v| (1..=max).contains(&v)),
            )?,
            true,
        ),
    };

    let (crossover, xvr) = if has_crossover {
        read_crossover()?
    } else {
        // Placeholder that survives a checkpoint reload; never invoked while
        // the whole population is elite.
        let args = AlgorithmArgs { name: "scattered".into(), values: vec![1.0] };
        let op = Crossover::Scattered { p: 1.0 };
        (args, op)
    };
    let (mutation, mtn) = read_mutation()?;

    if !predefined.is_empty() {
        println!("There are {} pre-defined training cases available!", predefined.len());
    }
    let cases_default = predefined.len().max(1);
    let cases_count = read_input(
        &format!("Training cases count [{cases_default}]:"),
        "Enter a positive number greater than or equal 1.",
        cases_default,
        |s| s.parse().ok().filter(|&v| v >= 1),
    )?;
    if cases_count > predefined.len() {
        println!("{} cases will be generated randomly.", cases_count - predefined.len());
    }

    let sway = read_input(
        &format!("Genome randomizer sway [{DEFAULT_GENOME_SWAY}]:"),
        "Enter a positive number.",
        DEFAULT_GENOME_SWAY,
        |s| s.parse().ok().filter(|&v: &f64| v > 0.0),
    )?;

    let check = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let uids = UidSource::default();
    let mut rng = SharedRng::trainer_grade(StdRng::from_entropy());

    let population: Vec<Genome> = (0..population_size)
        .map(|_| Genome { id: uids.next_uid(), genes: randomize_genes_naive(&mut rng, sway) })
        .collect();

    let mut cases: Vec<LandingCase> = Vec::with_capacity(cases_count);
    for mut case in predefined.into_iter().take(cases_count) {
        case.id = uids.next_uid();
        cases.push(case);
    }
    while cases.len() < cases_count {
        let mut case = LandingCase::randomize(&mut rng);
        case.id = uids.next_uid();
        cases.push(case);
    }

    let mut state = AppState {
        check,
        generation: 0,
        cases_count,
        population_size,
        elite_count,
        tournament_size,
        crossover,
        mutation,
        uids,
        cases,
        population,
        rng,
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
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_values_accept_amounts_and_percentages() {
        assert_eq!(parse_unit("7", 200), Some(7));
        assert_eq!(parse_unit("5%", 200), Some(10));
        assert_eq!(parse_unit("120%", 200), None);
        assert_eq!(parse_unit("banana", 200), None);
    }

    #[test]
    fn algorithm_lines_parse_name_and_values() {
        let args = parse_algorithm("Laplace; 0, 0.35").unwrap();
        assert_eq!(args.name, "laplace");
        assert_eq!(args.values, vec![0.0, 0.35]);

        let args = parse_algorithm("none").unwrap();
        assert_eq!(args.name, "none");
        assert!(args.values.is_empty());

        assert!(parse_algorithm("; 1, 2").is_none());
        assert!(parse_algorithm("uniform; a, b").is_none());
    }
}
