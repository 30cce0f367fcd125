//! replay.rs — keeps the last N successful landings as JSON replays
//!
//! The exporter records every turn of the flight being simulated; when the
//! outcome is Landed it writes a replay file and prunes the oldest ones
//! beyond the configured count. Write failures are logged and never disturb
//! the simulation loop.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde_json::json;
use tracing::{info, warn};

use lander_core::sim::Outcome;
use lander_core::state::{GameTurnInput, LanderState};
use lander_core::uid::Uid;

pub struct ReplayExporter {
    dir: PathBuf,
    max_count: usize,
    kept: VecDeque<PathBuf>,
    initial: Option<LanderState>,
    turns: Vec<GameTurnInput>,
    times: u64,
}

impl ReplayExporter {
    pub fn new(dir: PathBuf, max_count: usize) -> Self {
        Self {
            dir,
            max_count: max_count.max(1),
            kept: VecDeque::new(),
            initial: None,
            turns: Vec::new(),
            times: 0,
        }
    }

    /// Start recording a fresh flight.
    pub fn reset(&mut self, state: &LanderState) {
        self.initial = Some(state.clone());
        self.turns.clear();
        self.turns.push(state.turn_input());
    }

    pub fn push_turn(&mut self, turn: GameTurnInput) {
        self.turns.push(turn);
    }

    /// Persist the recorded flight if it landed; rotate out the oldest.
    pub fn export(&mut self, generation: u64, case_id: Uid, genome_id: Uid, outcome: Outcome) {
        if outcome != Outcome::Landed {
            return;
        }
        let Some(initial) = &self.initial else {
            return;
        };

        self.times += 1;
        let path = self.dir.join(format!(
            "replay_{generation}_{genome_id}_{case_id}_{:06}.json",
            self.times
        ));

        let replay = json!({
            "case_id": case_id,
            "gene_id": genome_id,
            "generation": generation,
            "outcome": outcome.as_str(),
            "state": initial.to_base64(),
            "init": { "surface": initial.surface, "safe_area": initial.safe_area },
            "turns": self.turns,
        });

        let write = std::fs::File::create(&path)
            .map_err(anyhow::Error::from)
            .and_then(|f| serde_json::to_writer_pretty(f, &replay).map_err(Into::into));
        match write {
            Ok(()) => {
                info!("Replay saved: {}", path.display());
                self.kept.push_back(path);
                while self.kept.len() > self.max_count {
                    if let Some(old) = self.kept.pop_front() {
                        if let Err(e) = std::fs::remove_file(&old) {
                            warn!("Could not prune replay {}: {e}", old.display());
                        }
                    }
                }
            }
            Err(e) => warn!("Could not write replay {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lander_core::genome::LandingCase;
    use lander_core::geometry::{FPoint, IPoint, Span};

    fn state() -> LanderState {
        let case = LandingCase {
            id: 1,
            fuel: 100,
            thrust: 0,
            tilt: 0,
            safe_area: Span { start: 0, end: 1 },
            position: IPoint::new(3000, 1000),
            velocity: FPoint::new(0.0, 0.0),
            surface: vec![IPoint::new(0, 150), IPoint::new(6999, 150)],
        };
        LanderState::from_case(&case).unwrap()
    }

    #[test]
    fn only_landings_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = ReplayExporter::new(dir.path().to_path_buf(), 2);
        exporter.reset(&state());
        exporter.export(0, 1, 2, Outcome::Crashed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        exporter.reset(&state());
        exporter.export(0, 1, 2, Outcome::Landed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn rotation_keeps_the_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = ReplayExporter::new(dir.path().to_path_buf(), 2);
        for i in 0..5 {
            exporter.reset(&state());
            exporter.export(0, i, i, Outcome::Landed);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn replay_contains_the_turn_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = ReplayExporter::new(dir.path().to_path_buf(), 1);
        let s = state();
        exporter.reset(&s);
        exporter.push_turn(s.turn_input());
        exporter.export(3, 7, 9, Outcome::Landed);

        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let raw = std::fs::read_to_string(file.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["generation"], 3);
        assert_eq!(parsed["turns"].as_array().unwrap().len(), 2);
        assert!(parsed["state"].is_string());
    }
}
