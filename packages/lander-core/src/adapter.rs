//! adapter.rs — turns game state into net inputs and net outputs into commands
//!
//! The adapter is built once per (genome, case) pair: it owns the derived
//! strip geometry and the homogeneous line of every surface segment, then
//! maps each turn to the 7-input feature vector and the 2-output action.

use crate::constants::*;
use crate::geometry::{as_point, cross, line, FPoint, Span};
use crate::nn::Dff;
use crate::state::{GameTurnInput, LanderState, TurnOutput};
use crate::{Fnum, Inum};

pub struct GameAdapter<'a> {
    dff: &'a Dff,
    safe_area_x: Span<Inum>,
    safe_area_alt: Inum,
    /// Initial height above the strip; normalizes the altitude input.
    safe_area_elev: Fnum,
    /// Per surface segment: homogeneous line + both endpoints.
    lines: Vec<([Fnum; 3], FPoint, FPoint)>,
}

impl<'a> GameAdapter<'a> {
    /// `initial` is the turn-zero state of the case being flown.
    pub fn new(dff: &'a Dff, initial: &LanderState) -> Self {
        let lines = initial
            .surface
            .windows(2)
            .map(|w| {
                let (a, b): (FPoint, FPoint) = (w[0].into(), w[1].into());
                (line(a, b), a, b)
            })
            .collect();
        Self {
            dff,
            safe_area_x: initial.safe_area_x,
            safe_area_alt: initial.safe_area_alt,
            safe_area_elev: (initial.position.y - initial.safe_area_alt) as Fnum,
            lines,
        }
    }

    /// Raycast the velocity vector against every surface segment and return
    /// `|v| / distance` to the nearest forward hit, in 1/s. No hit is 0.
    pub fn check_obstacle(&self, turn: &GameTurnInput) -> Fnum {
        let pos: FPoint = turn.position.into();
        let ray = line(pos, pos.add(&turn.velocity));

        let mut sqr_dst_min = Fnum::INFINITY;
        for (l, ia, ib) in &self.lines {
            let p = as_point(cross(*l, ray));
            if (p.x + p.y).is_nan() {
                continue;
            }
            let d = p.sub(&pos);
            if turn.velocity.dot(&d) < 0.0
                || p.sub(ia).dot(&ib.sub(ia)) < 0.0
                || p.sub(ib).dot(&ia.sub(ib)) < 0.0
            {
                continue;
            }
            let sqr_dst = d.dot(&d);
            if sqr_dst < sqr_dst_min {
                sqr_dst_min = sqr_dst;
            }
        }
        (turn.velocity.dot(&turn.velocity) / sqr_dst_min).sqrt()
    }

    /// One controller evaluation: feature vector in, commanded output out.
    pub fn output(&self, turn: &GameTurnInput) -> TurnOutput {
        let deg2rad = std::f64::consts::PI / 180.0;
        let out = self.dff.forward([
            turn.thrust as Fnum / THRUST_POWER_MAX as Fnum,
            (turn.tilt as Fnum * deg2rad).sin(),
            (self.safe_area_x.start - turn.position.x)
                .max(turn.position.x - self.safe_area_x.end) as Fnum
                / ZONE_WIDTH as Fnum,
            (turn.position.y - self.safe_area_alt) as Fnum / self.safe_area_elev,
            (turn.velocity.x.abs() >= SPEED_LIMIT_HORZ as Fnum) as u8 as Fnum,
            (turn.velocity.y.abs() >= SPEED_LIMIT_VERT as Fnum) as u8 as Fnum,
            self.check_obstacle(turn),
        ]);

        let rad2deg = 180.0 / std::f64::consts::PI;
        TurnOutput {
            thrust: (THRUST_POWER_MAX as Fnum * out[0].clamp(0.0, 1.0)).round() as Inum,
            tilt: (rad2deg * out[1].clamp(-1.0, 1.0).asin()).round() as Inum,
        }
    }
}
