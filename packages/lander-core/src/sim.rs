//! sim.rs — deterministic single-turn flight physics + outcome classification
//!
//! One call to [`simulate`] advances the state by exactly one turn:
//! 1. Clamp the commanded thrust/tilt deltas, then the absolute ranges
//! 2. Burn fuel; an empty tank forces thrust to 0
//! 3. Integrate one Euler step with integer-rounded positions
//! 4. Classify: Lost (left the zone), Aerial (above the surface),
//!    Landed (all six conjuncts of the landing predicate), else Crashed
//!
//! Positions round through `f64::round` (the `lround` contract), so two runs
//! over byte-equal states produce byte-equal post-states.

use crate::constants::*;
use crate::geometry::{intersect, IPoint};
use crate::state::LanderState;
use crate::{DomainError, Fnum, Inum};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Aerial,
    Landed,
    Crashed,
    Lost,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Aerial => "Aerial",
            Outcome::Landed => "Landed",
            Outcome::Crashed => "Crashed",
            Outcome::Lost => "Lost",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Surface interpolation ─────────────────────────────────────────────────────

/// Surface height at `x` (piecewise linear), plus the segment it lies on.
/// Queries at or outside the ends return the endpoint altitude; an interior
/// node takes the segment to its right.
pub fn surface_level(
    surface: &[IPoint],
    x: Inum,
) -> Result<(Fnum, IPoint, IPoint), DomainError> {
    if surface.len() < 2 {
        return Err(DomainError::DegenerateSurface(surface.len()));
    }

    let first = surface[0];
    if x <= first.x {
        return Ok((first.y as Fnum, first, surface[1]));
    }
    let last = surface[surface.len() - 1];
    if x >= last.x {
        return Ok((last.y as Fnum, surface[surface.len() - 2], last));
    }

    // First point strictly right of x; x is strictly inside, so hi >= 1.
    let hi = surface.partition_point(|p| p.x <= x);
    let (lo, hi) = (surface[hi - 1], surface[hi]);
    let h = lo.y as Fnum + (x - lo.x) as Fnum * (hi.y - lo.y) as Fnum / (hi.x - lo.x) as Fnum;
    Ok((h, lo, hi))
}

// ── One physics step ──────────────────────────────────────────────────────────

fn apply_state_changes(state: &mut LanderState) {
    state.thrust = (state.thrust
        + (state.out.thrust - state.thrust).clamp(-THRUST_DELTA_ABS, THRUST_DELTA_ABS))
        .clamp(THRUST_POWER_MIN, THRUST_POWER_MAX);

    state.tilt = (state.tilt
        + (state.out.tilt - state.tilt).clamp(-TILT_DELTA_ABS, TILT_DELTA_ABS))
        .clamp(TILT_ANGLE_MIN, TILT_ANGLE_MAX);

    state.fuel -= state.thrust;
    if state.fuel <= 0 {
        state.fuel = 0;
        state.thrust = 0;
    }

    let tilt_rad = state.tilt as Fnum * std::f64::consts::PI / 180.0;
    let ax = -tilt_rad.sin() * state.thrust as Fnum;
    let ay = tilt_rad.cos() * state.thrust as Fnum + MARS_GRAVITY_ACC;

    state.position.x += (state.velocity.x + 0.5 * ax).round() as Inum;
    state.position.y += (state.velocity.y + 0.5 * ay).round() as Inum;

    state.velocity.x += ax;
    state.velocity.y += ay;
}

/// Advance one turn and classify the result. On Landed the position is
/// replaced by the exact (rounded) intersection of the travel segment with
/// the landing strip.
pub fn simulate(state: &mut LanderState) -> Result<Outcome, DomainError> {
    let position_prev = state.position;
    apply_state_changes(state);

    if state.position.x < 0
        || state.position.x >= ZONE_WIDTH
        || state.position.y < 0
        || state.position.y >= ZONE_HEIGHT
    {
        return Ok(Outcome::Lost);
    }

    let (h, line_start, line_end) = surface_level(&state.surface, state.position.x)?;
    if state.position.y as Fnum > h {
        return Ok(Outcome::Aerial);
    }

    let landed = state.tilt == 0
        // Within landing area
        && state.safe_area_x.start <= state.position.x
        && state.position.x < state.safe_area_x.end
        // Speed vectors stay within limits
        && state.velocity.x.abs() <= SPEED_LIMIT_HORZ as Fnum
        && state.velocity.y >= -(SPEED_LIMIT_VERT as Fnum)
        // Landing area surface is close and is approached from above
        && state.velocity.y < 0.0
        && state.safe_area_alt as Fnum <= state.position.y as Fnum - 0.5 * state.velocity.y
        && state.position.y as Fnum + 0.5 * state.velocity.x <= state.safe_area_alt as Fnum;

    if !landed {
        return Ok(Outcome::Crashed);
    }
    state.position = intersect(position_prev, state.position, line_start, line_end);
    Ok(Outcome::Landed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::LandingCase;
    use crate::geometry::{FPoint, Span};

    fn reference_surface() -> Vec<IPoint> {
        vec![
            IPoint::new(0, 100),
            IPoint::new(1000, 500),
            IPoint::new(1500, 1500),
            IPoint::new(3000, 1000),
            IPoint::new(4000, 150),
            IPoint::new(5500, 150),
            IPoint::new(6999, 800),
        ]
    }

    fn case(fuel: Inum, tilt: Inum, position: IPoint, velocity: FPoint) -> LandingCase {
        LandingCase {
            id: 1,
            fuel,
            thrust: 0,
            tilt,
            safe_area: Span { start: 4, end: 5 },
            position,
            velocity,
            surface: reference_surface(),
        }
    }

    #[test]
    fn surface_level_interpolates_and_clamps() {
        let surface = reference_surface();
        let (h, _, _) = surface_level(&surface, 500).unwrap();
        assert_eq!(h, 300.0);
        // Exact interior node picks the segment to the right.
        let (h, lo, hi) = surface_level(&surface, 1000).unwrap();
        assert_eq!(h, 500.0);
        assert_eq!((lo.x, hi.x), (1000, 1500));
        // Boundary queries return the endpoint altitude.
        let (h, _, _) = surface_level(&surface, 0).unwrap();
        assert_eq!(h, 100.0);
        let (h, _, _) = surface_level(&surface, 6999).unwrap();
        assert_eq!(h, 800.0);
    }

    #[test]
    fn surface_level_needs_two_points() {
        assert!(surface_level(&[IPoint::new(0, 0)], 5).is_err());
    }

    #[test]
    fn out_of_zone_is_lost_on_first_step() {
        let c = case(100, 0, IPoint::new(6999, 2999), FPoint::new(200.0, 0.0));
        let mut s = LanderState::from_case(&c).unwrap();
        assert_eq!(simulate(&mut s).unwrap(), Outcome::Lost);
    }

    #[test]
    fn tilt_clamps_at_fifteen_degrees_per_turn() {
        let c = case(1000, 0, IPoint::new(2500, 2700), FPoint::new(0.0, 0.0));
        let mut s = LanderState::from_case(&c).unwrap();
        s.out = crate::state::TurnOutput { thrust: 0, tilt: 90 };
        simulate(&mut s).unwrap();
        assert_eq!(s.tilt, 15);
        for _ in 0..5 {
            simulate(&mut s).unwrap();
        }
        assert_eq!(s.tilt, 90);
    }

    #[test]
    fn byte_equal_states_simulate_identically() {
        let c = case(550, 0, IPoint::new(2500, 2700), FPoint::new(3.0, -2.0));
        let mut a = LanderState::from_case(&c).unwrap();
        let mut b = a.clone();
        a.out = crate::state::TurnOutput { thrust: 3, tilt: -10 };
        b.out = a.out;
        for _ in 0..32 {
            let oa = simulate(&mut a).unwrap();
            let ob = simulate(&mut b).unwrap();
            assert_eq!(oa, ob);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn conservation_invariants_hold_each_step() {
        let c = case(550, 0, IPoint::new(2500, 2700), FPoint::new(0.0, 0.0));
        let mut s = LanderState::from_case(&c).unwrap();
        s.out = crate::state::TurnOutput { thrust: 4, tilt: 0 };
        let mut outcome = Outcome::Aerial;
        let mut steps = 0;
        while outcome == Outcome::Aerial && steps < STEPS_LIMIT {
            let fuel_before = s.fuel;
            let thrust_before = s.thrust;
            let tilt_before = s.tilt;
            outcome = simulate(&mut s).unwrap();
            steps += 1;
            assert!(s.fuel <= fuel_before);
            if s.fuel == 0 {
                assert_eq!(s.thrust, 0);
            } else {
                assert!((s.thrust - thrust_before).abs() <= 1);
            }
            assert!((s.tilt - tilt_before).abs() <= 15);
        }
        // Full thrust straight up keeps the hover case airborne for a while.
        assert!(steps > 10);
    }

    #[test]
    fn free_fall_onto_the_strip_lands() {
        let c = case(100, 0, IPoint::new(4500, 155), FPoint::new(0.0, 0.0));
        let mut s = LanderState::from_case(&c).unwrap();
        let mut outcome = Outcome::Aerial;
        let mut steps = 0;
        while outcome == Outcome::Aerial && steps < STEPS_LIMIT {
            outcome = simulate(&mut s).unwrap();
            steps += 1;
        }
        assert_eq!(outcome, Outcome::Landed);
        // Predicate conjuncts on the terminal state.
        assert_eq!(s.tilt, 0);
        assert!(s.velocity.x.abs() <= 20.0);
        assert!(s.velocity.y >= -40.0 && s.velocity.y < 0.0);
        // The returned position sits on the strip line.
        assert_eq!(s.position.y, 150);
        assert!(s.position.x >= 4000 && s.position.x < 5500);
    }

    #[test]
    fn crash_outside_the_strip() {
        // Free fall over the hillside at x=2500; surface there is ~1167m.
        let c = case(0, 0, IPoint::new(2500, 1200), FPoint::new(0.0, 0.0));
        let mut s = LanderState::from_case(&c).unwrap();
        let mut outcome = Outcome::Aerial;
        let mut steps = 0;
        while outcome == Outcome::Aerial && steps < STEPS_LIMIT {
            outcome = simulate(&mut s).unwrap();
            steps += 1;
        }
        assert_eq!(outcome, Outcome::Crashed);
    }
}
