//! state.rs — per-turn lander state and its binary dump
//!
//! `LanderState` extends the case setup (surface + safe area + turn zero)
//! with the derived strip geometry and the last commanded output. The base64
//! form is the exchange format of the visualisation plug-in: a little-endian
//! dump of the fields in a fixed order, standard alphabet, `=` padding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::genome::LandingCase;
use crate::geometry::{FPoint, IPoint, Span};
use crate::{DomainError, Inum};

// ── Turn I/O ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GameTurnInput {
    pub fuel: Inum,
    pub thrust: Inum,
    pub tilt: Inum,
    pub position: IPoint,
    pub velocity: FPoint,
}

/// Commanded thrust and tilt for the next turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutput {
    pub thrust: Inum,
    pub tilt: Inum,
}

// ── Full state ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LanderState {
    pub surface: Vec<IPoint>,
    pub safe_area: Span<u32>,

    pub fuel: Inum,
    pub thrust: Inum,
    pub tilt: Inum,
    pub position: IPoint,
    pub velocity: FPoint,

    /// X extent of the flat landing strip, `surface[safe_area.start].x ..
    /// surface[safe_area.end].x`.
    pub safe_area_x: Span<Inum>,
    /// Altitude of the (flat) strip.
    pub safe_area_alt: Inum,

    pub out: TurnOutput,
}

impl LanderState {
    /// Build the initial state of one landing case. Fails on a surface too
    /// short to interpolate or a safe area pointing outside it.
    pub fn from_case(case: &LandingCase) -> Result<Self, DomainError> {
        if case.surface.len() < 2 {
            return Err(DomainError::DegenerateSurface(case.surface.len()));
        }
        let (start, end) = (case.safe_area.start as usize, case.safe_area.end as usize);
        if start >= case.surface.len() || end >= case.surface.len() || start >= end {
            return Err(DomainError::BadSafeArea { start, end, points: case.surface.len() });
        }
        Ok(Self {
            safe_area_x: Span {
                start: case.surface[start].x,
                end: case.surface[end].x,
            },
            safe_area_alt: case.surface[start].y,
            surface: case.surface.clone(),
            safe_area: case.safe_area,
            fuel: case.fuel,
            thrust: case.thrust,
            tilt: case.tilt,
            position: case.position,
            velocity: case.velocity,
            out: TurnOutput::default(),
        })
    }

    pub fn turn_input(&self) -> GameTurnInput {
        GameTurnInput {
            fuel: self.fuel,
            thrust: self.thrust,
            tilt: self.tilt,
            position: self.position,
            velocity: self.velocity,
        }
    }

    // ── Base64 dump ───────────────────────────────────────────────────────────

    /// Fixed field order: `n, surface[n], safe_area, fuel, thrust, tilt,
    /// position, velocity, safe_area_x, safe_area_alt`, all little-endian.
    pub fn to_base64(&self) -> String {
        let mut buf = Vec::with_capacity(64 + self.surface.len() * 8);
        buf.put_u64_le(self.surface.len() as u64);
        for p in &self.surface {
            buf.put_i32_le(p.x);
            buf.put_i32_le(p.y);
        }
        buf.put_u64_le(self.safe_area.start as u64);
        buf.put_u64_le(self.safe_area.end as u64);
        buf.put_i32_le(self.fuel);
        buf.put_i32_le(self.thrust);
        buf.put_i32_le(self.tilt);
        buf.put_i32_le(self.position.x);
        buf.put_i32_le(self.position.y);
        buf.put_f64_le(self.velocity.x);
        buf.put_f64_le(self.velocity.y);
        buf.put_i32_le(self.safe_area_x.start);
        buf.put_i32_le(self.safe_area_x.end);
        buf.put_i32_le(self.safe_area_alt);
        BASE64.encode(buf)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, DomainError> {
        let raw = BASE64.decode(encoded).map_err(|_| DomainError::MalformedStateDump)?;
        let mut buf = raw.as_slice();

        let need = |buf: &[u8], n: usize| {
            if buf.len() < n {
                Err(DomainError::MalformedStateDump)
            } else {
                Ok(())
            }
        };

        need(buf, 8)?;
        let n = buf.get_u64_le() as usize;
        need(buf, n.checked_mul(8).ok_or(DomainError::MalformedStateDump)?)?;
        let mut surface = Vec::with_capacity(n);
        for _ in 0..n {
            let x = buf.get_i32_le();
            let y = buf.get_i32_le();
            surface.push(IPoint::new(x, y));
        }
        need(buf, 16 + 5 * 4 + 2 * 8 + 3 * 4)?;
        let safe_area = Span {
            start: buf.get_u64_le() as u32,
            end: buf.get_u64_le() as u32,
        };
        let fuel = buf.get_i32_le();
        let thrust = buf.get_i32_le();
        let tilt = buf.get_i32_le();
        let position = IPoint::new(buf.get_i32_le(), buf.get_i32_le());
        let velocity = FPoint::new(buf.get_f64_le(), buf.get_f64_le());
        let safe_area_x = Span { start: buf.get_i32_le(), end: buf.get_i32_le() };
        let safe_area_alt = buf.get_i32_le();

        Ok(Self {
            surface,
            safe_area,
            fuel,
            thrust,
            tilt,
            position,
            velocity,
            safe_area_x,
            safe_area_alt,
            out: TurnOutput::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::LandingCase;

    fn hover_case() -> LandingCase {
        LandingCase {
            id: 7,
            fuel: 550,
            thrust: 0,
            tilt: 0,
            safe_area: Span { start: 4, end: 5 },
            position: IPoint::new(2500, 2700),
            velocity: FPoint::new(0.0, 0.0),
            surface: vec![
                IPoint::new(0, 100),
                IPoint::new(1000, 500),
                IPoint::new(1500, 1500),
                IPoint::new(3000, 1000),
                IPoint::new(4000, 150),
                IPoint::new(5500, 150),
                IPoint::new(6999, 800),
            ],
        }
    }

    #[test]
    fn derives_strip_geometry() {
        let s = LanderState::from_case(&hover_case()).unwrap();
        assert_eq!(s.safe_area_x, Span { start: 4000, end: 5500 });
        assert_eq!(s.safe_area_alt, 150);
    }

    #[test]
    fn rejects_short_surface() {
        let mut case = hover_case();
        case.surface.truncate(1);
        assert!(matches!(
            LanderState::from_case(&case),
            Err(DomainError::DegenerateSurface(1))
        ));
    }

    #[test]
    fn base64_round_trip() {
        let mut s = LanderState::from_case(&hover_case()).unwrap();
        s.velocity = FPoint::new(-12.25, 3.5);
        s.fuel = 123;
        let restored = LanderState::from_base64(&s.to_base64()).unwrap();
        assert_eq!(restored, s);
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(LanderState::from_base64("not-base64!").is_err());
        assert!(LanderState::from_base64("AAAA").is_err()); // truncated body
    }

    #[test]
    fn base64_known_vector() {
        assert_eq!(BASE64.encode("Hello, world!"), "SGVsbG8sIHdvcmxkIQ==");
    }

    #[test]
    fn base64_round_trip_and_lengths() {
        for n in 0..64usize {
            let bytes: Vec<u8> = (0..n as u8).collect();
            let encoded = BASE64.encode(&bytes);
            assert_eq!(encoded.len(), n.div_ceil(3) * 4);
            let padding = encoded.bytes().rev().take_while(|&b| b == b'=').count();
            assert_eq!(encoded.len() * 3 / 4 - padding, n);
            assert_eq!(BASE64.decode(&encoded).unwrap(), bytes);
        }
    }
}
