//! constants.rs — physical and game-rule constants of the landing zone

use crate::{Fnum, Inum};

pub const MARS_GRAVITY_ACC: Fnum = -3.711; // m/s^2

pub const FUEL_AMOUNT_MAX: Inum = 2000; // L
pub const SPEED_LIMIT_HORZ: Inum = 20; // m/s
pub const SPEED_LIMIT_VERT: Inum = 40; // m/s
pub const SURFACE_FLAT_WIDTH_MIN: Inum = 1000; // m
pub const THRUST_DELTA_ABS: Inum = 1; // m/s^3
pub const THRUST_POWER_MAX: Inum = 4; // m/s^2
pub const THRUST_POWER_MIN: Inum = 0; // m/s^2
pub const TILT_ANGLE_MAX: Inum = 90; // deg
pub const TILT_ANGLE_MIN: Inum = -90; // deg
pub const TILT_DELTA_ABS: Inum = 15; // deg/s
pub const ZONE_HEIGHT: Inum = 3000; // m
pub const ZONE_WIDTH: Inum = 7000; // m

pub const ZONE_X_MAX: Inum = ZONE_WIDTH - 1; // m
pub const ZONE_Y_MAX: Inum = ZONE_HEIGHT - 1; // m

/// A simulation that is still Aerial after this many turns is abandoned.
pub const STEPS_LIMIT: usize = 256;
