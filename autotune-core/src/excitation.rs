use libm::expf;

use crate::record::SystemIdent;

/// Time each dither step is held.
pub const STEP_PERIOD_US: u64 = 75_000;
/// Chosen so that a typical roll/pitch gain of exp(10.4) gets ~4 % of stick.
pub const SCALE_BIAS: f32 = 7.1;
pub const MAX_OFFSET: f32 = 0.25;

/// Axis kicked at each step and the direction, yaw interleaved with roll
/// and pitch.
const SEQUENCE: [(usize, f32); 8] = [
    (2, 1.0),
    (0, 1.0),
    (2, -1.0),
    (0, -1.0),
    (2, 1.0),
    (1, 1.0),
    (2, -1.0),
    (1, -1.0),
];

/// Actuator dither used by the stabilization loop in estimation mode.
///
/// Small steps excite one axis at a time. The step size is inversely
/// proportional to the gain identified so far, so a vehicle is not kicked
/// harder once the estimate shows it reacts strongly.
#[derive(Debug, Clone)]
pub struct IdentExcitation {
    iteration: u32,
    last_step_us: u64,
    offsets: [f32; 3],
}

impl IdentExcitation {
    pub fn new(now_us: u64) -> Self {
        Self {
            iteration: 0,
            last_step_us: now_us,
            offsets: [0.0; 3],
        }
    }

    /// Advance to the next step once the current one has been held long
    /// enough, returns the offsets to use now.
    pub fn update(&mut self, now_us: u64, ident: &SystemIdent) -> [f32; 3] {
        if now_us.saturating_sub(self.last_step_us) > STEP_PERIOD_US {
            self.iteration = self.iteration.wrapping_add(1);
            self.last_step_us = now_us;

            let (axis, sign) = SEQUENCE[(self.iteration & 0x07) as usize];
            self.offsets = [0.0; 3];
            self.offsets[axis] = sign * step_size(ident.log_gain[axis]);
        }
        self.offsets
    }

    pub fn offsets(&self) -> [f32; 3] {
        self.offsets
    }

    /// Add the dither to a roll / pitch / yaw actuator command, keeping the
    /// result within [-1, 1].
    pub fn apply(&self, actuator: [f32; 3]) -> [f32; 3] {
        core::array::from_fn(|i| (actuator[i] + self.offsets[i]).clamp(-1.0, 1.0))
    }
}

fn step_size(log_gain: f32) -> f32 {
    expf(SCALE_BIAS - log_gain).min(MAX_OFFSET)
}
