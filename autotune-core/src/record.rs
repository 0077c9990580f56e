use libm::expf;
use serde::{Deserialize, Serialize};

use crate::system_ident::{Axis, State};

/// Identified vehicle parameters, the output of an autotune run.
///
/// Published while measuring so the result can be watched live, and once
/// more when the window closes. The storage collaborator persists the last
/// published record.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemIdent {
    /// ln of the torque to angular acceleration gain, roll / pitch / yaw
    pub log_gain: [f32; 3],
    pub bias: [f32; 3],
    /// ln of the actuator time constant in seconds
    pub log_tau: f32,
    /// Decaying mean square of the rate residual, (deg/s)^2. `None` before
    /// measuring started.
    pub noise: Option<[f32; 3]>,
    /// dt of the last sample that went into this record, 0 for the final one
    pub period_ms: f32,
    pub num_updates: u32,
    pub num_spilled: u32,
    pub hover_throttle: f32,
}

impl SystemIdent {
    /// Largest encoded size, all options present and varints at full width.
    pub const MAX_ENCODED_LEN: usize = 64;

    pub fn from_state(
        state: &State,
        noise: Option<[f32; 3]>,
        period_s: f32,
        num_updates: u32,
        num_spilled: u32,
        hover_throttle: f32,
    ) -> Self {
        Self {
            log_gain: state.log_gains(),
            bias: state.biases(),
            log_tau: state.log_tau(),
            noise,
            period_ms: period_s * 1000.0,
            num_updates,
            num_spilled,
            hover_throttle,
        }
    }

    pub fn gain(&self, axis: Axis) -> f32 {
        expf(self.log_gain[axis.index()])
    }

    pub fn tau_s(&self) -> f32 {
        expf(self.log_tau)
    }

    /// Encode into `buffer`, returns the number of bytes written.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, postcard::Error> {
        let encoded = postcard::to_slice(self, buffer)?;
        Ok(encoded.len())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
