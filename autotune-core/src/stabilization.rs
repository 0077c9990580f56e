use serde::{Deserialize, Serialize};

use crate::config::{AirframeType, StabilizationSettings};
use crate::readings::ManualControlCommand;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationMode {
    /// Stick sets an attitude, deg
    Attitude,
    /// Stick sets a rate, deg/s
    Rate,
    /// Attitude on roll and pitch, rate on yaw, with the identification
    /// dither from `IdentExcitation` added to the actuator output
    Estimation,
}

/// Setpoint handed to the stabilization loop while autotune owns the sticks.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StabilizationDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
    /// roll, pitch, yaw
    pub mode: [StabilizationMode; 3],
}

impl StabilizationDesired {
    /// Scale the sticks the same way the stabilized flight modes do. While
    /// identifying every axis runs in estimation mode, otherwise roll and
    /// pitch hold attitude and yaw holds rate.
    pub fn from_manual(
        manual: &ManualControlCommand,
        settings: &StabilizationSettings,
        identifying: bool,
    ) -> Self {
        let mode = if identifying {
            [StabilizationMode::Estimation; 3]
        } else {
            [
                StabilizationMode::Attitude,
                StabilizationMode::Attitude,
                StabilizationMode::Rate,
            ]
        };

        let thrust = match settings.airframe {
            AirframeType::HeliCp => manual.collective,
            AirframeType::Multirotor => manual.throttle,
        };

        Self {
            roll: manual.roll * settings.roll_max as f32,
            pitch: manual.pitch * settings.pitch_max as f32,
            yaw: manual.yaw * settings.yaw_manual_rate,
            thrust,
            mode,
        }
    }
}
