use serde::{Deserialize, Serialize};

/// Gyro reading as published by the sensors module.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroData {
    /// deg/s
    pub x: f32,
    /// deg/s
    pub y: f32,
    /// deg/s
    pub z: f32,
}

impl GyroData {
    pub fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Normalized actuator commands produced by the stabilization loop,
/// roll / pitch / yaw in [-1, 1], thrust in [0, 1].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmedState {
    Disarmed,
    Arming,
    Armed,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Manual,
    Acro,
    Leveling,
    Horizon,
    AxisLock,
    VirtualBar,
    Stabilized1,
    Stabilized2,
    Stabilized3,
    Autotune,
    AltitudeHold,
    PositionHold,
    ReturnToHome,
    PathPlanner,
    Failsafe,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightStatus {
    pub armed: ArmedState,
    pub flight_mode: FlightMode,
}

impl FlightStatus {
    pub fn new(armed: ArmedState, flight_mode: FlightMode) -> Self {
        Self { armed, flight_mode }
    }

    pub fn is_autotune(&self) -> bool {
        self.flight_mode == FlightMode::Autotune
    }

    pub fn is_armed(&self) -> bool {
        self.armed == ArmedState::Armed
    }

    pub fn is_disarmed(&self) -> bool {
        self.armed == ArmedState::Disarmed
    }
}

/// Pilot stick positions after receiver scaling.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualControlCommand {
    /// [-1, 1]
    pub roll: f32,
    /// [-1, 1]
    pub pitch: f32,
    /// [-1, 1]
    pub yaw: f32,
    /// [0, 1]
    pub throttle: f32,
    /// [-1, 1], only meaningful on collective pitch airframes
    pub collective: f32,
}
