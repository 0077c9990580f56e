use serde::{Deserialize, Serialize};

/// Number of slots in the gyro sample queue. One slot is always kept free,
/// so at most `DEFAULT_QUEUE_CAPACITY - 1` samples can wait for the
/// estimation task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 18;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutotuneConfig {
    /// Module admin state. When false the task refuses to start.
    pub enabled: bool,
    /// Time spent armed in normal stabilization before measuring
    pub warmup_ms: u32,
    /// Length of the measurement window
    pub measure_ms: u32,
    /// Upper bound on samples fed through the filter per scheduling period
    pub max_samples_per_period: usize,
    /// Scheduling period while autotune is the active flight mode
    pub period_ms: u32,
    /// Scheduling period while another flight mode is active
    pub idle_period_ms: u32,
    /// Ceiling for the per-sample dt, absorbs the first sample and long gaps
    pub dt_ceiling_s: f32,
    /// Publish an intermediate record every this many samples
    pub publish_every: u32,
    /// Decay factor of the innovation noise average, per sample
    pub noise_alpha: f32,
    pub stabilization: StabilizationSettings,
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_ms: 2_000,
            measure_ms: 60_000,
            max_samples_per_period: 4,
            period_ms: 2,
            idle_period_ms: 50,
            dt_ceiling_s: 0.010,
            publish_every: 256,
            // 10 second time constant at 300 Hz
            noise_alpha: 0.9997,
            stabilization: StabilizationSettings::default(),
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirframeType {
    Multirotor,
    /// Collective pitch helicopter, thrust comes from the collective stick
    HeliCp,
}

/// The subset of the stabilization settings the manual passthrough needs.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StabilizationSettings {
    /// deg, full stick roll attitude
    pub roll_max: u8,
    /// deg, full stick pitch attitude
    pub pitch_max: u8,
    /// deg/s, full stick yaw rate
    pub yaw_manual_rate: f32,
    pub airframe: AirframeType,
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            roll_max: 55,
            pitch_max: 55,
            yaw_manual_rate: 150.0,
            airframe: AirframeType::Multirotor,
        }
    }
}
