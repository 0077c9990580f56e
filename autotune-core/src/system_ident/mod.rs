use libm::expf;
use nalgebra::{SMatrix, SVector};

mod correction;
mod propagation;
#[cfg(test)]
mod tests;

pub use correction::{Innovation, clamp, correct};
pub use propagation::{predict, scaled_input};

/// Expected gyro measurement noise, (deg/s)^2
pub const MEASUREMENT_NOISE: f32 = 150.0;

/// Process noise injected per prediction step.
pub const Q_RATE: f32 = 1e-3;
pub const Q_TORQUE: f32 = 1e-3;
pub const Q_LOG_GAIN: f32 = 1e-6;
pub const Q_LOG_TAU: f32 = 1e-6;
pub const Q_BIAS: f32 = 1e-19;

/// exp(-5.5) ~ 4 ms, exp(-1.5) ~ 220 ms
pub const LOG_TAU_MIN: f32 = -5.5;
pub const LOG_TAU_MAX: f32 = -1.5;
pub const BIAS_BOUND: f32 = 0.5;
/// Keeps exp(log_gain) and the covariance terms built from it finite
/// when the data cannot be explained by the model.
pub const LOG_GAIN_MIN: f32 = 0.0;
pub const LOG_GAIN_MAX: f32 = 20.0;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
    Yaw,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Row / column order of a per axis covariance block.
pub(crate) const B_RATE: usize = 0;
pub(crate) const B_TORQUE: usize = 1;
pub(crate) const B_LOG_GAIN: usize = 2;
pub(crate) const B_BIAS: usize = 3;
pub(crate) const B_LOG_TAU: usize = 4;

/// Covariance of one axis over [rate, torque, log_gain, bias, log_tau].
pub type AxisBlock = SMatrix<f32, 5, 5>;

/// State vector of the identification filter.
///
/// | index | meaning |
/// |-------|---------|
/// | 0-2   | angular rate estimate (deg/s) |
/// | 3-5   | lagged, scaled actuator torque |
/// | 6-8   | ln of the torque to angular acceleration gain |
/// | 9     | ln of the actuator time constant (s), shared by all axes |
/// | 10-12 | constant torque bias |
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct State(
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))] pub SVector<f32, { Self::SIZE }>,
);

impl State {
    pub const SIZE: usize = 13;

    const RATE: usize = 0;
    const TORQUE: usize = 3;
    const LOG_GAIN: usize = 6;
    const LOG_TAU: usize = 9;
    const BIAS: usize = 10;

    /// No rotation, no torque, medium strength on roll and pitch, less on yaw,
    /// roughly 18 ms actuator response and no bias.
    pub fn initial() -> Self {
        let mut x = SVector::zeros();
        x[Self::LOG_GAIN] = 10.0;
        x[Self::LOG_GAIN + 1] = 10.0;
        x[Self::LOG_GAIN + 2] = 7.0;
        x[Self::LOG_TAU] = -4.0;
        Self(x)
    }

    pub fn rate(&self, axis: Axis) -> f32 {
        self.0[Self::RATE + axis.index()]
    }

    pub fn rates(&self) -> [f32; 3] {
        Axis::ALL.map(|axis| self.rate(axis))
    }

    pub fn torque(&self, axis: Axis) -> f32 {
        self.0[Self::TORQUE + axis.index()]
    }

    pub fn log_gain(&self, axis: Axis) -> f32 {
        self.0[Self::LOG_GAIN + axis.index()]
    }

    pub fn log_gains(&self) -> [f32; 3] {
        Axis::ALL.map(|axis| self.log_gain(axis))
    }

    pub fn gain(&self, axis: Axis) -> f32 {
        expf(self.log_gain(axis))
    }

    pub fn log_tau(&self) -> f32 {
        self.0[Self::LOG_TAU]
    }

    /// Actuator time constant in seconds
    pub fn tau_s(&self) -> f32 {
        expf(self.log_tau())
    }

    pub fn bias(&self, axis: Axis) -> f32 {
        self.0[Self::BIAS + axis.index()]
    }

    pub fn biases(&self) -> [f32; 3] {
        Axis::ALL.map(|axis| self.bias(axis))
    }

    pub fn set_rate(&mut self, axis: Axis, value: f32) {
        self.0[Self::RATE + axis.index()] = value;
    }

    pub fn set_torque(&mut self, axis: Axis, value: f32) {
        self.0[Self::TORQUE + axis.index()] = value;
    }

    pub fn set_log_gain(&mut self, axis: Axis, value: f32) {
        self.0[Self::LOG_GAIN + axis.index()] = value;
    }

    pub fn set_log_tau(&mut self, value: f32) {
        self.0[Self::LOG_TAU] = value;
    }

    pub fn set_bias(&mut self, axis: Axis, value: f32) {
        self.0[Self::BIAS + axis.index()] = value;
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Tracked covariance terms of a single axis.
///
/// Terms between different axes are assumed to be zero and are not stored.
/// The only coupling between axes is through the shared log_tau state,
/// whose variance lives in [`Covariance::log_tau`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisCovariance {
    pub rate: f32,
    pub rate_torque: f32,
    pub torque: f32,
    pub rate_log_gain: f32,
    pub torque_log_gain: f32,
    pub log_gain: f32,
    pub rate_bias: f32,
    pub torque_bias: f32,
    pub log_gain_bias: f32,
    pub bias: f32,
    pub rate_log_tau: f32,
    pub torque_log_tau: f32,
    pub log_gain_log_tau: f32,
    pub bias_log_tau: f32,
}

impl AxisCovariance {
    pub const TRACKED_TERMS: usize = 14;

    fn diagonal(rate: f32, torque: f32, log_gain: f32, bias: f32) -> Self {
        Self {
            rate,
            torque,
            log_gain,
            bias,
            ..Default::default()
        }
    }

    /// Expand into a symmetric block, using `log_tau` as the shared variance.
    pub fn block(&self, log_tau: f32) -> AxisBlock {
        let upper = [
            (B_RATE, B_RATE, self.rate),
            (B_RATE, B_TORQUE, self.rate_torque),
            (B_TORQUE, B_TORQUE, self.torque),
            (B_RATE, B_LOG_GAIN, self.rate_log_gain),
            (B_TORQUE, B_LOG_GAIN, self.torque_log_gain),
            (B_LOG_GAIN, B_LOG_GAIN, self.log_gain),
            (B_RATE, B_BIAS, self.rate_bias),
            (B_TORQUE, B_BIAS, self.torque_bias),
            (B_LOG_GAIN, B_BIAS, self.log_gain_bias),
            (B_BIAS, B_BIAS, self.bias),
            (B_RATE, B_LOG_TAU, self.rate_log_tau),
            (B_TORQUE, B_LOG_TAU, self.torque_log_tau),
            (B_LOG_GAIN, B_LOG_TAU, self.log_gain_log_tau),
            (B_BIAS, B_LOG_TAU, self.bias_log_tau),
            (B_LOG_TAU, B_LOG_TAU, log_tau),
        ];

        let mut block = AxisBlock::zeros();
        for (row, col, value) in upper {
            block[(row, col)] = value;
            block[(col, row)] = value;
        }
        block
    }

    /// Pick the tracked terms out of a block. Off diagonal pairs are averaged
    /// so rounding cannot make the stored matrix asymmetric.
    pub fn from_block(block: &AxisBlock) -> Self {
        let sym = |row: usize, col: usize| 0.5 * (block[(row, col)] + block[(col, row)]);
        Self {
            rate: block[(B_RATE, B_RATE)],
            rate_torque: sym(B_RATE, B_TORQUE),
            torque: block[(B_TORQUE, B_TORQUE)],
            rate_log_gain: sym(B_RATE, B_LOG_GAIN),
            torque_log_gain: sym(B_TORQUE, B_LOG_GAIN),
            log_gain: block[(B_LOG_GAIN, B_LOG_GAIN)],
            rate_bias: sym(B_RATE, B_BIAS),
            torque_bias: sym(B_TORQUE, B_BIAS),
            log_gain_bias: sym(B_LOG_GAIN, B_BIAS),
            bias: block[(B_BIAS, B_BIAS)],
            rate_log_tau: sym(B_RATE, B_LOG_TAU),
            torque_log_tau: sym(B_TORQUE, B_LOG_TAU),
            log_gain_log_tau: sym(B_LOG_GAIN, B_LOG_TAU),
            bias_log_tau: sym(B_BIAS, B_LOG_TAU),
        }
    }

    /// Multiply the log_tau row / column by `factor`. Keeps the block positive
    /// semi-definite while changing the log_tau variance by `factor^2`.
    pub(crate) fn scale_log_tau_terms(&mut self, factor: f32) {
        self.rate_log_tau *= factor;
        self.torque_log_tau *= factor;
        self.log_gain_log_tau *= factor;
        self.bias_log_tau *= factor;
    }
}

/// Packed, sparse covariance of the identification filter: 3 x 14 per axis
/// terms plus the shared log_tau variance, instead of the 91 unique entries
/// of the full 13 x 13 matrix.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance {
    pub axes: [AxisCovariance; 3],
    pub log_tau: f32,
}

const _: () = assert!(
    core::mem::size_of::<Covariance>() == Covariance::TRACKED_TERMS * core::mem::size_of::<f32>()
);

impl Covariance {
    pub const TRACKED_TERMS: usize = 3 * AxisCovariance::TRACKED_TERMS + 1;

    /// Diagonal prior, no cross terms.
    pub fn initial() -> Self {
        Self {
            axes: [
                AxisCovariance::diagonal(1.0, 1.0, 0.05, 0.05),
                AxisCovariance::diagonal(1.0, 1.0, 0.05, 0.05),
                AxisCovariance::diagonal(1.0, 1.0, 0.005, 0.05),
            ],
            log_tau: 0.05,
        }
    }

    pub fn axis(&self, axis: Axis) -> &AxisCovariance {
        &self.axes[axis.index()]
    }

    pub fn block(&self, axis: Axis) -> AxisBlock {
        self.axis(axis).block(self.log_tau)
    }

    /// Variances in [`State`] order.
    pub fn diagonal(&self) -> [f32; State::SIZE] {
        let [roll, pitch, yaw] = &self.axes;
        [
            roll.rate,
            pitch.rate,
            yaw.rate,
            roll.torque,
            pitch.torque,
            yaw.torque,
            roll.log_gain,
            pitch.log_gain,
            yaw.log_gain,
            self.log_tau,
            roll.bias,
            pitch.bias,
            yaw.bias,
        ]
    }
}

/// The identification EKF: state plus its sparse covariance.
#[derive(Debug, Clone)]
pub struct SystemIdentFilter {
    state: State,
    covariance: Covariance,
}

impl SystemIdentFilter {
    pub fn new() -> Self {
        Self {
            state: State::initial(),
            covariance: Covariance::initial(),
        }
    }

    pub fn reset(&mut self) {
        self.state = State::initial();
        self.covariance = Covariance::initial();
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn covariance(&self) -> &Covariance {
        &self.covariance
    }

    /// Run one prediction and gyro correction.
    ///
    /// `actuator` is the desired roll / pitch / yaw command, `gyro` the
    /// measured rates in deg/s, `throttle` the desired thrust. `dt_s` must be
    /// positive, callers bound it from above.
    pub fn predict_update(
        &mut self,
        actuator: &[f32; 3],
        gyro: &[f32; 3],
        dt_s: f32,
        throttle: f32,
    ) -> Innovation {
        let input = scaled_input(actuator, throttle);
        let (predicted, predicted_cov) = predict(&self.state, &self.covariance, &input, dt_s);
        let (mut state, covariance, innovation) = correct(&predicted, &predicted_cov, gyro);
        clamp(&mut state);

        self.state = state;
        self.covariance = covariance;
        innovation
    }
}

impl Default for SystemIdentFilter {
    fn default() -> Self {
        Self::new()
    }
}
