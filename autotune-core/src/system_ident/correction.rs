use libm::sqrtf;
use nalgebra::SVector;

use super::{
    Axis, AxisBlock, AxisCovariance, B_BIAS, B_LOG_GAIN, B_LOG_TAU, B_RATE, B_TORQUE, BIAS_BOUND,
    Covariance, LOG_GAIN_MAX, LOG_GAIN_MIN, LOG_TAU_MAX, LOG_TAU_MIN, MEASUREMENT_NOISE, State,
};

/// Gyro residual and its variance for each axis, before correction.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Innovation {
    pub residual: [f32; 3],
    pub variance: [f32; 3],
}

/// sqrt(to / from), the factor that moves a log_tau column from a log_tau
/// variance of `from` to one of `to` at constant correlation.
fn log_tau_rescale(to: f32, from: f32) -> f32 {
    if from > 0.0 { sqrtf(to / from) } else { 0.0 }
}

/// Correction step with the three gyro axes as independent scalar
/// measurements of the rate states.
///
/// Axes are processed in order. Each one sees the log_tau variance left by
/// the axes before it, with its own log_tau terms scaled to match, so every
/// block stays positive semi-definite even though cross axis terms are not
/// tracked. The covariance update uses the Joseph form.
pub fn correct(
    state: &State,
    covariance: &Covariance,
    gyro: &[f32; 3],
) -> (State, Covariance, Innovation) {
    let mut next_state = state.clone();
    let mut next_covariance = covariance.clone();
    let mut innovation = Innovation::default();

    let prior_log_tau_variance = covariance.log_tau;
    let mut log_tau_variance = prior_log_tau_variance;
    let mut conditioned_log_tau_variance = [0.0f32; 3];
    let mut log_tau = state.log_tau();

    for axis in Axis::ALL {
        let i = axis.index();

        let mut axis_covariance = covariance.axes[i];
        axis_covariance.scale_log_tau_terms(log_tau_rescale(
            log_tau_variance,
            prior_log_tau_variance,
        ));
        let block = axis_covariance.block(log_tau_variance);

        let residual = gyro[i] - state.rate(axis);
        let residual_variance = block[(B_RATE, B_RATE)] + MEASUREMENT_NOISE;
        let gain: SVector<f32, 5> = block.column(B_RATE).into_owned() / residual_variance;

        next_state.set_rate(axis, state.rate(axis) + gain[B_RATE] * residual);
        next_state.set_torque(axis, state.torque(axis) + gain[B_TORQUE] * residual);
        next_state.set_log_gain(axis, state.log_gain(axis) + gain[B_LOG_GAIN] * residual);
        next_state.set_bias(axis, state.bias(axis) + gain[B_BIAS] * residual);
        log_tau += gain[B_LOG_TAU] * residual;

        // P = (I - K H) P (I - K H)^T + K R K^T, H selects the rate
        let mut a = AxisBlock::identity();
        for row in 0..5 {
            a[(row, B_RATE)] -= gain[row];
        }
        let updated =
            a * block * a.transpose() + gain * gain.transpose() * MEASUREMENT_NOISE;

        log_tau_variance = updated[(B_LOG_TAU, B_LOG_TAU)].max(0.0);
        conditioned_log_tau_variance[i] = log_tau_variance;
        next_covariance.axes[i] = AxisCovariance::from_block(&updated);

        innovation.residual[i] = residual;
        innovation.variance[i] = residual_variance;
    }

    // axes corrected early have not seen the later reductions yet
    for (axis_covariance, conditioned) in next_covariance
        .axes
        .iter_mut()
        .zip(conditioned_log_tau_variance)
    {
        axis_covariance.scale_log_tau_terms(log_tau_rescale(log_tau_variance, conditioned));
    }
    next_covariance.log_tau = log_tau_variance;
    next_state.set_log_tau(log_tau);

    (next_state, next_covariance, innovation)
}

/// `max` before `min` so a NaN lands on the lower bound instead of escaping.
fn bound(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

/// Keep the weakly observable states inside physically plausible ranges.
pub fn clamp(state: &mut State) {
    state.set_log_tau(bound(state.log_tau(), LOG_TAU_MIN, LOG_TAU_MAX));
    for axis in Axis::ALL {
        state.set_bias(axis, bound(state.bias(axis), -BIAS_BOUND, BIAS_BOUND));
        state.set_log_gain(axis, bound(state.log_gain(axis), LOG_GAIN_MIN, LOG_GAIN_MAX));
    }
}
