use super::{
    Axis, AxisBlock, AxisCovariance, B_BIAS, B_LOG_GAIN, B_LOG_TAU, B_RATE, B_TORQUE, Covariance,
    Q_BIAS, Q_LOG_GAIN, Q_LOG_TAU, Q_RATE, Q_TORQUE, State,
};

/// Torque input the model sees for a desired actuator command. Motor torque
/// scales with thrust, so the command is weighted by the throttle.
pub fn scaled_input(actuator: &[f32; 3], throttle: f32) -> [f32; 3] {
    actuator.map(|u| 4.0 * throttle * u)
}

/// Jacobian of one axis' transition with respect to
/// [rate, torque, log_gain, bias, log_tau], evaluated at the prior state.
///
/// rate'   = rate + dt * gain * (torque - bias)
/// torque' = (dt * input + tau * torque) / (dt + tau)
///
/// with gain = exp(log_gain) and tau = exp(log_tau), so d gain / d log_gain
/// is gain and d tau / d log_tau is tau.
fn axis_jacobian(gain: f32, torque: f32, bias: f32, input: f32, tau: f32, dt: f32) -> AxisBlock {
    let lag = dt + tau;

    let mut f = AxisBlock::identity();
    f[(B_RATE, B_TORQUE)] = dt * gain;
    f[(B_RATE, B_LOG_GAIN)] = dt * gain * (torque - bias);
    f[(B_RATE, B_BIAS)] = -dt * gain;
    f[(B_TORQUE, B_TORQUE)] = tau / lag;
    f[(B_TORQUE, B_LOG_TAU)] = dt * tau * (torque - input) / (lag * lag);
    f
}

/// Prediction step: integrate the first order model over `dt` seconds and
/// propagate the covariance through its linearization.
///
/// `input` is the output of [`scaled_input`].
pub fn predict(
    state: &State,
    covariance: &Covariance,
    input: &[f32; 3],
    dt: f32,
) -> (State, Covariance) {
    let tau = state.tau_s();
    let mut next_state = state.clone();
    let mut next_covariance = covariance.clone();

    for axis in Axis::ALL {
        let gain = state.gain(axis);
        let torque = state.torque(axis);
        let bias = state.bias(axis);
        let axis_input = input[axis.index()];

        next_state.set_rate(axis, state.rate(axis) + dt * gain * (torque - bias));
        next_state.set_torque(axis, (dt * axis_input + tau * torque) / (dt + tau));

        let f = axis_jacobian(gain, torque, bias, axis_input, tau, dt);
        let mut block = f * covariance.block(axis) * f.transpose();
        block[(B_RATE, B_RATE)] += Q_RATE;
        block[(B_TORQUE, B_TORQUE)] += Q_TORQUE;
        block[(B_LOG_GAIN, B_LOG_GAIN)] += Q_LOG_GAIN;
        block[(B_BIAS, B_BIAS)] += Q_BIAS;

        next_covariance.axes[axis.index()] = AxisCovariance::from_block(&block);
    }

    // log_tau does not evolve, its row of F is the identity
    next_covariance.log_tau = covariance.log_tau + Q_LOG_TAU;

    (next_state, next_covariance)
}
