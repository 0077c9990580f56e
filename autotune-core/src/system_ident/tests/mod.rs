
/// Exact first order plant the identification model assumes, integrated with
/// the same discretization so that a perfect filter has zero residual.
pub struct Plant {
    pub log_gain: [f64; 3],
    pub log_tau: f64,
    pub bias: [f64; 3],
    pub rate: [f64; 3],
    pub torque: [f64; 3],
}

impl Plant {
    pub fn new(log_gain: [f64; 3], log_tau: f64, bias: [f64; 3]) -> Self {
        Self {
            log_gain,
            log_tau,
            bias,
            rate: [0.0; 3],
            torque: [0.0; 3],
        }
    }

    pub fn step(&mut self, actuator: &[f32; 3], throttle: f32, dt: f64) {
        let tau = self.log_tau.exp();
        for i in 0..3 {
            let input = 4.0 * throttle as f64 * actuator[i] as f64;
            self.rate[i] += dt * self.log_gain[i].exp() * (self.torque[i] - self.bias[i]);
            self.torque[i] = (dt * input + tau * self.torque[i]) / (dt + tau);
        }
    }

    pub fn gyro(&self) -> [f32; 3] {
        self.rate.map(|r| r as f32)
    }
}

/// A pilot flicking the sticks back and forth at a different rate on each
/// axis, with a little rate damping so the vehicle does not spin up.
pub fn pilot_command(t: f64, rate: &[f64; 3]) -> [f32; 3] {
    core::array::from_fn(|i| {
        let half_periods = (t * (1.3 + 0.4 * i as f64)) as i64;
        let stick = if half_periods % 2 == 0 { 0.05 } else { -0.05 };
        (stick - 0.0005 * rate[i]) as f32
    })
}
