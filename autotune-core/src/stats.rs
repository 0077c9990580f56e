/// Running mean of a scalar stream, used for the hover throttle.
///
/// Incremental form `μ ← μ + (x - μ) / n`, so a long window of samples does
/// not need a wide accumulator.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    n: u32,
    mean: f32,
}

impl RunningMean {
    pub const fn new() -> Self {
        Self { n: 0, mean: 0.0 }
    }

    pub fn update(&mut self, sample: f32) {
        self.n = self.n.saturating_add(1);
        self.mean += (sample - self.mean) / self.n as f32;
    }

    /// Zero until the first sample arrives.
    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn count(&self) -> u32 {
        self.n
    }

    pub fn clear(&mut self) {
        self.n = 0;
        self.mean = 0.0;
    }
}

/// Exponentially decaying mean of squared residuals, per channel.
///
/// `m ← α·m + (1 - α)·r²`. Starts at zero, so it reads low until roughly
/// `1 / (1 - α)` samples went through.
#[derive(Debug, Clone)]
pub struct DecayingMeanSquare<const N: usize> {
    alpha: f32,
    value: [f32; N],
}

impl<const N: usize> DecayingMeanSquare<N> {
    pub const fn new(alpha: f32) -> Self {
        Self {
            alpha,
            value: [0.0; N],
        }
    }

    pub fn update(&mut self, residual: [f32; N]) {
        for i in 0..N {
            self.value[i] =
                self.alpha * self.value[i] + (1.0 - self.alpha) * residual[i] * residual[i];
        }
    }

    pub fn value(&self) -> [f32; N] {
        self.value
    }

    pub fn clear(&mut self) {
        self.value = [0.0; N];
    }
}
