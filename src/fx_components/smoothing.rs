// src/fx_components/smoothing.rs

//! Exponential parameter ramps.
//!
//! A ramp approaches its target as `value += (target - value) * (1 - e^(-1 / (tc * sr)))`
//! every sample, so after one time constant it has covered ~63% of the distance.

/// A live value that glides towards its target instead of jumping.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedParam {
    /// Starts settled at `value`.
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            coeff: 1.0,
        }
    }

    /// Begins a ramp towards `target`. A non-positive time constant jumps immediately.
    pub fn set_target(&mut self, target: f32, time_constant: f64, sample_rate: f32) {
        self.target = target;
        self.coeff = ramp_coeff(time_constant, sample_rate);
        if self.coeff >= 1.0 {
            self.current = target;
        }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            self.current += (self.target - self.current) * self.coeff;
            if (self.target - self.current).abs() < 1e-6 {
                self.current = self.target;
            }
        }
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

/// Per-sample approach factor for a ramp with time constant `time_constant` seconds.
pub fn ramp_coeff(time_constant: f64, sample_rate: f32) -> f32 {
    if time_constant <= 0.0 || sample_rate <= 0.0 {
        return 1.0;
    }
    1.0 - (-1.0 / (time_constant * sample_rate as f64)).exp() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_time_constant_covers_most_of_the_way() {
        let sr = 48_000.0;
        let mut p = SmoothedParam::new(0.0);
        p.set_target(1.0, 0.01, sr);
        for _ in 0..480 {
            p.next();
        }
        assert!((p.value() - 0.632).abs() < 0.01);
        for _ in 0..48_000 {
            p.next();
        }
        assert!(p.is_settled());
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn zero_time_constant_jumps() {
        let mut p = SmoothedParam::new(0.2);
        p.set_target(0.8, 0.0, 48_000.0);
        assert_eq!(p.value(), 0.8);
    }
}
