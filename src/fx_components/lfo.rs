// src/fx_components/lfo.rs

//! A sine low-frequency oscillator for internal modulation.
use std::f32::consts::TAU;

#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    frequency_hz: f32,
    sample_rate: f32,
}

impl Lfo {
    pub fn new(sample_rate: f32, frequency_hz: f32) -> Self {
        Self {
            phase: 0.0,
            frequency_hz,
            sample_rate,
        }
    }

    /// Advances one sample and returns a value in `[-1, 1]`.
    #[inline]
    pub fn process_sample(&mut self) -> f32 {
        let phase_inc = self.frequency_hz / self.sample_rate;
        self.phase = (self.phase + phase_inc) % 1.0;
        (self.phase * TAU).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_range_and_completes_a_cycle() {
        let mut lfo = Lfo::new(1000.0, 2.0);
        let values: Vec<f32> = (0..500).map(|_| lfo.process_sample()).collect();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(values.iter().any(|v| *v > 0.99));
        assert!(values.iter().any(|v| *v < -0.99));
    }
}
