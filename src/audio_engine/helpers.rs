// src/audio_engine/helpers.rs

pub const LIMITER_THRESHOLD: f32 = 0.98;
const LIMITER_ATTACK_MS: f32 = 0.01;
const LIMITER_RELEASE_MS: f32 = 80.0;

/// Master brickwall that keeps summed tracks and clicks inside full scale.
pub struct Limiter {
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    gain_reduction_db: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            attack_coeff: (-(1.0 / (LIMITER_ATTACK_MS * 0.001 * sample_rate))).exp(),
            release_coeff: (-(1.0 / (LIMITER_RELEASE_MS * 0.001 * sample_rate))).exp(),
            envelope: 0.0,
            gain_reduction_db: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let input_abs = input.abs();

        let coeff = if input_abs > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = (coeff * (self.envelope - input_abs) + input_abs).max(1e-6);

        let gain = if self.envelope > LIMITER_THRESHOLD {
            LIMITER_THRESHOLD / self.envelope
        } else {
            1.0
        };
        self.gain_reduction_db = -(20.0 * gain.log10()).clamp(-24.0, 0.0);

        (input * gain).clamp(-1.0, 1.0)
    }

    /// Most recent reduction, in positive dB.
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }
}
