// src/fx_components/compressor.rs

//! Feed-forward peak compressor with a hard knee.

use crate::fx::{CompParams, FxParam};
use crate::fx_components::smoothing::SmoothedParam;
use crate::fx_components::DspComponent;

pub const RELEASE_SECS: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f32,
    threshold_db: SmoothedParam,
    ratio: SmoothedParam,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

fn time_coeff(secs: f32, sample_rate: f32) -> f32 {
    if secs <= 0.0 {
        return 0.0;
    }
    (-(1.0 / (secs * sample_rate))).exp()
}

impl Compressor {
    pub fn new(sample_rate: f32, params: &CompParams) -> Self {
        Self {
            sample_rate,
            threshold_db: SmoothedParam::new(params.threshold),
            ratio: SmoothedParam::new(params.ratio),
            attack_coeff: time_coeff(params.attack, sample_rate),
            release_coeff: time_coeff(RELEASE_SECS, sample_rate),
            envelope: 0.0,
        }
    }

    /// Current gain reduction in dB (0 or negative).
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_db_for(self.envelope)
    }

    fn gain_db_for(&self, envelope: f32) -> f32 {
        let level_db = 20.0 * envelope.max(1e-6).log10();
        let threshold = self.threshold_db.value();
        if level_db <= threshold {
            return 0.0;
        }
        let ratio = self.ratio.value().max(1.0);
        let compressed = threshold + (level_db - threshold) / ratio;
        compressed - level_db
    }
}

impl DspComponent for Compressor {
    fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64) {
        match param {
            FxParam::CompThreshold => {
                self.threshold_db
                    .set_target(target, time_constant, self.sample_rate)
            }
            FxParam::CompRatio => self.ratio.set_target(target, time_constant, self.sample_rate),
            FxParam::CompAttack => {
                self.attack_coeff = time_coeff(target, self.sample_rate);
            }
            _ => {}
        }
    }

    #[inline]
    fn process_audio(&mut self, input: f32) -> f32 {
        self.threshold_db.next();
        self.ratio.next();

        let input_abs = input.abs();
        let coeff = if input_abs > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * (self.envelope - input_abs) + input_abs;

        let gain = 10.0_f32.powf(self.gain_db_for(self.envelope) / 20.0);
        input * gain
    }
}
