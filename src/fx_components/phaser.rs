// src/fx_components/phaser.rs

//! Swept all-pass stage.
//!
//! The centre frequency moves as `freq * (1 + depth * lfo)` with a 0.5 Hz sine LFO.
//! The stage output is the all-pass signal itself.

use crate::fx::{FxParam, PhaserParams};
use crate::fx_components::biquad::{Biquad, BiquadKind};
use crate::fx_components::lfo::Lfo;
use crate::fx_components::smoothing::SmoothedParam;
use crate::fx_components::DspComponent;

pub const PHASER_Q: f32 = 5.0;
pub const PHASER_LFO_HZ: f32 = 0.5;
/// Samples between coefficient updates while sweeping.
const UPDATE_INTERVAL: u32 = 16;

#[derive(Debug, Clone)]
pub struct Phaser {
    sample_rate: f32,
    allpass: Biquad,
    lfo: Lfo,
    freq: SmoothedParam,
    depth: SmoothedParam,
    counter: u32,
}

impl Phaser {
    pub fn new(sample_rate: f32, params: &PhaserParams) -> Self {
        let mut allpass = Biquad::new(BiquadKind::AllPass, sample_rate);
        allpass.set(params.freq, PHASER_Q, 0.0);
        Self {
            sample_rate,
            allpass,
            lfo: Lfo::new(sample_rate, PHASER_LFO_HZ),
            freq: SmoothedParam::new(params.freq),
            depth: SmoothedParam::new(params.depth),
            counter: 0,
        }
    }

    /// Centre frequency for an LFO value in `[-1, 1]`.
    pub fn swept_frequency(base: f32, depth: f32, lfo: f32) -> f32 {
        (base * (1.0 + depth * lfo)).max(10.0)
    }
}

impl DspComponent for Phaser {
    fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64) {
        match param {
            FxParam::PhaserFreq => self.freq.set_target(target, time_constant, self.sample_rate),
            FxParam::PhaserDepth => self.depth.set_target(target, time_constant, self.sample_rate),
            _ => {}
        }
    }

    #[inline]
    fn process_audio(&mut self, input: f32) -> f32 {
        let base = self.freq.next();
        let depth = self.depth.next();
        let lfo = self.lfo.process_sample();
        if self.counter == 0 {
            self.allpass
                .set(Self::swept_frequency(base, depth, lfo), PHASER_Q, 0.0);
        }
        self.counter = (self.counter + 1) % UPDATE_INTERVAL;
        self.allpass.process(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_scales_the_sweep_around_the_base() {
        assert_eq!(Phaser::swept_frequency(700.0, 0.7, 0.0), 700.0);
        assert!((Phaser::swept_frequency(700.0, 0.7, 1.0) - 1190.0).abs() < 1e-3);
        assert!((Phaser::swept_frequency(700.0, 0.7, -1.0) - 210.0).abs() < 1e-3);
        assert_eq!(Phaser::swept_frequency(700.0, 1.0, -1.0), 10.0);
    }

    #[test]
    fn output_stays_bounded() {
        let mut phaser = Phaser::new(48_000.0, &PhaserParams::default());
        for i in 0..48_000 {
            let x = ((i as f32) * 0.05).sin();
            assert!(phaser.process_audio(x).abs() < 4.0);
        }
    }
}
