// src/audio_engine/fx_rack.rs

use crate::fx::{FxModule, FxParam, FxParams, FxStage};
use crate::fx_components::{
    Compressor, DelayLine, DspComponent, Phaser, Reverb, SmoothedParam, ThreeBandEq,
};
use crate::fx_graph::RAMP_TIME_CONSTANT;

/// Processes one track's signal through its connected stages.
///
/// Every processor exists for the lifetime of the rack; connecting a new topology only
/// swaps the ordered stage list, so tails and the delay's feedback loop carry on across
/// rewiring.
pub struct FxRack {
    sample_rate: f32,
    stages: Vec<FxStage>,
    eq: ThreeBandEq,
    compressor: Compressor,
    phaser: Phaser,
    delay: DelayLine,
    reverb: Reverb,
    delay_mix: SmoothedParam,
    reverb_mix: SmoothedParam,
}

impl FxRack {
    pub fn new(sample_rate: f32) -> Self {
        let params = FxParams::default();
        Self {
            sample_rate,
            stages: Vec::new(),
            eq: ThreeBandEq::new(sample_rate, &params.eq),
            compressor: Compressor::new(sample_rate, &params.comp),
            phaser: Phaser::new(sample_rate, &params.phaser),
            delay: DelayLine::new(sample_rate, &params.delay),
            reverb: Reverb::new(sample_rate),
            delay_mix: SmoothedParam::new(params.delay.mix),
            reverb_mix: SmoothedParam::new(params.reverb.mix),
        }
    }

    /// Replaces the wiring with `stages`, steering every live value towards the values
    /// the stages carry.
    pub fn connect(&mut self, stages: Vec<FxStage>) {
        let tc = RAMP_TIME_CONSTANT;
        for stage in &stages {
            match stage {
                FxStage::Eq(p) => {
                    self.ramp_param(FxParam::EqLow, p.low, tc);
                    self.ramp_param(FxParam::EqMid, p.mid, tc);
                    self.ramp_param(FxParam::EqHigh, p.high, tc);
                }
                FxStage::Compressor(p) => {
                    self.ramp_param(FxParam::CompThreshold, p.threshold, tc);
                    self.ramp_param(FxParam::CompRatio, p.ratio, tc);
                    self.ramp_param(FxParam::CompAttack, p.attack, tc);
                }
                FxStage::Phaser(p) => {
                    self.ramp_param(FxParam::PhaserFreq, p.freq, tc);
                    self.ramp_param(FxParam::PhaserDepth, p.depth, tc);
                }
                FxStage::DelayMix(p) => {
                    self.ramp_param(FxParam::DelayTime, p.time, tc);
                    self.ramp_param(FxParam::DelayFeedback, p.feedback, tc);
                    self.ramp_param(FxParam::DelayMix, p.mix, tc);
                }
                FxStage::ReverbMix(p) => self.ramp_param(FxParam::ReverbMix, p.mix, tc),
            }
        }
        self.stages = stages;
    }

    pub fn stages(&self) -> &[FxStage] {
        &self.stages
    }

    pub fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64) {
        match param.module() {
            FxModule::Eq => self.eq.ramp_param(param, target, time_constant),
            FxModule::Comp => self.compressor.ramp_param(param, target, time_constant),
            FxModule::Phaser => self.phaser.ramp_param(param, target, time_constant),
            FxModule::Delay if param == FxParam::DelayMix => {
                self.delay_mix
                    .set_target(target, time_constant, self.sample_rate)
            }
            FxModule::Delay => self.delay.ramp_param(param, target, time_constant),
            FxModule::Reverb => {
                self.reverb_mix
                    .set_target(target, time_constant, self.sample_rate)
            }
        }
    }

    /// Processes an entire buffer in place.
    ///
    /// An unwired delay or reverb is still clocked with silence so its tail decays while
    /// bypassed instead of resuming where it stopped.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        let delay_wired = self
            .stages
            .iter()
            .any(|s| matches!(s, FxStage::DelayMix(_)));
        let reverb_wired = self
            .stages
            .iter()
            .any(|s| matches!(s, FxStage::ReverbMix(_)));
        for sample in buffer.iter_mut() {
            let mut x = *sample;
            for stage in &self.stages {
                x = match stage {
                    FxStage::Eq(_) => self.eq.process_audio(x),
                    FxStage::Compressor(_) => self.compressor.process_audio(x),
                    FxStage::Phaser(_) => self.phaser.process_audio(x),
                    FxStage::DelayMix(_) => {
                        let wet = self.delay.process_audio(x);
                        let mix = self.delay_mix.next();
                        x * (1.0 - mix) + wet * mix
                    }
                    FxStage::ReverbMix(_) => {
                        let wet = self.reverb.process_audio(x);
                        let mix = self.reverb_mix.next();
                        x * (1.0 - mix) + wet * mix
                    }
                };
            }
            if !delay_wired {
                self.delay.process_audio(0.0);
            }
            if !reverb_wired {
                self.reverb.process_audio(0.0);
            }
            *sample = x;
        }
    }
}
