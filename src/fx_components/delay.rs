// src/fx_components/delay.rs

//! A fractional delay line using a circular buffer and linear interpolation.
//!
//! The feedback loop is internal: the delayed signal is fed back into the line scaled by
//! the feedback coefficient. The returned sample is the wet signal only; the rack does
//! the dry/wet mix.
use crate::fx::{DelayParams, FxParam};
use crate::fx_components::smoothing::SmoothedParam;
use crate::fx_components::DspComponent;

pub const MAX_DELAY_SECS: f32 = 1.0;

/// The audio-thread state for the delay stage.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    max_delay_samples: usize,
    sample_rate: f32,
    time_secs: SmoothedParam,
    feedback: SmoothedParam,
}

impl DelayLine {
    pub fn new(sample_rate: f32, params: &DelayParams) -> Self {
        // Headroom so a full-second delay never reads the slot being written.
        let max_delay_samples = (MAX_DELAY_SECS * sample_rate).ceil() as usize + 2;
        Self {
            buffer: vec![0.0; max_delay_samples],
            write_pos: 0,
            max_delay_samples,
            sample_rate,
            time_secs: SmoothedParam::new(params.time),
            feedback: SmoothedParam::new(params.feedback),
        }
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.max_delay_samples;
    }

    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.max_delay_samples as f32;
        let delay = delay_samples.clamp(1.0, len - 2.0);
        let read_pos_float = (self.write_pos as f32 - delay + len) % len;
        let index1 = read_pos_float.floor() as usize % self.max_delay_samples;
        let index2 = (index1 + 1) % self.max_delay_samples;
        let fraction = read_pos_float.fract();
        let sample1 = self.buffer[index1];
        let sample2 = self.buffer[index2];
        sample1 + fraction * (sample2 - sample1)
    }
}

impl DspComponent for DelayLine {
    fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64) {
        match param {
            FxParam::DelayTime => {
                let target = target.clamp(0.0, MAX_DELAY_SECS);
                self.time_secs.set_target(target, time_constant, self.sample_rate)
            }
            FxParam::DelayFeedback => {
                self.feedback
                    .set_target(target, time_constant, self.sample_rate)
            }
            _ => {}
        }
    }

    #[inline]
    fn process_audio(&mut self, input: f32) -> f32 {
        let time = self.time_secs.next();
        let feedback = self.feedback.next();
        let delayed_sample = self.read(time * self.sample_rate);
        let write_sample = input + delayed_sample * feedback;
        self.write(write_sample.clamp(-1.0, 1.0));
        delayed_sample
    }
}
