// src/fx_components/reverb.rs

//! A Schroeder-style reverb.
//!
//! Four damped comb filters in parallel feed two all-pass diffusers in series. The comb
//! feedback is derived from a target decay time so the tail dies away over roughly
//! [`TAIL_SECS`]. Only the wet signal is returned; the rack does the mix.

use crate::fx::FxParam;
use crate::fx_components::DspComponent;

/// Time for the tail to fall by 60 dB.
pub const TAIL_SECS: f32 = 2.0;
const DAMPING: f32 = 0.2;

// --- Internal Building Blocks for the Reverb ---

/// A simple one-pole low-pass filter, used for damping the reverb tail.
#[derive(Debug, Clone, Copy, Default)]
struct DampingFilter {
    z1: f32,
}
impl DampingFilter {
    #[inline(always)]
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        let output = input * (1.0 - coeff) + self.z1 * coeff;
        self.z1 = output;
        output
    }
}

/// A delay line with feedback, a core part of a reverb's sound.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    feedback: f32,
    damping_filter: DampingFilter,
}
impl CombFilter {
    fn new(delay_samples: usize, sample_rate: f32) -> Self {
        let delay_samples = delay_samples.max(1);
        // g = 10^(-3 * delay / T60)
        let delay_secs = delay_samples as f32 / sample_rate;
        Self {
            buffer: vec![0.0; delay_samples],
            write_pos: 0,
            feedback: 10.0_f32.powf(-3.0 * delay_secs / TAIL_SECS),
            damping_filter: DampingFilter::default(),
        }
    }
    #[inline(always)]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.write_pos];
        let damped_output = self.damping_filter.process(output, DAMPING);
        self.buffer[self.write_pos] = input + damped_output * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

/// A filter that smears the phase of a signal, used to increase echo density.
#[derive(Debug, Clone)]
struct AllPassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
}
impl AllPassFilter {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
        }
    }
    #[inline(always)]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.write_pos];
        let output = -input + delayed;
        self.buffer[self.write_pos] = input + delayed * 0.5; // G = 0.5 (fixed)
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

// --- Main Public Reverb Struct ---

#[derive(Debug, Clone)]
pub struct Reverb {
    comb_filters: [CombFilter; 4],
    all_pass_filters: [AllPassFilter; 2],
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let sr_factor = sample_rate / 44100.0;
        // Mutually prime lengths, in samples at 44.1 kHz.
        let comb = |base: f32| CombFilter::new((base * sr_factor) as usize, sample_rate);
        let all_pass = |base: f32| AllPassFilter::new((base * sr_factor) as usize);
        Self {
            comb_filters: [comb(1117.0), comb(1187.0), comb(1277.0), comb(1351.0)],
            all_pass_filters: [all_pass(223.0), all_pass(557.0)],
        }
    }
}

impl DspComponent for Reverb {
    /// The reverb has no parameters of its own; its mix lives in the rack.
    fn ramp_param(&mut self, _param: FxParam, _target: f32, _time_constant: f64) {}

    #[inline]
    fn process_audio(&mut self, input: f32) -> f32 {
        let comb_out = self
            .comb_filters
            .iter_mut()
            .map(|f| f.process(input))
            .sum::<f32>()
            * 0.25; // Average the parallel comb filters

        self.all_pass_filters
            .iter_mut()
            .fold(comb_out, |acc, f| f.process(acc))
    }
}
