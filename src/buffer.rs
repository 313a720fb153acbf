// src/buffer.rs

//! Immutable audio buffers and the loop-conforming helpers that operate on them.
//!
//! A track never mutates sample data in place. Every edit produces a new buffer which is
//! shared by `Arc`, so history snapshots and playback sources are cheap clones.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fade applied to both ends of a freshly captured take.
pub const CAPTURE_FADE_SECS: f64 = 0.004;
/// Fade applied when a buffer is trimmed or stretched to a new loop length.
pub const CONFORM_FADE_SECS: f64 = 0.003;
/// Durations closer than this are treated as already loop-conformant.
pub const CONFORM_TOLERANCE_SECS: f64 = 1e-3;

pub type SharedBuffer = Arc<AudioBuffer>;

/// How an existing buffer is made to fit a different loop length.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Keep the head of the buffer, zero-pad or cut the tail.
    #[default]
    Trim,
    /// Time-scale the whole buffer (pitch follows).
    Stretch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

/// Number of whole samples covering `secs` at `sample_rate`.
pub fn samples_for(secs: f64, sample_rate: u32) -> usize {
    if secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64 + 1e-6).floor() as usize
}

impl AudioBuffer {
    /// Builds a buffer from per-channel sample arrays. Shorter channels are zero-padded.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.resize(len, 0.0);
        }
        Self {
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self::from_mono(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(self.channels.len() - 1)]
    }

    /// The first channel. Conformed track buffers are always mono.
    pub fn mono(&self) -> &[f32] {
        &self.channels[0]
    }

    /// Averages every channel down to one and applies a short linear fade at both ends.
    pub fn to_mono_with_fades(&self, fade_secs: f64) -> AudioBuffer {
        let len = self.len();
        let mut out = if self.channels.len() == 1 {
            self.channels[0].clone()
        } else {
            let scale = 1.0 / self.channels.len() as f32;
            (0..len)
                .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
                .collect()
        };
        let fade = fade_len(fade_secs, self.sample_rate, len);
        apply_fade_in(&mut out, fade);
        apply_fade_out(&mut out, fade);
        AudioBuffer::from_mono(out, self.sample_rate)
    }

    /// Trims or zero-pads the first channel to exactly `loop_len` seconds.
    pub fn fit_to_loop(&self, loop_len: f64) -> AudioBuffer {
        let want = samples_for(loop_len, self.sample_rate);
        let mut out = vec![0.0; want];
        let n = want.min(self.len());
        out[..n].copy_from_slice(&self.channels[0][..n]);
        let fade = fade_len(CONFORM_FADE_SECS, self.sample_rate, want);
        apply_fade_out(&mut out, fade);
        AudioBuffer::from_mono(out, self.sample_rate)
    }

    /// Time-scales the first channel to exactly `loop_len` seconds using linear interpolation.
    pub fn stretch_to_loop(&self, loop_len: f64) -> AudioBuffer {
        let want = samples_for(loop_len, self.sample_rate).max(1);
        let src = &self.channels[0];
        if src.is_empty() {
            return AudioBuffer::silent(want, self.sample_rate);
        }
        let ratio = want as f64 / src.len() as f64;
        let last = src.len() - 1;
        let mut out: Vec<f32> = (0..want)
            .map(|n| {
                let x = n as f64 / ratio;
                let i0 = (x.floor() as usize).min(last);
                let i1 = (i0 + 1).min(last);
                let frac = (x - i0 as f64) as f32;
                src[i0] * (1.0 - frac) + src[i1] * frac
            })
            .collect();
        let fade = fade_len(CONFORM_FADE_SECS, self.sample_rate, want);
        apply_fade_in(&mut out, fade);
        apply_fade_out(&mut out, fade);
        AudioBuffer::from_mono(out, self.sample_rate)
    }

    pub fn conform(&self, loop_len: f64, mode: FitMode) -> AudioBuffer {
        match mode {
            FitMode::Trim => self.fit_to_loop(loop_len),
            FitMode::Stretch => self.stretch_to_loop(loop_len),
        }
    }
}

/// Returns `buffer` untouched when it already matches `loop_len`, otherwise a trimmed copy.
pub fn normalize_to_loop(buffer: &SharedBuffer, loop_len: f64) -> SharedBuffer {
    if (buffer.duration() - loop_len).abs() < CONFORM_TOLERANCE_SECS {
        buffer.clone()
    } else {
        Arc::new(buffer.fit_to_loop(loop_len))
    }
}

fn fade_len(fade_secs: f64, sample_rate: u32, len: usize) -> usize {
    let f = ((fade_secs * sample_rate as f64).floor() as usize).max(1);
    f.min(len / 2)
}

fn apply_fade_in(samples: &mut [f32], fade: usize) {
    for k in 0..fade {
        samples[k] *= k as f32 / fade as f32;
    }
}

fn apply_fade_out(samples: &mut [f32], fade: usize) {
    let len = samples.len();
    for k in 0..fade {
        samples[len - 1 - k] *= k as f32 / fade as f32;
    }
}
