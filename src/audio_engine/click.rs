// src/audio_engine/click.rs

use std::f32::consts::TAU;

pub const CLICK_ATTACK_SECS: f32 = 0.001;
pub const CLICK_DECAY_END_SECS: f32 = 0.08;
pub const CLICK_STOP_SECS: f32 = 0.09;

/// One metronome click: a sine with a 1 ms attack and a linear decay to silence at
/// 80 ms. The voice is released at 90 ms.
pub struct ClickVoice {
    start_frame: u64,
    frequency: f32,
    level: f32,
    sample_rate: f32,
}

impl ClickVoice {
    pub fn new(start_frame: u64, frequency: f32, level: f32, sample_rate: f32) -> Self {
        Self {
            start_frame,
            frequency,
            level,
            sample_rate,
        }
    }

    fn envelope(&self, t: f32) -> f32 {
        if t < CLICK_ATTACK_SECS {
            self.level * t / CLICK_ATTACK_SECS
        } else if t < CLICK_DECAY_END_SECS {
            self.level * (1.0 - (t - CLICK_ATTACK_SECS) / (CLICK_DECAY_END_SECS - CLICK_ATTACK_SECS))
        } else {
            0.0
        }
    }

    #[inline]
    pub fn sample_at(&self, frame: u64) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let t = (frame - self.start_frame) as f32 / self.sample_rate;
        (TAU * self.frequency * t).sin() * self.envelope(t)
    }

    /// True once every frame up to `frame` is past the stop time.
    pub fn is_finished(&self, frame: u64) -> bool {
        let stop = self.start_frame + (CLICK_STOP_SECS * self.sample_rate).round() as u64;
        frame >= stop
    }
}
