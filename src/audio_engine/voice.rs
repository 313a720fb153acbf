// src/audio_engine/voice.rs

use crate::backend::SourceId;
use crate::buffer::SharedBuffer;

/// A looped playback source.
///
/// The read position is derived from the frame clock rather than stepped, so a voice
/// whose start frame already passed when its command arrived is still in phase.
pub struct LoopVoice {
    pub id: SourceId,
    pub track: usize,
    buffer: SharedBuffer,
    loop_samples: usize,
    start_frame: u64,
    offset_samples: usize,
}

impl LoopVoice {
    pub fn new(
        id: SourceId,
        track: usize,
        buffer: SharedBuffer,
        loop_samples: usize,
        start_frame: u64,
        offset_samples: usize,
    ) -> Self {
        Self {
            id,
            track,
            buffer,
            loop_samples: loop_samples.max(1),
            start_frame,
            offset_samples,
        }
    }

    #[inline]
    pub fn sample_at(&self, frame: u64) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let elapsed = ((frame - self.start_frame) % self.loop_samples as u64) as usize;
        let pos = (self.offset_samples + elapsed) % self.loop_samples;
        // Loop bounds may extend past a short buffer: the remainder is silence.
        self.buffer.mono().get(pos).copied().unwrap_or(0.0)
    }

    /// Adds this voice into `out`, whose first sample is at `first_frame`.
    pub fn render_into(&self, out: &mut [f32], first_frame: u64) {
        for (i, sample) in out.iter_mut().enumerate() {
            *sample += self.sample_at(first_frame + i as u64);
        }
    }
}
