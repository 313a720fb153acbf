use crate::buffer::AudioBuffer;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TRACK_VOLUME: f32 = 0.9;
pub const MAX_TRACK_VOLUME: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixerTrackState {
    pub volume: f32,
    pub is_muted: bool,
    pub is_soloed: bool,
}

impl Default for MixerTrackState {
    fn default() -> Self {
        Self {
            volume: DEFAULT_TRACK_VOLUME,
            is_muted: false,
            is_soloed: false,
        }
    }
}

impl MixerTrackState {
    /// 0 or 1: whether this track is audible given the solo state of the whole mix.
    pub fn gate(&self, any_solo: bool) -> f32 {
        if self.is_muted {
            0.0
        } else if any_solo && !self.is_soloed {
            0.0
        } else {
            1.0
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            DEFAULT_TRACK_VOLUME
        } else {
            volume.clamp(0.0, MAX_TRACK_VOLUME)
        };
    }
}

/// Output gain of every track: `volume * gate`. Solo on one track silences the others,
/// so this is always computed for the whole mix at once.
pub fn track_gains<'a>(states: impl IntoIterator<Item = &'a MixerTrackState>) -> Vec<f32> {
    let states: Vec<&MixerTrackState> = states.into_iter().collect();
    let any_solo = states.iter().any(|s| s.is_soloed);
    states
        .iter()
        .map(|s| s.volume * s.gate(any_solo))
        .collect()
}

/// Offline bounce: sums every `(buffer, gain)` layer into one mono buffer of `len` frames.
pub fn render_mix<'a>(
    layers: impl IntoIterator<Item = (&'a AudioBuffer, f32)>,
    len: usize,
    sample_rate: u32,
) -> AudioBuffer {
    let mut out = vec![0.0; len];
    for (buffer, gain) in layers {
        if gain == 0.0 {
            continue;
        }
        for (o, s) in out.iter_mut().zip(buffer.mono()) {
            *o += s * gain;
        }
    }
    AudioBuffer::from_mono(out, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounce_sums_layers_at_their_gains() {
        let a = AudioBuffer::from_mono(vec![0.5; 4], 1000);
        let b = AudioBuffer::from_mono(vec![1.0; 2], 1000);
        let muted = AudioBuffer::from_mono(vec![1.0; 4], 1000);
        let mix = render_mix([(&a, 0.5), (&b, 0.25), (&muted, 0.0)], 4, 1000);
        assert_eq!(mix.mono(), &[0.5, 0.5, 0.25, 0.25]);
    }

    #[test]
    fn solo_silences_the_rest() {
        let mut mix = [MixerTrackState::default(); 3];
        mix[1].is_soloed = true;
        assert_eq!(track_gains(&mix), vec![0.0, 0.9, 0.0]);
    }

    #[test]
    fn mute_wins_over_solo() {
        let mut mix = [MixerTrackState::default(); 2];
        mix[0].is_soloed = true;
        mix[0].is_muted = true;
        mix[1].set_volume(0.5);
        assert_eq!(track_gains(&mix), vec![0.0, 0.0]);
        mix[0].is_soloed = false;
        assert_eq!(track_gains(&mix), vec![0.0, 0.5]);
    }

    #[test]
    fn volume_is_clamped() {
        let mut state = MixerTrackState::default();
        state.set_volume(3.0);
        assert_eq!(state.volume, 1.0);
        state.set_volume(-1.0);
        assert_eq!(state.volume, 0.0);
    }
}
