// src/recorder.rs

//! Recording quantizer.
//!
//! Tracks the lifecycle of one take (busy guard, stop grace window) and turns a raw,
//! variable-length capture into a buffer that is exactly one loop long and sits at the
//! loop phase where it was played.

use crate::buffer::{samples_for, AudioBuffer, CAPTURE_FADE_SECS};

/// Delay between a stop request and the actual capture stop, so in-flight input flushes.
pub const STOP_GRACE_SECS: f64 = 0.08;
/// Slack used when deciding whether the audio clock has reached a scheduled time.
const DUE_EPSILON: f64 = 0.001;
const MEASURE_TOLERANCE: f64 = 1e-6;

/// Where in a running loop an overdub began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopAnchor {
    pub offset: f64,
    pub loop_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Take {
    pub track: usize,
    pub started_at: f64,
    /// Track generation at record start; a mismatch at completion means the track was
    /// edited underneath the take.
    pub generation: u64,
    pub anchor: Option<LoopAnchor>,
}

/// How a finished take is turned into a track buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Written at the captured loop phase, wrapping at the loop end.
    Overdub(LoopAnchor),
    /// Loop exists but the take did not start during playback: trimmed or padded from zero.
    Fit { loop_length: f64 },
    /// No loop yet: the take's length defines it.
    DefineLoop,
}

impl Take {
    /// Picks the placement for this take against the loop as it is now.
    ///
    /// Returns `None` when the take was anchored to a loop that has since changed length.
    pub fn placement(&self, current_loop: Option<f64>) -> Option<Placement> {
        match (self.anchor, current_loop) {
            (Some(anchor), Some(len)) if (anchor.loop_length - len).abs() < 1e-9 => {
                Some(Placement::Overdub(anchor))
            }
            (Some(_), _) => None,
            (None, Some(len)) => Some(Placement::Fit { loop_length: len }),
            (None, None) => Some(Placement::DefineLoop),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum RecorderState {
    #[default]
    Idle,
    Recording(Take),
    Stopping { take: Take, requested_at: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: RecorderState,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True from record start until the take has been handed back by [`Recorder::take_due`].
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, RecorderState::Idle)
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self.state, RecorderState::Stopping { .. })
    }

    pub fn recording_track(&self) -> Option<usize> {
        match self.state {
            RecorderState::Idle => None,
            RecorderState::Recording(take) | RecorderState::Stopping { take, .. } => {
                Some(take.track)
            }
        }
    }

    /// Arms a new take. Returns `false` (and changes nothing) while another take is live.
    pub fn begin(&mut self, take: Take) -> bool {
        if self.is_busy() {
            return false;
        }
        self.state = RecorderState::Recording(take);
        true
    }

    /// Schedules the stop `STOP_GRACE_SECS` after `now`. Idempotent.
    pub fn request_stop(&mut self, now: f64) -> bool {
        match self.state {
            RecorderState::Recording(take) => {
                self.state = RecorderState::Stopping {
                    take,
                    requested_at: now,
                };
                true
            }
            _ => false,
        }
    }

    /// Hands back the take once its grace window has elapsed, returning the recorder to idle.
    ///
    /// The second value is the performed length: start to stop request, without the grace
    /// window that only exists to flush the input.
    pub fn take_due(&mut self, now: f64) -> Option<(Take, f64)> {
        match self.state {
            RecorderState::Stopping { take, requested_at }
                if now >= requested_at + STOP_GRACE_SECS - DUE_EPSILON =>
            {
                self.state = RecorderState::Idle;
                Some((take, (requested_at - take.started_at).max(0.0)))
            }
            _ => None,
        }
    }

    /// Drops whatever take is live without finishing it.
    pub fn abort(&mut self) -> Option<Take> {
        match std::mem::take(&mut self.state) {
            RecorderState::Idle => None,
            RecorderState::Recording(take) | RecorderState::Stopping { take, .. } => Some(take),
        }
    }
}

/// Phase inside the loop at which a take starting at `record_start` was performed.
pub fn overdub_offset(record_start: f64, loop_start: f64, loop_length: f64, latency: f64) -> f64 {
    (record_start - latency - loop_start).rem_euclid(loop_length)
}

/// Whole measures covering a first take: rounded up, never fewer than one.
pub fn take_measures(duration: f64, measure_length: f64) -> u32 {
    let measures = (duration / measure_length - MEASURE_TOLERANCE).ceil();
    measures.max(1.0) as u32
}

/// Reduces a raw capture to mono with the short click-suppressing fades.
pub fn prepare_capture(capture: &AudioBuffer) -> AudioBuffer {
    capture.to_mono_with_fades(CAPTURE_FADE_SECS)
}

/// Writes `take` into a silent loop buffer starting at `offset` seconds, wrapping at the end.
///
/// At most one loop's worth of audio is written: samples that would wrap past the
/// offset again are dropped so a long take never overwrites its own head.
pub fn place_overdub(take: &[f32], offset: f64, loop_length: f64, sample_rate: u32) -> AudioBuffer {
    let want = samples_for(loop_length, sample_rate);
    let mut out = vec![0.0; want];
    if want == 0 {
        return AudioBuffer::from_mono(out, sample_rate);
    }
    let start = samples_for(offset, sample_rate) % want;

    let first = take.len().min(want - start);
    out[start..start + first].copy_from_slice(&take[..first]);

    let rest = (take.len() - first).min(start);
    out[..rest].copy_from_slice(&take[first..first + rest]);

    AudioBuffer::from_mono(out, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(track: usize, anchor: Option<LoopAnchor>) -> Take {
        Take {
            track,
            started_at: 1.0,
            generation: 0,
            anchor,
        }
    }

    #[test]
    fn offset_wrap_places_the_tail_at_the_loop_start() {
        let sr = 48_000;
        let capture: Vec<f32> = (0..sr as usize).map(|i| (i + 1) as f32).collect();
        let out = place_overdub(&capture, 3.5, 4.0, sr);
        let data = out.mono();
        assert_eq!(data.len(), 192_000);
        assert_eq!(data[168_000], 1.0);
        assert_eq!(data[191_999], 24_000.0);
        assert_eq!(data[0], 24_001.0);
        assert_eq!(data[23_999], 48_000.0);
        assert!(data[24_000..168_000].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn overlong_takes_do_not_overwrite_their_own_head() {
        let capture = vec![1.0; 3000];
        let out = place_overdub(&capture, 0.25, 1.0, 1000);
        assert_eq!(out.len(), 1000);
        assert!(out.mono().iter().all(|&s| s == 1.0));

        let short = place_overdub(&[0.5; 100], 0.9, 1.0, 1000);
        assert_eq!(short.mono()[950], 0.5);
        assert_eq!(short.mono()[0], 0.0);
    }

    #[test]
    fn offset_accounts_for_input_latency() {
        assert!((overdub_offset(10.5, 2.0, 4.0, 0.0) - 0.5).abs() < 1e-12);
        assert!((overdub_offset(10.5, 2.0, 4.0, 1.0) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn first_take_rounds_up_to_whole_measures() {
        assert_eq!(take_measures(2.1, 2.0), 2);
        assert_eq!(take_measures(4.0, 2.0), 2);
        assert_eq!(take_measures(4.0 + 1e-9, 2.0), 2);
        assert_eq!(take_measures(0.01, 2.0), 1);
        assert_eq!(take_measures(0.0, 2.0), 1);
    }

    #[test]
    fn busy_guard_rejects_a_second_take() {
        let mut rec = Recorder::new();
        assert!(rec.begin(take(0, None)));
        assert!(!rec.begin(take(1, None)));
        assert_eq!(rec.recording_track(), Some(0));
    }

    #[test]
    fn stop_waits_out_the_grace_window() {
        let mut rec = Recorder::new();
        rec.begin(take(2, None));
        assert!(rec.request_stop(5.0));
        assert!(!rec.request_stop(5.01));
        assert!(rec.take_due(5.05).is_none());
        assert!(rec.is_busy());
        let done = rec.take_due(5.08).map(|(t, _)| t.track);
        assert_eq!(done, Some(2));
        assert!(!rec.is_busy());
        assert!(rec.take_due(6.0).is_none());
    }

    #[test]
    fn performed_length_excludes_the_grace_window() {
        let mut rec = Recorder::new();
        rec.begin(take(0, None));
        rec.request_stop(5.0);
        let (_, performed) = rec.take_due(5.2).unwrap();
        assert!((performed - 4.0).abs() < 1e-12);
        assert_eq!(take_measures(performed, 2.0), 2);
    }

    #[test]
    fn stale_anchor_discards_the_take() {
        let anchor = LoopAnchor {
            offset: 1.0,
            loop_length: 4.0,
        };
        let t = take(0, Some(anchor));
        assert_eq!(t.placement(Some(4.0)), Some(Placement::Overdub(anchor)));
        assert_eq!(t.placement(Some(2.0)), None);
        assert_eq!(t.placement(None), None);
        assert_eq!(
            take(0, None).placement(Some(2.0)),
            Some(Placement::Fit { loop_length: 2.0 })
        );
        assert_eq!(take(0, None).placement(None), Some(Placement::DefineLoop));
    }
}
