// src/transport.rs

//! The tempo grid and loop clock.
//!
//! All times are seconds on the audio clock. Wall-clock time never enters here.

use serde::{Deserialize, Serialize};

pub const BPM_MIN: f64 = 40.0;
pub const BPM_MAX: f64 = 240.0;
pub const TS_TOP_MAX: u32 = 32;
pub const TS_BOTTOM_MAX: u32 = 32;
pub const MAX_LOOP_MEASURES: u32 = 64;
pub const DEFAULT_LOOP_MEASURES: u32 = 4;

/// Metronome pulses per beat.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl Subdivision {
    pub fn pulses_per_beat(self) -> u32 {
        match self {
            Subdivision::Quarter => 1,
            Subdivision::Eighth => 2,
            Subdivision::Sixteenth => 4,
        }
    }

    /// Maps a pulse count onto the nearest supported subdivision.
    pub fn from_pulses(pulses: u32) -> Self {
        match pulses {
            0 | 1 => Subdivision::Quarter,
            2 | 3 => Subdivision::Eighth,
            _ => Subdivision::Sixteenth,
        }
    }
}

/// `(60 / bpm) * top * (4 / bottom)`: seconds per measure.
pub fn measure_length(bpm: f64, ts_top: u32, ts_bottom: u32) -> f64 {
    (60.0 / bpm) * ts_top as f64 * (4.0 / ts_bottom as f64)
}

/// Rounds `len` to the nearest whole number of measures, never below one.
pub fn snap_to_measures(len: f64, measure: f64) -> f64 {
    let measures = (len / measure).round().max(1.0);
    measures * measure
}

/// Outcome of a tempo or time-signature change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopChange {
    pub old_length: f64,
    pub new_length: f64,
}

#[derive(Debug, Clone)]
pub struct Transport {
    bpm: f64,
    ts_top: u32,
    ts_bottom: u32,
    swing_percent: f64,
    subdivision: Subdivision,
    measure_length: f64,
    loop_length: Option<f64>,
    loop_measures: u32,
    loop_start: f64,
    playing: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            ts_top: 4,
            ts_bottom: 4,
            swing_percent: 0.0,
            subdivision: Subdivision::Quarter,
            measure_length: measure_length(120.0, 4, 4),
            loop_length: None,
            loop_measures: DEFAULT_LOOP_MEASURES,
            loop_start: 0.0,
            playing: false,
        }
    }

    /// Sets tempo and time signature, clamping each into its supported range.
    ///
    /// If a loop is active it is re-snapped to whole measures of the new grid; the
    /// returned change tells the caller which buffers need conforming.
    pub fn set_tempo(&mut self, bpm: f64, ts_top: u32, ts_bottom: u32) -> Option<LoopChange> {
        self.bpm = if bpm.is_finite() {
            bpm.clamp(BPM_MIN, BPM_MAX)
        } else {
            120.0
        };
        self.ts_top = ts_top.clamp(1, TS_TOP_MAX);
        self.ts_bottom = ts_bottom.clamp(1, TS_BOTTOM_MAX);
        self.measure_length = measure_length(self.bpm, self.ts_top, self.ts_bottom);

        let old_length = self.loop_length?;
        let new_length = snap_to_measures(old_length, self.measure_length);
        self.loop_measures = (new_length / self.measure_length).round() as u32;
        self.loop_length = Some(new_length);
        if (new_length - old_length).abs() > 1e-9 {
            Some(LoopChange {
                old_length,
                new_length,
            })
        } else {
            None
        }
    }

    pub fn set_swing(&mut self, percent: f64) {
        self.swing_percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        self.subdivision = subdivision;
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> (u32, u32) {
        (self.ts_top, self.ts_bottom)
    }

    pub fn swing_percent(&self) -> f64 {
        self.swing_percent
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn measure_length(&self) -> f64 {
        self.measure_length
    }

    pub fn beat_duration(&self) -> f64 {
        self.measure_length / self.ts_top as f64
    }

    pub fn loop_length(&self) -> Option<f64> {
        self.loop_length
    }

    /// The loop length, or one measure while no loop has been defined yet.
    pub fn effective_loop_length(&self) -> f64 {
        self.loop_length.unwrap_or(self.measure_length)
    }

    /// Whole measures in the active loop (or the pending "apply loop" value).
    pub fn loop_measures(&self) -> u32 {
        self.loop_length
            .map(|len| (len / self.measure_length).round().max(1.0) as u32)
            .unwrap_or(self.loop_measures)
    }

    /// Defines the loop as `measures` whole measures and returns the new length.
    pub fn set_loop_measures(&mut self, measures: u32) -> f64 {
        let measures = measures.clamp(1, MAX_LOOP_MEASURES);
        self.loop_measures = measures;
        let len = measures as f64 * self.measure_length;
        self.loop_length = Some(len);
        len
    }

    /// Adopts a loop length, snapping it to whole measures first.
    pub fn set_loop_length(&mut self, len: f64) -> f64 {
        let snapped = snap_to_measures(len, self.measure_length);
        self.loop_measures = (snapped / self.measure_length).round() as u32;
        self.loop_length = Some(snapped);
        snapped
    }

    /// Forgets the loop once the last track has been emptied.
    pub fn clear_loop(&mut self) {
        self.loop_length = None;
        self.loop_measures = DEFAULT_LOOP_MEASURES;
    }

    /// Makes sure a loop exists, defining one from the pending measure count if needed.
    pub fn ensure_loop_length(&mut self) -> f64 {
        match self.loop_length {
            Some(len) => len,
            None => self.set_loop_measures(self.loop_measures),
        }
    }

    pub fn loop_start(&self) -> f64 {
        self.loop_start
    }

    pub fn set_loop_start(&mut self, at: f64) {
        self.loop_start = at;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Position inside the loop at `now`, in `[0, loop_length)`.
    pub fn phase_at(&self, now: f64) -> Option<f64> {
        let len = self.loop_length?;
        Some((now - self.loop_start).rem_euclid(len))
    }

    /// First measure boundary strictly after `now`, counted from `reference`.
    pub fn next_measure_boundary(&self, now: f64, reference: f64) -> f64 {
        let measures_since = ((now - reference) / self.measure_length).floor();
        reference + (measures_since + 1.0) * self.measure_length
    }
}
