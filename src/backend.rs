// src/backend.rs

//! The seams between the loop engine and the outside world.
//!
//! [`AudioBackend`] is the audio capability: the authoritative clock, looping playback
//! sources, each track's FX wiring, smoothed gain and parameter ramps, click
//! scheduling and the input monitor gain. [`CaptureDevice`] is the single shared input.
//! The engine never talks to a sound card directly, which keeps every controller path
//! testable offline.

use crate::buffer::SharedBuffer;
use crate::error::Result;
use crate::fx::FxParam;
use crate::fx_graph::FxTopology;
use crate::metronome::ClickEvent;

/// Handle to one running looped playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// How a playback source should be started.
#[derive(Debug, Clone)]
pub struct SourceStart {
    pub track: usize,
    pub buffer: SharedBuffer,
    /// Loop bounds are `[0, loop_length)`.
    pub loop_length: f64,
    /// Audio-clock time at which the source becomes audible.
    pub when: f64,
    /// Position inside the buffer the source starts reading from.
    pub offset: f64,
}

pub trait AudioBackend {
    /// Current audio-clock time in seconds. Monotonic.
    fn now(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn start_source(&mut self, start: SourceStart) -> SourceId;

    /// Stops and releases a source. Unknown or already stopped ids are ignored.
    fn stop_source(&mut self, id: SourceId);

    /// Replaces the track's entire FX wiring with `topology`.
    fn connect_fx(&mut self, track: usize, topology: &FxTopology);

    /// Moves one live FX value towards `target` with the given time constant.
    fn ramp_fx_param(&mut self, track: usize, param: FxParam, target: f32, time_constant: f64);

    /// Moves the track's output gain towards `target` with the given time constant.
    fn ramp_track_gain(&mut self, track: usize, target: f32, time_constant: f64);

    /// Moves the shared metronome gain towards `target`.
    fn ramp_metronome_gain(&mut self, target: f32, time_constant: f64);

    /// Moves the gain of the live input routed to the output towards `target`.
    fn ramp_monitor_gain(&mut self, target: f32, time_constant: f64);

    /// Renders a click at its exact audio-clock time.
    fn schedule_click(&mut self, click: ClickEvent);
}

/// Audio handed back by a capture device when it stops.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedAudio {
    /// An encoded container (WAV, OGG, FLAC, ...), to be decoded before use.
    Encoded(Vec<u8>),
    /// Raw mono PCM chunks in capture order.
    Pcm { chunks: Vec<Vec<f32>>, sample_rate: u32 },
}

impl CapturedAudio {
    pub fn is_empty(&self) -> bool {
        match self {
            CapturedAudio::Encoded(bytes) => bytes.is_empty(),
            CapturedAudio::Pcm { chunks, .. } => chunks.iter().all(Vec::is_empty),
        }
    }
}

pub trait CaptureDevice {
    /// Begins capturing. Opens the input lazily on first use.
    ///
    /// Fails with `PermissionDenied` when the input cannot be opened and with
    /// `RecorderStartFailure` when it opens but refuses to start.
    fn start(&mut self) -> Result<()>;

    /// Ends the capture and returns everything gathered since `start`.
    fn stop(&mut self) -> Option<CapturedAudio>;

    fn is_capturing(&self) -> bool;

    /// Drains pending input into the capture. Called from the host's poll loop.
    fn poll(&mut self) {}

    /// Input latency reported by the device, in seconds.
    fn latency(&self) -> f64 {
        0.0
    }

    /// Keeps the input open and feeding the monitor path even between takes.
    fn set_monitoring(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}
