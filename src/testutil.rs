// src/testutil.rs

//! Offline stand-ins for the audio and capture capabilities.

use crate::backend::{AudioBackend, CaptureDevice, CapturedAudio, SourceId, SourceStart};
use crate::error::{LooperError, Result};
use crate::fx::FxParam;
use crate::fx_graph::FxTopology;
use crate::metronome::ClickEvent;
use std::collections::{BTreeMap, HashMap};

/// Records everything the engine asks of the audio capability. The clock only moves
/// when a test moves it.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub now: f64,
    pub sample_rate: u32,
    next_id: u64,
    /// Sources currently running.
    pub active: BTreeMap<SourceId, SourceStart>,
    /// Every source ever started, in order.
    pub started: Vec<SourceStart>,
    pub stopped: Vec<SourceId>,
    pub topologies: HashMap<usize, FxTopology>,
    pub connects: usize,
    pub fx_ramps: Vec<(usize, FxParam, f32, f64)>,
    pub track_gains: HashMap<usize, f32>,
    pub metronome_gain: f32,
    pub monitor_gain: f32,
    pub clicks: Vec<ClickEvent>,
}

impl FakeBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    pub fn active_source_for(&self, track: usize) -> Option<&SourceStart> {
        self.active.values().find(|s| s.track == track)
    }
}

impl AudioBackend for FakeBackend {
    fn now(&self) -> f64 {
        self.now
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_source(&mut self, start: SourceStart) -> SourceId {
        self.next_id += 1;
        let id = SourceId(self.next_id);
        self.started.push(start.clone());
        self.active.insert(id, start);
        id
    }

    fn stop_source(&mut self, id: SourceId) {
        if self.active.remove(&id).is_some() {
            self.stopped.push(id);
        }
    }

    fn connect_fx(&mut self, track: usize, topology: &FxTopology) {
        self.connects += 1;
        self.topologies.insert(track, topology.clone());
    }

    fn ramp_fx_param(&mut self, track: usize, param: FxParam, target: f32, time_constant: f64) {
        self.fx_ramps.push((track, param, target, time_constant));
    }

    fn ramp_track_gain(&mut self, track: usize, target: f32, _time_constant: f64) {
        self.track_gains.insert(track, target);
    }

    fn ramp_metronome_gain(&mut self, target: f32, _time_constant: f64) {
        self.metronome_gain = target;
    }

    fn ramp_monitor_gain(&mut self, target: f32, _time_constant: f64) {
        self.monitor_gain = target;
    }

    fn schedule_click(&mut self, click: ClickEvent) {
        self.clicks.push(click);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    Permission,
    Recorder,
}

/// A scriptable microphone.
#[derive(Debug, Default)]
pub struct FakeCapture {
    pub fail_start: Option<StartFailure>,
    /// Handed back by the next `stop`.
    pub next_capture: Option<CapturedAudio>,
    pub latency: f64,
    pub starts: usize,
    pub stops: usize,
    pub monitoring: bool,
    capturing: bool,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a mono PCM take of `secs` seconds filled with `value`.
    pub fn script_take(&mut self, secs: f64, sample_rate: u32, value: f32) {
        let len = (secs * sample_rate as f64).round() as usize;
        self.next_capture = Some(CapturedAudio::Pcm {
            chunks: vec![vec![value; len]],
            sample_rate,
        });
    }
}

impl CaptureDevice for FakeCapture {
    fn start(&mut self) -> Result<()> {
        match self.fail_start {
            Some(StartFailure::Permission) => {
                Err(LooperError::PermissionDenied("denied by test".to_string()))
            }
            Some(StartFailure::Recorder) => {
                Err(LooperError::RecorderStartFailure("refused by test".to_string()))
            }
            None => {
                self.starts += 1;
                self.capturing = true;
                Ok(())
            }
        }
    }

    fn stop(&mut self) -> Option<CapturedAudio> {
        if !self.capturing {
            return None;
        }
        self.capturing = false;
        self.stops += 1;
        self.next_capture.take()
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn latency(&self) -> f64 {
        self.latency
    }

    fn set_monitoring(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.fail_start == Some(StartFailure::Permission) {
            return Err(LooperError::PermissionDenied("denied by test".to_string()));
        }
        self.monitoring = enabled;
        Ok(())
    }
}
