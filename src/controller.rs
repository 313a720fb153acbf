// src/controller.rs

//! The loop engine's single owner of state.
//!
//! Every user action lands here. The controller mutates [`SessionState`], pushes the
//! matching work to the audio capability, and turns failures into notifications so
//! the session is always left consistent.

use crate::backend::{AudioBackend, CaptureDevice};
use crate::buffer::{
    normalize_to_loop, samples_for, FitMode, SharedBuffer, CONFORM_TOLERANCE_SECS,
};
use crate::codec;
use crate::error::{LooperError, Notification, Result};
use crate::fx::{FxModule, FxParam, FxParams};
use crate::fx_graph::{FxGraphBuilder, RAMP_TIME_CONSTANT};
use crate::history::History;
use crate::looper::{TrackState, TrackStore, NUM_TRACKS};
use crate::metronome::{ClickGrid, MetronomeScheduler};
use crate::mixer::{render_mix, track_gains, MixerTrackState};
use crate::player::LoopPlayer;
use crate::recorder::{
    overdub_offset, place_overdub, prepare_capture, take_measures, LoopAnchor, Placement,
    Recorder, Take,
};
use crate::session;
use crate::settings::{AppSettings, DEFAULT_METRONOME_VOLUME, DEFAULT_MONITOR_LEVEL};
use crate::transport::{Subdivision, Transport, DEFAULT_LOOP_MEASURES};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Cells in the loop position display.
pub const LED_CELLS: usize = 32;

/// Engine options taken from the application settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub fit_mode: FitMode,
    pub input_latency_secs: f64,
    pub metronome_volume: f32,
    pub monitor_level: f32,
    pub default_loop_measures: u32,
    pub sessions_root: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fit_mode: FitMode::Trim,
            input_latency_secs: 0.0,
            metronome_volume: DEFAULT_METRONOME_VOLUME,
            monitor_level: DEFAULT_MONITOR_LEVEL,
            default_loop_measures: DEFAULT_LOOP_MEASURES,
            sessions_root: None,
        }
    }
}

impl From<&AppSettings> for ControllerConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            fit_mode: settings.fit_mode,
            input_latency_secs: settings.input_latency_secs(),
            metronome_volume: settings.metronome_volume,
            monitor_level: settings.monitor_level,
            default_loop_measures: settings.default_loop_measures,
            sessions_root: settings.sessions_root(),
        }
    }
}

/// Live input routed to the output. Every take mutes it and `held` keeps the gain to
/// return to once the take is done.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorState {
    pub enabled: bool,
    pub level: f32,
    /// Gain currently applied to the monitor path.
    pub gain: f32,
    held: Option<f32>,
}

impl MonitorState {
    fn new(level: f32) -> Self {
        Self {
            enabled: false,
            level: clamp_level(level),
            gain: 0.0,
            held: None,
        }
    }

    fn target(&self) -> f32 {
        if self.enabled {
            self.level
        } else {
            0.0
        }
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Everything the engine knows, in one place.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub transport: Transport,
    pub tracks: TrackStore,
    pub metronome: MetronomeScheduler,
    pub metronome_enabled: bool,
    pub metronome_volume: f32,
    pub monitor: MonitorState,
    pub recorder: Recorder,
    pub player: LoopPlayer,
    pub fx_graph: FxGraphBuilder,
    pub config: ControllerConfig,
}

impl SessionState {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            transport: Transport::new(),
            tracks: TrackStore::new(NUM_TRACKS),
            metronome: MetronomeScheduler::new(),
            metronome_enabled: false,
            metronome_volume: config.metronome_volume.clamp(0.0, 1.0),
            monitor: MonitorState::new(config.monitor_level),
            recorder: Recorder::new(),
            player: LoopPlayer::new(NUM_TRACKS),
            fx_graph: FxGraphBuilder::new(NUM_TRACKS),
            config,
        }
    }
}

/// Where the loop is right now, for progress bars and the LED strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub fraction: f64,
    pub led: usize,
    pub loop_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackStatus {
    pub state: TrackState,
    pub duration: Option<f64>,
    pub mix: MixerTrackState,
    pub can_undo: bool,
    pub can_redo: bool,
    pub fx: Vec<FxModule>,
}

pub struct LoopController<B: AudioBackend, C: CaptureDevice> {
    backend: B,
    capture: C,
    state: SessionState,
    notifications: Vec<Notification>,
}

impl<B: AudioBackend, C: CaptureDevice> LoopController<B, C> {
    pub fn new(backend: B, capture: C, config: ControllerConfig) -> Self {
        let mut controller = Self {
            backend,
            capture,
            state: SessionState::new(config),
            notifications: Vec::new(),
        };
        for i in 0..controller.state.tracks.len() {
            controller.rebuild_fx(i);
        }
        controller.refresh_gains();
        controller
            .backend
            .ramp_metronome_gain(controller.state.metronome_volume, RAMP_TIME_CONSTANT);
        controller
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut C {
        &mut self.capture
    }

    /// Drains the pending user-facing messages.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, err: &LooperError) {
        error!("{}", err);
        self.notifications.push(Notification::from(err));
    }

    fn checked_track(&mut self, track: usize) -> Result<()> {
        let checked = self.state.tracks.get(track).map(|_| ());
        if let Err(e) = &checked {
            self.notify(e);
        }
        checked
    }

    // --- Transport ---

    /// Changes tempo and time signature. An active loop is re-snapped to whole measures
    /// and every track is conformed to the new length.
    pub fn set_tempo(&mut self, bpm: f64, ts_top: u32, ts_bottom: u32) {
        let change = self.state.transport.set_tempo(bpm, ts_top, ts_bottom);
        if let Some(change) = change {
            info!(
                old = change.old_length,
                new = change.new_length,
                "Loop re-snapped to tempo"
            );
            self.conform_all(change.new_length);
        }
        self.restart_metronome();
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let (top, bottom) = self.state.transport.time_signature();
        self.set_tempo(bpm, top, bottom);
    }

    pub fn set_time_signature(&mut self, ts_top: u32, ts_bottom: u32) {
        let bpm = self.state.transport.bpm();
        self.set_tempo(bpm, ts_top, ts_bottom);
    }

    pub fn set_swing(&mut self, percent: f64) {
        self.state.transport.set_swing(percent);
        self.restart_metronome();
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        self.state.transport.set_subdivision(subdivision);
        self.restart_metronome();
    }

    pub fn set_fit_mode(&mut self, mode: FitMode) {
        self.state.config.fit_mode = mode;
    }

    /// "Apply loop": defines the loop as `measures` whole measures, conforming every
    /// track (with an undo step each) when a loop already exists.
    pub fn set_loop_measures(&mut self, measures: u32) {
        let had_loop = self.state.transport.loop_length().is_some();
        let old = self.state.transport.loop_length();
        let new_length = self.state.transport.set_loop_measures(measures);
        info!(measures, length = new_length, "Loop length applied");
        if had_loop && old != Some(new_length) {
            self.conform_all(new_length);
        }
    }

    /// Conforms every non-empty track to `loop_length`, in parallel, each inside its own
    /// history bracket. The transport must already carry the new length.
    fn conform_all(&mut self, loop_length: f64) {
        let mode = self.state.config.fit_mode;
        let pending: Vec<(usize, SharedBuffer)> = self
            .state
            .tracks
            .iter()
            .filter_map(|t| t.buffer().map(|b| (t.index(), b.clone())))
            .collect();
        let conformed: Vec<(usize, SharedBuffer)> = pending
            .into_par_iter()
            .map(|(i, buf)| {
                if (buf.duration() - loop_length).abs() < CONFORM_TOLERANCE_SECS {
                    (i, buf)
                } else {
                    (i, Arc::new(buf.conform(loop_length, mode)))
                }
            })
            .collect();
        for (i, buf) in conformed {
            if let Ok(track) = self.state.tracks.get_mut(i) {
                track.bump_generation();
            }
            self.mutate_track(i, Some(buf));
        }
    }

    // --- Metronome ---

    fn metronome_reference(&self, now: f64) -> f64 {
        if self.state.transport.is_playing() {
            self.state.transport.loop_start()
        } else {
            now
        }
    }

    fn restart_metronome(&mut self) {
        if !self.state.metronome_enabled {
            return;
        }
        let now = self.backend.now();
        let reference = self.metronome_reference(now);
        let grid = ClickGrid::from_transport(&self.state.transport);
        self.state.metronome.restart(now, reference, grid);
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.state.metronome_enabled = enabled;
        if enabled {
            let now = self.backend.now();
            let reference = self.metronome_reference(now);
            let grid = ClickGrid::from_transport(&self.state.transport);
            self.state.metronome.start(now, reference, grid);
        } else {
            self.state.metronome.stop();
        }
    }

    pub fn set_metronome_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.state.metronome_volume = volume;
        self.backend.ramp_metronome_gain(volume, RAMP_TIME_CONSTANT);
    }

    /// Called by the host every lookahead interval. Returns how many clicks were scheduled.
    pub fn metronome_tick(&mut self) -> usize {
        let now = self.backend.now();
        let events = self.state.metronome.tick(now);
        let count = events.len();
        for event in events {
            self.backend.schedule_click(event);
        }
        count
    }

    // --- Mixer ---

    fn refresh_gains(&mut self) {
        let gains = track_gains(self.state.tracks.mix_states());
        for (i, gain) in gains.into_iter().enumerate() {
            self.backend.ramp_track_gain(i, gain, RAMP_TIME_CONSTANT);
        }
    }

    pub fn set_mute(&mut self, track: usize, muted: bool) -> Result<()> {
        self.checked_track(track)?;
        self.state.tracks.get_mut(track)?.mix.is_muted = muted;
        self.refresh_gains();
        Ok(())
    }

    pub fn toggle_mute(&mut self, track: usize) -> Result<bool> {
        self.checked_track(track)?;
        let muted = !self.state.tracks.get(track)?.mix.is_muted;
        self.set_mute(track, muted)?;
        Ok(muted)
    }

    pub fn set_solo(&mut self, track: usize, soloed: bool) -> Result<()> {
        self.checked_track(track)?;
        self.state.tracks.get_mut(track)?.mix.is_soloed = soloed;
        self.refresh_gains();
        Ok(())
    }

    pub fn toggle_solo(&mut self, track: usize) -> Result<bool> {
        self.checked_track(track)?;
        let soloed = !self.state.tracks.get(track)?.mix.is_soloed;
        self.set_solo(track, soloed)?;
        Ok(soloed)
    }

    pub fn set_volume(&mut self, track: usize, volume: f32) -> Result<()> {
        self.checked_track(track)?;
        self.state.tracks.get_mut(track)?.mix.set_volume(volume);
        self.refresh_gains();
        Ok(())
    }

    // --- Playback ---

    /// Starts every track at once. Without a loop, one is defined from the default
    /// measure count first.
    pub fn start_all(&mut self) {
        if self.state.transport.loop_length().is_none() {
            let measures = self.state.config.default_loop_measures;
            self.state.transport.set_loop_measures(measures);
        }
        self.state
            .player
            .start_all(&mut self.backend, &self.state.tracks, &mut self.state.transport);
        self.restart_metronome();
    }

    /// Stops every source and the metronome. Idempotent.
    pub fn stop_all(&mut self) {
        self.state
            .player
            .stop_all(&mut self.backend, &mut self.state.transport);
        self.state.metronome.stop();
    }

    /// Starts one track in phase with whatever is already playing.
    pub fn start_track(&mut self, track: usize) -> Result<()> {
        self.checked_track(track)?;
        let Some(buffer) = self.state.tracks.get(track)?.buffer().cloned() else {
            return Ok(());
        };
        let was_playing = self.state.transport.is_playing();
        self.state
            .player
            .start_track(&mut self.backend, track, &buffer, &mut self.state.transport);
        if !was_playing {
            self.restart_metronome();
        }
        Ok(())
    }

    pub fn stop_track(&mut self, track: usize) -> Result<()> {
        self.checked_track(track)?;
        self.state
            .player
            .stop_track(&mut self.backend, track, &mut self.state.transport);
        if !self.state.transport.is_playing() {
            self.state.metronome.stop();
        }
        Ok(())
    }

    // --- Buffer mutation and history ---

    /// The one path every buffer swap goes through: stop the old source, swap the
    /// buffer, restart in phase if playing, and forget the loop once every track is empty.
    fn apply_buffer(&mut self, track: usize, buffer: Option<SharedBuffer>) {
        let buffer = match (buffer, self.state.transport.loop_length()) {
            (Some(buf), Some(len)) => Some(normalize_to_loop(&buf, len)),
            (Some(buf), None) => {
                let len = self.state.transport.set_loop_length(buf.duration());
                debug!(length = len, "Loop redefined from restored buffer");
                Some(normalize_to_loop(&buf, len))
            }
            (None, _) => None,
        };
        let Ok(slot) = self.state.tracks.get_mut(track) else {
            return;
        };
        slot.replace_buffer(buffer.clone());
        self.state.player.replace_track(
            &mut self.backend,
            track,
            buffer.as_ref(),
            &self.state.transport,
        );
        if !self.state.tracks.any_audio() {
            self.state.transport.clear_loop();
            debug!("All tracks empty, loop cleared");
        }
    }

    /// Replaces a track's buffer between a "before" and an "after" history snapshot,
    /// so one undo returns to exactly the state before the change.
    fn mutate_track(&mut self, track: usize, buffer: Option<SharedBuffer>) {
        let Ok(slot) = self.state.tracks.get_mut(track) else {
            return;
        };
        let before = slot.buffer().cloned();
        slot.history.push(before);
        self.apply_buffer(track, buffer);
        if let Ok(slot) = self.state.tracks.get_mut(track) {
            let after = slot.buffer().cloned();
            slot.history.push(after);
        }
    }

    pub fn clear_track(&mut self, track: usize) -> Result<()> {
        self.checked_track(track)?;
        self.state.tracks.get_mut(track)?.bump_generation();
        self.mutate_track(track, None);
        info!(track, "Track cleared");
        Ok(())
    }

    /// Steps the track's history back. Returns whether anything changed.
    pub fn undo(&mut self, track: usize) -> Result<bool> {
        self.checked_track(track)?;
        let slot = self.state.tracks.get_mut(track)?;
        let Some(snapshot) = slot.history.undo() else {
            return Ok(false);
        };
        slot.bump_generation();
        self.apply_buffer(track, snapshot);
        Ok(true)
    }

    pub fn redo(&mut self, track: usize) -> Result<bool> {
        self.checked_track(track)?;
        let slot = self.state.tracks.get_mut(track)?;
        let Some(snapshot) = slot.history.redo() else {
            return Ok(false);
        };
        slot.bump_generation();
        self.apply_buffer(track, snapshot);
        Ok(true)
    }

    // --- Recording ---

    /// Arms the shared input for `track`. Returns `Ok(false)` when another take is
    /// already in progress (the busy guard).
    pub fn start_recording(&mut self, track: usize) -> Result<bool> {
        if self.state.recorder.is_busy() {
            debug!(track, "Record start ignored, recorder busy");
            return Ok(false);
        }
        self.checked_track(track)?;
        if let Err(e) = self.capture.start() {
            self.notify(&e);
            return Err(e);
        }

        let now = self.backend.now();
        let transport = &self.state.transport;
        let anchor = match (transport.is_playing(), transport.loop_length()) {
            (true, Some(loop_length)) => {
                let latency = self.state.config.input_latency_secs + self.capture.latency();
                Some(LoopAnchor {
                    offset: overdub_offset(now, transport.loop_start(), loop_length, latency),
                    loop_length,
                })
            }
            _ => None,
        };
        let take = Take {
            track,
            started_at: now,
            generation: self.state.tracks.get(track)?.generation(),
            anchor,
        };
        self.state.recorder.begin(take);
        self.hold_monitor();
        info!(track, overdub = anchor.is_some(), "Recording started");
        Ok(true)
    }

    /// Requests the end of the current take; the capture keeps running through the
    /// grace window. Safe to call when nothing is recording.
    pub fn stop_recording(&mut self) {
        let now = self.backend.now();
        if self.state.recorder.request_stop(now) {
            debug!("Recording stop scheduled");
        }
    }

    /// Host poll: pumps the capture and finishes a take whose grace window has elapsed.
    pub fn poll(&mut self) {
        self.capture.poll();
        let now = self.backend.now();
        if let Some((take, performed)) = self.state.recorder.take_due(now) {
            let captured = self.capture.stop();
            if let Err(e) = self.finish_take(take, performed, captured) {
                self.notify(&e);
            }
            self.release_monitor();
        }
    }

    fn finish_take(
        &mut self,
        take: Take,
        performed: f64,
        captured: Option<crate::backend::CapturedAudio>,
    ) -> Result<()> {
        let generation = self.state.tracks.get(take.track)?.generation();
        if generation != take.generation {
            warn!(track = take.track, "Track changed during recording, take discarded");
            self.notifications.push(Notification::warning(
                "Track changed while recording; take discarded.",
            ));
            return Ok(());
        }

        let captured =
            captured.ok_or_else(|| LooperError::DecodeFailure("Nothing captured".to_string()))?;
        let raw = codec::captured_to_buffer(captured, self.backend.sample_rate())?;
        // The grace window only flushes the input; what it captured is not part of the take.
        let raw = raw.truncated(samples_for(performed, raw.sample_rate()));
        let mono = prepare_capture(&raw);

        let Some(placement) = take.placement(self.state.transport.loop_length()) else {
            warn!(track = take.track, "Loop changed during recording, take discarded");
            self.notifications.push(Notification::warning(
                "Loop changed while recording; take discarded.",
            ));
            return Ok(());
        };

        let buffer = match placement {
            Placement::Overdub(anchor) => place_overdub(
                mono.mono(),
                anchor.offset,
                anchor.loop_length,
                mono.sample_rate(),
            ),
            Placement::Fit { loop_length } => mono.fit_to_loop(loop_length),
            Placement::DefineLoop => {
                let measure = self.state.transport.measure_length();
                let measures = take_measures(mono.duration(), measure);
                let loop_length = self.state.transport.set_loop_measures(measures);
                info!(measures, loop_length, "Loop defined by first take");
                mono.fit_to_loop(loop_length)
            }
        };
        self.mutate_track(take.track, Some(Arc::new(buffer)));
        info!(track = take.track, "Recording committed");
        Ok(())
    }

    // --- Monitoring ---

    /// Routes the live input to the output at the monitor level.
    pub fn set_monitoring(&mut self, enabled: bool) -> Result<()> {
        if let Err(e) = self.capture.set_monitoring(enabled) {
            self.notify(&e);
            return Err(e);
        }
        self.state.monitor.enabled = enabled;
        self.retarget_monitor();
        info!(enabled, "Input monitoring changed");
        Ok(())
    }

    pub fn set_monitor_level(&mut self, level: f32) {
        self.state.monitor.level = clamp_level(level);
        self.retarget_monitor();
    }

    fn retarget_monitor(&mut self) {
        let target = self.state.monitor.target();
        if self.state.monitor.held.is_some() {
            self.state.monitor.held = Some(target);
        } else {
            self.apply_monitor_gain(target);
        }
    }

    /// Mutes the monitor for the length of a take so it cannot bleed into the capture.
    fn hold_monitor(&mut self) {
        if self.state.monitor.held.is_none() {
            self.state.monitor.held = Some(self.state.monitor.gain);
            self.apply_monitor_gain(0.0);
        }
    }

    fn release_monitor(&mut self) {
        if let Some(previous) = self.state.monitor.held.take() {
            let gain = if self.state.monitor.enabled {
                previous
            } else {
                0.0
            };
            self.apply_monitor_gain(gain);
        }
    }

    fn apply_monitor_gain(&mut self, gain: f32) {
        self.state.monitor.gain = gain;
        self.backend.ramp_monitor_gain(gain, RAMP_TIME_CONSTANT);
    }

    // --- Export ---

    /// Bounces every track at its volume and mute/solo gate into one loop-length WAV
    /// in `dir`. FX are not rendered.
    pub fn export_mix(&mut self, dir: &Path) -> Result<PathBuf> {
        match self.write_mix(dir) {
            Ok(path) => {
                self.notifications
                    .push(Notification::info(format!("Mix exported: {}", path.display())));
                Ok(path)
            }
            Err(e) => {
                self.notify(&e);
                Err(e)
            }
        }
    }

    /// Writes each recorded track, conformed to the loop, as its own WAV in `dir`.
    pub fn export_stems(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        match self.write_stems(dir) {
            Ok(paths) => {
                self.notifications.push(Notification::info(format!(
                    "{} stems exported to {}",
                    paths.len(),
                    dir.display()
                )));
                Ok(paths)
            }
            Err(e) => {
                self.notify(&e);
                Err(e)
            }
        }
    }

    fn export_loop_length(&self) -> Result<f64> {
        match self.state.transport.loop_length() {
            Some(len) if self.state.tracks.any_audio() => Ok(len),
            _ => Err(LooperError::NothingRecorded),
        }
    }

    fn write_mix(&self, dir: &Path) -> Result<PathBuf> {
        let loop_length = self.export_loop_length()?;
        let gains = track_gains(self.state.tracks.mix_states());
        let layers: Vec<(SharedBuffer, f32)> = self
            .state
            .tracks
            .iter()
            .zip(gains)
            .filter_map(|(track, gain)| {
                track
                    .buffer()
                    .map(|b| (normalize_to_loop(b, loop_length), gain))
            })
            .collect();
        let sample_rate = self.backend.sample_rate();
        let mix = render_mix(
            layers.iter().map(|(b, gain)| (&**b, *gain)),
            samples_for(loop_length, sample_rate),
            sample_rate,
        );
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("octoloop_mix_{:.2}s.wav", loop_length));
        codec::write_wav_file(&path, &mix)?;
        info!(path = %path.display(), "Mix exported");
        Ok(path)
    }

    fn write_stems(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let loop_length = self.export_loop_length()?;
        fs::create_dir_all(dir)?;
        let mut paths = Vec::new();
        for (i, track) in self.state.tracks.iter().enumerate() {
            let Some(buffer) = track.buffer() else {
                continue;
            };
            let stem = normalize_to_loop(buffer, loop_length);
            let path = dir.join(format!("octoloop_t{}_{:.2}s.wav", i + 1, loop_length));
            codec::write_wav_file(&path, &stem)?;
            paths.push(path);
        }
        info!(count = paths.len(), dir = %dir.display(), "Stems exported");
        Ok(paths)
    }

    // --- FX ---

    fn rebuild_fx(&mut self, track: usize) {
        let Ok(slot) = self.state.tracks.get(track) else {
            return;
        };
        let params = slot.fx;
        if let Some(topology) = self.state.fx_graph.rebuild(track, &params) {
            self.backend.connect_fx(track, topology);
        }
    }

    /// Turns a stage on or off. Any change tears the track's wiring down and rebuilds it.
    pub fn set_fx_enabled(&mut self, track: usize, module: FxModule, on: bool) -> Result<()> {
        self.checked_track(track)?;
        if self.state.tracks.get_mut(track)?.fx.set_enabled(module, on) {
            self.rebuild_fx(track);
            debug!(track, %module, on, "FX topology rebuilt");
        }
        Ok(())
    }

    /// Moves one parameter. The wiring is untouched; the live value ramps to the
    /// clamped target. Returns the stored value.
    pub fn set_fx_param(&mut self, track: usize, param: FxParam, value: f32) -> Result<f32> {
        self.checked_track(track)?;
        let stored = self.state.tracks.get_mut(track)?.fx.set(param, value);
        let ramp = self.state.fx_graph.param_ramp(param, stored);
        self.backend
            .ramp_fx_param(track, ramp.param, ramp.target, ramp.time_constant);
        Ok(stored)
    }

    pub fn fx(&self, track: usize) -> Result<FxParams> {
        Ok(self.state.tracks.get(track)?.fx)
    }

    // --- Monitoring ---

    pub fn position(&self) -> Option<Position> {
        if !self.state.transport.is_playing() {
            return None;
        }
        let loop_length = self.state.transport.loop_length()?;
        let phase = self.state.transport.phase_at(self.backend.now())?;
        let fraction = phase / loop_length;
        let led = ((fraction * LED_CELLS as f64).floor() as usize) % LED_CELLS;
        Some(Position {
            fraction,
            led,
            loop_length,
        })
    }

    pub fn track_status(&self, track: usize) -> Result<TrackStatus> {
        let slot = self.state.tracks.get(track)?;
        let state = if self.state.recorder.recording_track() == Some(track) {
            TrackState::Recording
        } else if self.state.player.is_active(track) {
            TrackState::Playing
        } else if slot.has_audio() {
            TrackState::Ready
        } else {
            TrackState::Empty
        };
        Ok(TrackStatus {
            state,
            duration: slot.duration(),
            mix: slot.mix,
            can_undo: slot.history.can_undo(),
            can_redo: slot.history.can_redo(),
            fx: self
                .state
                .fx_graph
                .topology(track)
                .map(|t| t.modules())
                .unwrap_or_default(),
        })
    }

    // --- Sessions ---

    /// Saves into `dir`, or a fresh timestamped directory under the sessions root.
    pub fn save_session(&mut self, dir: Option<&Path>) -> Result<PathBuf> {
        let target = match dir {
            Some(d) => d.to_path_buf(),
            None => match &self.state.config.sessions_root {
                Some(root) => session::new_session_dir(root),
                None => {
                    let e = LooperError::Session("No sessions directory configured".to_string());
                    self.notify(&e);
                    return Err(e);
                }
            },
        };
        match session::save_session(&target, &self.state.transport, &self.state.tracks) {
            Ok(path) => {
                self.notifications
                    .push(Notification::info(format!("Session saved: {}", path.display())));
                Ok(path)
            }
            Err(e) => {
                self.notify(&e);
                Err(e)
            }
        }
    }

    /// Loads a session. Everything is read and decoded before anything is replaced, so
    /// a failed load leaves the current session running untouched.
    pub fn load_session(&mut self, dir: &Path) -> Result<()> {
        let loaded = match session::load_session(dir, self.backend.sample_rate()) {
            Ok(l) => l,
            Err(e) => {
                self.notify(&e);
                return Err(e);
            }
        };

        if self.state.recorder.abort().is_some() {
            self.capture.stop();
            self.release_monitor();
        }
        self.stop_all();

        let data = &loaded.data;
        self.state
            .transport
            .set_tempo(data.bpm, data.ts_top, data.ts_bottom);
        self.state.transport.set_swing(data.swing_percent);
        self.state.transport.set_subdivision(loaded.subdivision());
        let first_duration = loaded
            .tracks
            .iter()
            .find_map(|t| t.buffer.as_ref().map(|b| b.duration()));
        match data.loop_length.or(first_duration) {
            Some(len) => {
                self.state.transport.set_loop_length(len);
            }
            None => self.state.transport.clear_loop(),
        }

        let loaded = loaded.normalized(self.state.transport.loop_length());
        let mut incoming = loaded.tracks.into_iter();
        for i in 0..self.state.tracks.len() {
            let slot = self.state.tracks.get_mut(i)?;
            match incoming.next() {
                Some(t) => {
                    slot.replace_buffer(t.buffer);
                    slot.history = t.history;
                    slot.mix = t.mix;
                    slot.fx = t.fx;
                }
                None => {
                    slot.replace_buffer(None);
                    slot.history = History::from_entries(vec![None], None);
                    slot.mix = MixerTrackState::default();
                    slot.fx = FxParams::default();
                }
            }
            slot.bump_generation();
            self.rebuild_fx(i);
        }
        if !self.state.tracks.any_audio() {
            self.state.transport.clear_loop();
        }
        self.refresh_gains();
        self.notifications
            .push(Notification::info(format!("Session loaded: {}", dir.display())));
        Ok(())
    }

    pub fn list_sessions(&self) -> Vec<PathBuf> {
        self.state
            .config
            .sessions_root
            .as_deref()
            .map(session::list_sessions)
            .unwrap_or_default()
    }
}
