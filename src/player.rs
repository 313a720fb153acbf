// src/player.rs

//! Loop player: owns the playback source of every track and keeps them all on the
//! transport's single loop-start reference.

use crate::backend::{AudioBackend, SourceId, SourceStart};
use crate::buffer::{normalize_to_loop, SharedBuffer};
use crate::looper::TrackStore;
use crate::transport::Transport;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LoopPlayer {
    sources: Vec<Option<SourceId>>,
}

impl LoopPlayer {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            sources: vec![None; num_tracks],
        }
    }

    pub fn source(&self, track: usize) -> Option<SourceId> {
        self.sources.get(track).copied().flatten()
    }

    pub fn is_active(&self, track: usize) -> bool {
        self.source(track).is_some()
    }

    pub fn any_active(&self) -> bool {
        self.sources.iter().any(Option::is_some)
    }

    /// Starts every non-empty track at one shared instant, which becomes the new
    /// loop-start reference. The loop length must already be defined.
    pub fn start_all<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        tracks: &TrackStore,
        transport: &mut Transport,
    ) {
        self.release_all(backend);
        let now = backend.now();
        let loop_length = transport.ensure_loop_length();
        for track in tracks.iter() {
            if let Some(buffer) = track.buffer() {
                let id = backend.start_source(SourceStart {
                    track: track.index(),
                    buffer: normalize_to_loop(buffer, loop_length),
                    loop_length,
                    when: now,
                    offset: 0.0,
                });
                self.sources[track.index()] = Some(id);
            }
        }
        transport.set_loop_start(now);
        transport.set_playing(true);
        debug!(loop_length, at = now, "Started all tracks");
    }

    /// Stops and releases every source. Safe to call when nothing is playing.
    pub fn stop_all<B: AudioBackend + ?Sized>(&mut self, backend: &mut B, transport: &mut Transport) {
        self.release_all(backend);
        transport.set_playing(false);
    }

    /// Starts one track so it joins the others in phase. When nothing is playing this
    /// establishes a fresh loop-start reference instead.
    pub fn start_track<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        track: usize,
        buffer: &SharedBuffer,
        transport: &mut Transport,
    ) {
        if track >= self.sources.len() {
            return;
        }
        self.stop_track_source(backend, track);
        let now = backend.now();
        let loop_length = transport.ensure_loop_length();
        if !transport.is_playing() {
            transport.set_loop_start(now);
            transport.set_playing(true);
        }
        let offset = transport.phase_at(now).unwrap_or(0.0);
        let id = backend.start_source(SourceStart {
            track,
            buffer: normalize_to_loop(buffer, loop_length),
            loop_length,
            when: now,
            offset,
        });
        self.sources[track] = Some(id);
    }

    /// Stops one track. Once the last source is gone the transport stops too.
    pub fn stop_track<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        track: usize,
        transport: &mut Transport,
    ) {
        self.stop_track_source(backend, track);
        if !self.any_active() {
            transport.set_playing(false);
        }
    }

    /// Swaps the source of a track whose buffer just changed: the old source is always
    /// stopped, and a new one is started at the current loop phase if the transport runs.
    pub fn replace_track<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        track: usize,
        buffer: Option<&SharedBuffer>,
        transport: &Transport,
    ) {
        self.stop_track_source(backend, track);
        let (Some(buffer), Some(loop_length)) = (buffer, transport.loop_length()) else {
            return;
        };
        if !transport.is_playing() || track >= self.sources.len() {
            return;
        }
        let now = backend.now();
        let offset = transport.phase_at(now).unwrap_or(0.0);
        let id = backend.start_source(SourceStart {
            track,
            buffer: normalize_to_loop(buffer, loop_length),
            loop_length,
            when: now,
            offset,
        });
        self.sources[track] = Some(id);
    }

    fn stop_track_source<B: AudioBackend + ?Sized>(&mut self, backend: &mut B, track: usize) {
        if let Some(id) = self.sources.get_mut(track).and_then(Option::take) {
            backend.stop_source(id);
        }
    }

    fn release_all<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        for slot in self.sources.iter_mut() {
            if let Some(id) = slot.take() {
                backend.stop_source(id);
            }
        }
    }
}
