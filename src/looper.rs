// src/looper.rs

//! The fixed set of track slots and everything a slot owns.

use crate::buffer::SharedBuffer;
use crate::error::{LooperError, Result};
use crate::fx::FxParams;
use crate::history::History;
use crate::mixer::MixerTrackState;

pub const NUM_TRACKS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Empty,
    Ready,
    Playing,
    Recording,
}

#[derive(Debug, Clone)]
pub struct Track {
    index: usize,
    buffer: Option<SharedBuffer>,
    pub mix: MixerTrackState,
    pub fx: FxParams,
    pub history: History,
    generation: u64,
}

impl Track {
    /// A fresh, empty slot. The history starts with the empty state so the very
    /// first mutation can be undone.
    pub fn new(index: usize) -> Self {
        let mut history = History::new();
        history.push(None);
        Self {
            index,
            buffer: None,
            mix: MixerTrackState::default(),
            fx: FxParams::default(),
            history,
            generation: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> String {
        format!("Track {}", self.index + 1)
    }

    pub fn buffer(&self) -> Option<&SharedBuffer> {
        self.buffer.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn duration(&self) -> Option<f64> {
        self.buffer.as_ref().map(|b| b.duration())
    }

    /// Swaps in a new buffer and returns the previous one.
    pub fn replace_buffer(&mut self, buffer: Option<SharedBuffer>) -> Option<SharedBuffer> {
        std::mem::replace(&mut self.buffer, buffer)
    }

    /// Bumped by every edit that is not a recording landing, so an in-flight take can
    /// tell that its track changed underneath it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Debug, Clone)]
pub struct TrackStore {
    tracks: Vec<Track>,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(NUM_TRACKS)
    }
}

impl TrackStore {
    pub fn new(count: usize) -> Self {
        Self {
            tracks: (0..count).map(Track::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Track> {
        self.tracks
            .get(index)
            .ok_or(LooperError::InvalidTrack(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.tracks
            .get_mut(index)
            .ok_or(LooperError::InvalidTrack(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    pub fn any_audio(&self) -> bool {
        self.tracks.iter().any(Track::has_audio)
    }

    pub fn mix_states(&self) -> impl Iterator<Item = &MixerTrackState> {
        self.tracks.iter().map(|t| &t.mix)
    }
}
