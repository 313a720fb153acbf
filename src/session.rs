// src/session.rs

//! Session persistence: a `session.json` plus one mono WAV per distinct buffer, stored
//! together in a session directory.

use crate::buffer::{normalize_to_loop, AudioBuffer, SharedBuffer};
use crate::codec;
use crate::error::{LooperError, Result};
use crate::fx::FxParams;
use crate::history::{History, Snapshot};
use crate::looper::TrackStore;
use crate::mixer::MixerTrackState;
use crate::transport::{Subdivision, Transport};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

pub const SESSION_VERSION: u32 = 3;
pub const SESSION_FILE: &str = "session.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackSessionData {
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub fx: FxParams,
    /// WAV file holding the current buffer, relative to the session directory.
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub history: Vec<Option<String>>,
    #[serde(default)]
    pub history_cursor: Option<usize>,
}

fn default_volume() -> f32 {
    crate::mixer::DEFAULT_TRACK_VOLUME
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionData {
    pub version: u32,
    pub loop_length: Option<f64>,
    pub bpm: f64,
    pub ts_top: u32,
    pub ts_bottom: u32,
    #[serde(default)]
    pub swing_percent: f64,
    #[serde(default = "default_subdivisions")]
    pub subdivisions: u32,
    pub tracks: Vec<TrackSessionData>,
}

fn default_subdivisions() -> u32 {
    1
}

/// A track as read back from disk, before it is committed to the engine.
#[derive(Debug, Clone)]
pub struct LoadedTrack {
    pub mix: MixerTrackState,
    pub fx: FxParams,
    pub buffer: Option<SharedBuffer>,
    pub history: History,
}

#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub data: SessionData,
    pub tracks: Vec<LoadedTrack>,
}

impl LoadedSession {
    pub fn subdivision(&self) -> Subdivision {
        Subdivision::from_pulses(self.data.subdivisions)
    }

    /// Conforms every stored buffer (current and history) to `loop_length`. Buffers
    /// shared between entries stay shared.
    pub fn normalized(mut self, loop_length: Option<f64>) -> Self {
        let Some(loop_length) = loop_length else {
            return self;
        };
        let mut cache: HashMap<*const AudioBuffer, SharedBuffer> = HashMap::new();
        let mut conform = |snapshot: &Snapshot| -> Snapshot {
            snapshot.as_ref().map(|buf| {
                cache
                    .entry(Arc::as_ptr(buf))
                    .or_insert_with(|| normalize_to_loop(buf, loop_length))
                    .clone()
            })
        };
        for track in self.tracks.iter_mut() {
            track.buffer = conform(&track.buffer);
            let entries: Vec<Snapshot> = track.history.entries().map(&mut conform).collect();
            track.history = History::from_entries(entries, track.history.cursor());
        }
        self
    }
}

/// `Session_<timestamp>` inside `root`.
pub fn new_session_dir(root: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    root.join(format!("Session_{}", timestamp))
}

/// Writes the session into `dir`, creating it if needed.
pub fn save_session(dir: &Path, transport: &Transport, tracks: &TrackStore) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let mut written: HashMap<*const AudioBuffer, String> = HashMap::new();
    let mut next_file = 0usize;
    let mut store = |buffer: &SharedBuffer| -> Result<String> {
        if let Some(name) = written.get(&Arc::as_ptr(buffer)) {
            return Ok(name.clone());
        }
        let name = format!("audio_{:03}.wav", next_file);
        next_file += 1;
        codec::write_wav_file(&dir.join(&name), buffer)?;
        written.insert(Arc::as_ptr(buffer), name.clone());
        Ok(name)
    };

    let mut track_data = Vec::with_capacity(tracks.len());
    for track in tracks.iter() {
        let audio = track.buffer().map(&mut store).transpose()?;
        let history = track
            .history
            .entries()
            .map(|entry| entry.as_ref().map(&mut store).transpose())
            .collect::<Result<Vec<_>>>()?;
        track_data.push(TrackSessionData {
            muted: track.mix.is_muted,
            solo: track.mix.is_soloed,
            volume: track.mix.volume,
            fx: track.fx,
            audio,
            history,
            history_cursor: track.history.cursor(),
        });
    }

    let (ts_top, ts_bottom) = transport.time_signature();
    let data = SessionData {
        version: SESSION_VERSION,
        loop_length: transport.loop_length(),
        bpm: transport.bpm(),
        ts_top,
        ts_bottom,
        swing_percent: transport.swing_percent(),
        subdivisions: transport.subdivision().pulses_per_beat(),
        tracks: track_data,
    };
    let json_path = dir.join(SESSION_FILE);
    fs::write(&json_path, serde_json::to_string_pretty(&data)?)?;
    info!("Saved session to {}", dir.display());
    Ok(dir.to_path_buf())
}

/// Reads and decodes a whole session. Nothing is committed here, so any error leaves
/// the running engine untouched.
pub fn load_session(dir: &Path, sample_rate: u32) -> Result<LoadedSession> {
    let json_path = dir.join(SESSION_FILE);
    let json_string = fs::read_to_string(&json_path)?;
    let data: SessionData = serde_json::from_str(&json_string)?;
    if data.version > SESSION_VERSION {
        return Err(LooperError::Session(format!(
            "Unsupported session version {}",
            data.version
        )));
    }

    let mut cache: HashMap<String, SharedBuffer> = HashMap::new();
    let mut load = |name: &String| -> Result<SharedBuffer> {
        if let Some(buf) = cache.get(name) {
            return Ok(buf.clone());
        }
        let path = dir.join(name);
        if path.file_name().map(|f| f != name.as_str()).unwrap_or(true) {
            return Err(LooperError::Session(format!("Invalid audio file name: {}", name)));
        }
        let raw = codec::read_wav_file(&path)?;
        let buffer = if raw.sample_rate() == sample_rate {
            raw
        } else {
            codec::resample(&raw, sample_rate)?
        };
        let shared = Arc::new(buffer);
        cache.insert(name.clone(), shared.clone());
        Ok(shared)
    };

    let mut tracks = Vec::with_capacity(data.tracks.len());
    for track in &data.tracks {
        let buffer = track.audio.as_ref().map(&mut load).transpose()?;
        let entries = track
            .history
            .iter()
            .map(|entry| entry.as_ref().map(&mut load).transpose())
            .collect::<Result<Vec<Snapshot>>>()?;
        let history = if entries.is_empty() {
            History::from_entries(vec![buffer.clone()], None)
        } else {
            History::from_entries(entries, track.history_cursor)
        };
        let mut mix = MixerTrackState {
            volume: track.volume,
            is_muted: track.muted,
            is_soloed: track.solo,
        };
        mix.set_volume(track.volume);
        tracks.push(LoadedTrack {
            mix,
            fx: track.fx.sanitized(),
            buffer,
            history,
        });
    }
    info!("Loaded session from {}", dir.display());
    Ok(LoadedSession { data, tracks })
}

/// Every directory under `root` that holds a `session.json`, sorted by path.
pub fn list_sessions(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        warn!("Sessions directory {} does not exist", root.display());
        return Vec::new();
    }
    let mut sessions: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == SESSION_FILE)
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    sessions.sort();
    sessions
}
