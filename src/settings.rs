use crate::buffer::FitMode;
use crate::transport::DEFAULT_LOOP_MEASURES;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_METRONOME_VOLUME: f32 = 0.4;
/// Level of the live input in the output while monitoring is on.
pub const DEFAULT_MONITOR_LEVEL: f32 = 0.18;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    pub input_latency_compensation_ms: f32,
    pub fit_mode: FitMode,
    pub metronome_volume: f32,
    pub monitor_level: f32,
    pub default_loop_measures: u32,
    pub sessions_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host_name: None,
            input_device: None,
            output_device: None,
            sample_rate: None,
            buffer_size: None,
            input_latency_compensation_ms: 0.0,
            fit_mode: FitMode::Trim,
            metronome_volume: DEFAULT_METRONOME_VOLUME,
            monitor_level: DEFAULT_MONITOR_LEVEL,
            default_loop_measures: DEFAULT_LOOP_MEASURES,
            sessions_dir: None,
        }
    }
}

impl AppSettings {
    pub fn input_latency_secs(&self) -> f64 {
        (self.input_latency_compensation_ms.max(0.0) as f64) / 1000.0
    }

    /// Where sessions are saved by default: the override, or `Sessions` in the config dir.
    pub fn sessions_root(&self) -> Option<PathBuf> {
        self.sessions_dir
            .clone()
            .or_else(|| get_config_dir().map(|dir| dir.join("Sessions")))
    }
}

/// The per-user config directory, falling back to an `AppSettings` folder next to the
/// executable. Created on first use.
pub fn get_config_dir() -> Option<PathBuf> {
    let dir = ProjectDirs::from("", "", "octoloop")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| {
            env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|p| p.join("AppSettings")))
        });
    let Some(dir) = dir else {
        error!("Could not determine a configuration directory.");
        return None;
    };
    for sub in [dir.clone(), dir.join("Sessions")] {
        if !sub.exists() {
            if let Err(e) = fs::create_dir_all(&sub) {
                error!("Failed to create directory at {}: {}", sub.display(), e);
                return None;
            }
        }
    }
    Some(dir)
}

pub fn save_settings_to(dir: &Path, settings: &AppSettings) {
    let path = dir.join(SETTINGS_FILE);
    match serde_json::to_string_pretty(settings) {
        Ok(json_string) => {
            if let Err(e) = fs::write(&path, json_string) {
                error!("Failed to write settings to {}: {}", path.display(), e);
            }
        }
        Err(e) => {
            error!("Failed to serialize settings: {}", e);
        }
    }
}

pub fn load_settings_from(dir: &Path) -> AppSettings {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return AppSettings::default();
    }
    match fs::read_to_string(&path) {
        Ok(json_string) => match serde_json::from_str(&json_string) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to parse settings file, using defaults. Error: {}", e);
                AppSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read settings file, using defaults. Error: {}", e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) {
    if let Some(dir) = get_config_dir() {
        save_settings_to(&dir, settings);
    }
}

pub fn load_settings() -> AppSettings {
    get_config_dir()
        .map(|dir| load_settings_from(&dir))
        .unwrap_or_default()
}
