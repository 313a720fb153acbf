// src/error.rs

//! Error taxonomy for the loop engine.
//!
//! Nothing in here is fatal: every failure is caught at the operation boundary,
//! surfaced as a [`Notification`], and the engine is left in its last consistent state.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Decode failed: {0}")]
    DecodeFailure(String),

    #[error("Recorder failed to start: {0}")]
    RecorderStartFailure(String),

    #[error("No such track: {0}")]
    InvalidTrack(usize),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Nothing recorded")]
    NothingRecorded,

    #[error("Resampling failed: {0}Hz -> {1}Hz")]
    Resample(u32, u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LooperError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A transient, user-facing message (the host decides how to show it).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl From<&LooperError> for Notification {
    fn from(err: &LooperError) -> Self {
        match err {
            LooperError::PermissionDenied(_) => {
                Notification::error("Mic blocked. Allow microphone access and retry.")
            }
            LooperError::DecodeFailure(_) => Notification::error("Decode failed."),
            LooperError::RecorderStartFailure(_) => Notification::error("Recorder failed."),
            LooperError::NothingRecorded => Notification::warning("Record something first."),
            other => Notification::error(other.to_string()),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warn",
            NotificationLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}
