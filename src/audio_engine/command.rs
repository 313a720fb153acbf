// src/audio_engine/command.rs

use crate::backend::SourceId;
use crate::buffer::SharedBuffer;
use crate::fx::{FxParam, FxStage};

/// Everything the control thread can ask of the audio thread. Times are absolute
/// frame positions on the engine's frame clock.
#[derive(Debug)]
pub enum AudioCommand {
    StartSource {
        id: SourceId,
        track: usize,
        buffer: SharedBuffer,
        loop_samples: usize,
        start_frame: u64,
        offset_samples: usize,
    },
    StopSource(SourceId),

    // --- FX Commands ---
    ConnectFx {
        track: usize,
        stages: Vec<FxStage>,
    },
    RampFxParam {
        track: usize,
        param: FxParam,
        target: f32,
        time_constant: f64,
    },

    // --- Mixer Commands ---
    RampTrackGain {
        track: usize,
        target: f32,
        time_constant: f64,
    },
    RampMetronomeGain {
        target: f32,
        time_constant: f64,
    },
    RampMonitorGain {
        target: f32,
        time_constant: f64,
    },

    ScheduleClick {
        start_frame: u64,
        frequency: f32,
        level: f32,
    },
}
