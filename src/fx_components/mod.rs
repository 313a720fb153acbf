// src/fx_components/mod.rs

// Declare all component modules
pub mod biquad;
pub mod compressor;
pub mod delay;
pub mod lfo;
pub mod phaser;
pub mod reverb;
pub mod smoothing;

pub use biquad::{Biquad, BiquadKind, ThreeBandEq};
pub use compressor::Compressor;
pub use delay::DelayLine;
pub use lfo::Lfo;
pub use phaser::Phaser;
pub use reverb::Reverb;
pub use smoothing::SmoothedParam;

use crate::fx::FxParam;

/// A common interface for the audio processors of a track's FX rack.
///
/// Components live on the audio thread. Parameter changes arrive as ramps, never as
/// jumps, so a moving control never clicks.
pub trait DspComponent: Send {
    /// Starts moving `param` towards `target`. Parameters the component does not own are
    /// ignored.
    fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64);

    /// Processes a single audio sample.
    fn process_audio(&mut self, input: f32) -> f32;
}
