// src/fx.rs

//! Per-track effect parameter set.
//!
//! Five fixed modules, each with an `on` flag and a handful of named values. This is
//! pure data: it is what gets persisted with a session and what the graph builder
//! reads to decide the live topology.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EqParams {
    pub on: bool,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            on: false,
            low: 0.0,
            mid: 0.0,
            high: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CompParams {
    pub on: bool,
    pub threshold: f32,
    pub ratio: f32,
    pub attack: f32,
}

impl Default for CompParams {
    fn default() -> Self {
        Self {
            on: false,
            threshold: -24.0,
            ratio: 12.0,
            attack: 0.003,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PhaserParams {
    pub on: bool,
    pub freq: f32,
    pub depth: f32,
}

impl Default for PhaserParams {
    fn default() -> Self {
        Self {
            on: false,
            freq: 700.0,
            depth: 0.7,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DelayParams {
    pub on: bool,
    pub time: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            on: false,
            time: 0.3,
            feedback: 0.4,
            mix: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ReverbParams {
    pub on: bool,
    pub mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self { on: false, mix: 0.4 }
    }
}

/// The complete effect settings of one track.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct FxParams {
    pub eq: EqParams,
    pub comp: CompParams,
    pub phaser: PhaserParams,
    pub delay: DelayParams,
    pub reverb: ReverbParams,
}

/// One stage of the chain, in chain order, carrying its own parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FxStage {
    Eq(EqParams),
    Compressor(CompParams),
    Phaser(PhaserParams),
    DelayMix(DelayParams),
    ReverbMix(ReverbParams),
}

impl FxStage {
    pub fn module(&self) -> FxModule {
        match self {
            FxStage::Eq(_) => FxModule::Eq,
            FxStage::Compressor(_) => FxModule::Comp,
            FxStage::Phaser(_) => FxModule::Phaser,
            FxStage::DelayMix(_) => FxModule::Delay,
            FxStage::ReverbMix(_) => FxModule::Reverb,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            FxStage::Eq(p) => p.on,
            FxStage::Compressor(p) => p.on,
            FxStage::Phaser(p) => p.on,
            FxStage::DelayMix(p) => p.on,
            FxStage::ReverbMix(p) => p.on,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FxModule {
    Eq,
    Comp,
    Phaser,
    Delay,
    Reverb,
}

impl FxModule {
    pub const ALL: [FxModule; 5] = [
        FxModule::Eq,
        FxModule::Comp,
        FxModule::Phaser,
        FxModule::Delay,
        FxModule::Reverb,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FxModule::Eq => "eq",
            FxModule::Comp => "comp",
            FxModule::Phaser => "phaser",
            FxModule::Delay => "delay",
            FxModule::Reverb => "reverb",
        }
    }
}

impl fmt::Display for FxModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FxModule::Eq => write!(f, "EQ"),
            FxModule::Comp => write!(f, "Compressor"),
            FxModule::Phaser => write!(f, "Phaser"),
            FxModule::Delay => write!(f, "Delay"),
            FxModule::Reverb => write!(f, "Reverb"),
        }
    }
}

impl FromStr for FxModule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FxModule::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown FX module: {}", s))
    }
}

/// Every continuously adjustable value of the parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FxParam {
    EqLow,
    EqMid,
    EqHigh,
    CompThreshold,
    CompRatio,
    CompAttack,
    PhaserFreq,
    PhaserDepth,
    DelayTime,
    DelayFeedback,
    DelayMix,
    ReverbMix,
}

impl FxParam {
    pub const ALL: [FxParam; 12] = [
        FxParam::EqLow,
        FxParam::EqMid,
        FxParam::EqHigh,
        FxParam::CompThreshold,
        FxParam::CompRatio,
        FxParam::CompAttack,
        FxParam::PhaserFreq,
        FxParam::PhaserDepth,
        FxParam::DelayTime,
        FxParam::DelayFeedback,
        FxParam::DelayMix,
        FxParam::ReverbMix,
    ];

    pub fn module(self) -> FxModule {
        match self {
            FxParam::EqLow | FxParam::EqMid | FxParam::EqHigh => FxModule::Eq,
            FxParam::CompThreshold | FxParam::CompRatio | FxParam::CompAttack => FxModule::Comp,
            FxParam::PhaserFreq | FxParam::PhaserDepth => FxModule::Phaser,
            FxParam::DelayTime | FxParam::DelayFeedback | FxParam::DelayMix => FxModule::Delay,
            FxParam::ReverbMix => FxModule::Reverb,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            FxParam::EqLow => "low",
            FxParam::EqMid => "mid",
            FxParam::EqHigh => "high",
            FxParam::CompThreshold => "threshold",
            FxParam::CompRatio => "ratio",
            FxParam::CompAttack => "attack",
            FxParam::PhaserFreq => "freq",
            FxParam::PhaserDepth => "depth",
            FxParam::DelayTime => "time",
            FxParam::DelayFeedback => "feedback",
            FxParam::DelayMix | FxParam::ReverbMix => "mix",
        }
    }

    /// Inclusive range the value is clamped into.
    pub fn range(self) -> (f32, f32) {
        match self {
            FxParam::EqLow | FxParam::EqMid | FxParam::EqHigh => (-20.0, 20.0),
            FxParam::CompThreshold => (-100.0, 0.0),
            FxParam::CompRatio => (1.0, 20.0),
            FxParam::CompAttack => (0.0, 0.1),
            FxParam::PhaserFreq => (20.0, 2000.0),
            FxParam::PhaserDepth => (0.0, 1.0),
            FxParam::DelayTime => (0.01, 1.0),
            FxParam::DelayFeedback => (0.0, 0.9),
            FxParam::DelayMix | FxParam::ReverbMix => (0.0, 1.0),
        }
    }

    pub fn clamp(self, value: f32) -> f32 {
        let (lo, hi) = self.range();
        if value.is_nan() {
            lo
        } else {
            value.clamp(lo, hi)
        }
    }
}

impl fmt::Display for FxParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module().key(), self.key())
    }
}

/// Parses the `module.param` form, e.g. `delay.time`.
impl FromStr for FxParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, param) = s
            .split_once('.')
            .ok_or_else(|| format!("Expected MODULE.PARAM, got: {}", s))?;
        let module: FxModule = module.parse()?;
        FxParam::ALL
            .into_iter()
            .find(|p| p.module() == module && p.key().eq_ignore_ascii_case(param))
            .ok_or_else(|| format!("Unknown parameter {} for {}", param, module))
    }
}

impl FxParams {
    /// The five stages in chain order, enabled or not.
    pub fn stages(&self) -> [FxStage; 5] {
        [
            FxStage::Eq(self.eq),
            FxStage::Compressor(self.comp),
            FxStage::Phaser(self.phaser),
            FxStage::DelayMix(self.delay),
            FxStage::ReverbMix(self.reverb),
        ]
    }

    pub fn is_enabled(&self, module: FxModule) -> bool {
        match module {
            FxModule::Eq => self.eq.on,
            FxModule::Comp => self.comp.on,
            FxModule::Phaser => self.phaser.on,
            FxModule::Delay => self.delay.on,
            FxModule::Reverb => self.reverb.on,
        }
    }

    /// Sets a module's flag; returns whether it actually changed.
    pub fn set_enabled(&mut self, module: FxModule, on: bool) -> bool {
        let flag = match module {
            FxModule::Eq => &mut self.eq.on,
            FxModule::Comp => &mut self.comp.on,
            FxModule::Phaser => &mut self.phaser.on,
            FxModule::Delay => &mut self.delay.on,
            FxModule::Reverb => &mut self.reverb.on,
        };
        let changed = *flag != on;
        *flag = on;
        changed
    }

    pub fn get(&self, param: FxParam) -> f32 {
        match param {
            FxParam::EqLow => self.eq.low,
            FxParam::EqMid => self.eq.mid,
            FxParam::EqHigh => self.eq.high,
            FxParam::CompThreshold => self.comp.threshold,
            FxParam::CompRatio => self.comp.ratio,
            FxParam::CompAttack => self.comp.attack,
            FxParam::PhaserFreq => self.phaser.freq,
            FxParam::PhaserDepth => self.phaser.depth,
            FxParam::DelayTime => self.delay.time,
            FxParam::DelayFeedback => self.delay.feedback,
            FxParam::DelayMix => self.delay.mix,
            FxParam::ReverbMix => self.reverb.mix,
        }
    }

    /// Stores `value` clamped into the parameter's range and returns what was stored.
    pub fn set(&mut self, param: FxParam, value: f32) -> f32 {
        let value = param.clamp(value);
        let slot = match param {
            FxParam::EqLow => &mut self.eq.low,
            FxParam::EqMid => &mut self.eq.mid,
            FxParam::EqHigh => &mut self.eq.high,
            FxParam::CompThreshold => &mut self.comp.threshold,
            FxParam::CompRatio => &mut self.comp.ratio,
            FxParam::CompAttack => &mut self.comp.attack,
            FxParam::PhaserFreq => &mut self.phaser.freq,
            FxParam::PhaserDepth => &mut self.phaser.depth,
            FxParam::DelayTime => &mut self.delay.time,
            FxParam::DelayFeedback => &mut self.delay.feedback,
            FxParam::DelayMix => &mut self.delay.mix,
            FxParam::ReverbMix => &mut self.reverb.mix,
        };
        *slot = value;
        value
    }

    /// Clamps every value, e.g. after loading hand-edited session JSON.
    pub fn sanitized(mut self) -> Self {
        for param in FxParam::ALL {
            let v = self.get(param);
            self.set(param, v);
        }
        self
    }
}
