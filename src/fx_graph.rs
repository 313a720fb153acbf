// src/fx_graph.rs

//! Explicit FX routing graph.
//!
//! Each track's output stage is described as data: the ordered list of enabled
//! stages plus the node-to-node edges that list implies. The renderer interprets
//! the stage list; the edges describe the same wiring for inspection and tests.
//!
//! Toggling a stage always rebuilds the whole topology from the current flags. Moving a
//! parameter never does: it becomes a smoothed ramp on the already-connected stage.

use crate::fx::{FxModule, FxParam, FxParams, FxStage};

/// Time constant of the exponential approach used for every live parameter change.
pub const RAMP_TIME_CONSTANT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FxNode {
    Input,
    EqLow,
    EqMid,
    EqHigh,
    Compressor,
    Phaser,
    DelayDry,
    Delay,
    DelayWet,
    DelayFeedback,
    DelaySum,
    ReverbDry,
    Reverb,
    ReverbWet,
    Output,
}

pub type Edge = (FxNode, FxNode);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FxTopology {
    /// Enabled stages in chain order.
    pub stages: Vec<FxStage>,
    pub edges: Vec<Edge>,
}

impl FxTopology {
    /// Builds the wiring for `params` from scratch.
    ///
    /// `Input -> [EQ] -> [Compressor] -> [Phaser] -> [Delay mix] -> [Reverb mix] -> Output`,
    /// where a disabled stage is absent rather than zeroed. The delay's feedback loop is
    /// always wired, even while the delay stage is out of the chain.
    pub fn build(params: &FxParams) -> Self {
        let mut edges = vec![
            (FxNode::Delay, FxNode::DelayFeedback),
            (FxNode::DelayFeedback, FxNode::Delay),
        ];
        let mut stages = Vec::new();
        let mut last = FxNode::Input;

        for stage in params.stages() {
            if !stage.enabled() {
                continue;
            }
            stages.push(stage);
            match stage {
                FxStage::Eq(_) => {
                    edges.push((last, FxNode::EqLow));
                    edges.push((FxNode::EqLow, FxNode::EqMid));
                    edges.push((FxNode::EqMid, FxNode::EqHigh));
                    last = FxNode::EqHigh;
                }
                FxStage::Compressor(_) => {
                    edges.push((last, FxNode::Compressor));
                    last = FxNode::Compressor;
                }
                FxStage::Phaser(_) => {
                    edges.push((last, FxNode::Phaser));
                    last = FxNode::Phaser;
                }
                FxStage::DelayMix(_) => {
                    edges.push((last, FxNode::DelayDry));
                    edges.push((FxNode::DelayDry, FxNode::DelaySum));
                    edges.push((last, FxNode::Delay));
                    edges.push((FxNode::Delay, FxNode::DelayWet));
                    edges.push((FxNode::DelayWet, FxNode::DelaySum));
                    last = FxNode::DelaySum;
                }
                FxStage::ReverbMix(_) => {
                    edges.push((last, FxNode::ReverbDry));
                    edges.push((FxNode::ReverbDry, FxNode::Output));
                    edges.push((last, FxNode::Reverb));
                    edges.push((FxNode::Reverb, FxNode::ReverbWet));
                    edges.push((FxNode::ReverbWet, FxNode::Output));
                    last = FxNode::Output;
                }
            }
        }
        if last != FxNode::Output {
            edges.push((last, FxNode::Output));
        }
        Self { stages, edges }
    }

    pub fn connects(&self, from: FxNode, to: FxNode) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Whether `node` carries signal from the input, i.e. is reachable without the feedback pair.
    pub fn in_signal_path(&self, node: FxNode) -> bool {
        let mut frontier = vec![FxNode::Input];
        let mut seen = vec![FxNode::Input];
        while let Some(n) = frontier.pop() {
            if n == node {
                return true;
            }
            for &(from, to) in &self.edges {
                if from == n && !seen.contains(&to) {
                    seen.push(to);
                    frontier.push(to);
                }
            }
        }
        false
    }

    pub fn modules(&self) -> Vec<FxModule> {
        self.stages.iter().map(FxStage::module).collect()
    }

    pub fn is_bypassed(&self) -> bool {
        self.stages.is_empty()
    }
}

/// A smoothed change to one live parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRamp {
    pub param: FxParam,
    pub target: f32,
    pub time_constant: f64,
}

/// Owns the live topology of every track's output stage.
#[derive(Debug, Clone)]
pub struct FxGraphBuilder {
    topologies: Vec<FxTopology>,
    rebuilds: Vec<u64>,
}

impl FxGraphBuilder {
    pub fn new(num_tracks: usize) -> Self {
        let bypass = FxTopology::build(&FxParams::default());
        Self {
            topologies: vec![bypass; num_tracks],
            rebuilds: vec![0; num_tracks],
        }
    }

    pub fn topology(&self, track: usize) -> Option<&FxTopology> {
        self.topologies.get(track)
    }

    /// How many times the track's graph has been torn down and rewired.
    pub fn rebuild_count(&self, track: usize) -> u64 {
        self.rebuilds.get(track).copied().unwrap_or(0)
    }

    /// Discards the previous wiring of `track` and builds it again from `params`.
    pub fn rebuild(&mut self, track: usize, params: &FxParams) -> Option<&FxTopology> {
        let slot = self.topologies.get_mut(track)?;
        *slot = FxTopology::build(params);
        self.rebuilds[track] += 1;
        Some(slot)
    }

    /// Parameter moves never touch the wiring; they turn into a ramp on the live value.
    pub fn param_ramp(&self, param: FxParam, value: f32) -> ParamRamp {
        ParamRamp {
            param,
            target: param.clamp(value),
            time_constant: RAMP_TIME_CONSTANT,
        }
    }
}
