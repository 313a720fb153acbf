// src/audio_engine.rs

//! The real-time renderer.
//!
//! Owned by the output stream callback. The control thread talks to it only through the
//! command ring; the only thing flowing back is the frame clock, which is the audio
//! clock every scheduling decision is made against. Live input for monitoring arrives
//! on a separate ring fed by the input stream.

pub mod click;
pub mod command;
pub mod fx_rack;
mod helpers;
pub mod voice;

use crate::fx_components::SmoothedParam;
use click::ClickVoice;
use command::AudioCommand;
use fx_rack::FxRack;
use helpers::Limiter;
use ringbuf::HeapConsumer;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use voice::LoopVoice;

pub const PARAM_SCALER: f32 = 1_000_000.0;
const MAX_BLOCK_SIZE: usize = 4096;

/// One track's output stage: its voices are summed into `scratch`, run through the
/// rack, then scaled by the smoothed gain.
struct TrackChannel {
    rack: FxRack,
    gain: SmoothedParam,
    scratch: Vec<f32>,
}

impl TrackChannel {
    fn new(sample_rate: f32) -> Self {
        Self {
            rack: FxRack::new(sample_rate),
            gain: SmoothedParam::new(0.0),
            scratch: vec![0.0; MAX_BLOCK_SIZE],
        }
    }
}

pub struct AudioEngine {
    command_consumer: HeapConsumer<AudioCommand>,
    sample_rate: f32,
    frame_clock: Arc<AtomicU64>,
    cpu_load: Arc<AtomicU32>,
    voices: Vec<LoopVoice>,
    clicks: Vec<ClickVoice>,
    channels: Vec<TrackChannel>,
    metronome_gain: SmoothedParam,
    monitor_input: Option<HeapConsumer<f32>>,
    monitor_gain: SmoothedParam,
    limiter: Limiter,
}

impl AudioEngine {
    pub fn new(
        command_consumer: HeapConsumer<AudioCommand>,
        sample_rate: f32,
        num_tracks: usize,
        frame_clock: Arc<AtomicU64>,
        cpu_load: Arc<AtomicU32>,
    ) -> Self {
        Self {
            command_consumer,
            sample_rate,
            frame_clock,
            cpu_load,
            voices: Vec::with_capacity(num_tracks * 2),
            clicks: Vec::with_capacity(16),
            channels: (0..num_tracks).map(|_| TrackChannel::new(sample_rate)).collect(),
            metronome_gain: SmoothedParam::new(0.0),
            monitor_input: None,
            monitor_gain: SmoothedParam::new(0.0),
            limiter: Limiter::new(sample_rate),
        }
    }

    /// Routes live input samples into the mix through the monitor gain.
    pub fn with_monitor_input(mut self, input: HeapConsumer<f32>) -> Self {
        self.monitor_input = Some(input);
        self
    }

    pub fn handle_commands(&mut self) {
        while let Some(command) = self.command_consumer.pop() {
            match command {
                AudioCommand::StartSource {
                    id,
                    track,
                    buffer,
                    loop_samples,
                    start_frame,
                    offset_samples,
                } => {
                    if track < self.channels.len() {
                        self.voices.push(LoopVoice::new(
                            id,
                            track,
                            buffer,
                            loop_samples,
                            start_frame,
                            offset_samples,
                        ));
                    }
                }
                AudioCommand::StopSource(id) => self.voices.retain(|v| v.id != id),
                AudioCommand::ConnectFx { track, stages } => {
                    if let Some(channel) = self.channels.get_mut(track) {
                        channel.rack.connect(stages);
                    }
                }
                AudioCommand::RampFxParam {
                    track,
                    param,
                    target,
                    time_constant,
                } => {
                    if let Some(channel) = self.channels.get_mut(track) {
                        channel.rack.ramp_param(param, target, time_constant);
                    }
                }
                AudioCommand::RampTrackGain {
                    track,
                    target,
                    time_constant,
                } => {
                    if let Some(channel) = self.channels.get_mut(track) {
                        channel
                            .gain
                            .set_target(target, time_constant, self.sample_rate);
                    }
                }
                AudioCommand::RampMetronomeGain {
                    target,
                    time_constant,
                } => self
                    .metronome_gain
                    .set_target(target, time_constant, self.sample_rate),
                AudioCommand::RampMonitorGain {
                    target,
                    time_constant,
                } => self
                    .monitor_gain
                    .set_target(target, time_constant, self.sample_rate),
                AudioCommand::ScheduleClick {
                    start_frame,
                    frequency,
                    level,
                } => self.clicks.push(ClickVoice::new(
                    start_frame,
                    frequency,
                    level,
                    self.sample_rate,
                )),
            }
        }
    }

    /// Renders the next `output.len()` frames and advances the frame clock.
    pub fn process_buffer(&mut self, output: &mut [f32]) {
        let start_time = Instant::now();
        let first_frame = self.frame_clock.load(Ordering::Relaxed);
        output.fill(0.0);

        // Oversized device blocks are rendered in slices so scratch never reallocates.
        let mut done = 0;
        while done < output.len() {
            let len = (output.len() - done).min(MAX_BLOCK_SIZE);
            self.render_block(&mut output[done..done + len], first_frame + done as u64);
            done += len;
        }

        let end_frame = first_frame + output.len() as u64;
        self.clicks.retain(|c| !c.is_finished(end_frame));
        self.frame_clock.store(end_frame, Ordering::Relaxed);

        let budget = output.len() as f32 / self.sample_rate;
        if budget > 0.0 {
            let load = start_time.elapsed().as_secs_f32() / budget;
            self.cpu_load
                .store((load * PARAM_SCALER) as u32, Ordering::Relaxed);
        }
    }

    fn render_block(&mut self, output: &mut [f32], first_frame: u64) {
        let len = output.len();
        for (track, channel) in self.channels.iter_mut().enumerate() {
            let scratch = &mut channel.scratch[..len];
            scratch.fill(0.0);
            for voice in self.voices.iter().filter(|v| v.track == track) {
                voice.render_into(scratch, first_frame);
            }
            channel.rack.process_buffer(scratch);
            for (out, s) in output.iter_mut().zip(scratch.iter()) {
                *out += *s * channel.gain.next();
            }
        }

        for (i, out) in output.iter_mut().enumerate() {
            let frame = first_frame + i as u64;
            let click: f32 = self.clicks.iter().map(|c| c.sample_at(frame)).sum();
            *out += click * self.metronome_gain.next();
            // Input is drained even while muted so it never plays back stale.
            let live = self
                .monitor_input
                .as_mut()
                .and_then(|input| input.pop())
                .unwrap_or(0.0);
            *out += live * self.monitor_gain.next();
            *out = self.limiter.process(*out);
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}
