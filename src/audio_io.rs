// src/audio_io.rs

//! cpal-backed implementations of the audio and capture capabilities.

use crate::audio_engine::command::AudioCommand;
use crate::audio_engine::{AudioEngine, PARAM_SCALER};
use crate::backend::{AudioBackend, CaptureDevice, CapturedAudio, SourceId, SourceStart};
use crate::buffer::samples_for;
use crate::error::{LooperError, Result};
use crate::fx::FxParam;
use crate::fx_graph::FxTopology;
use crate::metronome::ClickEvent;
use crate::settings::AppSettings;
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Host, Sample, SampleFormat, Stream, StreamConfig};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

const COMMAND_QUEUE_SIZE: usize = 1024;
/// Seconds of mono input buffered between the input callback and `poll`.
const INPUT_QUEUE_SECS: usize = 4;
/// Bound on the monitor ring, which is also the worst-case monitor latency.
const MONITOR_QUEUE_MS: usize = 50;

/// Picks the host by name, falling back to the platform default.
fn select_host(host_name: Option<&str>) -> Host {
    if let Some(name) = host_name {
        let found = cpal::available_hosts()
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name));
        match found.map(cpal::host_from_id) {
            Some(Ok(host)) => return host,
            Some(Err(e)) => warn!("Audio host {} unavailable: {}", name, e),
            None => warn!("Audio host not found: {}", name),
        }
    }
    cpal::default_host()
}

fn find_output_device(host: &Host, name: Option<&str>) -> anyhow::Result<Device> {
    if let Some(name) = name {
        if let Some(device) = host
            .output_devices()?
            .find(|d| d.name().ok().as_deref() == Some(name))
        {
            return Ok(device);
        }
        warn!("Output device not found: {}, using the default", name);
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

fn find_input_device(host: &Host, name: Option<&str>) -> Option<Device> {
    if let Some(name) = name {
        let found = host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().ok().as_deref() == Some(name)));
        if found.is_some() {
            return found;
        }
        warn!("Input device not found: {}, using the default", name);
    }
    host.default_input_device()
}

fn apply_overrides(config: &mut StreamConfig, settings: &AppSettings) {
    if let Some(sr) = settings.sample_rate {
        config.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(bs) = settings.buffer_size {
        config.buffer_size = BufferSize::Fixed(bs);
    }
}

/// Opens the output stream and the (not yet started) input device.
pub fn open(settings: &AppSettings, num_tracks: usize) -> anyhow::Result<(CpalBackend, CpalCapture)> {
    let host = select_host(settings.host_name.as_deref());
    let output_device = find_output_device(&host, settings.output_device.as_deref())?;
    info!("Using output device: {}", output_device.name()?);

    let default_output_config = output_device.default_output_config()?;
    let sample_format = default_output_config.sample_format();
    let mut config: StreamConfig = default_output_config.into();
    apply_overrides(&mut config, settings);
    let sample_rate = config.sample_rate.0;

    let (command_producer, command_consumer) = HeapRb::<AudioCommand>::new(COMMAND_QUEUE_SIZE).split();
    let monitor_len = (sample_rate as usize * MONITOR_QUEUE_MS / 1000).max(1);
    let (monitor_producer, monitor_consumer) = HeapRb::<f32>::new(monitor_len).split();
    let frame_clock = Arc::new(AtomicU64::new(0));
    let cpu_load = Arc::new(AtomicU32::new(0));
    let xrun_count = Arc::new(AtomicUsize::new(0));
    let engine = AudioEngine::new(
        command_consumer,
        sample_rate as f32,
        num_tracks,
        frame_clock.clone(),
        cpu_load.clone(),
    )
    .with_monitor_input(monitor_consumer);

    let stream = match sample_format {
        SampleFormat::F32 => build_output_stream::<f32>(&output_device, &config, engine, xrun_count.clone())?,
        SampleFormat::I16 => build_output_stream::<i16>(&output_device, &config, engine, xrun_count.clone())?,
        SampleFormat::U16 => build_output_stream::<u16>(&output_device, &config, engine, xrun_count.clone())?,
        format => return Err(anyhow!("Unsupported sample format {}", format)),
    };
    stream.play()?;
    info!(
        "Started output stream: {} Hz, {:?}",
        sample_rate, config.buffer_size
    );

    let backend = CpalBackend {
        command_producer,
        frame_clock,
        cpu_load,
        xrun_count: xrun_count.clone(),
        sample_rate,
        next_id: 0,
        _stream: stream,
    };
    let input_device = find_input_device(&host, settings.input_device.as_deref());
    let capture = CpalCapture::new(
        input_device,
        settings.clone(),
        xrun_count,
        monitor_producer,
        sample_rate,
    );
    Ok((backend, capture))
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut engine: AudioEngine,
    xrun_count: Arc<AtomicUsize>,
) -> anyhow::Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = move |err| {
        error!("an error occurred on output stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let mut mono: Vec<f32> = vec![];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            engine.handle_commands();
            mono.resize(data.len() / channels, 0.0);
            engine.process_buffer(&mut mono);
            for (frame, sample_value) in data.chunks_mut(channels).zip(mono.iter()) {
                for sample in frame.iter_mut() {
                    *sample = T::from_sample(*sample_value);
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// The sound card: owns the output stream and feeds the renderer through the command ring.
pub struct CpalBackend {
    command_producer: HeapProducer<AudioCommand>,
    frame_clock: Arc<AtomicU64>,
    cpu_load: Arc<AtomicU32>,
    xrun_count: Arc<AtomicUsize>,
    sample_rate: u32,
    next_id: u64,
    _stream: Stream,
}

impl CpalBackend {
    fn send(&mut self, command: AudioCommand) {
        if self.command_producer.push(command).is_err() {
            warn!("Audio command queue full, command dropped");
        }
    }

    fn frame_at(&self, when: f64) -> u64 {
        (when.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Fraction of the callback budget the last block used.
    pub fn cpu_load(&self) -> f32 {
        self.cpu_load.load(Ordering::Relaxed) as f32 / PARAM_SCALER
    }

    pub fn xruns(&self) -> usize {
        self.xrun_count.load(Ordering::Relaxed)
    }
}

impl AudioBackend for CpalBackend {
    fn now(&self) -> f64 {
        self.frame_clock.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_source(&mut self, start: SourceStart) -> SourceId {
        self.next_id += 1;
        let id = SourceId(self.next_id);
        let command = AudioCommand::StartSource {
            id,
            track: start.track,
            loop_samples: samples_for(start.loop_length, self.sample_rate),
            start_frame: self.frame_at(start.when),
            offset_samples: samples_for(start.offset, self.sample_rate),
            buffer: start.buffer,
        };
        self.send(command);
        id
    }

    fn stop_source(&mut self, id: SourceId) {
        self.send(AudioCommand::StopSource(id));
    }

    fn connect_fx(&mut self, track: usize, topology: &FxTopology) {
        self.send(AudioCommand::ConnectFx {
            track,
            stages: topology.stages.clone(),
        });
    }

    fn ramp_fx_param(&mut self, track: usize, param: FxParam, target: f32, time_constant: f64) {
        self.send(AudioCommand::RampFxParam {
            track,
            param,
            target,
            time_constant,
        });
    }

    fn ramp_track_gain(&mut self, track: usize, target: f32, time_constant: f64) {
        self.send(AudioCommand::RampTrackGain {
            track,
            target,
            time_constant,
        });
    }

    fn ramp_metronome_gain(&mut self, target: f32, time_constant: f64) {
        self.send(AudioCommand::RampMetronomeGain {
            target,
            time_constant,
        });
    }

    fn ramp_monitor_gain(&mut self, target: f32, time_constant: f64) {
        self.send(AudioCommand::RampMonitorGain {
            target,
            time_constant,
        });
    }

    fn schedule_click(&mut self, click: ClickEvent) {
        let start_frame = self.frame_at(click.time);
        self.send(AudioCommand::ScheduleClick {
            start_frame,
            frequency: click.frequency(),
            level: click.level(),
        });
    }
}

struct OpenInput {
    stream: Stream,
    consumer: HeapConsumer<f32>,
    sample_rate: u32,
    latency: f64,
}

/// Where the input callback sends what it hears.
struct InputTaps {
    capture: HeapProducer<f32>,
    monitor: Option<HeapProducer<f32>>,
    capturing: Arc<AtomicBool>,
    monitoring: Arc<AtomicBool>,
    xrun_count: Arc<AtomicUsize>,
}

/// The shared microphone. The input stream is opened on the first `start` (or when
/// monitoring is switched on) and kept for the rest of the run; between takes the
/// callback only feeds the monitor ring, if anything.
pub struct CpalCapture {
    device: Option<Device>,
    settings: AppSettings,
    xrun_count: Arc<AtomicUsize>,
    capturing: Arc<AtomicBool>,
    monitoring: Arc<AtomicBool>,
    monitor_out: Option<HeapProducer<f32>>,
    output_sample_rate: u32,
    input: Option<OpenInput>,
    chunks: Vec<Vec<f32>>,
}

impl CpalCapture {
    fn new(
        device: Option<Device>,
        settings: AppSettings,
        xrun_count: Arc<AtomicUsize>,
        monitor_out: HeapProducer<f32>,
        output_sample_rate: u32,
    ) -> Self {
        Self {
            device,
            settings,
            xrun_count,
            capturing: Arc::new(AtomicBool::new(false)),
            monitoring: Arc::new(AtomicBool::new(false)),
            monitor_out: Some(monitor_out),
            output_sample_rate,
            input: None,
            chunks: Vec::new(),
        }
    }

    fn ensure_input(&mut self) -> Result<&mut OpenInput> {
        if self.input.is_none() {
            self.input = Some(self.open_input()?);
        }
        self.input
            .as_mut()
            .ok_or_else(|| LooperError::RecorderStartFailure("input not open".to_string()))
    }

    fn open_input(&mut self) -> Result<OpenInput> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| LooperError::PermissionDenied("no input device".to_string()))?;
        let denied = |e: &dyn std::fmt::Display| LooperError::PermissionDenied(e.to_string());
        let default_config = device.default_input_config().map_err(|e| denied(&e))?;
        let sample_format = default_config.sample_format();
        let mut config: StreamConfig = default_config.into();
        apply_overrides(&mut config, &self.settings);
        let sample_rate = config.sample_rate.0;

        let (producer, consumer) = HeapRb::<f32>::new(sample_rate as usize * INPUT_QUEUE_SECS).split();
        // The monitor ring is played back unresampled, so it is only wired at a matching rate.
        let monitor = if sample_rate == self.output_sample_rate {
            self.monitor_out.take()
        } else {
            warn!(
                "Input runs at {} Hz, output at {} Hz: monitoring disabled",
                sample_rate, self.output_sample_rate
            );
            None
        };
        let taps = InputTaps {
            capture: producer,
            monitor,
            capturing: self.capturing.clone(),
            monitoring: self.monitoring.clone(),
            xrun_count: self.xrun_count.clone(),
        };
        let stream = match sample_format {
            SampleFormat::F32 => build_input_stream::<f32>(device, &config, taps),
            SampleFormat::I16 => build_input_stream::<i16>(device, &config, taps),
            SampleFormat::U16 => build_input_stream::<u16>(device, &config, taps),
            format => Err(anyhow!("Unsupported sample format {}", format)),
        }
        .map_err(|e| denied(&e))?;

        let latency = match config.buffer_size {
            BufferSize::Fixed(frames) => frames as f64 / sample_rate as f64,
            BufferSize::Default => 0.0,
        };
        info!(
            "Opened input device {} at {} Hz",
            device.name().unwrap_or_default(),
            sample_rate
        );
        Ok(OpenInput {
            stream,
            consumer,
            sample_rate,
            latency,
        })
    }
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut taps: InputTaps,
) -> anyhow::Result<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let err_fn = {
        let xrun_count = taps.xrun_count.clone();
        move |err| {
            error!("an error occurred on input stream: {}", err);
            xrun_count.fetch_add(1, Ordering::Relaxed);
        }
    };
    let channels = config.channels as usize;

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let capturing = taps.capturing.load(Ordering::Relaxed);
            let monitoring = taps.monitoring.load(Ordering::Relaxed);
            if !capturing && !monitoring {
                return;
            }
            let mut overrun = false;
            for frame in data.chunks(channels) {
                let mono_sample =
                    frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / (channels as f32);
                if capturing && !overrun && taps.capture.push(mono_sample).is_err() {
                    taps.xrun_count.fetch_add(1, Ordering::Relaxed);
                    overrun = true;
                }
                if monitoring {
                    if let Some(monitor) = taps.monitor.as_mut() {
                        // A full ring drops input rather than letting latency grow.
                        let _ = monitor.push(mono_sample);
                    }
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

impl CaptureDevice for CpalCapture {
    fn start(&mut self) -> Result<()> {
        self.chunks.clear();
        let input = self.ensure_input()?;
        let stale = input.consumer.len();
        input.consumer.skip(stale);
        input
            .stream
            .play()
            .map_err(|e| LooperError::RecorderStartFailure(e.to_string()))?;
        self.capturing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn poll(&mut self) {
        if !self.is_capturing() {
            return;
        }
        if let Some(input) = self.input.as_mut() {
            let pending = input.consumer.len();
            if pending > 0 {
                let mut chunk = vec![0.0; pending];
                let read = input.consumer.pop_slice(&mut chunk);
                chunk.truncate(read);
                self.chunks.push(chunk);
            }
        }
    }

    fn stop(&mut self) -> Option<CapturedAudio> {
        if !self.is_capturing() {
            return None;
        }
        self.poll();
        self.capturing.store(false, Ordering::Relaxed);
        let input = self.input.as_ref()?;
        if !self.monitoring.load(Ordering::Relaxed) {
            if let Err(e) = input.stream.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
        }
        Some(CapturedAudio::Pcm {
            chunks: std::mem::take(&mut self.chunks),
            sample_rate: input.sample_rate,
        })
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }

    fn latency(&self) -> f64 {
        self.input.as_ref().map_or(0.0, |i| i.latency)
    }

    fn set_monitoring(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            let input = self.ensure_input()?;
            input
                .stream
                .play()
                .map_err(|e| LooperError::RecorderStartFailure(e.to_string()))?;
            self.monitoring.store(true, Ordering::Relaxed);
            return Ok(());
        }
        self.monitoring.store(false, Ordering::Relaxed);
        if let Some(input) = self.input.as_ref() {
            if !self.is_capturing() {
                if let Err(e) = input.stream.pause() {
                    warn!("Failed to pause input stream: {}", e);
                }
            }
        }
        Ok(())
    }
}
