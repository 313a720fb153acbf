// src/codec.rs

//! Byte-level audio formats: WAV for sessions, anything symphonia can read for
//! captured takes, and sample-rate conversion.

use crate::backend::CapturedAudio;
use crate::buffer::AudioBuffer;
use crate::error::{LooperError, Result};
use rodio::source::Source;
use rodio::Decoder;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * i16::MAX as f32) as i16
    }
}

/// Encodes the buffer's first channel as a mono 16-bit PCM WAV.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), wav_spec(buffer.sample_rate()))?;
        for &sample in buffer.mono() {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

pub fn write_wav_file(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, wav_spec(buffer.sample_rate()))?;
    for &sample in buffer.mono() {
        writer.write_sample(to_i16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

fn read_wav<R: Read>(reader: hound::WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let num_channels = spec.channels.max(1) as usize;
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };
    let mut channels = vec![Vec::with_capacity(interleaved.len() / num_channels); num_channels];
    for frame in interleaved.chunks_exact(num_channels) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
    Ok(AudioBuffer::new(channels, spec.sample_rate))
}

pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    read_wav(hound::WavReader::new(Cursor::new(bytes))?)
}

pub fn read_wav_file(path: &Path) -> Result<AudioBuffer> {
    read_wav(hound::WavReader::new(BufReader::new(File::open(path)?))?)
}

fn decode_with<R>(source: R) -> Result<AudioBuffer>
where
    R: Read + Seek + Send + Sync + 'static,
{
    let decoder = Decoder::new(source).map_err(|e| LooperError::DecodeFailure(e.to_string()))?;
    let sample_rate = decoder.sample_rate();
    let num_channels = decoder.channels().max(1) as usize;
    // Rodio decodes to i16.
    let all_samples: Vec<f32> = decoder.map(|s| s as f32 / i16::MAX as f32).collect();
    if all_samples.is_empty() {
        return Err(LooperError::DecodeFailure("no audio frames".to_string()));
    }
    let mut channels = vec![Vec::with_capacity(all_samples.len() / num_channels); num_channels];
    for frame in all_samples.chunks_exact(num_channels) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
    Ok(AudioBuffer::new(channels, sample_rate))
}

/// Decodes an encoded take (any container/codec symphonia understands).
pub fn decode_captured_bytes(bytes: Vec<u8>) -> Result<AudioBuffer> {
    decode_with(Cursor::new(bytes))
}

/// Converts every channel to `target_sr`. Returns a plain copy when the rates match.
pub fn resample(buffer: &AudioBuffer, target_sr: u32) -> Result<AudioBuffer> {
    let source_sr = buffer.sample_rate();
    if source_sr == target_sr || buffer.is_empty() {
        return Ok(AudioBuffer::new(
            (0..buffer.num_channels())
                .map(|c| buffer.channel(c).to_vec())
                .collect(),
            if buffer.is_empty() { target_sr } else { source_sr },
        ));
    }
    debug!("Resampling {} Hz -> {} Hz", source_sr, target_sr);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        target_sr as f64 / source_sr as f64,
        2.0,
        params,
        buffer.len(),
        buffer.num_channels(),
    )
    .map_err(|_| LooperError::Resample(source_sr, target_sr))?;
    let waves_in: Vec<Vec<f32>> = (0..buffer.num_channels())
        .map(|c| buffer.channel(c).to_vec())
        .collect();
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|_| LooperError::Resample(source_sr, target_sr))?;
    Ok(AudioBuffer::new(waves_out, target_sr))
}

/// Turns whatever the capture device delivered into a buffer at `target_sr`.
///
/// Empty captures are a decode failure: there is nothing to commit.
pub fn captured_to_buffer(captured: CapturedAudio, target_sr: u32) -> Result<AudioBuffer> {
    if captured.is_empty() {
        return Err(LooperError::DecodeFailure("Nothing captured".to_string()));
    }
    let raw = match captured {
        CapturedAudio::Encoded(bytes) => decode_captured_bytes(bytes)?,
        CapturedAudio::Pcm {
            chunks,
            sample_rate,
        } => AudioBuffer::from_mono(chunks.concat(), sample_rate),
    };
    if raw.sample_rate() == target_sr {
        Ok(raw)
    } else {
        resample(&raw, target_sr)
    }
}
