use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use log::{error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{audio_processor::downmix, Result, Waveform};

/// Capture a fixed-length clip from the default input device
pub fn record_clip(duration: Duration) -> Result<Waveform> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

    info!("Using input device: {}", device.name()?);

    let config = device.default_input_config()?;
    info!("Default input config: {:?}", config);

    let sample_format = config.sample_format();
    let config: StreamConfig = config.into();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let capacity = (sample_rate as f64 * duration.as_secs_f64()) as usize * channels;
    let captured = Arc::new(Mutex::new(Vec::with_capacity(capacity)));

    let stream = create_input_stream(&device, &config, sample_format, captured.clone(), capacity)?;
    stream.play()?;
    info!("Recording for {:.1} seconds...", duration.as_secs_f64());
    std::thread::sleep(duration);
    drop(stream);
    info!("Recording finished");

    let interleaved = captured
        .lock()
        .map_err(|_| anyhow::anyhow!("capture buffer lock poisoned"))?
        .split_off(0);
    Ok(Waveform::new(downmix(&interleaved, channels), sample_rate))
}

fn create_input_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    captured: Arc<Mutex<Vec<f32>>>,
    capacity: usize,
) -> Result<Stream> {
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_samples(data.iter().copied(), &captured, capacity);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_samples(data.iter().map(|&s| s as f32 / 32768.0), &captured, capacity);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                push_samples(
                    data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0),
                    &captured,
                    capacity,
                );
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?,
        _ => anyhow::bail!("Unsupported sample format: {:?}", sample_format),
    };

    Ok(stream)
}

fn push_samples<I: Iterator<Item = f32>>(samples: I, captured: &Arc<Mutex<Vec<f32>>>, capacity: usize) {
    if let Ok(mut buffer) = captured.lock() {
        let room = capacity.saturating_sub(buffer.len());
        buffer.extend(samples.take(room));
    }
}
