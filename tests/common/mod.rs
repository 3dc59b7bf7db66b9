#![allow(dead_code)]

use hound::{SampleFormat, WavSpec, WavWriter};
use living_noise_solver::{AudioEventModel, ClassMap, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::sync::Mutex;

/// Raised-cosine gain for the first and last `fade` samples
fn fade_gain(i: usize, n: usize, fade: usize) -> f32 {
    let edge = i.min(n - 1 - i);
    if edge < fade {
        0.5 * (1.0 - (std::f32::consts::PI * edge as f32 / fade as f32).cos())
    } else {
        1.0
    }
}

pub fn tone(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
    jittered_tone(freq, 0.0, sample_rate, seconds, amplitude, 0)
}

/// Sine whose frequency is redrawn every 20 ms from `base ± jitter_hz`,
/// phase-continuous, with 20 ms fades at both ends.
pub fn jittered_tone(
    base: f32,
    jitter_hz: f32,
    sample_rate: u32,
    seconds: f32,
    amplitude: f32,
    seed: u64,
) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (sample_rate as f32 * seconds) as usize;
    let segment = (sample_rate / 50) as usize;
    let mut phase = 0.0f64;
    let mut freq = base;

    (0..n)
        .map(|i| {
            if jitter_hz > 0.0 && i % segment == 0 {
                freq = base + rng.gen_range(-jitter_hz..=jitter_hz);
            }
            let sample = amplitude * fade_gain(i, n, segment) * (phase.sin() as f32);
            phase += 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
            sample
        })
        .collect()
}

/// 16-bit PCM WAV in memory
pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    wav_bytes_channels(samples, 1, sample_rate)
}

pub fn wav_bytes_channels(interleaved: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for &s in interleaved {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn class_map(n: usize) -> ClassMap {
    let mut csv = String::from("index,mid,display_name\n");
    for i in 0..n {
        csv.push_str(&format!("{},/m/{:05},\"Sound {}, variant\"\n", i, i, i));
    }
    ClassMap::from_reader(csv.as_bytes()).unwrap()
}

/// Deterministic stand-in for the ONNX classifier.
///
/// Emits one score frame per 0.48 s of audio; class `c` scores
/// `(c * 7 % classes) / classes`, nudged by the frame index. Every waveform
/// it receives is kept for inspection.
pub struct FakeModel {
    pub classes: usize,
    pub seen: Mutex<Vec<Vec<f32>>>,
}

impl FakeModel {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn last_input(&self) -> Option<Vec<f32>> {
        self.seen.lock().unwrap().last().cloned()
    }
}

impl AudioEventModel for FakeModel {
    fn predict_scores(&self, waveform: &[f32]) -> Result<Array2<f32>> {
        self.seen.lock().unwrap().push(waveform.to_vec());
        let frames = 1 + waveform.len() / 7680;
        let classes = self.classes;
        Ok(Array2::from_shape_fn((frames, classes), |(f, c)| {
            ((c * 7 % classes) as f32 + 0.01 * f as f32) / classes as f32
        }))
    }
}

/// Always fails, like a session that rejects its input
pub struct BrokenModel;

impl AudioEventModel for BrokenModel {
    fn predict_scores(&self, _waveform: &[f32]) -> Result<Array2<f32>> {
        anyhow::bail!("input tensor rejected")
    }
}

/// Panics inside inference
pub struct PanickingModel;

impl AudioEventModel for PanickingModel {
    fn predict_scores(&self, _waveform: &[f32]) -> Result<Array2<f32>> {
        panic!("inference crashed")
    }
}

/// Blocks inside inference until the test releases it, reporting when it
/// has started. Scores like `FakeModel` once released.
pub struct GatedModel {
    inner: FakeModel,
    started: Mutex<std::sync::mpsc::Sender<()>>,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl GatedModel {
    /// Returns the model, a receiver signalled on entry and a sender that
    /// lets one inference finish.
    pub fn new(
        classes: usize,
    ) -> (
        Self,
        std::sync::mpsc::Receiver<()>,
        std::sync::mpsc::Sender<()>,
    ) {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let model = Self {
            inner: FakeModel::new(classes),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        };
        (model, started_rx, release_tx)
    }
}

impl AudioEventModel for GatedModel {
    fn predict_scores(&self, waveform: &[f32]) -> Result<Array2<f32>> {
        let _ = self.started.lock().unwrap().send(());
        self.release.lock().unwrap().recv()?;
        self.inner.predict_scores(waveform)
    }
}
