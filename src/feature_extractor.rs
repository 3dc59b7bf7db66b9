use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

/// Power floor used when converting frame energy to decibels
const POWER_AMIN: f32 = 1e-10;
/// Amplitude floor used by the loudness estimate
const AMPLITUDE_AMIN: f32 = 1e-5;

/// Overlapping frames centred on multiples of `hop_length`, viewed as slices
/// of a single zero-padded copy of the signal.
///
/// The signal is padded by half a frame on both sides, so there are
/// `1 + len / hop_length` frames and frame `t` covers
/// `[t * hop - frame_length / 2, t * hop + frame_length / 2)`.
pub struct CenteredFrames {
    padded: Vec<f32>,
    frame_length: usize,
    hop_length: usize,
    count: usize,
}

impl CenteredFrames {
    pub fn new(audio: &[f32], frame_length: usize, hop_length: usize) -> Self {
        if audio.is_empty() || frame_length == 0 || hop_length == 0 {
            return Self {
                padded: Vec::new(),
                frame_length,
                hop_length,
                count: 0,
            };
        }

        let pad = frame_length / 2;
        let mut padded = vec![0.0f32; audio.len() + 2 * pad];
        padded[pad..pad + audio.len()].copy_from_slice(audio);
        let count = 1 + (padded.len() - frame_length) / hop_length;

        Self {
            padded,
            frame_length,
            hop_length,
            count,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.count).map(move |t| {
            let start = t * self.hop_length;
            &self.padded[start..start + self.frame_length]
        })
    }
}

pub fn centered_frames(audio: &[f32], frame_length: usize, hop_length: usize) -> CenteredFrames {
    CenteredFrames::new(audio, frame_length, hop_length)
}

/// Root-mean-square energy of each centred frame
pub fn rms_frames(audio: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    centered_frames(audio, frame_length, hop_length)
        .iter()
        .map(|frame| {
            let power = frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32;
            power.sqrt()
        })
        .collect()
}

/// Average loudness in dB relative to full scale.
///
/// Frame RMS is converted with `20 * log10(max(1e-5, rms))`, frames more than
/// `top_db` below the loudest frame are raised to that floor, and the result
/// is the mean across frames. Returns `None` for empty input.
pub fn mean_loudness_db(
    audio: &[f32],
    frame_length: usize,
    hop_length: usize,
    top_db: f32,
) -> Option<f64> {
    let db: Vec<f64> = rms_frames(audio, frame_length, hop_length)
        .into_iter()
        .map(|rms| 20.0 * (rms.max(AMPLITUDE_AMIN) as f64).log10())
        .collect();
    if db.is_empty() {
        return None;
    }

    let loudest = db.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let floor = loudest - top_db as f64;
    let sum: f64 = db.iter().map(|&v| v.max(floor)).sum();
    Some(sum / db.len() as f64)
}

/// Non-silent sample intervals `(start, end)` of `audio`.
///
/// A frame is voiced when its power is within `top_db` of the loudest frame
/// and above `floor_db` dBFS. Consecutive voiced frames merge into one
/// interval; edges are frame indices scaled by `hop_length`, clipped to the
/// clip length.
pub fn split_on_silence(
    audio: &[f32],
    top_db: f32,
    floor_db: f32,
    frame_length: usize,
    hop_length: usize,
) -> Vec<(usize, usize)> {
    let power_db: Vec<f32> = rms_frames(audio, frame_length, hop_length)
        .into_iter()
        .map(|rms| 10.0 * (rms * rms).max(POWER_AMIN).log10())
        .collect();
    if power_db.is_empty() {
        return Vec::new();
    }

    let loudest = power_db.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let voiced: Vec<bool> = power_db
        .iter()
        .map(|&db| db - loudest > -top_db && db > floor_db)
        .collect();

    let mut intervals = Vec::new();
    let mut start: Option<usize> = None;
    for (frame, &is_voiced) in voiced.iter().enumerate() {
        match (is_voiced, start) {
            (true, None) => start = Some(frame),
            (false, Some(s)) => {
                intervals.push((s, frame));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        intervals.push((s, voiced.len()));
    }

    intervals
        .into_iter()
        .map(|(s, e)| {
            (
                (s * hop_length).min(audio.len()),
                (e * hop_length).min(audio.len()),
            )
        })
        .filter(|(s, e)| e > s)
        .collect()
}

/// Per-bin pitch and magnitude estimates, shaped `(n_fft / 2 + 1, n_frames)`.
/// Bins without a spectral peak hold zero in both arrays.
#[derive(Debug, Clone)]
pub struct PitchCandidates {
    pub pitches: Array2<f32>,
    pub magnitudes: Array2<f32>,
}

impl PitchCandidates {
    /// Pitches whose magnitude beats `ratio` times the mean magnitude over
    /// every bin and frame, restricted to `[min_hz, max_hz]`.
    pub fn confident_pitches(&self, ratio: f32, min_hz: f32, max_hz: f32) -> Vec<f32> {
        let mean = self.magnitudes.mean().unwrap_or(0.0);
        let cutoff = mean * ratio;
        self.pitches
            .iter()
            .zip(self.magnitudes.iter())
            .filter(|(_, &mag)| mag > cutoff)
            .map(|(&pitch, _)| pitch)
            .filter(|&pitch| pitch >= min_hz && pitch <= max_hz)
            .collect()
    }
}

/// Spectral-peak pitch tracker with parabolic interpolation.
pub struct PitchTracker {
    sample_rate: f32,
    n_fft: usize,
    hop_length: usize,
    fmin: f32,
    fmax: f32,
    threshold: f32,
}

impl PitchTracker {
    pub fn new(sample_rate: f32, n_fft: usize, hop_length: usize) -> Self {
        Self {
            sample_rate,
            n_fft,
            hop_length,
            fmin: 150.0,
            fmax: 4000.0,
            threshold: 0.1,
        }
    }

    /// Limit the bins searched for peaks to `[fmin, fmax)`
    pub fn with_frequency_range(mut self, fmin: f32, fmax: f32) -> Self {
        self.fmin = fmin.max(0.0);
        self.fmax = fmax;
        self
    }

    /// Ignore peaks below `threshold` times the frame maximum
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn track(&self, audio: &[f32]) -> PitchCandidates {
        let spectrogram = self.compute_spectrogram(audio);
        let (n_bins, n_frames) = spectrogram.dim();
        let mut pitches = Array2::zeros((n_bins, n_frames));
        let mut magnitudes = Array2::zeros((n_bins, n_frames));
        if n_bins < 3 {
            return PitchCandidates {
                pitches,
                magnitudes,
            };
        }

        let fmax = self.fmax.min(self.sample_rate / 2.0);
        let bin_hz = self.sample_rate / self.n_fft as f32;

        for t in 0..n_frames {
            let column = spectrogram.column(t);
            let frame_max = column.iter().cloned().fold(0.0f32, f32::max);
            let ref_value = self.threshold * frame_max;
            let gated: Vec<f32> = column
                .iter()
                .map(|&s| if s > ref_value { s } else { 0.0 })
                .collect();

            for bin in 1..n_bins - 1 {
                let freq = bin as f32 * bin_hz;
                if freq < self.fmin || freq >= fmax {
                    continue;
                }
                if !(gated[bin] > gated[bin - 1] && gated[bin] >= gated[bin + 1]) {
                    continue;
                }

                let (left, centre, right) = (column[bin - 1], column[bin], column[bin + 1]);
                let avg = 0.5 * (right - left);
                let curvature = 2.0 * centre - right - left;
                let shift = if curvature.abs() < f32::MIN_POSITIVE {
                    avg
                } else {
                    avg / curvature
                };

                pitches[[bin, t]] = (bin as f32 + shift) * bin_hz;
                magnitudes[[bin, t]] = centre + 0.5 * avg * shift;
            }
        }

        PitchCandidates {
            pitches,
            magnitudes,
        }
    }

    /// Magnitude STFT over centred, Hann-windowed frames
    fn compute_spectrogram(&self, audio: &[f32]) -> Array2<f32> {
        let frames = centered_frames(audio, self.n_fft, self.hop_length);
        let n_bins = self.n_fft / 2 + 1;
        let mut spectrogram = Array2::zeros((n_bins, frames.len()));
        if frames.is_empty() {
            return spectrogram;
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.n_fft);
        let window: Vec<f32> = (0..self.n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / self.n_fft as f32).cos()))
            .collect();

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        for (frame_idx, frame) in frames.iter().enumerate() {
            for (slot, (&sample, &w)) in buffer.iter_mut().zip(frame.iter().zip(window.iter())) {
                *slot = Complex::new(sample * w, 0.0);
            }

            fft.process(&mut buffer);

            for (bin, value) in buffer.iter().take(n_bins).enumerate() {
                spectrogram[[bin, frame_idx]] = value.norm();
            }
        }

        spectrogram
    }
}
