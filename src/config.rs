//! Analysis tunables shared by both pipelines

use serde::{Deserialize, Serialize};
use std::path::Path;
use anyhow::Context;

use crate::Result;

/// Numeric parameters for silence trimming, pitch tracking and noise scoring.
///
/// Every field has a default, so a JSON file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames quieter than the loudest frame by more than this count as silence
    pub top_db: f32,
    /// Absolute power floor (dBFS) under which a frame is always silence
    pub silence_floor_db: f32,
    /// FFT size, also the frame length for RMS and silence detection
    pub n_fft: usize,
    /// Hop between successive frames
    pub hop_length: usize,
    /// Lowest FFT bin frequency searched for pitch peaks
    pub fmin: f32,
    /// Highest FFT bin frequency searched for pitch peaks (exclusive)
    pub fmax: f32,
    /// Peaks below this fraction of the frame maximum are ignored
    pub peak_threshold: f32,
    /// Candidates must exceed this multiple of the mean magnitude
    pub magnitude_ratio: f32,
    /// Supported voice band, inclusive
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    /// Sample rate the audio event model expects
    pub model_sample_rate: u32,
    /// Number of ranked labels returned by the noise pipeline
    pub top_k: usize,
    /// Dynamic range kept by the loudness estimate
    pub loudness_top_db: f32,
    /// Noise requests allowed to run or wait for the model at once; the
    /// rest are turned away
    pub max_pending_inference: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_db: 25.0,
            silence_floor_db: -80.0,
            n_fft: 2048,
            hop_length: 512,
            fmin: 50.0,
            fmax: 4000.0,
            peak_threshold: 0.1,
            magnitude_ratio: 0.7,
            min_pitch_hz: 50.0,
            max_pitch_hz: 430.0,
            model_sample_rate: crate::MODEL_SAMPLE_RATE,
            top_k: 5,
            loudness_top_db: 80.0,
            max_pending_inference: 8,
        }
    }
}

impl AnalysisConfig {
    /// Load overrides from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_fft < 4 || self.hop_length == 0 {
            anyhow::bail!("n_fft must be >= 4 and hop_length > 0");
        }
        if self.model_sample_rate == 0 {
            anyhow::bail!("model_sample_rate must be positive");
        }
        if self.max_pending_inference == 0 {
            anyhow::bail!("max_pending_inference must be at least 1");
        }
        if self.min_pitch_hz > self.max_pitch_hz {
            anyhow::bail!(
                "pitch band is inverted: {} > {}",
                self.min_pitch_hz,
                self.max_pitch_hz
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"top_db": 30.0, "top_k": 3}"#).unwrap();
        assert_eq!(config.top_db, 30.0);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.model_sample_rate, 16000);
    }

    #[test]
    fn inverted_band_is_rejected() {
        let config = AnalysisConfig {
            min_pitch_hz: 500.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inference_queue_needs_a_slot() {
        let config = AnalysisConfig {
            max_pending_inference: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AnalysisConfig::default().validate().is_ok());
    }
}
