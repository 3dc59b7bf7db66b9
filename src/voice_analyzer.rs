use log::debug;
use serde::Serialize;

use crate::{
    categories::{Categorization, CategoryMapper},
    feature_extractor::{split_on_silence, PitchTracker},
    round2, AnalysisConfig, AnalysisError, AudioProcessor, Waveform,
};

/// Pitch statistics and the categories they map to
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAnalysis {
    pub median_pitch: f64,
    pub pitch_std: f64,
    pub categories: Categorization,
}

/// JSON body of `POST /voice/analyze`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VoiceResponse {
    Success {
        median_pitch: f64,
        pitch_std: f64,
        tone_category: String,
        variability_category: String,
        mapped_sound: String,
    },
    Failure {
        message: String,
    },
}

impl VoiceResponse {
    pub fn from_error(err: &AnalysisError) -> Self {
        let message = if err.is_voice_outcome() {
            err.to_string()
        } else {
            format!("음성 분석 중 오류 발생: {}", err)
        };
        VoiceResponse::Failure { message }
    }
}

impl From<VoiceAnalysis> for VoiceResponse {
    fn from(analysis: VoiceAnalysis) -> Self {
        VoiceResponse::Success {
            median_pitch: analysis.median_pitch,
            pitch_std: analysis.pitch_std,
            tone_category: analysis.categories.tone,
            variability_category: analysis.categories.variability,
            mapped_sound: analysis.categories.sound,
        }
    }
}

impl From<Result<VoiceAnalysis, AnalysisError>> for VoiceResponse {
    fn from(outcome: Result<VoiceAnalysis, AnalysisError>) -> Self {
        match outcome {
            Ok(analysis) => analysis.into(),
            Err(err) => VoiceResponse::from_error(&err),
        }
    }
}

/// Maps a voice recording to an animal sound through its pitch statistics.
pub struct VoiceAnalyzer {
    config: AnalysisConfig,
    decoder: AudioProcessor,
    mapper: CategoryMapper,
}

impl VoiceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            decoder: AudioProcessor::new(config.model_sample_rate),
            mapper: CategoryMapper::new(),
            config,
        }
    }

    pub fn mapper(&self) -> &CategoryMapper {
        &self.mapper
    }

    pub fn analyze(&self, bytes: &[u8]) -> Result<VoiceAnalysis, AnalysisError> {
        let waveform = self.decoder.decode(bytes)?;
        self.analyze_waveform(&waveform)
    }

    pub fn analyze_waveform(&self, waveform: &Waveform) -> Result<VoiceAnalysis, AnalysisError> {
        let cfg = &self.config;
        if waveform.sample_rate == 0 {
            return Err(AnalysisError::Decode("sample rate is zero".to_string()));
        }

        let intervals = split_on_silence(
            &waveform.samples,
            cfg.top_db,
            cfg.silence_floor_db,
            cfg.n_fft,
            cfg.hop_length,
        );
        if intervals.is_empty() {
            return Err(AnalysisError::NoVoiceDetected);
        }

        let voice: Vec<f32> = intervals
            .iter()
            .flat_map(|&(start, end)| waveform.samples[start..end].iter().copied())
            .collect();
        if voice.is_empty() {
            return Err(AnalysisError::AudioTooShort);
        }
        debug!(
            "{} voiced interval(s), {} of {} samples kept",
            intervals.len(),
            voice.len(),
            waveform.len()
        );

        let candidates = PitchTracker::new(waveform.sample_rate as f32, cfg.n_fft, cfg.hop_length)
            .with_frequency_range(cfg.fmin, cfg.fmax)
            .with_threshold(cfg.peak_threshold)
            .track(&voice);
        let pitches =
            candidates.confident_pitches(cfg.magnitude_ratio, cfg.min_pitch_hz, cfg.max_pitch_hz);
        if pitches.is_empty() {
            return Err(AnalysisError::NoPitchInRange);
        }

        let median = median(&pitches);
        let spread = std_dev(&pitches);
        debug!(
            "{} pitch candidates, median {:.2} Hz, std {:.2} Hz",
            pitches.len(),
            median,
            spread
        );

        Ok(VoiceAnalysis {
            median_pitch: round2(median),
            pitch_std: round2(spread),
            categories: self.mapper.categorize(median, spread),
        })
    }
}

/// Median, averaging the two middle values for even lengths
fn median(values: &[f32]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation
fn std_dev(values: &[f32]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
