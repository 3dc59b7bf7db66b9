use log::debug;
use ndarray::{Array2, Axis};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    feature_extractor::mean_loudness_db, round2, AnalysisConfig, AnalysisError, AudioEventModel,
    AudioProcessor, ClassMap, Waveform,
};

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoiseAnalysis {
    pub ranked: Vec<ScoredLabel>,
    pub db: f64,
}

/// JSON body of `POST /noise/analyze`.
///
/// Success omits `error`; failure carries it with null `analysis` and `db`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub analysis: Option<Vec<ScoredLabel>>,
    pub db: Option<f64>,
}

impl NoiseResponse {
    pub fn from_error(err: &AnalysisError) -> Self {
        Self {
            error: Some(err.to_string()),
            analysis: None,
            db: None,
        }
    }
}

impl From<NoiseAnalysis> for NoiseResponse {
    fn from(analysis: NoiseAnalysis) -> Self {
        Self {
            error: None,
            analysis: Some(analysis.ranked),
            db: Some(analysis.db),
        }
    }
}

impl From<Result<NoiseAnalysis, AnalysisError>> for NoiseResponse {
    fn from(outcome: Result<NoiseAnalysis, AnalysisError>) -> Self {
        match outcome {
            Ok(analysis) => analysis.into(),
            Err(err) => NoiseResponse::from_error(&err),
        }
    }
}

/// Classifies ambient noise and estimates its loudness.
pub struct NoiseAnalyzer {
    config: AnalysisConfig,
    audio: AudioProcessor,
    model: Arc<dyn AudioEventModel>,
    classes: Arc<ClassMap>,
}

impl NoiseAnalyzer {
    pub fn new(
        config: AnalysisConfig,
        model: Arc<dyn AudioEventModel>,
        classes: Arc<ClassMap>,
    ) -> Self {
        Self {
            audio: AudioProcessor::new(config.model_sample_rate),
            config,
            model,
            classes,
        }
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    pub fn analyze(&self, bytes: &[u8]) -> Result<NoiseAnalysis, AnalysisError> {
        let waveform = self.audio.decode(bytes)?;
        self.analyze_waveform(waveform)
    }

    pub fn analyze_waveform(&self, waveform: Waveform) -> Result<NoiseAnalysis, AnalysisError> {
        let waveform = self.audio.resample(waveform)?;
        if waveform.is_empty() {
            return Err(AnalysisError::EmptyAudio);
        }

        let scores = self.model.predict_scores(&waveform.samples)?;
        debug!(
            "model returned {} frame(s) x {} class(es)",
            scores.nrows(),
            scores.ncols()
        );
        let ranked = rank_labels(&scores, &self.classes, self.config.top_k)?;

        let db = mean_loudness_db(
            &waveform.samples,
            self.config.n_fft,
            self.config.hop_length,
            self.config.loudness_top_db,
        )
        .ok_or(AnalysisError::EmptyAudio)?;

        Ok(NoiseAnalysis {
            ranked,
            db: round2(db),
        })
    }
}

/// Average `scores` over frames and return the `top_k` best classes,
/// highest first. Equal scores keep class order.
pub fn rank_labels(
    scores: &Array2<f32>,
    classes: &ClassMap,
    top_k: usize,
) -> Result<Vec<ScoredLabel>, AnalysisError> {
    let mean = scores
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::Internal("model returned no score frames".to_string()))?;
    if mean.len() != classes.len() {
        return Err(AnalysisError::Internal(format!(
            "model produced {} classes but the class map lists {}",
            mean.len(),
            classes.len()
        )));
    }

    let mut order: Vec<usize> = (0..mean.len()).collect();
    order.sort_by(|&a, &b| mean[b].total_cmp(&mean[a]));

    order
        .into_iter()
        .take(top_k)
        .map(|i| {
            classes
                .get(i)
                .map(|label| ScoredLabel {
                    label: label.to_string(),
                    score: mean[i] as f64,
                })
                .ok_or_else(|| AnalysisError::Internal(format!("no label for class {}", i)))
        })
        .collect()
}
