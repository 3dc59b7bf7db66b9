use anyhow::Context;
use log::info;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use crate::Result;

/// Something that turns a 16 kHz mono waveform into per-frame class scores.
///
/// Implementations must be callable from several request workers at once.
pub trait AudioEventModel: Send + Sync {
    /// Scores shaped `(frames, classes)`
    fn predict_scores(&self, waveform: &[f32]) -> Result<Array2<f32>>;
}

/// Human readable class names in model output order
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    labels: Vec<String>,
}

impl ClassMap {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Load `index,mid,display_name` rows; the header row is skipped and
    /// the third column is the label.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening class map {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("reading class map {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut table = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut labels = Vec::new();
        for (row, record) in table.records().enumerate() {
            let record = record?;
            let label = record
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("row {} has no label column", row + 1))?;
            labels.push(label.to_string());
        }

        if labels.is_empty() {
            anyhow::bail!("class map has no labels");
        }
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Pretrained audio event classifier (YAMNet exported to ONNX).
///
/// The session needs exclusive access to run, so concurrent requests queue
/// on the mutex.
pub struct NoiseClassifier {
    session: Mutex<Session>,
}

impl NoiseClassifier {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("loading model {}", model_path.display()))?;

        info!("Model loaded from {}", model_path.display());
        for input in &session.inputs {
            info!("  input: {}", input.name);
        }
        for output in &session.outputs {
            info!("  output: {}", output.name);
        }

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl AudioEventModel for NoiseClassifier {
    fn predict_scores(&self, waveform: &[f32]) -> Result<Array2<f32>> {
        let input_tensor = Tensor::from_array((vec![waveform.len()], waveform.to_vec()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("inference session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // First output is the score matrix; embeddings and spectrogram follow
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let scores = match dims.as_slice() {
            [frames, classes] => Array2::from_shape_vec((*frames, *classes), data.to_vec())?,
            [classes] => Array2::from_shape_vec((1, *classes), data.to_vec())?,
            _ => anyhow::bail!("Unexpected score tensor shape: {:?}", dims),
        };
        Ok(scores)
    }
}
