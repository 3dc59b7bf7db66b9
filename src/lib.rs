pub mod audio_processor;
pub mod categories;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod model_inference;
pub mod noise_analyzer;
#[cfg(feature = "microphone")]
pub mod recorder;
pub mod server;
pub mod voice_analyzer;

pub use audio_processor::{AudioProcessor, Waveform};
pub use categories::CategoryMapper;
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use model_inference::{AudioEventModel, ClassMap, NoiseClassifier};
pub use noise_analyzer::{NoiseAnalysis, NoiseAnalyzer, NoiseResponse, ScoredLabel};
pub use server::AppState;
pub use voice_analyzer::{VoiceAnalysis, VoiceAnalyzer, VoiceResponse};

/// Sample rate the audio event model was trained on
pub const MODEL_SAMPLE_RATE: u32 = 16000;

pub type Result<T> = anyhow::Result<T>;

/// Round half to even at two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
