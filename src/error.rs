//! Failure kinds produced by the analysis pipelines.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("유효한 음성 구간이 없습니다.")]
    NoVoiceDetected,

    #[error("분석할 음성 데이터가 너무 짧습니다.")]
    AudioTooShort,

    #[error("허용 범위 내 유효한 피치를 감지할 수 없습니다.")]
    NoPitchInRange,

    #[error("Audio data is empty or too short after processing.")]
    EmptyAudio,

    #[error("noise classification model is not loaded")]
    ModelUnavailable,

    #[error("noise classifier is busy, {0} request(s) already queued")]
    Busy(usize),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("{0}")]
    Internal(String),
}

impl AnalysisError {
    /// True for the outcomes the voice pipeline reports with its own message
    /// rather than the generic "error during analysis" wrapper.
    pub fn is_voice_outcome(&self) -> bool {
        matches!(
            self,
            AnalysisError::NoVoiceDetected
                | AnalysisError::AudioTooShort
                | AnalysisError::NoPitchInRange
        )
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Internal(format!("{:#}", err))
    }
}

impl From<ndarray::ShapeError> for AnalysisError {
    fn from(err: ndarray::ShapeError) -> Self {
        AnalysisError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            AnalysisError::Internal("analysis worker panicked".to_string())
        } else {
            AnalysisError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_messages_are_preserved() {
        assert_eq!(
            AnalysisError::NoVoiceDetected.to_string(),
            "유효한 음성 구간이 없습니다."
        );
        assert_eq!(
            AnalysisError::EmptyAudio.to_string(),
            "Audio data is empty or too short after processing."
        );
        assert!(AnalysisError::NoPitchInRange.is_voice_outcome());
        assert!(!AnalysisError::Decode("bad".into()).is_voice_outcome());
    }

    #[test]
    fn anyhow_errors_become_internal() {
        let err: AnalysisError = anyhow::anyhow!("session exploded").into();
        assert!(matches!(err, AnalysisError::Internal(ref m) if m == "session exploded"));
    }
}
