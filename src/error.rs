use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No active test case")]
    NoActiveTestCase,

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Invalid step patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid state document: {0}")]
    InvalidState(String),

    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    CodeGeneration(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
