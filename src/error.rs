use thiserror::Error;

/// Failure classification for an HTTP call to the matching server.
///
/// Every non-2xx response maps to `Status` with the status's canonical
/// reason phrase — call sites never branch on individual codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Status(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures of the voice capture pipeline. All variants are surfaced
/// inline, scoped to the question row that triggered them.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("another question is already recording")]
    Busy,

    #[error("no recording in progress for question {0}")]
    NotRecording(usize),

    #[error("no such question: {0}")]
    UnknownQuestion(usize),

    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("transcription failed: {0}")]
    Transcribe(String),

    #[error("profile must be saved before creating a persona")]
    ProfileMissing,

    #[error("persona creation already in progress")]
    CreateInFlight,
}

/// Crate-level error for the controller and both frontends.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("history stream closed: {0}")]
    Stream(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
