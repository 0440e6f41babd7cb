use sprout_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("session is locked")]
    Locked,
    #[error("a recording is already in progress")]
    RecordingInProgress,
    #[error("no recording in progress")]
    NotRecording,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Audio(#[from] anyhow::Error),
}
