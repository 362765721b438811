use crate::types::FrameIndex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("startup precondition failed: {0}")]
    Precondition(String),
    #[error("frame {frame}: malformed record {path}: {reason}")]
    MalformedRecord {
        frame: FrameIndex,
        path: String,
        reason: String,
    },
    #[error("frame {frame}: failed to persist {path}: {reason}")]
    Persist {
        frame: FrameIndex,
        path: String,
        reason: String,
    },
    #[error("frame {frame}: pipeline failed: {reason}")]
    Pipeline { frame: FrameIndex, reason: String },
    #[error("process error: {0}")]
    Process(String),
}

impl HarnessError {
    /// Frame the error belongs to, when it was raised inside the replay loop.
    pub fn frame(&self) -> Option<FrameIndex> {
        match self {
            Self::MalformedRecord { frame, .. }
            | Self::Persist { frame, .. }
            | Self::Pipeline { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}
