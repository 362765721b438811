use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type FrameIndex = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    ConstantVelocity,
    Command,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConstantVelocity => "constant_velocity",
            Self::Command => "command",
        }
    }
}

/// What the replay loop does when a frame's pipeline call or output write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Abort,
    Continue,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureRootSource {
    CliOverride,
    Config,
    HomeEnv(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRoot {
    pub path: PathBuf,
    pub source: FixtureRootSource,
}
