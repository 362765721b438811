//! The planning pipeline under test, seen only through [`Pipeline`].
//!
//! The replay loop never looks inside a pipeline: it initializes one before
//! the first frame and then calls [`Pipeline::process_frame`] exactly once per
//! frame, after the mock clock has been pinned to the frame's timestamp.

pub mod command;
pub mod constant_velocity;

use crate::clock::MockClock;
use crate::config::PipelineConfig;
use crate::errors::HarnessError;
use crate::fixture::FrameInputs;
use crate::records::Trajectory;
use crate::types::PipelineKind;

pub use command::CommandPipeline;
pub use constant_velocity::ConstantVelocityPipeline;

pub trait Pipeline {
    fn name(&self) -> &str;

    /// Called once, before any frame.
    fn initialize(&mut self, config: &PipelineConfig) -> Result<(), HarnessError>;

    /// Runs one frame to completion. `clock` already reads the frame's timestamp.
    fn process_frame(
        &mut self,
        inputs: &FrameInputs,
        clock: &dyn MockClock,
    ) -> Result<Trajectory, HarnessError>;
}

pub fn build_pipeline(kind: PipelineKind) -> Box<dyn Pipeline> {
    match kind {
        PipelineKind::ConstantVelocity => Box::new(ConstantVelocityPipeline::new()),
        PipelineKind::Command => Box::new(CommandPipeline::new()),
    }
}

pub fn initialize_pipeline(config: &PipelineConfig) -> Result<Box<dyn Pipeline>, HarnessError> {
    let mut pipeline = build_pipeline(config.kind);
    pipeline.initialize(config)?;
    Ok(pipeline)
}
