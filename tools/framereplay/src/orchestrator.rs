//! Frame replay loop.
//!
//! Frames are probed from index 0 upward; the first index whose primary
//! fixture file is missing ends the run. There is no frame count anywhere, so
//! a gap in the numbering (5 absent, 6 present) stops the run at the gap.
//!
//! Per frame, strictly in order: load inputs, pin the mock clock to the
//! header timestamp, run the pipeline once, write the output. Only scalar
//! aggregates survive a frame.

use crate::clock::MockClock;
use crate::errors::HarnessError;
use crate::fixture::FixtureStore;
use crate::logging::RunLog;
use crate::pipeline::Pipeline;
use crate::runtime::Terminal;
use crate::types::{FailurePolicy, FrameIndex};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub load_stories: bool,
    pub on_frame_failure: FailurePolicy,
    pub pretty_output: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            load_stories: false,
            on_frame_failure: FailurePolicy::Abort,
            pretty_output: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Probing(FrameIndex),
    Terminated { frames: FrameIndex },
}

/// When the harness started and how long bringing up the pipeline took.
#[derive(Debug, Clone, Copy)]
pub struct InitTiming {
    pub started_at: Instant,
    pub init_duration: Duration,
}

impl InitTiming {
    pub fn since(started_at: Instant) -> Self {
        Self {
            started_at,
            init_duration: started_at.elapsed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    /// Final frame index, i.e. the number of frames replayed.
    pub frames_processed: u64,
    pub init_duration: Duration,
    pub io_duration: Duration,
    pub processing_duration: Duration,
    pub total_duration: Duration,
    pub frame_failures: u64,
    pub optional_inputs_missing: u64,
    /// `sha256:<hex>` over every persisted output, in frame order.
    pub output_digest: String,
}

struct Accumulator {
    io: Duration,
    processing: Duration,
    frame_failures: u64,
    optional_inputs_missing: u64,
    digest: Sha256,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            io: Duration::ZERO,
            processing: Duration::ZERO,
            frame_failures: 0,
            optional_inputs_missing: 0,
            digest: Sha256::new(),
        }
    }
}

pub struct FrameReplay<'a> {
    store: &'a FixtureStore<'a>,
    clock: &'a dyn MockClock,
    terminal: &'a dyn Terminal,
    log: &'a dyn RunLog,
    options: ReplayOptions,
}

impl<'a> FrameReplay<'a> {
    pub fn new(
        store: &'a FixtureStore<'a>,
        clock: &'a dyn MockClock,
        terminal: &'a dyn Terminal,
        log: &'a dyn RunLog,
        options: ReplayOptions,
    ) -> Self {
        Self {
            store,
            clock,
            terminal,
            log,
            options,
        }
    }

    pub fn run(
        &self,
        pipeline: &mut dyn Pipeline,
        timing: InitTiming,
    ) -> Result<RunStatistics, HarnessError> {
        let root = self.store.layout().root.display().to_string();
        self.clock.enable_deterministic_mode();
        self.log.event(
            "info",
            "run_started",
            json!({
                "fixture_root": root,
                "pipeline": pipeline.name(),
                "load_stories": self.options.load_stories,
                "on_frame_failure": self.options.on_frame_failure.as_str(),
            }),
        )?;
        if !self.store.root_exists() {
            self.log
                .event("warn", "fixture_root_missing", json!({ "fixture_root": root }))?;
        }

        let mut acc = Accumulator::new();
        let mut state = ReplayState::Probing(0);
        let frames = loop {
            state = match state {
                ReplayState::Probing(frame) => self.step(frame, pipeline, &mut acc)?,
                ReplayState::Terminated { frames } => break frames,
            };
        };

        let stats = RunStatistics {
            frames_processed: frames,
            init_duration: timing.init_duration,
            io_duration: acc.io,
            processing_duration: acc.processing,
            total_duration: timing.started_at.elapsed(),
            frame_failures: acc.frame_failures,
            optional_inputs_missing: acc.optional_inputs_missing,
            output_digest: format!("sha256:{}", hex_bytes(&acc.digest.finalize())),
        };
        self.log.event(
            "info",
            "run_completed",
            json!({
                "frames_processed": stats.frames_processed,
                "frame_failures": stats.frame_failures,
                "io_sec": stats.io_duration.as_secs_f64(),
                "processing_sec": stats.processing_duration.as_secs_f64(),
                "total_sec": stats.total_duration.as_secs_f64(),
                "output_digest": stats.output_digest,
            }),
        )?;
        Ok(stats)
    }

    fn step(
        &self,
        frame: FrameIndex,
        pipeline: &mut dyn Pipeline,
        acc: &mut Accumulator,
    ) -> Result<ReplayState, HarnessError> {
        if !self.store.frame_exists(frame) {
            return Ok(ReplayState::Terminated { frames: frame });
        }
        self.replay_frame(frame, pipeline, acc)?;
        Ok(ReplayState::Probing(frame + 1))
    }

    fn replay_frame(
        &self,
        frame: FrameIndex,
        pipeline: &mut dyn Pipeline,
        acc: &mut Accumulator,
    ) -> Result<(), HarnessError> {
        self.terminal
            .write_line(&format!("Processing Frame {frame}"))?;
        self.log
            .event("info", "frame_started", json!({ "frame": frame }))?;

        let load_started = Instant::now();
        let loaded = self.store.load_frame(frame, self.options.load_stories)?;
        let load_elapsed = load_started.elapsed();
        acc.io += load_elapsed;

        if loaded.header_missing {
            self.log.event(
                "warn",
                "input_missing",
                json!({
                    "frame": frame,
                    "input": "header",
                    "path": self.store.layout().header_path(frame).display().to_string(),
                }),
            )?;
        }
        for channel in &loaded.missing {
            acc.optional_inputs_missing += 1;
            self.log.event(
                "info",
                "input_missing",
                json!({
                    "frame": frame,
                    "input": channel.as_str(),
                    "path": self.store.layout().input_path(frame, *channel).display().to_string(),
                }),
            )?;
        }

        let timestamp = loaded.inputs.timestamp_sec();
        self.clock.set_time(timestamp)?;

        let process_started = Instant::now();
        let outcome = pipeline.process_frame(&loaded.inputs, self.clock);
        let process_elapsed = process_started.elapsed();
        acc.processing += process_elapsed;

        let trajectory = match outcome {
            Ok(trajectory) => trajectory,
            Err(err) => {
                let err = match err {
                    HarnessError::Pipeline { .. } => err,
                    other => HarnessError::Pipeline {
                        frame,
                        reason: other.to_string(),
                    },
                };
                return self.frame_failed(frame, "process", err, acc);
            }
        };

        let output_path = self.store.layout().output_path(frame);
        let persist_started = Instant::now();
        let saved =
            self.store
                .save_record(frame, &output_path, &trajectory, self.options.pretty_output);
        acc.io += persist_started.elapsed();
        let rendered = match saved {
            Ok(rendered) => rendered,
            Err(err) => return self.frame_failed(frame, "persist", err, acc),
        };

        acc.digest.update(rendered.as_bytes());
        acc.digest.update(b"\n");

        self.log.event(
            "info",
            "frame_completed",
            json!({
                "frame": frame,
                "timestamp_sec": timestamp,
                "load_sec": load_elapsed.as_secs_f64(),
                "process_sec": process_elapsed.as_secs_f64(),
                "io_total_sec": acc.io.as_secs_f64(),
                "processing_total_sec": acc.processing.as_secs_f64(),
                "output": output_path.display().to_string(),
                "output_sha256": hex_bytes(&Sha256::digest(rendered.as_bytes())),
            }),
        )?;
        Ok(())
    }

    fn frame_failed(
        &self,
        frame: FrameIndex,
        phase: &str,
        err: HarnessError,
        acc: &mut Accumulator,
    ) -> Result<(), HarnessError> {
        self.log.event(
            "error",
            "frame_failed",
            json!({
                "frame": frame,
                "phase": phase,
                "error": err.to_string(),
                "policy": self.options.on_frame_failure.as_str(),
            }),
        )?;
        match self.options.on_frame_failure {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Continue => {
                self.terminal.write_error_line(&err.to_string())?;
                acc.frame_failures += 1;
                Ok(())
            }
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
