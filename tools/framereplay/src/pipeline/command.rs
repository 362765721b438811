//! Drives an external planner process over line-delimited JSON.
//!
//! The planner is spawned once by `initialize` and stays alive for the whole
//! run, so it can keep state between frames. Every request is one JSON line on
//! its stdin and every reply one JSON line on its stdout:
//!
//! ```text
//! > {"type":"init","config_path":"...","map_id":"base_map.bin"}
//! < {"type":"ready"}
//! > {"type":"frame","now_sec":12.5,"inputs":{...}}
//! < {"type":"trajectory","trajectory":{...}}
//! ```
//!
//! A planner may answer any request with `{"type":"error","message":"..."}`.
//! A planner that stays silent longer than `pipeline.reply_timeout_sec` fails
//! the request instead of stalling the run.

use crate::clock::MockClock;
use crate::config::PipelineConfig;
use crate::errors::HarnessError;
use crate::fixture::{FrameInputs, LocalView};
use crate::pipeline::Pipeline;
use crate::records::Trajectory;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannerRequest {
    Init {
        config_path: PathBuf,
        map_id: String,
    },
    Frame {
        now_sec: f64,
        inputs: LocalView,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannerReply {
    Ready,
    Trajectory { trajectory: Trajectory },
    Error { message: String },
}

struct PlannerProcess {
    child: Child,
    stdin: ChildStdin,
    /// Lines read off the planner's stdout by a background reader thread.
    replies: Receiver<std::io::Result<String>>,
}

#[derive(Default)]
pub struct CommandPipeline {
    process: Option<PlannerProcess>,
    program: String,
    reply_timeout: Duration,
}

impl CommandPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn exchange(&mut self, request: &PlannerRequest) -> Result<PlannerReply, HarnessError> {
        let program = self.program.clone();
        let process = self.process.as_mut().ok_or_else(|| {
            HarnessError::Process("command pipeline used before initialize".to_string())
        })?;

        let line =
            serde_json::to_string(request).map_err(|e| HarnessError::Process(e.to_string()))?;
        process
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| process.stdin.write_all(b"\n"))
            .and_then(|_| process.stdin.flush())
            .map_err(|e| HarnessError::Process(format!("{program}: write failed: {e}")))?;

        let reply = match process.replies.recv_timeout(self.reply_timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                return Err(HarnessError::Process(format!("{program}: read failed: {e}")));
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(HarnessError::Process(format!(
                    "{program}: no reply within {:.3}s",
                    self.reply_timeout.as_secs_f64()
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let status = process
                    .child
                    .try_wait()
                    .ok()
                    .flatten()
                    .map(|status| status.to_string())
                    .unwrap_or_else(|| "still running".to_string());
                return Err(HarnessError::Process(format!(
                    "{program}: planner closed stdout ({status})"
                )));
            }
        };
        serde_json::from_str(reply.trim())
            .map_err(|e| HarnessError::Process(format!("{program}: invalid reply: {e}")))
    }
}

impl Pipeline for CommandPipeline {
    fn name(&self) -> &str {
        "command"
    }

    fn initialize(&mut self, config: &PipelineConfig) -> Result<(), HarnessError> {
        let program = config
            .command
            .clone()
            .filter(|command| !command.trim().is_empty())
            .ok_or_else(|| {
                HarnessError::InvalidConfig(
                    "pipeline.command is required for the command pipeline".to_string(),
                )
            })?;

        let mut child = Command::new(&program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| HarnessError::Process(format!("{program}: spawn failed: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Process(format!("{program}: stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Process(format!("{program}: stdout unavailable")))?;

        let (sender, replies) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let failed = line.is_err();
                if sender.send(line).is_err() || failed {
                    break;
                }
            }
        });

        self.program = program;
        self.reply_timeout = Duration::from_secs_f64(config.reply_timeout_sec);
        self.process = Some(PlannerProcess {
            child,
            stdin,
            replies,
        });

        match self.exchange(&PlannerRequest::Init {
            config_path: config.config_path.clone(),
            map_id: config.map_id.clone(),
        })? {
            PlannerReply::Ready => Ok(()),
            PlannerReply::Error { message } => Err(HarnessError::Process(format!(
                "{}: init rejected: {message}",
                self.program
            ))),
            PlannerReply::Trajectory { .. } => Err(HarnessError::Process(format!(
                "{}: expected ready, got trajectory",
                self.program
            ))),
        }
    }

    fn process_frame(
        &mut self,
        inputs: &FrameInputs,
        clock: &dyn MockClock,
    ) -> Result<Trajectory, HarnessError> {
        let request = PlannerRequest::Frame {
            now_sec: clock.now_seconds(),
            inputs: inputs.to_local_view(),
        };
        match self.exchange(&request)? {
            PlannerReply::Trajectory { trajectory } => Ok(trajectory),
            PlannerReply::Error { message } => Err(HarnessError::Process(message)),
            PlannerReply::Ready => Err(HarnessError::Process(format!(
                "{}: expected trajectory, got ready",
                self.program
            ))),
        }
    }
}

impl Drop for CommandPipeline {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.child.kill();
            let _ = process.child.wait();
        }
    }
}
