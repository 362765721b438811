use crate::errors::HarnessError;
use crate::orchestrator::RunStatistics;
use crate::runtime::{FileSystem, Terminal};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable form of [`RunStatistics`], durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub init_sec: f64,
    pub total_sec: f64,
    pub io_sec: f64,
    pub processing_sec: f64,
    pub frame_failures: u64,
    pub optional_inputs_missing: u64,
    pub output_digest: String,
}

impl From<&RunStatistics> for RunSummary {
    fn from(stats: &RunStatistics) -> Self {
        Self {
            frames_processed: stats.frames_processed,
            init_sec: stats.init_duration.as_secs_f64(),
            total_sec: stats.total_duration.as_secs_f64(),
            io_sec: stats.io_duration.as_secs_f64(),
            processing_sec: stats.processing_duration.as_secs_f64(),
            frame_failures: stats.frame_failures,
            optional_inputs_missing: stats.optional_inputs_missing,
            output_digest: stats.output_digest.clone(),
        }
    }
}

pub fn summary_lines(stats: &RunStatistics) -> Vec<String> {
    let mut lines = vec![
        format!("stopped at frame index: {}", stats.frames_processed),
        format!("INIT TIME: {:.6} seconds", stats.init_duration.as_secs_f64()),
        format!("TOTAL TIME: {:.6} seconds", stats.total_duration.as_secs_f64()),
        format!("IO TIME: {:.6} seconds", stats.io_duration.as_secs_f64()),
        format!(
            "PROCESSING TIME: {:.6} seconds",
            stats.processing_duration.as_secs_f64()
        ),
    ];
    if stats.frame_failures > 0 {
        lines.push(format!("FRAME FAILURES: {}", stats.frame_failures));
    }
    lines.push(format!("OUTPUT DIGEST: {}", stats.output_digest));
    lines
}

pub fn report(stats: &RunStatistics, terminal: &dyn Terminal) -> Result<(), HarnessError> {
    for line in summary_lines(stats) {
        terminal.write_line(&line)?;
    }
    Ok(())
}

pub fn write_summary_json(
    fs: &dyn FileSystem,
    path: &Path,
    stats: &RunStatistics,
) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent)?;
        }
    }
    let rendered = serde_json::to_string_pretty(&RunSummary::from(stats))
        .map_err(|e| HarnessError::Io(e.to_string()))?;
    fs.write_string(path, &rendered)
}

#[cfg(test)]
mod tests {
    use super::{report, summary_lines, write_summary_json, RunSummary};
    use crate::orchestrator::RunStatistics;
    use crate::runtime::{FakeFileSystem, FakeTerminal};
    use std::path::Path;
    use std::time::Duration;

    fn stats(frame_failures: u64) -> RunStatistics {
        RunStatistics {
            frames_processed: 2,
            init_duration: Duration::from_millis(1500),
            io_duration: Duration::from_millis(250),
            processing_duration: Duration::from_millis(500),
            total_duration: Duration::from_secs(3),
            frame_failures,
            optional_inputs_missing: 4,
            output_digest: "sha256:abc".to_string(),
        }
    }

    #[test]
    fn summary_reports_count_and_four_timings() {
        let lines = summary_lines(&stats(0));
        assert_eq!(
            lines,
            vec![
                "stopped at frame index: 2".to_string(),
                "INIT TIME: 1.500000 seconds".to_string(),
                "TOTAL TIME: 3.000000 seconds".to_string(),
                "IO TIME: 0.250000 seconds".to_string(),
                "PROCESSING TIME: 0.500000 seconds".to_string(),
                "OUTPUT DIGEST: sha256:abc".to_string(),
            ]
        );
    }

    #[test]
    fn failures_line_only_appears_when_nonzero() {
        let terminal = FakeTerminal::default();
        report(&stats(3), &terminal).expect("report");
        assert!(terminal
            .written_lines()
            .contains(&"FRAME FAILURES: 3".to_string()));
    }

    #[test]
    fn summary_json_round_trips_through_the_file_system() {
        let fs = FakeFileSystem::default();
        write_summary_json(&fs, Path::new("/out/summary.json"), &stats(0)).expect("write");
        let raw = fs.file(Path::new("/out/summary.json")).expect("written");
        let summary: RunSummary = serde_json::from_str(&raw).expect("parse");
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.io_sec, 0.25);
        assert_eq!(fs.created_dirs(), vec![Path::new("/out").to_path_buf()]);
    }
}
