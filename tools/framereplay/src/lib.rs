pub mod clock;
pub mod config;
pub mod errors;
pub mod fixture;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod runtime;
pub mod types;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use clock::SimClock;
use config::{load_config, resolve_fixture_root, CliOverrides, EnvMap};
use errors::HarnessError;
use fixture::FixtureStore;
use logging::{JsonlLogger, NullRunLog, RunLog};
use orchestrator::{FrameReplay, InitTiming, ReplayOptions};
use pipeline::initialize_pipeline;
use runtime::ProductionRuntime;
use std::time::Instant;
use types::PipelineKind;

#[derive(Debug, Clone, Parser)]
#[command(name = "framereplay")]
#[command(about = "Replays recorded planning frames through a pipeline under a mock clock")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    /// Overrides fixtures.root and the /home/$USER/deft/testdata default.
    #[arg(long)]
    pub fixture_root: Option<std::path::PathBuf>,
    #[arg(long, value_enum)]
    pub pipeline: Option<CliPipeline>,
    #[arg(long, default_value_t = false)]
    pub load_stories: bool,
    #[arg(long, default_value_t = false)]
    pub continue_on_failure: bool,
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
    #[arg(long)]
    pub run_log: Option<std::path::PathBuf>,
    #[arg(long)]
    pub summary_json: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliPipeline {
    ConstantVelocity,
    Command,
}

impl From<CliPipeline> for PipelineKind {
    fn from(value: CliPipeline) -> Self {
        match value {
            CliPipeline::ConstantVelocity => PipelineKind::ConstantVelocity,
            CliPipeline::Command => PipelineKind::Command,
        }
    }
}

pub fn run() -> Result<i32, HarnessError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| HarnessError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, HarnessError> {
    // Init and total time are measured from before argument parsing.
    let started_at = Instant::now();
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(HarnessError::Cli(error.to_string())),
        },
    };
    replay_with_cli(&cli, started_at, env, cwd, runtime)
}

fn replay_with_cli(
    cli: &Cli,
    started_at: Instant,
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, HarnessError> {
    let env_map = env_to_map(env);
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        fixture_root: cli.fixture_root.clone(),
        pipeline: cli.pipeline.map(PipelineKind::from),
        load_stories: cli.load_stories,
        continue_on_failure: cli.continue_on_failure,
        pretty_output: cli.pretty,
        run_log: cli.run_log.clone(),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;
    let root = resolve_fixture_root(&cfg, &overrides, &env_map, cwd)?;

    let log: Box<dyn RunLog> = match &cfg.logging.run_log {
        Some(path) => {
            let mut logger = JsonlLogger::new(config::absolutize_path(cwd, path));
            logger.max_payload_bytes = cfg.logging.max_payload_bytes;
            Box::new(logger)
        }
        None => Box::new(NullRunLog),
    };

    let mut pipeline = initialize_pipeline(&cfg.pipeline)?;
    let timing = InitTiming::since(started_at);

    let store = FixtureStore::new(runtime.file_system.as_ref(), cfg.layout(&root.path));
    let clock = SimClock::new();
    let options = ReplayOptions {
        load_stories: cfg.inputs.load_stories,
        on_frame_failure: cfg.run.on_frame_failure,
        pretty_output: cfg.run.pretty_output,
    };
    let replay = FrameReplay::new(
        &store,
        &clock,
        runtime.terminal.as_ref(),
        log.as_ref(),
        options,
    );
    let stats = replay.run(pipeline.as_mut(), timing)?;

    report::report(&stats, runtime.terminal.as_ref())?;
    if let Some(path) = &cli.summary_json {
        report::write_summary_json(
            runtime.file_system.as_ref(),
            &config::absolutize_path(cwd, path),
            &stats,
        )?;
    }
    Ok(0)
}

pub fn render_help() -> Result<String, HarnessError> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();
    cmd.write_long_help(&mut buffer)
        .map_err(|e| HarnessError::Io(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| HarnessError::Io(e.to_string()))
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::{render_help, replay_with_cli, run_with_runtime, Cli};
    use clap::Parser;
    use crate::errors::HarnessError;
    use crate::runtime::{FakeFileSystem, FakeTerminal, FileSystem, ProductionRuntime};
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn args(values: &[&str]) -> Vec<OsString> {
        std::iter::once("framereplay")
            .chain(values.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn fake_runtime(fs: &FakeFileSystem, terminal: &FakeTerminal) -> ProductionRuntime {
        ProductionRuntime {
            file_system: Arc::new(fs.clone()),
            terminal: Arc::new(terminal.clone()),
        }
    }

    #[test]
    fn help_lists_replay_flags() {
        let help = render_help().expect("help");
        for flag in ["--fixture-root", "--load-stories", "--continue-on-failure", "--summary-json"] {
            assert!(help.contains(flag), "missing {flag}");
        }
    }

    #[test]
    fn missing_user_and_root_is_a_precondition_failure() {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::default();
        let err = run_with_runtime(&args(&[]), &[], Path::new("/work"), &fake_runtime(&fs, &terminal))
            .expect_err("no root");
        assert!(matches!(err, HarnessError::Precondition(_)));
        assert!(terminal.written_lines().is_empty());
    }

    #[test]
    fn unknown_flag_is_a_cli_error() {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::default();
        let err = run_with_runtime(
            &args(&["--frames", "3"]),
            &[],
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect_err("bad flag");
        assert!(matches!(err, HarnessError::Cli(_)));
    }

    #[test]
    fn user_env_derives_the_default_root() {
        let fs = FakeFileSystem::with_file("/home/alex/deft/testdata/0/planning.json", "{}");
        let terminal = FakeTerminal::default();
        let env = vec![(OsString::from("USER"), OsString::from("alex"))];
        let code = run_with_runtime(&args(&[]), &env, Path::new("/work"), &fake_runtime(&fs, &terminal))
            .expect("run");
        assert_eq!(code, 0);
        assert!(fs
            .file(Path::new("/home/alex/deft/testdata/0/deft.json"))
            .is_some());
        let lines = terminal.written_lines();
        assert_eq!(lines[0], "Processing Frame 0");
        assert!(lines.contains(&"stopped at frame index: 1".to_string()));
    }

    #[test]
    fn relative_fixture_root_and_summary_resolve_against_cwd() {
        let fs = FakeFileSystem::default();
        fs.write_string(Path::new("/work/fx/0/planning.json"), "{}")
            .expect("seed");
        let terminal = FakeTerminal::default();
        run_with_runtime(
            &args(&["--fixture-root", "fx", "--summary-json", "out/summary.json"]),
            &[],
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect("run");
        let summary = fs
            .file(Path::new("/work/out/summary.json"))
            .expect("summary written");
        let value: serde_json::Value = serde_json::from_str(&summary).expect("json");
        assert_eq!(value["frames_processed"], 1);
    }

    #[test]
    fn init_time_counts_from_the_start_instant_passed_in() {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::default();
        let cli = Cli::try_parse_from(args(&["--fixture-root", "/empty"])).expect("parse");
        let Some(started_at) = Instant::now().checked_sub(Duration::from_secs(2)) else {
            return;
        };
        replay_with_cli(&cli, started_at, &[], Path::new("/work"), &fake_runtime(&fs, &terminal))
            .expect("run");
        let init_line = terminal
            .written_lines()
            .into_iter()
            .find(|line| line.starts_with("INIT TIME: "))
            .expect("init line");
        let seconds: f64 = init_line
            .trim_start_matches("INIT TIME: ")
            .trim_end_matches(" seconds")
            .parse()
            .expect("seconds");
        assert!(seconds >= 2.0, "{init_line}");
    }

    #[test]
    fn config_file_settings_reach_the_replay() {
        let fs = FakeFileSystem::with_file(
            "/work/harness.toml",
            "[fixtures]\nroot = \"/data\"\noutput_file = \"result.json\"\n\n[run]\npretty_output = true\n",
        );
        fs.write_string(Path::new("/data/0/planning.json"), "{}")
            .expect("seed");
        let terminal = FakeTerminal::default();
        run_with_runtime(
            &args(&["--config", "/work/harness.toml"]),
            &[],
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect("run");
        let output = fs.file(Path::new("/data/0/result.json")).expect("output");
        assert!(output.contains('\n'));
    }
}
