use crate::errors::HarnessError;
use crate::fixture::{
    FixtureLayout, InputChannel, DEFAULT_HEADER_FILE, DEFAULT_OUTPUT_FILE, DEFAULT_PRIMARY_FILE,
};
use crate::pipeline::constant_velocity::MAX_TRAJECTORY_STEPS;
use crate::runtime::FileSystem;
use crate::types::{FailurePolicy, FixtureRoot, FixtureRootSource, PipelineKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type EnvMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub fixture_root: Option<PathBuf>,
    pub pipeline: Option<PipelineKind>,
    pub load_stories: bool,
    pub continue_on_failure: bool,
    pub pretty_output: bool,
    pub run_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    pub fixtures: FixturesConfig,
    pub inputs: InputsConfig,
    pub pipeline: PipelineConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixturesConfig {
    pub root: Option<PathBuf>,
    pub home_env: String,
    pub primary_file: String,
    pub header_file: String,
    pub output_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputsConfig {
    pub load_stories: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub kind: PipelineKind,
    pub config_path: PathBuf,
    pub map_id: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub horizon_sec: f64,
    pub step_sec: f64,
    /// How long the command pipeline waits for one reply line.
    pub reply_timeout_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    pub on_frame_failure: FailurePolicy,
    pub pretty_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fixtures: FixturesConfig {
                root: None,
                home_env: "USER".to_string(),
                primary_file: DEFAULT_PRIMARY_FILE.to_string(),
                header_file: DEFAULT_HEADER_FILE.to_string(),
                output_file: DEFAULT_OUTPUT_FILE.to_string(),
            },
            inputs: InputsConfig {
                load_stories: false,
            },
            pipeline: PipelineConfig {
                kind: PipelineKind::ConstantVelocity,
                config_path: PathBuf::from(
                    "/apollo/modules/planning/conf/planning_config.pb.txt",
                ),
                map_id: "base_map.bin".to_string(),
                command: None,
                args: Vec::new(),
                horizon_sec: 8.0,
                step_sec: 0.1,
                reply_timeout_sec: 30.0,
            },
            run: RunConfig {
                on_frame_failure: FailurePolicy::Abort,
                pretty_output: false,
            },
            logging: LoggingConfig {
                run_log: None,
                max_payload_bytes: 4096,
            },
        }
    }
}

impl HarnessConfig {
    pub fn layout(&self, root: &Path) -> FixtureLayout {
        FixtureLayout {
            root: root.to_path_buf(),
            primary_file: self.fixtures.primary_file.clone(),
            header_file: self.fixtures.header_file.clone(),
            output_file: self.fixtures.output_file.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialHarnessConfig {
    fixtures: Option<PartialFixturesConfig>,
    inputs: Option<PartialInputsConfig>,
    pipeline: Option<PartialPipelineConfig>,
    run: Option<PartialRunConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialFixturesConfig {
    root: Option<PathBuf>,
    home_env: Option<String>,
    primary_file: Option<String>,
    header_file: Option<String>,
    output_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialInputsConfig {
    load_stories: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPipelineConfig {
    kind: Option<PipelineKind>,
    config_path: Option<PathBuf>,
    map_id: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    horizon_sec: Option<f64>,
    step_sec: Option<f64>,
    reply_timeout_sec: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRunConfig {
    on_frame_failure: Option<FailurePolicy>,
    pretty_output: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    run_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

pub fn load_config(
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<HarnessConfig, HarnessError> {
    let mut cfg = HarnessConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialHarnessConfig = toml::from_str(&file_contents)
            .map_err(|e| HarnessError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut HarnessConfig, partial: PartialHarnessConfig) {
    if let Some(fixtures) = partial.fixtures {
        if let Some(root) = fixtures.root {
            cfg.fixtures.root = Some(root);
        }
        if let Some(value) = fixtures.home_env {
            cfg.fixtures.home_env = value;
        }
        if let Some(value) = fixtures.primary_file {
            cfg.fixtures.primary_file = value;
        }
        if let Some(value) = fixtures.header_file {
            cfg.fixtures.header_file = value;
        }
        if let Some(value) = fixtures.output_file {
            cfg.fixtures.output_file = value;
        }
    }

    if let Some(inputs) = partial.inputs {
        if let Some(value) = inputs.load_stories {
            cfg.inputs.load_stories = value;
        }
    }

    if let Some(pipeline) = partial.pipeline {
        if let Some(kind) = pipeline.kind {
            cfg.pipeline.kind = kind;
        }
        if let Some(value) = pipeline.config_path {
            cfg.pipeline.config_path = value;
        }
        if let Some(value) = pipeline.map_id {
            cfg.pipeline.map_id = value;
        }
        if let Some(command) = pipeline.command {
            cfg.pipeline.command = Some(command);
        }
        if let Some(args) = pipeline.args {
            cfg.pipeline.args = args;
        }
        if let Some(value) = pipeline.horizon_sec {
            cfg.pipeline.horizon_sec = value;
        }
        if let Some(value) = pipeline.step_sec {
            cfg.pipeline.step_sec = value;
        }
        if let Some(value) = pipeline.reply_timeout_sec {
            cfg.pipeline.reply_timeout_sec = value;
        }
    }

    if let Some(run) = partial.run {
        if let Some(value) = run.on_frame_failure {
            cfg.run.on_frame_failure = value;
        }
        if let Some(value) = run.pretty_output {
            cfg.run.pretty_output = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.run_log {
            cfg.logging.run_log = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut HarnessConfig, overrides: &CliOverrides) {
    if let Some(kind) = overrides.pipeline {
        cfg.pipeline.kind = kind;
    }
    if overrides.load_stories {
        cfg.inputs.load_stories = true;
    }
    if overrides.continue_on_failure {
        cfg.run.on_frame_failure = FailurePolicy::Continue;
    }
    if overrides.pretty_output {
        cfg.run.pretty_output = true;
    }
    if let Some(path) = &overrides.run_log {
        cfg.logging.run_log = Some(path.clone());
    }
}

/// Picks the fixture root: CLI flag, then config, then `/home/$<home_env>/deft/testdata`.
///
/// Failing all three is the one fatal startup precondition of a run.
pub fn resolve_fixture_root(
    cfg: &HarnessConfig,
    overrides: &CliOverrides,
    env: &EnvMap,
    process_cwd: &Path,
) -> Result<FixtureRoot, HarnessError> {
    if let Some(path) = &overrides.fixture_root {
        return Ok(FixtureRoot {
            path: absolutize_path(process_cwd, path),
            source: FixtureRootSource::CliOverride,
        });
    }
    if let Some(path) = &cfg.fixtures.root {
        return Ok(FixtureRoot {
            path: absolutize_path(process_cwd, path),
            source: FixtureRootSource::Config,
        });
    }
    let var = cfg.fixtures.home_env.as_str();
    match env.get(var).map(|value| value.trim()) {
        Some(user) if !user.is_empty() => Ok(FixtureRoot {
            path: PathBuf::from("/home").join(user).join("deft/testdata"),
            source: FixtureRootSource::HomeEnv(var.to_string()),
        }),
        _ => Err(HarnessError::Precondition(format!(
            "{var} environment variable is not set and no fixture root was given \
             (use --fixture-root or fixtures.root)"
        ))),
    }
}

pub fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &HarnessConfig) -> Result<(), HarnessError> {
    let reserved = [
        ("fixtures.primary_file", cfg.fixtures.primary_file.as_str()),
        ("fixtures.header_file", cfg.fixtures.header_file.as_str()),
        ("fixtures.output_file", cfg.fixtures.output_file.as_str()),
    ];
    for (key, name) in reserved {
        if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
            return Err(HarnessError::InvalidConfig(format!(
                "{key} must be a plain file name"
            )));
        }
        if InputChannel::ALL
            .iter()
            .any(|channel| channel.file_name() == name)
        {
            return Err(HarnessError::InvalidConfig(format!(
                "{key} collides with an input channel file name"
            )));
        }
    }
    for (i, (key_a, a)) in reserved.iter().enumerate() {
        for (key_b, b) in reserved.iter().skip(i + 1) {
            if a == b {
                return Err(HarnessError::InvalidConfig(format!(
                    "{key_a} and {key_b} must differ"
                )));
            }
        }
    }

    if cfg.fixtures.root.is_none() && cfg.fixtures.home_env.trim().is_empty() {
        return Err(HarnessError::InvalidConfig(
            "fixtures.home_env must be set when fixtures.root is omitted".to_string(),
        ));
    }

    let (step, horizon) = (cfg.pipeline.step_sec, cfg.pipeline.horizon_sec);
    if !step.is_finite() || step <= 0.0 {
        return Err(HarnessError::InvalidConfig(
            "pipeline.step_sec must be a finite number greater than zero".to_string(),
        ));
    }
    if !horizon.is_finite() || horizon < step {
        return Err(HarnessError::InvalidConfig(
            "pipeline.horizon_sec must be finite and at least pipeline.step_sec".to_string(),
        ));
    }
    if cfg.pipeline.kind == PipelineKind::ConstantVelocity
        && (horizon / step).round() > MAX_TRAJECTORY_STEPS as f64
    {
        return Err(HarnessError::InvalidConfig(format!(
            "pipeline.horizon_sec / pipeline.step_sec may not exceed {MAX_TRAJECTORY_STEPS}"
        )));
    }
    let timeout = cfg.pipeline.reply_timeout_sec;
    if !timeout.is_finite() || timeout <= 0.0 {
        return Err(HarnessError::InvalidConfig(
            "pipeline.reply_timeout_sec must be a finite number greater than zero".to_string(),
        ));
    }
    if cfg.pipeline.kind == PipelineKind::Command
        && !cfg
            .pipeline
            .command
            .as_deref()
            .is_some_and(|command| !command.trim().is_empty())
    {
        return Err(HarnessError::InvalidConfig(
            "pipeline.command is required for the command pipeline".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, resolve_fixture_root, CliOverrides, EnvMap, HarnessConfig};
    use crate::runtime::FakeFileSystem;
    use crate::types::{FailurePolicy, FixtureRootSource, PipelineKind};
    use std::path::{Path, PathBuf};

    fn overrides_with_config(path: &str) -> CliOverrides {
        CliOverrides {
            config_path: Some(PathBuf::from(path)),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn defaults_disable_stories_and_abort_on_failure() {
        let fs = FakeFileSystem::default();
        let cfg = load_config(&CliOverrides::default(), &fs).expect("config");
        assert_eq!(cfg, HarnessConfig::default());
        assert!(!cfg.inputs.load_stories);
        assert_eq!(cfg.run.on_frame_failure, FailurePolicy::Abort);
        assert_eq!(cfg.pipeline.kind, PipelineKind::ConstantVelocity);
    }

    #[test]
    fn partial_file_merges_over_defaults_and_cli_wins() {
        let fs = FakeFileSystem::with_file(
            "/cfg.toml",
            r#"
[fixtures]
root = "fixtures"
[inputs]
load_stories = false
[pipeline]
kind = "command"
command = "planner"
args = ["--flagfile", "planning.conf"]
[run]
on_frame_failure = "abort"
"#,
        );
        let mut overrides = overrides_with_config("/cfg.toml");
        overrides.load_stories = true;
        overrides.continue_on_failure = true;

        let cfg = load_config(&overrides, &fs).expect("config");
        assert_eq!(cfg.fixtures.root, Some(PathBuf::from("fixtures")));
        assert_eq!(cfg.fixtures.primary_file, "planning.json");
        assert_eq!(cfg.pipeline.kind, PipelineKind::Command);
        assert_eq!(cfg.pipeline.args.len(), 2);
        assert!(cfg.inputs.load_stories);
        assert_eq!(cfg.run.on_frame_failure, FailurePolicy::Continue);
        assert_eq!(cfg.pipeline.horizon_sec, 8.0);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[pipeline\nkind = ");
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("parse");
        assert!(err.to_string().starts_with("config parse error"));
    }

    #[test]
    fn output_name_may_not_shadow_an_input() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[fixtures]\noutput_file = \"header.json\"\n");
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("collision");
        assert!(err.to_string().contains("must differ"));

        let fs = FakeFileSystem::with_file("/cfg.toml", "[fixtures]\noutput_file = \"chassis.json\"\n");
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("collision");
        assert!(err.to_string().contains("input channel"));
    }

    #[test]
    fn non_finite_or_oversized_horizon_is_rejected() {
        let fs = FakeFileSystem::with_file("/cfg.toml", "[pipeline]\nhorizon_sec = inf\n");
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("inf");
        assert!(err.to_string().starts_with("invalid config"));
        assert!(err.to_string().contains("pipeline.horizon_sec"));

        let fs = FakeFileSystem::with_file(
            "/cfg.toml",
            "[pipeline]\nhorizon_sec = 1e9\nstep_sec = 0.001\n",
        );
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("ratio");
        assert!(err.to_string().contains("may not exceed"));

        let fs = FakeFileSystem::with_file("/cfg.toml", "[pipeline]\nreply_timeout_sec = 0.0\n");
        let err = load_config(&overrides_with_config("/cfg.toml"), &fs).expect_err("timeout");
        assert!(err.to_string().contains("pipeline.reply_timeout_sec"));
    }

    #[test]
    fn command_pipeline_requires_a_command() {
        let fs = FakeFileSystem::default();
        let overrides = CliOverrides {
            pipeline: Some(PipelineKind::Command),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, &fs).expect_err("missing command");
        assert!(err.to_string().contains("pipeline.command"));
    }

    #[test]
    fn fixture_root_prefers_cli_then_config_then_home_env() {
        let mut env = EnvMap::new();
        env.insert("USER".to_string(), "apollo".to_string());
        let mut cfg = HarnessConfig::default();

        let root = resolve_fixture_root(&cfg, &CliOverrides::default(), &env, Path::new("/work"))
            .expect("env root");
        assert_eq!(root.path, PathBuf::from("/home/apollo/deft/testdata"));
        assert_eq!(root.source, FixtureRootSource::HomeEnv("USER".to_string()));

        cfg.fixtures.root = Some(PathBuf::from("data"));
        let root = resolve_fixture_root(&cfg, &CliOverrides::default(), &env, Path::new("/work"))
            .expect("config root");
        assert_eq!(root.path, PathBuf::from("/work/data"));

        let overrides = CliOverrides {
            fixture_root: Some(PathBuf::from("/abs/fixtures")),
            ..CliOverrides::default()
        };
        let root = resolve_fixture_root(&cfg, &overrides, &env, Path::new("/work")).expect("cli");
        assert_eq!(root.path, PathBuf::from("/abs/fixtures"));
        assert_eq!(root.source, FixtureRootSource::CliOverride);
    }

    #[test]
    fn missing_home_env_is_a_precondition_failure() {
        let err = resolve_fixture_root(
            &HarnessConfig::default(),
            &CliOverrides::default(),
            &EnvMap::new(),
            Path::new("/work"),
        )
        .expect_err("no root");
        assert!(err.to_string().starts_with("startup precondition failed"));
        assert!(err.to_string().contains("USER"));
    }
}
