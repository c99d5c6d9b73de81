//! Configuration loading from progress.toml
//!
//! Settings resolve in layers: built-in defaults, then `progress.toml`
//! (discovered by walking up from the current directory), then environment
//! variables and command line flags (bound together by clap).

use crate::machine::MachineOverrides;
use crate::Cli;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`ProgressConfig::discover`]
pub const CONFIG_FILE: &str = "progress.toml";

/// Default number of samples per target
pub const DEFAULT_SAMPLES: u32 = 30;

/// Default report path
pub const DEFAULT_OUTPUT: &str = "progress.json";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid duration {0:?} (expected e.g. \"30s\", \"500ms\", \"2m\")")]
    InvalidDuration(String),

    #[error("sample count must be at least 1")]
    ZeroSamples,

    #[error("invalid target filter: {0}")]
    Filter(#[from] regex::Error),
}

/// Contents of progress.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    /// Sampling configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Report file configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Machine profile overrides
    #[serde(default)]
    pub machine: MachineConfig,
}

/// How samples are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// One worker process per sample (default)
    #[default]
    Process,
    /// Same process, panics contained
    InProcess,
}

/// Runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Samples per target
    #[serde(default)]
    pub samples: Option<u32>,
    /// Isolation mode: "process" or "in-process"
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Per-sample worker timeout (e.g. "60s"); unset waits forever
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Report path
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// JSON indent width; compact when unset
    #[serde(default)]
    pub indent: Option<usize>,
}

/// Machine overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// OS description
    #[serde(default)]
    pub os: Option<String>,
    /// vCPU count
    #[serde(default)]
    pub vcpu: Option<String>,
}

impl ProgressConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find progress.toml in the current directory or an ancestor
    pub fn discover() -> Result<Option<(PathBuf, Self)>, ConfigError> {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Ok(None),
        }
    }

    /// Find progress.toml in `start` or an ancestor
    pub fn discover_from(start: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        for dir in start.ancestors() {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                let config = Self::load(&config_path)?;
                return Ok(Some((config_path, config)));
            }
        }
        Ok(None)
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m"); a bare number is seconds
    pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidDuration(s.to_string());
        if s.is_empty() {
            return Err(invalid());
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }

        let seconds = match unit_part.to_lowercase().as_str() {
            "ms" => value / 1_000.0,
            "s" => value,
            "m" | "min" => value * 60.0,
            "h" => value * 3_600.0,
            _ => return Err(invalid()),
        };

        Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
    }
}

/// Fully resolved run settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Samples per target unless overridden by the suite or the target
    pub samples: u32,
    /// Report path
    pub output: PathBuf,
    /// JSON indent width
    pub output_indent: Option<usize>,
    /// Machine profile overrides
    pub machine: MachineOverrides,
    /// Sample execution mode
    pub isolation: IsolationMode,
    /// Per-sample worker timeout
    pub worker_timeout: Option<Duration>,
    /// Only targets whose id matches run
    pub filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            output: PathBuf::from(DEFAULT_OUTPUT),
            output_indent: None,
            machine: MachineOverrides::default(),
            isolation: IsolationMode::default(),
            worker_timeout: None,
            filter: ".*".to_string(),
        }
    }
}

impl Settings {
    /// Layer `file` and then `cli` (flags and environment) over the defaults
    pub fn resolve(file: &ProgressConfig, cli: &Cli) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let samples = cli
            .samples
            .or(file.runner.samples)
            .unwrap_or(defaults.samples);
        if samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }

        let isolation = match cli.isolated {
            Some(true) => IsolationMode::Process,
            Some(false) => IsolationMode::InProcess,
            None => file.runner.isolation,
        };

        let worker_timeout = match cli.worker_timeout.as_deref().or(file.runner.timeout.as_deref()) {
            Some(text) => Some(ProgressConfig::parse_duration(text)?),
            None => None,
        };

        let filter = cli.filter.clone().unwrap_or(defaults.filter);
        regex::Regex::new(&filter)?;

        Ok(Self {
            samples,
            output: cli
                .output
                .clone()
                .or_else(|| file.output.path.clone())
                .unwrap_or(defaults.output),
            output_indent: cli.output_indent.or(file.output.indent),
            machine: MachineOverrides {
                name: cli.machine_name.clone().or_else(|| file.machine.name.clone()),
                os: cli.machine_os.clone().or_else(|| file.machine.os.clone()),
                vcpu: cli.machine_vcpu.clone().or_else(|| file.machine.vcpu.clone()),
            },
            isolation,
            worker_timeout,
            filter,
        })
    }

    /// Sample count for a target: its own override, then the suite's, then ours
    pub fn samples_for(&self, target: Option<u32>, suite: Option<u32>) -> u32 {
        target.or(suite).unwrap_or(self.samples)
    }

    /// Commented template of every recognised key
    pub fn default_toml() -> &'static str {
        r#"# progress-tracker configuration

[runner]
# Samples per target
samples = 30
# "process" runs every sample in a fresh worker, "in-process" runs it here
isolation = "process"
# Kill a worker that takes longer than this (uncomment to enable)
# timeout = "60s"

[output]
# Cumulative report
path = "progress.json"
# JSON indent width (uncomment for pretty output)
# indent = 2

[machine]
# name = "Workstation"
# os = "Ubuntu 22.04"
# vcpu = "8"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.samples, 30);
        assert_eq!(settings.output, PathBuf::from("progress.json"));
        assert_eq!(settings.output_indent, None);
        assert_eq!(settings.isolation, IsolationMode::Process);
        assert_eq!(settings.worker_timeout, None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(ProgressConfig::parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(ProgressConfig::parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(ProgressConfig::parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(ProgressConfig::parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(ProgressConfig::parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(ProgressConfig::parse_duration("fast").is_err());
        assert!(ProgressConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: ProgressConfig = toml::from_str(
            r#"
            [runner]
            samples = 5
            isolation = "in-process"

            [output]
            indent = 2
        "#,
        )
        .unwrap();
        assert_eq!(config.runner.samples, Some(5));
        assert_eq!(config.runner.isolation, IsolationMode::InProcess);
        assert_eq!(config.output.indent, Some(2));
        assert!(config.output.path.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<ProgressConfig, _> = toml::from_str("[runner]\nwarmup = \"3s\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_toml_parses() {
        let config: ProgressConfig = toml::from_str(Settings::default_toml()).unwrap();
        assert_eq!(config.runner.samples, Some(30));
        assert_eq!(config.output.path, Some(PathBuf::from("progress.json")));
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[runner]\nsamples = 7\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (path, config) = ProgressConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE));
        assert_eq!(config.runner.samples, Some(7));
    }

    #[test]
    fn test_discover_reports_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[runner\n").unwrap();
        assert!(matches!(
            ProgressConfig::discover_from(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cli_beats_file_beats_defaults() {
        let file: ProgressConfig = toml::from_str(
            r#"
            [runner]
            samples = 5
            timeout = "2s"
            [output]
            path = "from-file.json"
            [machine]
            name = "File Box"
        "#,
        )
        .unwrap();

        let settings = Settings::resolve(&file, &cli(&["--samples", "3"])).unwrap();
        assert_eq!(settings.samples, 3);
        assert_eq!(settings.output, PathBuf::from("from-file.json"));
        assert_eq!(settings.worker_timeout, Some(Duration::from_secs(2)));
        assert_eq!(settings.machine.name.as_deref(), Some("File Box"));

        let settings = Settings::resolve(
            &file,
            &cli(&["--machine-name", "Cli Box", "--isolated=false", "--output-indent", "4"]),
        )
        .unwrap();
        assert_eq!(settings.samples, 5);
        assert_eq!(settings.machine.name.as_deref(), Some("Cli Box"));
        assert_eq!(settings.isolation, IsolationMode::InProcess);
        assert_eq!(settings.output_indent, Some(4));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let result = Settings::resolve(&ProgressConfig::default(), &cli(&["--samples", "0"]));
        assert!(matches!(result, Err(ConfigError::ZeroSamples)));
    }

    #[test]
    fn test_bad_filter_rejected() {
        let result = Settings::resolve(&ProgressConfig::default(), &cli(&["("]));
        assert!(matches!(result, Err(ConfigError::Filter(_))));
    }

    #[test]
    fn test_sample_precedence() {
        let settings = Settings::default();
        assert_eq!(settings.samples_for(Some(3), Some(10)), 3);
        assert_eq!(settings.samples_for(None, Some(10)), 10);
        assert_eq!(settings.samples_for(None, None), 30);
    }
}
