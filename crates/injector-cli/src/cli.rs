//! Argument parsing
//!
//! Exactly one mode per invocation: submit, batch, status, metrics or
//! daemon.

use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use injector_queue::Priority;
use serde_json::Value;
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// What the invocation should do
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Run one task to completion
    Submit {
        task_type: String,
        spec: Value,
        priority: Priority,
    },
    /// Run a batch file to completion
    Batch { path: PathBuf, priority: Priority },
    /// Look up a task or batch in the state file
    Status { id: String },
    /// Report metrics from the state file
    Metrics,
    /// Process work until interrupted
    Daemon,
}

/// Parsed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub log_format: LogFormat,
    pub mode: Mode,
}

/// Malformed invocation
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("--spec is not valid JSON: {0}")]
    SpecJson(#[source] serde_json::Error),
}

/// Command definition
#[must_use]
pub fn command() -> Command {
    Command::new("prefab-injector")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Priority task injector with batch jobs and self-repair")
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (.yaml, .yml, .toml or .json)"),
        )
        .arg(
            Arg::new("task-type")
                .long("task-type")
                .help("Task type to submit (generate_prefab, generate_script, optimize_assets, validate_project)"),
        )
        .arg(
            Arg::new("spec")
                .long("spec")
                .requires("task-type")
                .help("Task specification as a JSON object"),
        )
        .arg(
            Arg::new("priority")
                .long("priority")
                .default_value("normal")
                .value_parser(["low", "normal", "medium", "high", "critical"])
                .help("Task priority; a batch file's own priority takes precedence"),
        )
        .arg(
            Arg::new("batch-file")
                .long("batch-file")
                .value_parser(value_parser!(PathBuf))
                .help("Batch definition file (.yaml, .yml or .json)"),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .value_name("ID")
                .help("Show a task or batch from the state file"),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .action(ArgAction::SetTrue)
                .help("Show metrics and system health"),
        )
        .arg(
            Arg::new("start-daemon")
                .long("start-daemon")
                .action(ArgAction::SetTrue)
                .help("Process queued work until interrupted"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .default_value("pretty")
                .value_parser(["pretty", "json"])
                .help("Log format on stderr"),
        )
        .group(
            ArgGroup::new("mode")
                .args(["task-type", "batch-file", "status", "metrics", "start-daemon"])
                .required(true)
                .multiple(false),
        )
}

impl CliArgs {
    /// Parse from an argument iterator (first item is the binary name)
    ///
    /// # Errors
    /// - `CliError::Usage` for clap errors (including `--help`)
    /// - `CliError::SpecJson` for an unparseable `--spec`
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        Self::from_matches(&matches)
    }

    /// Build from clap matches
    ///
    /// # Errors
    /// - `CliError::SpecJson` for an unparseable `--spec`
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, CliError> {
        let priority = matches
            .get_one::<String>("priority")
            .and_then(|p| p.parse::<Priority>().ok())
            .unwrap_or_default();
        let log_format = match matches.get_one::<String>("log-format").map(String::as_str) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let mode = if let Some(task_type) = matches.get_one::<String>("task-type") {
            let spec = match matches.get_one::<String>("spec") {
                Some(raw) => serde_json::from_str(raw).map_err(CliError::SpecJson)?,
                None => Value::Object(serde_json::Map::new()),
            };
            Mode::Submit {
                task_type: task_type.clone(),
                spec,
                priority,
            }
        } else if let Some(path) = matches.get_one::<PathBuf>("batch-file") {
            Mode::Batch {
                path: path.clone(),
                priority,
            }
        } else if let Some(id) = matches.get_one::<String>("status") {
            Mode::Status { id: id.clone() }
        } else if matches.get_flag("metrics") {
            Mode::Metrics
        } else {
            Mode::Daemon
        };

        Ok(Self {
            config: matches.get_one::<PathBuf>("config").cloned(),
            log_format,
            mode,
        })
    }
}
