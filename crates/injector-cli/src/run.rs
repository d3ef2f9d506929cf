//! Mode execution
//!
//! Each mode prints one pretty JSON document on stdout and returns the
//! process exit status.

use crate::cli::{CliArgs, CliError, Mode};
use anyhow::Context;
use injector_core::{BatchFile, InjectorConfig, InjectorError, PrefabInjector, StateStore};
use injector_queue::{BatchId, BatchReport, BatchStatus, Priority, TaskId, TaskStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::ExitCode;

/// Process exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exit {
    Success = 0,
    /// Task or batch failed, or the ID is unknown
    Failed = 1,
    InvalidInput = 2,
    Internal = 3,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

impl Exit {
    /// Classify an error escaping [`execute`]
    #[must_use]
    pub fn for_error(error: &anyhow::Error) -> Self {
        if let Some(e) = error.downcast_ref::<InjectorError>() {
            if e.is_invalid_input() {
                return Exit::InvalidInput;
            }
            if e.is_not_found() {
                return Exit::Failed;
            }
        }
        if error.downcast_ref::<CliError>().is_some() {
            return Exit::InvalidInput;
        }
        Exit::Internal
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the parsed invocation
///
/// # Errors
/// Invalid input, unknown IDs and internal failures; see [`Exit::for_error`]
pub async fn execute(args: CliArgs) -> anyhow::Result<Exit> {
    let config = InjectorConfig::load(args.config.as_deref()).map_err(InjectorError::from)?;

    match args.mode {
        Mode::Submit {
            task_type,
            spec,
            priority,
        } => submit(config, &task_type, spec, priority).await,
        Mode::Batch { path, priority } => batch(config, &path, priority).await,
        Mode::Status { id } => status(&config, &id).await,
        Mode::Metrics => metrics(config).await,
        Mode::Daemon => daemon(config).await,
    }
}

async fn submit(
    config: InjectorConfig,
    task_type: &str,
    spec: Value,
    priority: Priority,
) -> anyhow::Result<Exit> {
    let injector = PrefabInjector::new(config)?;
    injector.load_state().await?;

    let id = injector.submit(task_type, spec, priority)?;
    injector.start().await;
    let task = injector.wait_for_task(id).await;
    injector.stop().await;
    injector.save_state().await?;

    let task = task?;
    print_json(&task)?;
    Ok(if task.status == TaskStatus::Succeeded {
        Exit::Success
    } else {
        Exit::Failed
    })
}

async fn batch(config: InjectorConfig, path: &Path, priority: Priority) -> anyhow::Result<Exit> {
    let file = BatchFile::load(path).map_err(InjectorError::from)?;
    let name = file.name.clone();
    let priority = file.priority.unwrap_or(priority);

    let injector = PrefabInjector::new(config)?;
    injector.load_state().await?;

    let id = injector.create_batch(&name, file.into_tasks(), priority)?;
    injector.start().await;
    let report = injector.wait_for_batch(id).await;
    injector.stop().await;
    injector.save_state().await?;

    let report = report?;
    print_json(&report)?;
    Ok(if report.status == BatchStatus::Succeeded {
        Exit::Success
    } else {
        Exit::Failed
    })
}

/// Read-only lookup; unfinished tasks are reported as last persisted
async fn status(config: &InjectorConfig, id: &str) -> anyhow::Result<Exit> {
    let snapshot = match &config.state_file {
        Some(path) => StateStore::new(path)
            .load()
            .await
            .map_err(InjectorError::from)?
            .unwrap_or_default(),
        None => {
            tracing::warn!("No state_file configured; nothing to look up");
            Default::default()
        }
    };

    if let Ok(task_id) = id.parse::<TaskId>() {
        if let Some(task) = snapshot.tasks.iter().find(|t| t.id == task_id) {
            print_json(task)?;
            return Ok(Exit::Success);
        }
    }
    if let Ok(batch_id) = id.parse::<BatchId>() {
        if let Some(job) = snapshot.batches.iter().find(|b| b.id == batch_id) {
            let members = job
                .task_ids
                .iter()
                .filter_map(|member| snapshot.tasks.iter().find(|t| t.id == *member).cloned())
                .collect();
            print_json(&BatchReport::new(job, members))?;
            return Ok(Exit::Success);
        }
    }

    print_json(&json!({ "error": format!("no task or batch with id '{id}'") }))?;
    Ok(Exit::Failed)
}

async fn metrics(config: InjectorConfig) -> anyhow::Result<Exit> {
    let injector = PrefabInjector::new(config)?;
    injector.load_state().await?;
    print_json(&injector.metrics())?;
    Ok(Exit::Success)
}

async fn daemon(config: InjectorConfig) -> anyhow::Result<Exit> {
    let interval = config.persist_interval();
    let injector = PrefabInjector::new(config)?;
    let restored = injector.load_state().await?;
    tracing::info!("Daemon starting with {} restored task(s)", restored);

    injector.start().await;
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for ctrl-c")?;
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = injector.save_state().await {
                    tracing::warn!("Periodic state save failed: {}", e);
                }
            }
        }
    }

    injector.stop().await;
    injector.save_state().await?;
    print_json(&injector.metrics())?;
    Ok(Exit::Success)
}
