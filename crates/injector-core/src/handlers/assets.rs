use super::{unexpected_spec, HandlerContext, HandlerOutput, TaskHandler};
use crate::error::HandlerError;
use async_trait::async_trait;
use injector_queue::{Task, TaskSpec, TaskType};
use std::path::{Path, PathBuf};

/// Copies an asset to `<asset_path>.optimized`
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeAssetsHandler;

#[async_trait]
impl TaskHandler for OptimizeAssetsHandler {
    fn task_type(&self) -> TaskType {
        TaskType::OptimizeAssets
    }

    async fn handle(
        &self,
        task: &Task,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let TaskSpec::OptimizeAssets(spec) = &task.spec else {
            return Err(unexpected_spec(self.task_type(), task));
        };

        let source = &spec.asset_path;
        let target = optimized_path(source);
        tokio::fs::copy(source, &target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HandlerError::io(source, &e)
            } else {
                HandlerError::io(&target, &e)
            }
        })?;

        tracing::info!("Optimized {} -> {}", source.display(), target.display());
        Ok(HandlerOutput {
            output_path: Some(target),
        })
    }
}

fn optimized_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".optimized");
    PathBuf::from(name)
}

/// Checks a project directory exists and has an `Assets` folder
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateProjectHandler;

#[async_trait]
impl TaskHandler for ValidateProjectHandler {
    fn task_type(&self) -> TaskType {
        TaskType::ValidateProject
    }

    async fn handle(
        &self,
        task: &Task,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let TaskSpec::ValidateProject(spec) = &task.spec else {
            return Err(unexpected_spec(self.task_type(), task));
        };

        let root = &spec.project_path;
        let metadata = tokio::fs::metadata(root).await.map_err(|e| {
            HandlerError::io(root, &e).with("is_directory", true)
        })?;
        if !metadata.is_dir() {
            return Err(HandlerError::new(format!(
                "project path is not a directory: {}",
                root.display()
            )));
        }

        let assets = root.join("Assets");
        if !tokio::fs::try_exists(&assets).await.unwrap_or(false) {
            return Err(HandlerError::new(format!(
                "project structure invalid, no Assets folder in {}",
                root.display()
            ))
            .with("project_path", root.to_string_lossy().into_owned()));
        }

        let mut scripts = 0usize;
        let mut entries = tokio::fs::read_dir(&assets)
            .await
            .map_err(|e| HandlerError::io(&assets, &e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HandlerError::io(&assets, &e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "cs") {
                scripts += 1;
            }
        }

        tracing::info!("Validated project {} ({} top-level scripts)", root.display(), scripts);
        Ok(HandlerOutput::default())
    }
}
