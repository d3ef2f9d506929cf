//! Typed task specifications
//!
//! Submissions arrive as `(task_type, json)` and are validated into a
//! [`TaskSpec`]. Every task type has an explicit option set; unknown keys,
//! unknown task types and wrongly typed values are rejected.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Recognized task types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GeneratePrefab,
    GenerateScript,
    OptimizeAssets,
    ValidateProject,
}

impl TaskType {
    /// Every recognized task type
    pub const ALL: [TaskType; 4] = [
        TaskType::GeneratePrefab,
        TaskType::GenerateScript,
        TaskType::OptimizeAssets,
        TaskType::ValidateProject,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::GeneratePrefab => "generate_prefab",
            TaskType::GenerateScript => "generate_script",
            TaskType::OptimizeAssets => "optimize_assets",
            TaskType::ValidateProject => "validate_project",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QueueError::invalid_spec("task_type is empty"));
        }
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| QueueError::invalid_spec(format!("unknown task_type '{s}'")))
    }
}

/// Options for `generate_prefab`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefabSpec {
    /// Prefab name; defaults to one derived from the task ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Overrides the configured output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Component names listed in the prefab
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
}

/// Options for `generate_script`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Base class; `MonoBehaviour` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_logic: Option<String>,
}

/// Options for `optimize_assets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizeAssetsSpec {
    pub asset_path: PathBuf,
}

/// Options for `validate_project`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateProjectSpec {
    pub project_path: PathBuf,
}

/// Validated task specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", content = "options", rename_all = "snake_case")]
pub enum TaskSpec {
    GeneratePrefab(PrefabSpec),
    GenerateScript(ScriptSpec),
    OptimizeAssets(OptimizeAssetsSpec),
    ValidateProject(ValidateProjectSpec),
}

impl TaskSpec {
    /// Validate a raw submission
    ///
    /// # Errors
    /// Returns `QueueError::InvalidSpec` if the task type is empty or
    /// unknown, `spec` is not an object, or any option is unrecognized or
    /// malformed
    pub fn parse(task_type: &str, spec: Value) -> Result<Self, QueueError> {
        let task_type: TaskType = task_type.parse()?;
        if !spec.is_object() {
            return Err(QueueError::invalid_spec(format!(
                "spec for {task_type} must be a JSON object"
            )));
        }

        let parsed = match task_type {
            TaskType::GeneratePrefab => serde_json::from_value(spec).map(TaskSpec::GeneratePrefab),
            TaskType::GenerateScript => serde_json::from_value(spec).map(TaskSpec::GenerateScript),
            TaskType::OptimizeAssets => serde_json::from_value(spec).map(TaskSpec::OptimizeAssets),
            TaskType::ValidateProject => {
                serde_json::from_value(spec).map(TaskSpec::ValidateProject)
            }
        }
        .map_err(|e| QueueError::invalid_spec(format!("{task_type}: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Task type tag
    #[inline]
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskSpec::GeneratePrefab(_) => TaskType::GeneratePrefab,
            TaskSpec::GenerateScript(_) => TaskType::GenerateScript,
            TaskSpec::OptimizeAssets(_) => TaskType::OptimizeAssets,
            TaskSpec::ValidateProject(_) => TaskType::ValidateProject,
        }
    }

    fn validate(&self) -> Result<(), QueueError> {
        match self {
            TaskSpec::GeneratePrefab(spec) => {
                if let Some(name) = &spec.name {
                    check_file_stem("name", name)?;
                }
                Ok(())
            }
            TaskSpec::GenerateScript(spec) => {
                if let Some(name) = &spec.name {
                    check_identifier("name", name)?;
                }
                if let Some(base) = &spec.base_class {
                    check_identifier("base_class", base)?;
                }
                Ok(())
            }
            TaskSpec::OptimizeAssets(spec) => check_path("asset_path", &spec.asset_path),
            TaskSpec::ValidateProject(spec) => check_path("project_path", &spec.project_path),
        }
    }
}

/// Names end up as file names inside the output directory
fn check_file_stem(field: &str, value: &str) -> Result<(), QueueError> {
    let bad = value.trim().is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(QueueError::invalid_spec(format!(
            "{field} '{value}' is not a valid file name"
        )));
    }
    Ok(())
}

/// Script and base class names become C# identifiers
fn check_identifier(field: &str, value: &str) -> Result<(), QueueError> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(QueueError::invalid_spec(format!(
            "{field} '{value}' is not a valid identifier"
        )));
    }
    Ok(())
}

fn check_path(field: &str, value: &std::path::Path) -> Result<(), QueueError> {
    if value.as_os_str().is_empty() {
        return Err(QueueError::invalid_spec(format!("{field} is empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_prefab_with_components() {
        let spec = TaskSpec::parse(
            "generate_prefab",
            json!({"name": "Player", "components": ["Rigidbody", "Collider"]}),
        )
        .unwrap();

        let TaskSpec::GeneratePrefab(prefab) = &spec else {
            panic!("wrong variant: {spec:?}");
        };
        assert_eq!(prefab.name.as_deref(), Some("Player"));
        assert_eq!(prefab.components.len(), 2);
        assert_eq!(spec.task_type(), TaskType::GeneratePrefab);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let spec = TaskSpec::parse("generate_script", json!({})).unwrap();
        assert_eq!(spec, TaskSpec::GenerateScript(ScriptSpec::default()));
    }

    #[test]
    fn rejects_empty_task_type() {
        assert!(matches!(
            TaskSpec::parse("  ", json!({})),
            Err(QueueError::InvalidSpec(_))
        ));
    }

    #[test]
    fn rejects_unknown_task_type() {
        let err = TaskSpec::parse("deploy_build", json!({})).unwrap_err();
        assert!(err.to_string().contains("deploy_build"));
    }

    #[test]
    fn rejects_non_object_spec() {
        assert!(TaskSpec::parse("generate_prefab", json!(["a"])).is_err());
        assert!(TaskSpec::parse("generate_prefab", json!("name")).is_err());
        assert!(TaskSpec::parse("generate_prefab", Value::Null).is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = TaskSpec::parse("generate_prefab", json!({"name": "A", "colour": "red"}))
            .unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn rejects_missing_required_field() {
        assert!(TaskSpec::parse("optimize_assets", json!({})).is_err());
        assert!(TaskSpec::parse("validate_project", json!({"project_path": ""})).is_err());
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(TaskSpec::parse("generate_prefab", json!({"name": "../escape"})).is_err());
        assert!(TaskSpec::parse("generate_script", json!({"name": "3D"})).is_err());
        assert!(TaskSpec::parse("generate_script", json!({"base_class": "Mono Behaviour"})).is_err());
    }

    #[test]
    fn serializes_with_type_tag() {
        let spec = TaskSpec::parse("validate_project", json!({"project_path": "/srv"})).unwrap();
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["task_type"], json!("validate_project"));
        assert_eq!(value["options"]["project_path"], json!("/srv"));

        let back: TaskSpec = serde_json::from_value(value).unwrap();
        assert_eq!(back, spec);
    }
}
