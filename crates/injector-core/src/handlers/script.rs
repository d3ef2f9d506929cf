use super::{unexpected_spec, write_output, HandlerContext, HandlerOutput, TaskHandler};
use crate::error::HandlerError;
use async_trait::async_trait;
use chrono::Utc;
use injector_queue::{ScriptSpec, Task, TaskSpec, TaskType};

const DEFAULT_BASE_CLASS: &str = "MonoBehaviour";

/// Writes `<name>.cs`, a behaviour with a health check and self-reset loop
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptHandler;

#[async_trait]
impl TaskHandler for ScriptHandler {
    fn task_type(&self) -> TaskType {
        TaskType::GenerateScript
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let TaskSpec::GenerateScript(spec) = &task.spec else {
            return Err(unexpected_spec(self.task_type(), task));
        };

        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("GeneratedScript_{}", task.id));
        let dir = spec.output_dir.as_deref().unwrap_or(ctx.output_directory.as_path());

        let path = write_output(dir, &format!("{name}.cs"), &render(&name, spec)).await?;
        tracing::info!("Generated script {}", path.display());
        Ok(HandlerOutput {
            output_path: Some(path),
        })
    }
}

fn render(name: &str, spec: &ScriptSpec) -> String {
    let base_class = spec.base_class.as_deref().unwrap_or(DEFAULT_BASE_CLASS);
    let init = spec.init_logic.as_deref().unwrap_or("// no initialization logic");
    let update = spec.update_logic.as_deref().unwrap_or("// no update logic");
    let reset = spec.reset_logic.as_deref().unwrap_or("// no reset logic");
    let generated = Utc::now().to_rfc3339();

    format!(
        r#"using UnityEngine;
using System.Collections;

/// <summary>
/// Generated {generated}
/// </summary>
public class {name} : {base_class}
{{
    [Header("Self-Repair")]
    public bool selfRepairEnabled = true;
    public float healthCheckInterval = 30f;

    private float lastHealthCheck = 0f;

    void Start()
    {{
        Initialize();
    }}

    void Update()
    {{
        {update}

        if (Time.time - lastHealthCheck > healthCheckInterval)
        {{
            lastHealthCheck = Time.time;
            if (selfRepairEnabled && !IsHealthy())
            {{
                Repair();
            }}
        }}
    }}

    private void Initialize()
    {{
        {init}
    }}

    private bool IsHealthy()
    {{
        return gameObject != null && enabled && gameObject.activeInHierarchy;
    }}

    private void Repair()
    {{
        Debug.Log($"{{name}}: resetting to a safe state");
        ResetToSafeState();
        Initialize();
    }}

    private void ResetToSafeState()
    {{
        {reset}
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_monobehaviour() {
        let script = render("Spawner", &ScriptSpec::default());
        assert!(script.contains("public class Spawner : MonoBehaviour"));
        assert!(script.contains("// no update logic"));
    }

    #[test]
    fn embeds_supplied_logic() {
        let spec = ScriptSpec {
            base_class: Some("NetworkBehaviour".into()),
            init_logic: Some("count = 0;".into()),
            update_logic: Some("count++;".into()),
            reset_logic: Some("count = -1;".into()),
            ..ScriptSpec::default()
        };
        let script = render("Counter", &spec);

        assert!(script.contains("public class Counter : NetworkBehaviour"));
        assert!(script.contains("count = 0;"));
        assert!(script.contains("count++;"));
        assert!(script.contains("count = -1;"));
        assert!(script.contains("Debug.Log($\"{name}: resetting"));
    }
}
