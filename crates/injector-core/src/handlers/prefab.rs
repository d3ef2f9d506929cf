use super::{unexpected_spec, write_output, HandlerContext, HandlerOutput, TaskHandler};
use crate::error::HandlerError;
use async_trait::async_trait;
use chrono::Utc;
use injector_queue::{PrefabSpec, Task, TaskSpec, TaskType};
use std::fmt::Write as _;

/// Writes `<name>.prefab` as a Unity YAML document
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefabHandler;

#[async_trait]
impl TaskHandler for PrefabHandler {
    fn task_type(&self) -> TaskType {
        TaskType::GeneratePrefab
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let TaskSpec::GeneratePrefab(spec) = &task.spec else {
            return Err(unexpected_spec(self.task_type(), task));
        };

        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("GeneratedPrefab_{}", task.id));
        let dir = spec.output_dir.as_deref().unwrap_or(ctx.output_directory.as_path());

        let path = write_output(dir, &format!("{name}.prefab"), &render(&name, spec)).await?;
        tracing::info!("Generated prefab {}", path.display());
        Ok(HandlerOutput {
            output_path: Some(path),
        })
    }
}

/// Stable object ID derived from the prefab name (FNV-1a)
fn file_id(name: &str) -> u64 {
    let hash = name.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    hash % 1_000_000
}

fn render(name: &str, spec: &PrefabSpec) -> String {
    let id = file_id(name);
    let mut doc = String::new();
    doc.push_str("%YAML 1.1\n%TAG !u! tag:unity3d.com,2011:\n");
    let _ = writeln!(doc, "--- !u!1 &{id}");
    doc.push_str("GameObject:\n");
    doc.push_str("  m_ObjectHideFlags: 0\n");
    doc.push_str("  serializedVersion: 6\n");
    doc.push_str("  m_Component:\n");
    let _ = writeln!(doc, "  - component: {{fileID: {}}}", id + 1);
    doc.push_str("  m_Layer: 0\n");
    let _ = writeln!(doc, "  m_Name: {name}");
    doc.push_str("  m_TagString: Untagged\n");
    doc.push_str("  m_IsActive: 1\n");
    let _ = writeln!(doc, "  # Generated: {}", Utc::now().to_rfc3339());
    let _ = writeln!(doc, "  # Components: {}", spec.components.join(", "));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_stable() {
        assert_eq!(file_id("Player"), file_id("Player"));
        assert_ne!(file_id("Player"), file_id("Enemy"));
        assert!(file_id("Player") < 1_000_000);
    }

    #[test]
    fn render_lists_components() {
        let spec = PrefabSpec {
            name: Some("Door".into()),
            components: vec!["Collider".into(), "Animator".into()],
            ..PrefabSpec::default()
        };
        let doc = render("Door", &spec);

        assert!(doc.starts_with("%YAML 1.1"));
        assert!(doc.contains("m_Name: Door"));
        assert!(doc.contains("# Components: Collider, Animator"));
    }
}
