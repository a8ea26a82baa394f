//! The built-in code emitter: one Markdown task descriptor per checklist
//! item, in execution order.

use crate::digest::short;
use crate::error::Result;
use crate::item::ChecklistItem;
use crate::paths::CHECKLIST_DIR;
use crate::ports::{CodeEmitter, GeneratedFile};
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct ChecklistDocEmitter {
    pub dir: String,
}

impl Default for ChecklistDocEmitter {
    fn default() -> Self {
        Self {
            dir: CHECKLIST_DIR.to_string(),
        }
    }
}

fn render(item: &ChecklistItem) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", item.action);
    let _ = writeln!(md, "- id: `{}`", item.id);
    let _ = writeln!(md, "- pointer: `{}`", item.pointer);
    let _ = writeln!(md, "- kind: {}", item.kind.tag());
    let _ = writeln!(
        md,
        "- severity: {} / priority: {} / confidence: {}",
        item.severity, item.priority, item.confidence
    );
    let _ = writeln!(md, "- status: {}", item.status);
    if let Some(order) = item.execution_order {
        let _ = writeln!(md, "- execution order: {order}");
    }
    if !item.depends_on.is_empty() {
        let deps: Vec<&str> = item.depends_on.iter().map(|d| short(d)).collect();
        let _ = writeln!(md, "- depends on: {}", deps.join(", "));
    }
    if !item.requirement_refs.is_empty() {
        let _ = writeln!(md, "- requirements: {}", item.requirement_refs.join(", "));
    }
    if !item.blocked_by.is_empty() {
        let _ = writeln!(md, "- blocked by: {}", item.blocked_by.join(", "));
    }
    let _ = writeln!(md, "\n> {}", item.evidence.quote);
    md
}

impl CodeEmitter for ChecklistDocEmitter {
    fn emit(&self, items: &[ChecklistItem]) -> Result<Vec<GeneratedFile>> {
        let mut ordered: Vec<&ChecklistItem> = items.iter().collect();
        // Cycle members have no execution order and go last, by rank.
        ordered.sort_by_key(|i| (i.execution_order.unwrap_or(u32::MAX), i.order_rank));
        Ok(ordered
            .into_iter()
            .map(|item| {
                let order = item.execution_order.unwrap_or(0);
                GeneratedFile {
                    path: format!("{}/{order:04}-{}.md", self.dir, short(&item.id)),
                    content: render(item),
                }
            })
            .collect())
    }
}
