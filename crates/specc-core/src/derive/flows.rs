use super::DeriveInput;
use crate::ast::{Node, NodeKind};
use crate::item::{ChecklistItem, ItemKind};

fn step_name(step: &Node) -> String {
    match step.kind {
        NodeKind::Map => step
            .label()
            .map(str::to_string)
            .unwrap_or_else(|| step.path.clone()),
        _ => step
            .value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| step.value_string()),
    }
}

/// One edge per consecutive step pair; each edge follows the previous one.
pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();
    for flow in input.ast.matching("/flows/*") {
        let name = flow
            .label()
            .map(str::to_string)
            .or_else(|| flow.key.clone())
            .unwrap_or_default();
        let Some(steps) = flow.child("steps").filter(|s| s.kind == NodeKind::Seq) else {
            continue;
        };
        let mut previous: Option<String> = None;
        for pair in steps.children.windows(2) {
            let (from, to) = (step_name(&pair[0]), step_name(&pair[1]));
            let mut item = input.item(
                &pair[1],
                ItemKind::FlowEdge {
                    flow: name.clone(),
                    from: from.clone(),
                    to: to.clone(),
                },
                format!("flow '{name}': '{from}' -> '{to}'"),
            );
            item.parent = Some(input.node_id(flow));
            if let Some(prev) = previous.take() {
                item.depends_on.push(prev);
            }
            previous = Some(item.provisional_id(input.namespace));
            out.push(item);
        }
    }
    out
}
