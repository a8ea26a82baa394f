use super::DeriveInput;
use crate::ast::{EntityKind, Node};
use crate::item::{ChecklistItem, ItemKind};

fn section_id(node: &Node) -> Option<&str> {
    node.child_str("id")
}

pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();
    let sections = input.ast.matching("/sections/*");

    // Explicit `after: <section id>`.
    for node in &sections {
        let (Some(id), Some(after)) = (section_id(node), node.child_str("after")) else {
            continue;
        };
        let mut item = input.item(
            node,
            ItemKind::SectionOrder {
                section: id.to_string(),
                after: after.to_string(),
            },
            format!("order: '{id}' after '{after}'"),
        );
        let target = input
            .entities
            .get(after)
            .filter(|e| e.kind == EntityKind::Section);
        match target {
            Some(_) => item.depends_on.extend(input.entity_id(after)),
            None => item.block(format!("missing_section:{after}")),
        }
        out.push(item);
    }

    // Numeric `order`: each section follows the one ranked just before it.
    let mut ranked: Vec<(i64, &str, &Node)> = sections
        .iter()
        .filter_map(|&n| {
            let order = n.child("order").and_then(|o| o.value.as_i64())?;
            Some((order, section_id(n)?, n))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    for pair in ranked.windows(2) {
        let (prev, (_, id, node)) = (&pair[0], &pair[1]);
        if node.child_str("after") == Some(prev.1) {
            continue;
        }
        let mut item = input.item(
            node,
            ItemKind::SectionOrder {
                section: id.to_string(),
                after: prev.1.to_string(),
            },
            format!("order: '{id}' after '{}'", prev.1),
        );
        item.depends_on.push(input.node_id(prev.2));
        out.push(item);
    }

    out
}
