use super::DeriveInput;
use crate::ast::{Entity, EntityKind};
use crate::item::{ChecklistItem, ItemKind};
use regex::Regex;

/// Entities that may declare `depends_on`.
const DEPENDENT_KINDS: &[EntityKind] = &[EntityKind::Module, EntityKind::Agent];

/// Whole-word, case-insensitive matcher for an entity name.
fn name_pattern(name: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).ok()
}

pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();
    // Compiled once per pass; every description is tested against the same set.
    let targets: Vec<(&Entity, Regex)> = input
        .entities
        .iter()
        .filter(|e| DEPENDENT_KINDS.contains(&e.kind))
        .filter_map(|e| name_pattern(&e.name).map(|re| (e, re)))
        .collect();

    for &kind in DEPENDENT_KINDS {
        for entity in input.entities.of_kind(kind) {
            let Some(node) = input.ast.get(&entity.pointer) else {
                continue;
            };
            let explicit = node.string_list("depends_on");

            for to in &explicit {
                let target = input.entity_id(to);
                let mut item = input.item(
                    node,
                    ItemKind::Dependency {
                        from: entity.name.clone(),
                        to: to.clone(),
                        explicit: true,
                        resolved: target.is_some(),
                    },
                    format!("depends: '{}' -> '{to}'", entity.name),
                );
                match target {
                    Some(id) => item.depends_on.push(id),
                    None => item.block(format!("missing:{to}")),
                }
                out.push(item);
            }

            // Implicit edges: another entity named in the description.
            let Some(description) = node.child_str("description") else {
                continue;
            };
            for (target, pattern) in &targets {
                if target.name == entity.name
                    || explicit.contains(&target.name)
                    || !pattern.is_match(description)
                {
                    continue;
                }
                let mut item = input.item(
                    node,
                    ItemKind::Dependency {
                        from: entity.name.clone(),
                        to: target.name.clone(),
                        explicit: false,
                        resolved: true,
                    },
                    format!("mentions: '{}' -> '{}'", entity.name, target.name),
                );
                item.depends_on.extend(input.entity_id(&target.name));
                out.push(item);
            }
        }
    }

    out
}
