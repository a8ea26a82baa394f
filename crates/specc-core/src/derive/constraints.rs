use super::DeriveInput;
use crate::ast::NodeKind;
use crate::item::{ChecklistItem, ItemKind};

/// Required fields per collection shape.
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("/metadata", &["name", "version"]),
    ("/architecture/modules/*", &["name"]),
    ("/agents/*", &["name", "role"]),
    ("/api/endpoints/*", &["method", "path"]),
    ("/invariants/*", &["id", "expr"]),
    ("/requirements/*", &["id", "text"]),
    ("/sections/*", &["id", "title", "content"]),
    ("/flows/*", &["name", "steps"]),
    ("/bootstrap/*", &["name"]),
];

pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();

    for (pattern, fields) in REQUIRED_FIELDS {
        for node in input.ast.matching(pattern) {
            if node.kind != NodeKind::Map {
                continue;
            }
            for field in *fields {
                let mut item = input.item(
                    node,
                    ItemKind::RequiredField {
                        field: field.to_string(),
                    },
                    format!("required: '{field}' at {}", node.path),
                );
                let present = node.child(field).map(|c| !c.is_empty_value());
                if present != Some(true) {
                    item.block(format!("missing_field:{field}"));
                }
                out.push(item);
            }
        }
    }

    // Explicit `constraints: [..]` lists on any map.
    for node in input.ast.preorder() {
        if node.kind != NodeKind::Map {
            continue;
        }
        let Some(list) = node.child("constraints") else {
            continue;
        };
        let entries: Vec<_> = match list.kind {
            NodeKind::Seq => list.children.iter().collect(),
            NodeKind::Str => vec![list],
            _ => Vec::new(),
        };
        for entry in entries {
            let Some(text) = entry.value.as_str().filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            let mut item = input.item(
                entry,
                ItemKind::Constraint {
                    constraint: text.to_string(),
                },
                format!("constraint: '{text}'"),
            );
            item.parent = Some(input.node_id(node));
            out.push(item);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use serde_json::json;

    fn run(doc: serde_json::Value) -> Vec<ChecklistItem> {
        let ast = Ast::build(&doc);
        let entities = ast.entities();
        derive(&DeriveInput {
            ast: &ast,
            entities: &entities,
            namespace: "ns",
        })
    }

    #[test]
    fn missing_required_field_blocks() {
        let items = run(json!({"metadata": {"name": "pay", "version": ""}}));
        assert_eq!(items.len(), 2);
        let version = items
            .iter()
            .find(|i| matches!(&i.kind, ItemKind::RequiredField { field } if field == "version"))
            .unwrap();
        assert_eq!(version.blocked_by, vec!["missing_field:version"]);
        let name = items
            .iter()
            .find(|i| matches!(&i.kind, ItemKind::RequiredField { field } if field == "name"))
            .unwrap();
        assert!(name.blocked_by.is_empty());
    }

    #[test]
    fn explicit_constraints_become_items() {
        let items = run(json!({"model": {"account": {
            "constraints": ["balance >= 0", ""]
        }}}));
        let c: Vec<_> = items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::Constraint { .. }))
            .collect();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].pointer, "/model/account/constraints/0");
        assert_eq!(c[0].text, "constraint: 'balance >= 0'");
    }
}
