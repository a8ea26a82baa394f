use super::DeriveInput;
use crate::ast::NodeKind;
use crate::item::{ChecklistItem, ItemKind};

const REF_KEYS: &[&str] = &["$ref", "ref"];

pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();
    for node in input.ast.preorder() {
        if node.kind != NodeKind::Str || !node.key.as_deref().is_some_and(|k| REF_KEYS.contains(&k)) {
            continue;
        }
        let Some(target) = node.value.as_str() else {
            continue;
        };
        let resolved = input.ast.resolve(target);
        let mut item = input.item(
            node,
            ItemKind::CrossReference {
                target: target.to_string(),
                resolved: resolved.is_some(),
            },
            format!("ref: {target}"),
        );
        match resolved {
            Some(t) if !t.path.is_empty() => item.depends_on.push(input.node_id(t)),
            Some(_) => {}
            None => item.block(format!("dangling:{target}")),
        }
        out.push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use serde_json::json;

    #[test]
    fn refs_are_checked() {
        let ast = Ast::build(&json!({
            "model": {"user": {"name": "str"}},
            "api": {"endpoints": [
                {"method": "GET", "path": "/u", "$ref": "#/model/user"},
                {"method": "GET", "path": "/v", "ref": "/model/ghost"}
            ]}
        }));
        let entities = ast.entities();
        let items = derive(&DeriveInput {
            ast: &ast,
            entities: &entities,
            namespace: "ns",
        });
        assert_eq!(items.len(), 2);
        let ok = &items[0];
        assert!(matches!(ok.kind, ItemKind::CrossReference { resolved: true, .. }));
        assert_eq!(ok.depends_on.len(), 1);
        let bad = &items[1];
        assert_eq!(bad.blocked_by, vec!["dangling:/model/ghost"]);
    }
}
