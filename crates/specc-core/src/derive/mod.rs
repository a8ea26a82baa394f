//! Structural derivation. Each pass reads only the original tree, never the
//! output of another pass, and the results are merged into one item set.

mod constraints;
mod cross_refs;
mod dependencies;
mod flows;
mod ordering;
mod semantic;
pub mod subtasks;

use crate::ast::{Ast, EntityIndex, Node};
use crate::context::{PipelineContext, Stage};
use crate::extract::{entity_item_id, node_item_id};
use crate::item::{ChecklistItem, Evidence, ItemHints, ItemKind};

pub use subtasks::derive_subtasks;

/// Read-only view shared by every pass.
pub struct DeriveInput<'a> {
    pub ast: &'a Ast,
    pub entities: &'a EntityIndex,
    pub namespace: &'a str,
}

impl<'a> DeriveInput<'a> {
    /// A derived item anchored at `node` whose parent is the node's raw item.
    pub fn item(&self, node: &Node, kind: ItemKind, text: String) -> ChecklistItem {
        let quote = node
            .label()
            .map(str::to_string)
            .or_else(|| node.value.as_str().map(str::to_string))
            .unwrap_or_else(|| node.path.clone());
        ChecklistItem::new(kind, node.path.clone(), text, Evidence::at(&node.path, quote))
            .with_value(node.value_string())
            .with_parent(node_item_id(self.namespace, node))
            .with_hints(ItemHints {
                explicit_field: true,
                ..ItemHints::default()
            })
    }

    pub fn entity_id(&self, name: &str) -> Option<String> {
        entity_item_id(self.namespace, self.ast, self.entities, name)
    }

    pub fn node_id(&self, node: &Node) -> String {
        node_item_id(self.namespace, node)
    }
}

pub type Pass = fn(&DeriveInput) -> Vec<ChecklistItem>;

/// Passes in merge order.
pub const PASSES: &[(&str, Pass)] = &[
    ("constraints", constraints::derive),
    ("semantic", semantic::derive),
    ("dependencies", dependencies::derive),
    ("cross_refs", cross_refs::derive),
    ("flows", flows::derive),
    ("ordering", ordering::derive),
];

pub fn derive(ast: &Ast, entities: &EntityIndex, ctx: &mut PipelineContext) -> Vec<ChecklistItem> {
    let namespace = ctx.namespace.clone();
    let input = DeriveInput {
        ast,
        entities,
        namespace: &namespace,
    };
    let mut out = Vec::new();
    for (name, pass) in PASSES {
        let items = pass(&input);
        ctx.record(Stage::Derive, items.len(), format!("pass {name}"));
        out.extend(items);
    }
    out
}
