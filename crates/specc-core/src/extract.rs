//! Raw item extraction: one item per addressable node, plus one prose item
//! per obligation-bearing sentence.

use crate::ast::{matches_pattern, Ast, ClauseType, EntityIndex, Node, NodeKind};
use crate::context::{PipelineContext, Stage};
use crate::item::{compute_id, ChecklistItem, Evidence, ItemHints, ItemKind};
use regex::Regex;

/// Map keys whose string values are treated as prose.
const PROSE_KEYS: &[&str] = &["content", "description", "text", "summary", "notes"];

// ---------------------------------------------------------------------------
// Node text / identity
// ---------------------------------------------------------------------------

/// Pointer-derived item text for a node.
pub fn node_text(node: &Node) -> String {
    match node.label() {
        Some(label) if node.kind == NodeKind::Map => format!("Define {} '{}'", node.path, label),
        _ => format!("Define {}", node.path),
    }
}

/// Provisional id of the raw item extracted for `node`.
pub fn node_item_id(namespace: &str, node: &Node) -> String {
    compute_id(namespace, &node.path, &node_text(node))
}

/// Resolve an entity name to the provisional id of its node item.
pub fn entity_item_id(namespace: &str, ast: &Ast, entities: &EntityIndex, name: &str) -> Option<String> {
    let entity = entities.get(name)?;
    let node = ast.get(&entity.pointer)?;
    Some(node_item_id(namespace, node))
}

// ---------------------------------------------------------------------------
// ProseMatcher
// ---------------------------------------------------------------------------

/// Finds obligation-bearing sentences by keyword.
pub struct ProseMatcher {
    re: Option<Regex>,
}

impl ProseMatcher {
    pub fn new(keywords: &[String]) -> Self {
        let alts: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alts.is_empty() {
            return Self { re: None };
        }
        let pattern = format!(r"(?i)\b({})(?:s|d|es)?\b", alts.join("|"));
        Self {
            re: Regex::new(&pattern).ok(),
        }
    }

    /// `(sentence, keyword)` pairs in text order.
    pub fn sentences(&self, text: &str) -> Vec<(String, String)> {
        let Some(re) = &self.re else {
            return Vec::new();
        };
        text.split(['.', '!', '?', ';', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                re.captures(s)
                    .and_then(|c| c.get(1))
                    .map(|m| (s.to_string(), m.as_str().to_lowercase()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Kind dispatch
// ---------------------------------------------------------------------------

fn kind_for(node: &Node) -> ItemKind {
    let p = node.path.as_str();
    if node.kind == NodeKind::Map {
        let name = || {
            node.label()
                .map(str::to_string)
                .or_else(|| node.key.clone())
                .unwrap_or_default()
        };
        if matches_pattern(p, "/architecture/modules/*") {
            return ItemKind::Module { name: name() };
        }
        if matches_pattern(p, "/bootstrap/*") {
            return ItemKind::Bootstrap { name: name() };
        }
        if matches_pattern(p, "/agents/*") {
            return ItemKind::Agent { name: name() };
        }
        if matches_pattern(p, "/sections/*") {
            return ItemKind::Section { section_id: name() };
        }
        if matches_pattern(p, "/api/endpoints/*") {
            return ItemKind::Endpoint {
                method: node.child_str("method").unwrap_or("").to_uppercase(),
                path: node.child_str("path").unwrap_or("").to_string(),
            };
        }
        if matches_pattern(p, "/invariants/*") {
            if let Some(expr) = node.child_str("expr") {
                return ItemKind::Invariant {
                    invariant_id: name(),
                    expr: expr.to_string(),
                };
            }
        }
        if matches_pattern(p, "/requirements/*") {
            return ItemKind::Requirement {
                requirement_id: name(),
            };
        }
    }
    ItemKind::Node {
        node_kind: node.kind,
    }
}

fn quote_for(node: &Node) -> String {
    match node.kind {
        NodeKind::Str => node.value.as_str().unwrap_or_default().to_string(),
        NodeKind::Num | NodeKind::Bool | NodeKind::Null => node.value.to_string(),
        NodeKind::Map | NodeKind::Seq => node
            .label()
            .map(str::to_string)
            .unwrap_or_else(|| node.path.clone()),
    }
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

pub fn extract(ast: &Ast, entities: &EntityIndex, ctx: &mut PipelineContext) -> Vec<ChecklistItem> {
    let targets = crate::invariant::targets(ast);
    let matcher = ProseMatcher::new(&ctx.config.prose_keywords);
    let mut items = Vec::new();
    let mut prose = 0usize;

    for node in ast.preorder().into_iter().skip(1) {
        let kind = kind_for(node);
        let invariant_bound = matches!(kind, ItemKind::Invariant { .. })
            || targets
                .iter()
                .any(|t| crate::ast::is_within(&node.path, t) || matches_pattern(&node.path, t));
        let hints = ItemHints {
            classification: node.child_str("classification").map(str::to_string),
            priority: node.child_str("priority").map(str::to_string),
            invariant_bound,
            explicit_field: true,
            instruction: node.clause_type == ClauseType::Instructions,
        };

        let mut item = ChecklistItem::new(
            kind,
            node.path.clone(),
            node_text(node),
            Evidence::at(&node.path, quote_for(node)),
        )
        .with_value(node.value_string())
        .with_hints(hints);

        if node.kind == NodeKind::Map {
            let mut refs = node.string_list("satisfies");
            refs.extend(node.string_list("requirement_refs"));
            refs.sort();
            refs.dedup();
            item.requirement_refs = refs;

            let mut dims = node.string_list("covers_dimensions");
            dims.sort();
            dims.dedup();
            item.covers_dimensions = dims;

            item.risk_if_false = node.child_str("risk_if_false").map(str::to_string);
            item.claim = node.child_str("claim").map(str::to_string);

            for name in node.string_list("depends_on") {
                match entity_item_id(&ctx.namespace, ast, entities, &name) {
                    Some(id) => {
                        if !item.depends_on.contains(&id) {
                            item.depends_on.push(id);
                        }
                    }
                    None => item.block(format!("missing:{name}")),
                }
            }
        }
        items.push(item);

        if is_prose_node(node) {
            for (sentence, keyword) in matcher.sentences(node.value.as_str().unwrap_or_default()) {
                let mut p = ChecklistItem::new(
                    ItemKind::Prose { keyword },
                    node.path.clone(),
                    format!("Satisfy {}: {}", node.path, sentence),
                    Evidence::prose(&node.path, &sentence),
                )
                .with_value(node.value_string())
                .with_hints(ItemHints {
                    instruction: node.clause_type == ClauseType::Instructions,
                    ..ItemHints::default()
                });
                p.inferred_from_prose = true;
                items.push(p);
                prose += 1;
            }
        }
    }

    ctx.record(
        Stage::Extract,
        items.len(),
        format!("extracted {} raw items ({prose} from prose)", items.len()),
    );
    items
}

fn is_prose_node(node: &Node) -> bool {
    if node.kind != NodeKind::Str {
        return false;
    }
    match node.clause_type {
        ClauseType::Requirement => false,
        ClauseType::Instructions => true,
        _ => node
            .key
            .as_deref()
            .map(|k| PROSE_KEYS.contains(&k))
            .unwrap_or(false),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use serde_json::json;

    fn run(doc: serde_json::Value) -> Vec<ChecklistItem> {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let ast = Ast::build(&doc);
        let entities = ast.entities();
        extract(&ast, &entities, &mut ctx)
    }

    #[test]
    fn one_item_per_node() {
        let doc = json!({"metadata": {"name": "x", "version": "1"}});
        let items = run(doc.clone());
        // /metadata, /metadata/name, /metadata/version
        assert_eq!(items.len(), Ast::build(&doc).len() - 1);
        assert!(items.iter().all(|i| !i.pointer.is_empty()));
    }

    #[test]
    fn module_items_resolve_dependencies() {
        let items = run(json!({"architecture": {"modules": [
            {"name": "ledger", "depends_on": ["store", "ghost"]},
            {"name": "store"}
        ]}}));
        let ledger = items
            .iter()
            .find(|i| i.pointer == "/architecture/modules/0")
            .unwrap();
        assert!(matches!(&ledger.kind, ItemKind::Module { name } if name == "ledger"));
        assert_eq!(ledger.depends_on.len(), 1);
        assert_eq!(ledger.blocked_by, vec!["missing:ghost"]);
        let store = items
            .iter()
            .find(|i| i.pointer == "/architecture/modules/1")
            .unwrap();
        assert_eq!(ledger.depends_on[0], store.provisional_id("ns"));
    }

    #[test]
    fn prose_items_carry_excerpt_digest() {
        let items = run(json!({"sections": [
            {"id": "overview", "title": "Overview",
             "content": "The system must refuse X. It is fast."}
        ]}));
        let prose: Vec<_> = items.iter().filter(|i| i.inferred_from_prose).collect();
        assert_eq!(prose.len(), 1);
        assert!(prose[0].evidence.excerpt_digest.is_some());
        assert!(prose[0].text.ends_with("The system must refuse X"));
        assert!(matches!(&prose[0].kind, ItemKind::Prose { keyword } if keyword == "must"));
    }

    #[test]
    fn requirement_text_is_not_prose() {
        let items = run(json!({"requirements": [{"id": "R1", "text": "must log"}]}));
        assert!(items.iter().all(|i| !i.inferred_from_prose));
    }

    #[test]
    fn explicit_fields_are_captured() {
        let items = run(json!({"api": {"endpoints": [{
            "method": "post", "path": "/pay",
            "satisfies": ["R2", "R1"], "covers_dimensions": ["audit"],
            "classification": "governance", "risk_if_false": "double charge"
        }]}}));
        let ep = items
            .iter()
            .find(|i| i.pointer == "/api/endpoints/0")
            .unwrap();
        assert_eq!(ep.requirement_refs, vec!["R1", "R2"]);
        assert_eq!(ep.covers_dimensions, vec!["audit"]);
        assert_eq!(ep.hints.classification.as_deref(), Some("governance"));
        assert_eq!(ep.risk_if_false.as_deref(), Some("double charge"));
        assert!(matches!(&ep.kind, ItemKind::Endpoint { method, .. } if method == "POST"));
    }

    #[test]
    fn invariant_targets_mark_items() {
        let items = run(json!({
            "metadata": {"name": "x"},
            "invariants": [{"id": "I1", "expr": "exists /metadata/name"}]
        }));
        let name = items.iter().find(|i| i.pointer == "/metadata/name").unwrap();
        assert!(name.hints.invariant_bound);
        let meta = items.iter().find(|i| i.pointer == "/metadata").unwrap();
        assert!(!meta.hints.invariant_bound);
    }

    #[test]
    fn prose_matcher_handles_suffixes() {
        let m = ProseMatcher::new(&["refuse".to_string(), "must".to_string()]);
        let s = m.sentences("It refuses bad input. Musty rooms are fine");
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].1, "refuse");
        assert!(ProseMatcher::new(&[]).sentences("must").is_empty());
    }
}
