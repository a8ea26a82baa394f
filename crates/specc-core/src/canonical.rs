//! Canonicalization: dedupe, prefix collapse, canonical sort, id synthesis
//! and order ranks.
//!
//! Text is final once `normalize` returns. `finalize` is the only place an
//! item's `id` is written.

use crate::ast::Ast;
use crate::context::{PipelineContext, Stage};
use crate::enrich::verify_contract;
use crate::error::{Result, SpeccError};
use crate::item::{compute_id, ChecklistItem};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Dedupe by `(pointer, text, value)` keeping the first occurrence, then
/// collapse same-pointer items whose text extends another's, keeping the
/// shorter. References to collapsed items are remapped.
pub fn normalize(items: Vec<ChecklistItem>, ctx: &mut PipelineContext) -> Vec<ChecklistItem> {
    let ns = ctx.namespace.clone();
    let before = items.len();

    let mut seen = HashSet::new();
    let mut unique: Vec<ChecklistItem> = items
        .into_iter()
        .filter(|i| seen.insert((i.pointer.clone(), i.text.clone(), i.value.clone())))
        .collect();
    let deduped = before - unique.len();

    // Per pointer, texts in sorted order: a prefix sorts before its extensions.
    let mut by_pointer: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for item in &unique {
        by_pointer
            .entry(item.pointer.as_str())
            .or_default()
            .insert(item.text.as_str());
    }
    let mut remap: BTreeMap<String, String> = BTreeMap::new();
    for (pointer, texts) in &by_pointer {
        let mut kept: Vec<&str> = Vec::new();
        for text in texts {
            match kept.iter().find(|k| text.starts_with(*k)) {
                Some(shorter) => {
                    remap.insert(
                        compute_id(&ns, pointer, text),
                        compute_id(&ns, pointer, shorter),
                    );
                }
                None => kept.push(text),
            }
        }
    }

    if !remap.is_empty() {
        unique.retain(|i| !remap.contains_key(&i.provisional_id(&ns)));
        for item in unique.iter_mut() {
            let own = item.provisional_id(&ns);
            let mut deps = Vec::with_capacity(item.depends_on.len());
            for dep in &item.depends_on {
                let target = remap.get(dep).cloned().unwrap_or_else(|| dep.clone());
                if target != own && !deps.contains(&target) {
                    deps.push(target);
                }
            }
            item.depends_on = deps;
            if let Some(parent) = item.parent.as_ref().and_then(|p| remap.get(p)) {
                item.parent = Some(parent.clone());
            }
        }
    }

    ctx.record(
        Stage::Canonical,
        unique.len(),
        format!("deduped {deduped}, collapsed {}", remap.len()),
    );
    unique
}

// ---------------------------------------------------------------------------
// finalize
// ---------------------------------------------------------------------------

/// Canonical sort key: `(pointer, pointer length, text, value)`.
fn sort_key(item: &ChecklistItem) -> (&str, usize, &str, &str) {
    (&item.pointer, item.pointer.len(), &item.text, &item.value)
}

/// Sort, synthesize ids exactly once, then assign order ranks.
pub fn finalize(
    mut items: Vec<ChecklistItem>,
    ast: &Ast,
    ctx: &mut PipelineContext,
) -> Result<Vec<ChecklistItem>> {
    verify_contract(&items)?;

    items.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut ids = HashSet::with_capacity(items.len());
    for item in items.iter_mut() {
        if !item.id.is_empty() {
            return Err(SpeccError::ContractViolation(format!(
                "item '{}' already has id {}",
                item.text, item.id
            )));
        }
        if !ast.contains(&item.pointer) {
            return Err(SpeccError::ContractViolation(format!(
                "item '{}' points at unresolvable {}",
                item.text, item.pointer
            )));
        }
        let id = compute_id(&ctx.namespace, &item.pointer, &item.text);
        if !ids.insert(id.clone()) {
            return Err(SpeccError::ContractViolation(format!(
                "id collision on {} at {}",
                id, item.pointer
            )));
        }
        item.id = id;
    }

    let mut ranked: Vec<usize> = (0..items.len()).collect();
    ranked.sort_by(|&a, &b| {
        let (x, y) = (&items[a], &items[b]);
        (
            x.severity.rank(),
            x.classification.as_str(),
            x.pointer.len(),
            &x.pointer,
            &x.text,
        )
            .cmp(&(
                y.severity.rank(),
                y.classification.as_str(),
                y.pointer.len(),
                &y.pointer,
                &y.text,
            ))
    });
    for (rank, idx) in ranked.into_iter().enumerate() {
        items[idx].order_rank = rank as u32 + 1;
    }

    ctx.record(Stage::Canonical, items.len(), "ids synthesized");
    Ok(items)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::config::CompilerConfig;
    use crate::enrich::enrich;
    use crate::item::{Evidence, ItemKind};
    use serde_json::json;

    fn item(pointer: &str, text: &str, value: &str) -> ChecklistItem {
        ChecklistItem::new(
            ItemKind::Node {
                node_kind: NodeKind::Str,
            },
            pointer,
            text,
            Evidence::at(pointer, value),
        )
        .with_value(value)
    }

    fn ast() -> Ast {
        Ast::build(&json!({"a": "1", "b": "2"}))
    }

    #[test]
    fn dedupe_keeps_first() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let mut first = item("/a", "Define /a", "1");
        first.covers_dimensions = vec!["x".to_string()];
        let items = normalize(
            vec![first, item("/a", "Define /a", "1"), item("/b", "Define /b", "2")],
            &mut ctx,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].covers_dimensions, vec!["x"]);
    }

    #[test]
    fn prefix_collapse_keeps_shorter_and_remaps() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let long = item("/a", "Define /a extra", "1");
        let long_id = long.provisional_id("ns");
        let short = item("/a", "Define /a", "1");
        let short_id = short.provisional_id("ns");
        let dependent = item("/b", "Define /b", "2").with_depends_on(vec![long_id]);
        let items = normalize(vec![long, short, dependent], &mut ctx);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.text != "Define /a extra"));
        let b = items.iter().find(|i| i.pointer == "/b").unwrap();
        assert_eq!(b.depends_on, vec![short_id]);
    }

    #[test]
    fn finalize_sorts_and_assigns_ids_once() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let items = vec![
            enrich(item("/b", "Define /b", "2")),
            enrich(item("/a", "Define /a", "1")),
        ];
        let out = finalize(items, &ast(), &mut ctx).unwrap();
        assert_eq!(out[0].pointer, "/a");
        for i in &out {
            assert_eq!(i.id, compute_id("ns", &i.pointer, &i.text));
            assert!(i.order_rank >= 1);
        }
        let again = finalize(out, &ast(), &mut ctx);
        assert!(matches!(again, Err(SpeccError::ContractViolation(_))));
    }

    #[test]
    fn finalize_rejects_unresolvable_pointer() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let items = vec![enrich(item("/zzz", "Define /zzz", "1"))];
        assert!(matches!(
            finalize(items, &ast(), &mut ctx),
            Err(SpeccError::ContractViolation(_))
        ));
    }

    #[test]
    fn finalize_rejects_collision() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let items = vec![
            enrich(item("/a", "Define /a", "1")),
            enrich(item("/a", "Define /a", "other")),
        ];
        assert!(matches!(
            finalize(items, &ast(), &mut ctx),
            Err(SpeccError::ContractViolation(_))
        ));
    }
}
