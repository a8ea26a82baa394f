//! Equivalence collapsing and minimality proofs.
//!
//! Items that reference requirements are grouped by what they claim and
//! why; each group keeps one primary. A group is only pruned when doing so
//! leaves every requirement's completeness untouched.

use crate::context::{FindingLevel, PipelineContext, Stage};
use crate::coverage::completeness;
use crate::digest::{digest_parts, short};
use crate::item::ChecklistItem;
use crate::requirement::Requirement;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceGroup {
    pub primary_id: String,
    pub collapsed_from: Vec<String>,
    pub requirement_refs: Vec<String>,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalityProof {
    pub primary_id: String,
    /// Removing the primary would change some requirement's state.
    pub load_bearing: bool,
    /// Requirements whose state depends on the primary.
    pub affected_requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub groups: Vec<EquivalenceGroup>,
    pub proofs: Vec<MinimalityProof>,
    /// Signatures of candidate groups left intact.
    pub skipped: Vec<String>,
}

/// Content signature: obligation, evidence, intent, risk and readiness
/// impact. Requirement refs are part of the group key separately.
pub fn signature(item: &ChecklistItem) -> String {
    let obligation = item.claim.as_deref().unwrap_or(&item.action);
    let evidence = item.evidence.signature();
    let impact = format!("{:?}", item.readiness_impact());
    digest_parts(&[
        obligation,
        &evidence,
        item.intent_category.as_str(),
        item.risk_if_false.as_deref().unwrap_or(""),
        &impact,
    ])
}

/// Total order for primary selection: lowest priority rank, then most
/// covered dimensions, then highest confidence, then smallest id.
pub fn primary_order(a: &ChecklistItem, b: &ChecklistItem) -> Ordering {
    let key = |i: &ChecklistItem| {
        (
            i.priority.rank(),
            Reverse(i.covers_dimensions.len()),
            Reverse(i.confidence),
            i.id.clone(),
        )
    };
    key(a).cmp(&key(b))
}

fn remove_ids(items: &[ChecklistItem], ids: &BTreeSet<String>) -> Vec<ChecklistItem> {
    items.iter().filter(|i| !ids.contains(&i.id)).cloned().collect()
}

pub fn collapse(
    items: Vec<ChecklistItem>,
    requirements: &[Requirement],
    ctx: &mut PipelineContext,
) -> (Vec<ChecklistItem>, EquivalenceReport) {
    let mut report = EquivalenceReport::default();

    let mut groups: BTreeMap<(Vec<String>, String), Vec<usize>> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        if item.requirement_refs.is_empty() {
            continue;
        }
        let mut refs = item.requirement_refs.clone();
        refs.sort();
        groups.entry((refs, signature(item))).or_default().push(idx);
    }

    let mut current = items;
    let mut remap: BTreeMap<String, String> = BTreeMap::new();

    for ((refs, sig), members) in groups {
        if members.len() < 2 {
            continue;
        }
        let group: Vec<&ChecklistItem> = members.iter().map(|&i| &current[i]).collect();
        let Some(primary) = group.iter().copied().min_by(|a, b| primary_order(a, b)) else {
            continue;
        };
        let primary_id = primary.id.clone();
        let collapsed: BTreeSet<String> = group
            .iter()
            .filter(|i| i.id != primary_id)
            .map(|i| i.id.clone())
            .collect();

        let before = completeness(requirements, &current).states();
        let after = completeness(requirements, &remove_ids(&current, &collapsed)).states();
        if before != after {
            ctx.finding(
                "collapse_skipped",
                FindingLevel::Info,
                short(&primary_id),
                format!("pruning {} item(s) would change completeness", collapsed.len()),
            );
            report.skipped.push(sig);
            continue;
        }

        for id in &collapsed {
            remap.insert(id.clone(), primary_id.clone());
        }
        report.groups.push(EquivalenceGroup {
            primary_id,
            collapsed_from: collapsed.into_iter().collect(),
            requirement_refs: refs,
            signature: sig,
        });
    }

    // Indexes into `current` stay valid until here; prune once.
    if !remap.is_empty() {
        current.retain(|i| !remap.contains_key(&i.id));
        for item in current.iter_mut() {
            let mut deps = Vec::with_capacity(item.depends_on.len());
            for dep in &item.depends_on {
                let target = remap.get(dep).unwrap_or(dep);
                if *target != item.id && !deps.contains(target) {
                    deps.push(target.clone());
                }
            }
            item.depends_on = deps;
            if let Some(p) = item.parent.as_ref().and_then(|p| remap.get(p)) {
                item.parent = Some(p.clone());
            }
        }
    }

    // Minimality: would the requirement states change without the primary?
    let baseline = completeness(requirements, &current).states();
    for group in &report.groups {
        let without: BTreeSet<String> = [group.primary_id.clone()].into_iter().collect();
        let hypothetical = completeness(requirements, &remove_ids(&current, &without)).states();
        let affected: Vec<String> = baseline
            .iter()
            .filter(|(id, state)| hypothetical.get(*id) != Some(*state))
            .map(|(id, _)| id.clone())
            .collect();
        let load_bearing = !affected.is_empty();
        if !load_bearing {
            ctx.finding(
                "not_load_bearing",
                FindingLevel::Info,
                short(&group.primary_id),
                "removing the primary leaves completeness unchanged",
            );
        }
        report.proofs.push(MinimalityProof {
            primary_id: group.primary_id.clone(),
            load_bearing,
            affected_requirements: affected,
        });
    }

    let collapsed: usize = report.groups.iter().map(|g| g.collapsed_from.len()).sum();
    ctx.record(
        Stage::Equivalence,
        collapsed,
        format!("{} group(s), {collapsed} item(s) collapsed", report.groups.len()),
    );
    (current, report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::config::CompilerConfig;
    use crate::coverage::RequirementState;
    use crate::item::{Evidence, ItemKind};
    use crate::requirement::RequirementOrigin;
    use crate::types::{Confidence, Priority};

    fn req(id: &str, dims: &[&str]) -> Requirement {
        Requirement {
            id: id.to_string(),
            text: String::new(),
            dimensions: dims.iter().map(|d| d.to_string()).collect(),
            priority: Priority::P0,
            source_pointer: "/requirements/0".to_string(),
            origin: RequirementOrigin::Explicit,
        }
    }

    fn item(id: &str, pointer: &str) -> ChecklistItem {
        let mut i = ChecklistItem::new(
            ItemKind::Node {
                node_kind: NodeKind::Map,
            },
            pointer,
            format!("Define {pointer}"),
            Evidence::at(pointer, "same quote"),
        );
        i.id = id.to_string();
        i.requirement_refs = vec!["R1".to_string()];
        i.risk_if_false = Some("x".to_string());
        i.claim = Some("refuses X".to_string());
        i
    }

    #[test]
    fn equivalent_pair_keeps_one_primary() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let reqs = vec![req("R1", &["behavior"])];
        let items = vec![item("bbb", "/b"), item("aaa", "/a")];
        let before = completeness(&reqs, &items).state_of("R1");

        let (out, report) = collapse(items, &reqs, &mut ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].primary_id, "aaa");
        assert_eq!(report.groups[0].collapsed_from, vec!["bbb"]);
        assert_eq!(completeness(&reqs, &out).state_of("R1"), before);
        assert_eq!(before, Some(RequirementState::Complete));
        assert!(report.proofs[0].load_bearing);
    }

    #[test]
    fn primary_prefers_priority_then_dimensions_then_confidence() {
        let mut a = item("a", "/a");
        let mut b = item("b", "/b");
        a.priority = Priority::P1;
        b.priority = Priority::P0;
        assert_eq!(primary_order(&a, &b), Ordering::Greater);
        a.priority = Priority::P0;
        a.covers_dimensions = vec!["x".to_string()];
        assert_eq!(primary_order(&a, &b), Ordering::Less);
        b.covers_dimensions = vec!["y".to_string()];
        b.confidence = Confidence::High;
        a.confidence = Confidence::Low;
        assert_eq!(primary_order(&a, &b), Ordering::Greater);
    }

    #[test]
    fn collapse_skipped_when_completeness_changes() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let reqs = vec![req("R1", &["audit", "retention"])];
        let mut a = item("a", "/a");
        a.covers_dimensions = vec!["audit".to_string()];
        let mut b = item("b", "/b");
        b.covers_dimensions = vec!["retention".to_string()];
        let (out, report) = collapse(vec![a, b], &reqs, &mut ctx);
        assert_eq!(out.len(), 2);
        assert!(report.groups.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn redundant_primary_is_reported() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let reqs = vec![req("R1", &["behavior"])];
        let mut other = item("zzz", "/z");
        other.claim = Some("different claim".to_string());
        let (_, report) = collapse(
            vec![item("a", "/a"), item("b", "/b"), other],
            &reqs,
            &mut ctx,
        );
        assert!(!report.proofs[0].load_bearing);
        assert!(ctx.findings().iter().any(|f| f.code == "not_load_bearing"));
    }

    #[test]
    fn dependents_are_remapped_to_primary() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let reqs = vec![req("R1", &["behavior"])];
        let mut dependent = item("c", "/c");
        dependent.requirement_refs.clear();
        dependent.depends_on = vec!["b".to_string()];
        let (out, _) = collapse(vec![item("a", "/a"), item("b", "/b"), dependent], &reqs, &mut ctx);
        let c = out.iter().find(|i| i.id == "c").unwrap();
        assert_eq!(c.depends_on, vec!["a"]);
    }
}
