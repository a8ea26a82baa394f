//! Requirement coverage, completeness and the sufficiency verdict.

use crate::graph::GraphReport;
use crate::item::{ChecklistItem, ItemKind};
use crate::requirement::Requirement;
use crate::types::Priority;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Completeness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementState {
    Unbound,
    Partial,
    Complete,
}

impl fmt::Display for RequirementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequirementState::Unbound => "UNBOUND",
            RequirementState::Partial => "PARTIAL",
            RequirementState::Complete => "COMPLETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEdge {
    pub requirement_id: String,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCoverage {
    pub requirement_id: String,
    pub priority: Priority,
    pub state: RequirementState,
    pub dimensions: Vec<String>,
    pub covered_dimensions: Vec<String>,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub requirements: Vec<RequirementCoverage>,
    pub total: usize,
    pub complete: usize,
    pub partial: usize,
    pub unbound: usize,
    /// `complete / total`; 1.0 when there are no requirements.
    pub complete_pct: f64,
}

impl CompletenessReport {
    pub fn state_of(&self, requirement_id: &str) -> Option<RequirementState> {
        self.requirements
            .iter()
            .find(|r| r.requirement_id == requirement_id)
            .map(|r| r.state)
    }

    /// Per-requirement states, for before/after comparisons.
    pub fn states(&self) -> BTreeMap<String, RequirementState> {
        self.requirements
            .iter()
            .map(|r| (r.requirement_id.clone(), r.state))
            .collect()
    }
}

/// Coverage edges in requirement order. Items are identified by `id`.
pub fn coverage_edges(requirements: &[Requirement], items: &[ChecklistItem]) -> Vec<CoverageEdge> {
    requirements
        .iter()
        .map(|r| CoverageEdge {
            requirement_id: r.id.clone(),
            item_ids: items
                .iter()
                .filter(|i| i.requirement_refs.contains(&r.id))
                .map(|i| i.id.clone())
                .collect(),
        })
        .collect()
}

pub fn completeness(requirements: &[Requirement], items: &[ChecklistItem]) -> CompletenessReport {
    let mut rows = Vec::with_capacity(requirements.len());
    for req in requirements {
        let covering: Vec<&ChecklistItem> = items
            .iter()
            .filter(|i| i.requirement_refs.contains(&req.id))
            .collect();
        let covered: BTreeSet<String> = if covering.is_empty() {
            BTreeSet::new()
        } else if req.is_behavior_only() {
            req.dimensions.iter().cloned().collect()
        } else {
            covering
                .iter()
                .flat_map(|i| i.covers_dimensions.iter())
                .filter(|d| req.dimensions.contains(d))
                .cloned()
                .collect()
        };
        let state = if covering.is_empty() {
            RequirementState::Unbound
        } else if req.dimensions.iter().all(|d| covered.contains(d)) {
            RequirementState::Complete
        } else {
            RequirementState::Partial
        };
        rows.push(RequirementCoverage {
            requirement_id: req.id.clone(),
            priority: req.priority,
            state,
            dimensions: req.dimensions.clone(),
            covered_dimensions: covered.into_iter().collect(),
            item_ids: covering.iter().map(|i| i.id.clone()).collect(),
        });
    }

    let count = |s: RequirementState| rows.iter().filter(|r| r.state == s).count();
    let (complete, partial, unbound) = (
        count(RequirementState::Complete),
        count(RequirementState::Partial),
        count(RequirementState::Unbound),
    );
    let total = rows.len();
    CompletenessReport {
        complete_pct: if total == 0 {
            1.0
        } else {
            complete as f64 / total as f64
        },
        requirements: rows,
        total,
        complete,
        partial,
        unbound,
    }
}

// ---------------------------------------------------------------------------
// Sufficiency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockingReason {
    BelowThreshold {
        complete_pct: f64,
        threshold: f64,
    },
    RequirementNotComplete {
        requirement_id: String,
        priority: Priority,
        state: RequirementState,
    },
    Cycle {
        members: Vec<String>,
    },
    MissingArtifact {
        item_id: String,
        detail: String,
    },
    PriorityInversion {
        item_id: String,
        prerequisite_id: String,
    },
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::BelowThreshold {
                complete_pct,
                threshold,
            } => write!(
                f,
                "completeness {:.2} is below threshold {:.2}",
                complete_pct, threshold
            ),
            BlockingReason::RequirementNotComplete {
                requirement_id,
                priority,
                state,
            } => write!(f, "{priority} requirement {requirement_id} is {state}"),
            BlockingReason::Cycle { members } => {
                write!(f, "dependency cycle among {} item(s)", members.len())
            }
            BlockingReason::MissingArtifact { item_id, detail } => {
                write!(f, "missing artifact ({detail}) for {item_id}")
            }
            BlockingReason::PriorityInversion {
                item_id,
                prerequisite_id,
            } => write!(f, "P0 item {item_id} waits on P2 item {prerequisite_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    pub ok: bool,
    pub complete_pct: f64,
    pub threshold: f64,
    /// Mandatory requirements not complete, in requirement order.
    pub blocking_requirements: Vec<String>,
    pub reasons: Vec<BlockingReason>,
}

fn missing_artifact(item: &ChecklistItem) -> Option<String> {
    match &item.kind {
        ItemKind::FixDependency { missing, .. } => Some(format!("undeclared '{missing}'")),
        ItemKind::CrossReference {
            target,
            resolved: false,
        } => Some(format!("dangling reference {target}")),
        _ => None,
    }
}

pub fn sufficiency(
    report: &CompletenessReport,
    items: &[ChecklistItem],
    graph: &GraphReport,
    threshold: f64,
) -> SufficiencyVerdict {
    let mut reasons = Vec::new();

    if report.complete_pct < threshold {
        reasons.push(BlockingReason::BelowThreshold {
            complete_pct: report.complete_pct,
            threshold,
        });
    }

    let mut blocking_requirements = Vec::new();
    for row in &report.requirements {
        if row.priority.is_mandatory() && row.state != RequirementState::Complete {
            blocking_requirements.push(row.requirement_id.clone());
            reasons.push(BlockingReason::RequirementNotComplete {
                requirement_id: row.requirement_id.clone(),
                priority: row.priority,
                state: row.state,
            });
        }
    }

    for cycle in &graph.cycles {
        reasons.push(BlockingReason::Cycle {
            members: cycle.clone(),
        });
    }

    for item in items {
        if let Some(detail) = missing_artifact(item) {
            reasons.push(BlockingReason::MissingArtifact {
                item_id: item.id.clone(),
                detail,
            });
        }
    }

    let priority: BTreeMap<&str, Priority> =
        items.iter().map(|i| (i.id.as_str(), i.priority)).collect();
    for item in items.iter().filter(|i| i.priority == Priority::P0) {
        for dep in &item.depends_on {
            if priority.get(dep.as_str()) == Some(&Priority::P2) {
                reasons.push(BlockingReason::PriorityInversion {
                    item_id: item.id.clone(),
                    prerequisite_id: dep.clone(),
                });
            }
        }
    }

    SufficiencyVerdict {
        ok: reasons.is_empty(),
        complete_pct: report.complete_pct,
        threshold,
        blocking_requirements,
        reasons,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::item::Evidence;
    use crate::requirement::RequirementOrigin;

    fn req(id: &str, priority: Priority, dims: &[&str]) -> Requirement {
        Requirement {
            id: id.to_string(),
            text: String::new(),
            dimensions: dims.iter().map(|d| d.to_string()).collect(),
            priority,
            source_pointer: "/requirements/0".to_string(),
            origin: RequirementOrigin::Explicit,
        }
    }

    fn item(id: &str, refs: &[&str], dims: &[&str]) -> ChecklistItem {
        let mut i = ChecklistItem::new(
            ItemKind::Node {
                node_kind: NodeKind::Map,
            },
            "/x",
            format!("Define /x {id}"),
            Evidence::at("/x", "x"),
        );
        i.id = id.to_string();
        i.requirement_refs = refs.iter().map(|r| r.to_string()).collect();
        i.covers_dimensions = dims.iter().map(|d| d.to_string()).collect();
        i
    }

    #[test]
    fn behavior_requirement_covered_by_any_reference() {
        let reqs = vec![req("R1", Priority::P1, &["behavior"])];
        let report = completeness(&reqs, &[item("a", &["R1"], &[])]);
        assert_eq!(report.requirements[0].state, RequirementState::Complete);
        assert_eq!(report.complete_pct, 1.0);
    }

    #[test]
    fn dimensions_partial_and_unbound() {
        let reqs = vec![
            req("R1", Priority::P2, &["audit", "retention"]),
            req("R2", Priority::P2, &["behavior"]),
        ];
        let report = completeness(&reqs, &[item("a", &["R1"], &["audit", "speed"])]);
        assert_eq!(report.state_of("R1"), Some(RequirementState::Partial));
        assert_eq!(report.requirements[0].covered_dimensions, vec!["audit"]);
        assert_eq!(report.state_of("R2"), Some(RequirementState::Unbound));
        assert_eq!(report.complete_pct, 0.0);
    }

    #[test]
    fn no_requirements_is_vacuously_complete() {
        let report = completeness(&[], &[]);
        assert_eq!(report.complete_pct, 1.0);
        let v = sufficiency(&report, &[], &GraphReport::default(), 0.8);
        assert!(v.ok);
    }

    #[test]
    fn removing_sole_cover_of_p0_flips_sufficiency() {
        let reqs = vec![req("R1", Priority::P0, &["behavior"])];
        let with = vec![item("a", &["R1"], &[])];
        let report = completeness(&reqs, &with);
        assert!(sufficiency(&report, &with, &GraphReport::default(), 0.8).ok);

        let report = completeness(&reqs, &[]);
        let v = sufficiency(&report, &[], &GraphReport::default(), 0.8);
        assert!(!v.ok);
        assert_eq!(v.blocking_requirements, vec!["R1"]);
        assert!(v.reasons.iter().any(|r| matches!(
            r,
            BlockingReason::RequirementNotComplete { requirement_id, .. } if requirement_id == "R1"
        )));
    }

    #[test]
    fn execution_prerequisites_block() {
        let mut p0 = item("a", &[], &[]);
        p0.priority = Priority::P0;
        p0.depends_on = vec!["b".to_string()];
        let p2 = item("b", &[], &[]);
        let graph = GraphReport {
            cycles: vec![vec!["c".to_string(), "d".to_string()]],
            ..GraphReport::default()
        };
        let v = sufficiency(&completeness(&[], &[]), &[p0, p2], &graph, 0.8);
        assert!(!v.ok);
        assert!(v.blocking_requirements.is_empty());
        assert!(v
            .reasons
            .iter()
            .any(|r| matches!(r, BlockingReason::PriorityInversion { .. })));
        assert!(v.reasons.iter().any(|r| matches!(r, BlockingReason::Cycle { .. })));
    }

    #[test]
    fn edges_follow_requirement_order() {
        let reqs = vec![req("R2", Priority::P2, &["behavior"]), req("R1", Priority::P2, &["behavior"])];
        let edges = coverage_edges(&reqs, &[item("a", &["R1", "R2"], &[])]);
        assert_eq!(edges[0].requirement_id, "R2");
        assert_eq!(edges[1].item_ids, vec!["a"]);
    }
}
