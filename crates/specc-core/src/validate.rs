//! Semantic strictness. Failures here degrade the run instead of refusing
//! it: the draft checklist is kept and the reasons become VALID-tier
//! blockers.

use crate::ast::{Ast, NodeKind};
use crate::context::{PipelineContext, Stage, Staged};
use crate::item::{ChecklistItem, ItemKind};
use crate::types::QualityStatus;
use std::collections::BTreeSet;

/// Reason codes, in the order they are reported.
fn reasons(items: &[ChecklistItem], ast: &Ast) -> Vec<String> {
    let mut out = Vec::new();

    for section in ast.matching("/sections/*") {
        if section.kind != NodeKind::Map {
            continue;
        }
        let empty = section.child("content").map_or(true, |c| c.is_empty_value());
        if empty {
            let name = section
                .label()
                .map(str::to_string)
                .unwrap_or_else(|| section.path.clone());
            out.push(format!("empty_section:{name}"));
        }
    }

    for item in items {
        match &item.kind {
            ItemKind::RequiredField { field } if !item.blocked_by.is_empty() => {
                out.push(format!("missing_field:{}/{field}", item.pointer));
            }
            ItemKind::Naming { rule, subject } => {
                out.push(format!("naming:{subject}:{rule}"));
            }
            ItemKind::Invariant { invariant_id, .. }
                if item.quality_status == QualityStatus::Violation =>
            {
                out.push(format!("invariant_violated:{invariant_id}"));
            }
            _ => {}
        }
    }

    let mut seen = BTreeSet::new();
    out.retain(|r| seen.insert(r.clone()));
    out
}

pub fn check(
    items: Vec<ChecklistItem>,
    ast: &Ast,
    ctx: &mut PipelineContext,
) -> Staged<Vec<ChecklistItem>> {
    let reasons = reasons(&items, ast);
    if reasons.is_empty() {
        ctx.record(Stage::Validation, 0, "semantically valid");
    } else {
        tracing::warn!(count = reasons.len(), "semantic validation degraded the run");
        ctx.record(
            Stage::Validation,
            reasons.len(),
            format!("degraded: {}", reasons.join(", ")),
        );
    }
    Staged::from_reasons(items, reasons)
}
