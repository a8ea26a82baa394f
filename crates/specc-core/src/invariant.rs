//! Invariant expressions and their evaluation against the tree.
//!
//! Three forms are understood:
//!
//! * `exists <pointer>`
//! * `count <pointer> <op> <n>` with `op` one of `== != >= <= > <`
//! * `unique <pattern>` where `*` matches one segment
//!
//! Each may also be written call-style, e.g. `exists(/metadata/name)`.
//! Anything else passes with a recorded safe-default explanation.

use crate::ast::{Ast, NodeKind};
use crate::context::{FindingLevel, PipelineContext, Stage};
use crate::item::{ChecklistItem, Explanation, ItemKind};
use crate::types::{InferenceType, Provenance, QualityStatus, Tier};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl CmpOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "==" | "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            ">=" => CmpOp::Ge,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            "<" => CmpOp::Lt,
            _ => return None,
        })
    }

    pub fn holds(self, lhs: usize, rhs: usize) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Lt => lhs < rhs,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantExpr {
    Exists(String),
    Count { pointer: String, op: CmpOp, n: usize },
    Unique(String),
    Unrecognized(String),
}

impl fmt::Display for InvariantExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantExpr::Exists(p) => write!(f, "exists {p}"),
            InvariantExpr::Count { pointer, op, n } => {
                write!(f, "count {pointer} {} {n}", op.as_str())
            }
            InvariantExpr::Unique(p) => write!(f, "unique {p}"),
            InvariantExpr::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

fn normalize_pointer(p: &str) -> String {
    let p = p.trim().trim_matches(|c| c == '"' || c == '\'');
    let p = p.strip_prefix('#').unwrap_or(p);
    if p.starts_with('/') || p.is_empty() {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

pub fn parse(expr: &str) -> InvariantExpr {
    static UNARY: OnceLock<Regex> = OnceLock::new();
    static COUNT: OnceLock<Regex> = OnceLock::new();
    let unary = UNARY.get_or_init(|| {
        Regex::new(r"^(exists|unique)\s*(?:\(\s*([^)\s]+)\s*\)|\s([^\s]+))$").unwrap()
    });
    let count = COUNT.get_or_init(|| {
        Regex::new(r"^count\s*(?:\(\s*([^)\s]+)\s*\)|\s([^\s]+))\s*(==|!=|>=|<=|=|>|<)\s*(\d+)$")
            .unwrap()
    });
    let raw = expr.trim();

    if let Some(c) = unary.captures(raw) {
        let target = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str());
        if let Some(target) = target {
            let pointer = normalize_pointer(target);
            return match &c[1] {
                "exists" => InvariantExpr::Exists(pointer),
                _ => InvariantExpr::Unique(pointer),
            };
        }
    }
    if let Some(c) = count.captures(raw) {
        let target = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str());
        let op = CmpOp::parse(&c[3]);
        let n = c[4].parse::<usize>().ok();
        if let (Some(target), Some(op), Some(n)) = (target, op, n) {
            return InvariantExpr::Count {
                pointer: normalize_pointer(target),
                op,
                n,
            };
        }
    }
    InvariantExpr::Unrecognized(raw.to_string())
}

/// Pointers or patterns named by every invariant in the document.
pub fn targets(ast: &Ast) -> Vec<String> {
    let mut out = BTreeSet::new();
    for node in ast.matching("/invariants/*") {
        let Some(expr) = node.child_str("expr") else {
            continue;
        };
        match parse(expr) {
            InvariantExpr::Exists(p) | InvariantExpr::Unique(p) => {
                out.insert(p);
            }
            InvariantExpr::Count { pointer, .. } => {
                out.insert(pointer);
            }
            InvariantExpr::Unrecognized(_) => {}
        }
    }
    out.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    SafeDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantResult {
    pub invariant_id: String,
    pub expr: String,
    pub outcome: Outcome,
    pub detail: String,
}

fn count_at(ast: &Ast, pointer: &str) -> usize {
    if pointer.contains('*') {
        return ast.matching(pointer).len();
    }
    match ast.get(pointer) {
        Some(n) if n.kind.is_container() => n.children.len(),
        Some(n) if n.kind == NodeKind::Null => 0,
        Some(_) => 1,
        None => 0,
    }
}

pub fn evaluate(expr: &InvariantExpr, ast: &Ast) -> (Outcome, String) {
    match expr {
        InvariantExpr::Exists(p) => {
            let found = ast
                .matching(p)
                .iter()
                .any(|n| n.kind != NodeKind::Null);
            if found {
                (Outcome::Pass, format!("{p} exists"))
            } else {
                (Outcome::Fail, format!("{p} does not exist"))
            }
        }
        InvariantExpr::Count { pointer, op, n } => {
            let actual = count_at(ast, pointer);
            let outcome = if op.holds(actual, *n) {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            (
                outcome,
                format!("count {pointer} = {actual}, expected {} {n}", op.as_str()),
            )
        }
        InvariantExpr::Unique(pattern) => {
            let mut seen = BTreeSet::new();
            let mut dups = BTreeSet::new();
            for node in ast.matching(pattern) {
                let v = node.value_string();
                if !seen.insert(v.clone()) {
                    dups.insert(v);
                }
            }
            if dups.is_empty() {
                (Outcome::Pass, format!("{} value(s) unique", seen.len()))
            } else {
                let list: Vec<String> = dups.into_iter().collect();
                (Outcome::Fail, format!("duplicate value(s): {}", list.join(", ")))
            }
        }
        InvariantExpr::Unrecognized(raw) => (
            Outcome::SafeDefault,
            format!("unrecognized expression '{raw}' defaults to pass"),
        ),
    }
}

/// Evaluate every invariant item. Violations escalate the item and spawn a
/// resolution item; unrecognized expressions pass with an explanation.
pub fn apply(
    items: Vec<ChecklistItem>,
    ast: &Ast,
    ctx: &mut PipelineContext,
) -> (Vec<ChecklistItem>, Vec<InvariantResult>) {
    let ns = ctx.namespace.clone();
    let mut out = Vec::with_capacity(items.len());
    let mut spawned = Vec::new();
    let mut results = Vec::new();

    for mut item in items {
        let ItemKind::Invariant { invariant_id, expr } = item.kind.clone() else {
            out.push(item);
            continue;
        };
        let parsed = parse(&expr);
        let (outcome, detail) = evaluate(&parsed, ast);
        let (provenance, inference_type, tier) = match outcome {
            Outcome::SafeDefault => (Provenance::Default, InferenceType::SafeDefault, Tier::Fallback),
            _ => (Provenance::Derived, InferenceType::Invariant, Tier::Explicit),
        };
        item.explain(Explanation {
            field: "invariant".to_string(),
            provenance,
            justification: detail.clone(),
            inference_type,
            tier,
        });

        match outcome {
            Outcome::Pass => {}
            Outcome::SafeDefault => {
                ctx.finding(
                    "invariant_safe_default",
                    FindingLevel::Warning,
                    &invariant_id,
                    detail.clone(),
                );
            }
            Outcome::Fail => {
                item.quality_status = QualityStatus::Violation;
                let resolution = ChecklistItem::new(
                    ItemKind::InvariantResolution {
                        invariant_id: invariant_id.clone(),
                    },
                    item.pointer.clone(),
                    format!("resolve-invariant: {invariant_id} ({expr})"),
                    item.evidence.clone(),
                )
                .with_value(item.value.clone())
                .with_parent(item.provisional_id(&ns));
                spawned.push(resolution);
                ctx.finding(
                    "invariant_violated",
                    FindingLevel::Blocking,
                    &invariant_id,
                    detail.clone(),
                );
            }
        }
        results.push(InvariantResult {
            invariant_id,
            expr,
            outcome,
            detail,
        });
        out.push(item);
    }

    let failed = results.iter().filter(|r| r.outcome == Outcome::Fail).count();
    ctx.record(
        Stage::Invariant,
        results.len(),
        format!("{} invariant(s), {failed} violated", results.len()),
    );
    out.extend(spawned);
    (out, results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
