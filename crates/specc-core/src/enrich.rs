//! Enrichment passes. Each field is decided by a pure function of the item
//! alone, so the passes may run in any order and never reorder the set.

use crate::ast::top_section;
use crate::error::{Result, SpeccError};
use crate::item::{ChecklistItem, Explanation, ItemKind, SubTaskKind};
use crate::types::{
    Classification, Confidence, InferenceType, IntentCategory, Priority, Provenance,
    QualityStatus, Severity, Tier,
};

/// Fields that must carry an explanation after enrichment.
pub const EXPLAINED_FIELDS: &[&str] = &[
    "classification",
    "severity",
    "priority",
    "confidence",
    "intent_category",
];

fn explanation(
    field: &str,
    provenance: Provenance,
    inference_type: InferenceType,
    tier: Tier,
    justification: impl Into<String>,
) -> Explanation {
    Explanation {
        field: field.to_string(),
        provenance,
        justification: justification.into(),
        inference_type,
        tier,
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classification forced by the item kind, if any.
fn kind_classification(kind: &ItemKind) -> Option<Classification> {
    let c = match kind {
        ItemKind::Node { .. } | ItemKind::Prose { .. } => return None,
        ItemKind::Module { .. } => Classification::Structure,
        ItemKind::Bootstrap { .. } => Classification::Setup,
        ItemKind::Endpoint { .. } => Classification::Interface,
        ItemKind::Agent { .. } => Classification::Agent,
        ItemKind::Section { .. } => Classification::Documentation,
        ItemKind::Invariant { .. } | ItemKind::InvariantResolution { .. } => {
            Classification::Invariant
        }
        ItemKind::Requirement { .. } | ItemKind::Naming { .. } => Classification::Validation,
        ItemKind::RequiredField { .. } | ItemKind::Constraint { .. } => Classification::Constraint,
        ItemKind::Dependency { .. }
        | ItemKind::CrossReference { .. }
        | ItemKind::ResolveCycle { .. }
        | ItemKind::FixDependency { .. } => Classification::Dependency,
        ItemKind::FlowEdge { .. } => Classification::Flow,
        ItemKind::SectionOrder { .. } => Classification::Ordering,
        ItemKind::SubTask { task } => match task {
            SubTaskKind::Test | SubTaskKind::Verify => Classification::Test,
            SubTaskKind::Import => Classification::Dependency,
            SubTaskKind::Init | SubTaskKind::Impl => Classification::Setup,
        },
    };
    Some(c)
}

fn prefix_classification(pointer: &str) -> Option<Classification> {
    let c = match top_section(pointer)?.as_str() {
        "metadata" | "sections" => Classification::Documentation,
        "model" | "architecture" => Classification::Structure,
        "instructions" => Classification::Governance,
        "agents" => Classification::Agent,
        "api" => Classification::Interface,
        "invariants" => Classification::Invariant,
        "requirements" => Classification::Validation,
        "flows" => Classification::Flow,
        "bootstrap" => Classification::Setup,
        _ => return None,
    };
    Some(c)
}

/// Precedence: kind override > explicit flag > pointer prefix > `core`.
pub fn classify(item: &ChecklistItem) -> (Classification, Explanation) {
    const F: &str = "classification";
    if let Some(c) = kind_classification(&item.kind) {
        return (
            c,
            explanation(
                F,
                Provenance::Derived,
                InferenceType::TypeOverride,
                Tier::Override,
                format!("{} items are always {c}", item.kind.tag()),
            ),
        );
    }
    let mut ignored = None;
    if let Some(flag) = &item.hints.classification {
        match flag.parse::<Classification>() {
            Ok(c) => {
                return (
                    c,
                    explanation(
                        F,
                        Provenance::Derived,
                        InferenceType::ExplicitField,
                        Tier::Explicit,
                        format!("explicit classification '{flag}'"),
                    ),
                )
            }
            Err(_) => ignored = Some(flag.clone()),
        }
    }
    let suffix = ignored
        .map(|f| format!(" (ignored unknown classification '{f}')"))
        .unwrap_or_default();
    if let Some(c) = prefix_classification(&item.pointer) {
        return (
            c,
            explanation(
                F,
                Provenance::Inferred,
                InferenceType::PointerPrefix,
                Tier::Heuristic,
                format!("pointer prefix of {}{suffix}", item.pointer),
            ),
        );
    }
    (
        Classification::Core,
        explanation(
            F,
            Provenance::Default,
            InferenceType::SafeDefault,
            Tier::Fallback,
            format!("no rule matched{suffix}"),
        ),
    )
}

// ---------------------------------------------------------------------------
// Severity rules
// ---------------------------------------------------------------------------

/// A fn-pointer severity rule. Rules are evaluated in order; first match wins.
pub struct SeverityRule {
    pub id: &'static str,
    pub condition: fn(&ChecklistItem) -> bool,
    pub severity: Severity,
    pub inference_type: InferenceType,
    pub tier: Tier,
}

const CRITICAL_WORDS: &[&str] = &[
    "security",
    "authentication",
    "authorization",
    "payment",
    "secret",
    "refuse",
    "never",
    "critical",
];
const HIGH_WORDS: &[&str] = &["must", "shall", "required", "invariant", "integrity"];
const MEDIUM_WORDS: &[&str] = &["should", "validate", "test", "verify"];

fn mentions(item: &ChecklistItem, words: &[&str]) -> bool {
    let haystack = format!("{} {}", item.text, item.value).to_lowercase();
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| {
            words
                .iter()
                .any(|k| w.starts_with(k) && w.len() <= k.len() + 2)
        })
}

fn structural_weight(item: &ChecklistItem) -> bool {
    matches!(
        item.kind,
        ItemKind::Module { .. }
            | ItemKind::Bootstrap { .. }
            | ItemKind::Endpoint { .. }
            | ItemKind::Agent { .. }
            | ItemKind::Invariant { .. }
            | ItemKind::Requirement { .. }
            | ItemKind::RequiredField { .. }
            | ItemKind::Constraint { .. }
            | ItemKind::Dependency { .. }
            | ItemKind::CrossReference { .. }
            | ItemKind::FlowEdge { .. }
            | ItemKind::SubTask { .. }
    )
}

macro_rules! severity_rule {
    ($id:expr, $cond:expr, $sev:expr, $inf:expr, $tier:expr) => {
        SeverityRule {
            id: $id,
            condition: $cond,
            severity: $sev,
            inference_type: $inf,
            tier: $tier,
        }
    };
}

pub fn severity_rules() -> Vec<SeverityRule> {
    vec![
        severity_rule!(
            "invariant-violated",
            |i| i.quality_status == QualityStatus::Violation,
            Severity::Critical,
            InferenceType::Invariant,
            Tier::Override
        ),
        severity_rule!(
            "invariant-bound",
            |i| i.hints.invariant_bound,
            Severity::High,
            InferenceType::Invariant,
            Tier::Override
        ),
        severity_rule!(
            "blocking-dependency",
            |i| !i.blocked_by.is_empty()
                || matches!(
                    i.kind,
                    ItemKind::FixDependency { .. }
                        | ItemKind::ResolveCycle { .. }
                        | ItemKind::InvariantResolution { .. }
                        | ItemKind::Dependency { resolved: false, .. }
                        | ItemKind::CrossReference { resolved: false, .. }
                ),
            Severity::Critical,
            InferenceType::Graph,
            Tier::Explicit
        ),
        severity_rule!(
            "critical-keyword",
            |i| mentions(i, CRITICAL_WORDS),
            Severity::Critical,
            InferenceType::Keyword,
            Tier::Heuristic
        ),
        severity_rule!(
            "high-keyword",
            |i| mentions(i, HIGH_WORDS),
            Severity::High,
            InferenceType::Keyword,
            Tier::Heuristic
        ),
        severity_rule!(
            "medium-keyword",
            |i| mentions(i, MEDIUM_WORDS),
            Severity::Medium,
            InferenceType::Keyword,
            Tier::Heuristic
        ),
        severity_rule!(
            "structural",
            structural_weight,
            Severity::Medium,
            InferenceType::Structural,
            Tier::Heuristic
        ),
    ]
}

pub fn severity(item: &ChecklistItem) -> (Severity, Explanation) {
    const F: &str = "severity";
    for rule in severity_rules() {
        if (rule.condition)(item) {
            return (
                rule.severity,
                explanation(
                    F,
                    if rule.tier == Tier::Heuristic {
                        Provenance::Inferred
                    } else {
                        Provenance::Derived
                    },
                    rule.inference_type,
                    rule.tier,
                    format!("rule {}", rule.id),
                ),
            );
        }
    }
    (
        Severity::Low,
        explanation(
            F,
            Provenance::Default,
            InferenceType::SafeDefault,
            Tier::Fallback,
            "no severity rule matched",
        ),
    )
}

// ---------------------------------------------------------------------------
// Priority / confidence / intent
// ---------------------------------------------------------------------------

pub fn priority(item: &ChecklistItem) -> (Priority, Explanation) {
    const F: &str = "priority";
    let (sev, _) = severity(item);
    if item.quality_status == QualityStatus::Violation {
        return (
            Priority::P0,
            explanation(
                F,
                Provenance::Derived,
                InferenceType::Invariant,
                Tier::Override,
                "violated invariant",
            ),
        );
    }
    if let Some(flag) = &item.hints.priority {
        if let Ok(p) = flag.parse::<Priority>() {
            return (
                p,
                explanation(
                    F,
                    Provenance::Derived,
                    InferenceType::ExplicitField,
                    Tier::Explicit,
                    format!("explicit priority {p}"),
                ),
            );
        }
    }
    let p = Priority::from_severity(sev);
    (
        p,
        explanation(
            F,
            Provenance::Derived,
            InferenceType::Structural,
            Tier::Heuristic,
            format!("severity {sev} maps to {p}"),
        ),
    )
}

pub fn confidence(item: &ChecklistItem) -> (Confidence, Explanation) {
    const F: &str = "confidence";
    if item.inferred_from_prose {
        return (
            Confidence::Low,
            explanation(
                F,
                Provenance::Inferred,
                InferenceType::Keyword,
                Tier::Heuristic,
                "free-text keyword match",
            ),
        );
    }
    if item.hints.invariant_bound
        || item.hints.instruction
        || matches!(item.kind, ItemKind::Invariant { .. })
    {
        return (
            Confidence::High,
            explanation(
                F,
                Provenance::Derived,
                InferenceType::Invariant,
                Tier::Explicit,
                "explicit invariant or instruction",
            ),
        );
    }
    if item.hints.explicit_field {
        return (
            Confidence::Medium,
            explanation(
                F,
                Provenance::Derived,
                InferenceType::ExplicitField,
                Tier::Explicit,
                "explicit structural field",
            ),
        );
    }
    if item.generated {
        return (
            Confidence::Medium,
            explanation(
                F,
                Provenance::Derived,
                InferenceType::Structural,
                Tier::Heuristic,
                "derived from structure",
            ),
        );
    }
    (
        Confidence::Low,
        explanation(
            F,
            Provenance::Default,
            InferenceType::SafeDefault,
            Tier::Fallback,
            "no provenance signal",
        ),
    )
}

pub fn intent(item: &ChecklistItem) -> (IntentCategory, Explanation) {
    let intent = match &item.kind {
        ItemKind::ResolveCycle { .. }
        | ItemKind::FixDependency { .. }
        | ItemKind::InvariantResolution { .. } => IntentCategory::Resolve,
        ItemKind::Invariant { .. }
        | ItemKind::Naming { .. }
        | ItemKind::RequiredField { .. }
        | ItemKind::Constraint { .. }
        | ItemKind::CrossReference { .. }
        | ItemKind::Requirement { .. } => IntentCategory::Verify,
        ItemKind::SubTask { task } => match task {
            SubTaskKind::Test | SubTaskKind::Verify => IntentCategory::Verify,
            SubTaskKind::Import | SubTaskKind::Init => IntentCategory::Configure,
            SubTaskKind::Impl => IntentCategory::Implement,
        },
        ItemKind::Bootstrap { .. } => IntentCategory::Configure,
        ItemKind::Section { .. } | ItemKind::SectionOrder { .. } => IntentCategory::Document,
        ItemKind::Node { .. } => match top_section(&item.pointer).as_deref() {
            Some("metadata") => IntentCategory::Configure,
            Some("sections") => IntentCategory::Document,
            Some("invariants") | Some("requirements") => IntentCategory::Verify,
            _ => IntentCategory::Implement,
        },
        ItemKind::Module { .. }
        | ItemKind::Endpoint { .. }
        | ItemKind::Agent { .. }
        | ItemKind::Prose { .. }
        | ItemKind::Dependency { .. }
        | ItemKind::FlowEdge { .. } => IntentCategory::Implement,
    };
    (
        intent,
        explanation(
            "intent_category",
            Provenance::Derived,
            InferenceType::TypeOverride,
            Tier::Override,
            format!("{} item", item.kind.tag()),
        ),
    )
}

/// Actionable imperative for the item.
pub fn action(item: &ChecklistItem) -> String {
    match &item.kind {
        ItemKind::Node { node_kind } if node_kind.is_container() => {
            format!("Define {}", item.pointer)
        }
        ItemKind::Node { .. } => format!("Set {} to {}", item.pointer, item.value),
        ItemKind::Module { name } => format!("Implement module '{name}'"),
        ItemKind::Bootstrap { name } => format!("Run bootstrap step '{name}'"),
        ItemKind::Endpoint { method, path } => format!("Expose endpoint {method} {path}"),
        ItemKind::Agent { name } => format!("Implement agent '{name}'"),
        ItemKind::Section { section_id } => format!("Document section '{section_id}'"),
        ItemKind::Invariant { invariant_id, expr } => {
            format!("Enforce invariant {invariant_id}: {expr}")
        }
        ItemKind::Requirement { requirement_id } => {
            format!("Satisfy requirement {requirement_id}")
        }
        ItemKind::Prose { keyword } => {
            format!("Satisfy '{keyword}' obligation at {}", item.pointer)
        }
        ItemKind::RequiredField { field } => {
            format!("Provide required field '{field}' at {}", item.pointer)
        }
        ItemKind::Constraint { constraint } => format!("Enforce constraint '{constraint}'"),
        ItemKind::Naming { rule, subject } => format!("Make '{subject}' satisfy {rule}"),
        ItemKind::Dependency {
            from, to, resolved, ..
        } => {
            if *resolved {
                format!("Wire '{from}' to '{to}'")
            } else {
                format!("Resolve dependency '{from}' -> '{to}'")
            }
        }
        ItemKind::CrossReference { target, resolved } => {
            if *resolved {
                format!("Keep reference to {target} in sync")
            } else {
                format!("Fix dangling reference to {target}")
            }
        }
        ItemKind::FlowEdge { flow, from, to } => {
            format!("Implement flow '{flow}' step '{from}' -> '{to}'")
        }
        ItemKind::SectionOrder { section, after } => {
            format!("Place section '{section}' after '{after}'")
        }
        ItemKind::ResolveCycle { members } => {
            format!("Break dependency cycle among {} items", members.len())
        }
        ItemKind::InvariantResolution { invariant_id } => {
            format!("Resolve violated invariant {invariant_id}")
        }
        ItemKind::SubTask { task } => match task {
            SubTaskKind::Test => format!("Write tests for {}", item.pointer),
            SubTaskKind::Import => format!("Import dependencies of {}", item.pointer),
            SubTaskKind::Init => format!("Initialize {}", item.pointer),
            SubTaskKind::Impl => format!("Implement {}", item.pointer),
            SubTaskKind::Verify => format!("Verify {}", item.pointer),
        },
        ItemKind::FixDependency { dependent, missing } => {
            format!("Declare '{missing}' required by '{dependent}'")
        }
    }
}

// ---------------------------------------------------------------------------
// enrich
// ---------------------------------------------------------------------------

pub fn enrich(mut item: ChecklistItem) -> ChecklistItem {
    let (c, ce) = classify(&item);
    let (s, se) = severity(&item);
    let (p, pe) = priority(&item);
    let (conf, confe) = confidence(&item);
    let (i, ie) = intent(&item);
    item.action = action(&item);
    item.classification = c;
    item.severity = s;
    item.priority = p;
    item.confidence = conf;
    item.intent_category = i;
    for e in [ce, se, pe, confe, ie] {
        item.explain(e);
    }
    item
}

pub fn enrich_all(items: Vec<ChecklistItem>) -> Vec<ChecklistItem> {
    items.into_iter().map(enrich).collect()
}

/// Every decided field is explained, every item has a pointer and prose
/// provenance always carries an excerpt digest.
pub fn verify_contract(items: &[ChecklistItem]) -> Result<()> {
    for item in items {
        if item.evidence.source_pointer != item.pointer {
            return Err(SpeccError::ContractViolation(format!(
                "item '{}' cites {} but lives at {}",
                item.text, item.evidence.source_pointer, item.pointer
            )));
        }
        for field in EXPLAINED_FIELDS {
            if item.explanation(field).is_none() {
                return Err(SpeccError::ContractViolation(format!(
                    "item '{}' has no explanation for {field}",
                    item.text
                )));
            }
        }
        if item.inferred_from_prose && item.evidence.excerpt_digest.is_none() {
            return Err(SpeccError::ContractViolation(format!(
                "prose item '{}' has no excerpt digest",
                item.text
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
