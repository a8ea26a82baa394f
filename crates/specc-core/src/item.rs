use crate::ast::NodeKind;
use crate::digest::digest_str;
use crate::types::{
    Classification, Confidence, InferenceType, IntentCategory, ItemStatus, Priority, Provenance,
    QualityStatus, ReadinessImpact, Severity, Tier,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item identity: `sha256(namespace | pointer | text)`.
pub fn compute_id(namespace: &str, pointer: &str, text: &str) -> String {
    digest_str(&format!("{namespace}|{pointer}|{text}"))
}

// ---------------------------------------------------------------------------
// SubTaskKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskKind {
    Test,
    Import,
    Init,
    Impl,
    Verify,
}

impl SubTaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubTaskKind::Test => "test",
            SubTaskKind::Import => "import",
            SubTaskKind::Init => "init",
            SubTaskKind::Impl => "impl",
            SubTaskKind::Verify => "verify",
        }
    }

    pub fn is_verification(self) -> bool {
        matches!(self, SubTaskKind::Test | SubTaskKind::Verify)
    }
}

impl fmt::Display for SubTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

/// Closed set of checklist item kinds. Every stage dispatches on this with
/// an exhaustive match, so a new kind is a compile-time addition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Node { node_kind: NodeKind },
    Module { name: String },
    Bootstrap { name: String },
    Endpoint { method: String, path: String },
    Agent { name: String },
    Section { section_id: String },
    Invariant { invariant_id: String, expr: String },
    Requirement { requirement_id: String },
    Prose { keyword: String },
    RequiredField { field: String },
    Constraint { constraint: String },
    Naming { rule: String, subject: String },
    Dependency { from: String, to: String, explicit: bool, resolved: bool },
    CrossReference { target: String, resolved: bool },
    FlowEdge { flow: String, from: String, to: String },
    SectionOrder { section: String, after: String },
    ResolveCycle { members: Vec<String> },
    InvariantResolution { invariant_id: String },
    SubTask { task: SubTaskKind },
    FixDependency { dependent: String, missing: String },
}

impl ItemKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ItemKind::Node { .. } => "node",
            ItemKind::Module { .. } => "module",
            ItemKind::Bootstrap { .. } => "bootstrap",
            ItemKind::Endpoint { .. } => "endpoint",
            ItemKind::Agent { .. } => "agent",
            ItemKind::Section { .. } => "section",
            ItemKind::Invariant { .. } => "invariant",
            ItemKind::Requirement { .. } => "requirement",
            ItemKind::Prose { .. } => "prose",
            ItemKind::RequiredField { .. } => "required_field",
            ItemKind::Constraint { .. } => "constraint",
            ItemKind::Naming { .. } => "naming",
            ItemKind::Dependency { .. } => "dependency",
            ItemKind::CrossReference { .. } => "cross_reference",
            ItemKind::FlowEdge { .. } => "flow_edge",
            ItemKind::SectionOrder { .. } => "section_order",
            ItemKind::ResolveCycle { .. } => "resolve_cycle",
            ItemKind::InvariantResolution { .. } => "invariant_resolution",
            ItemKind::SubTask { .. } => "sub_task",
            ItemKind::FixDependency { .. } => "fix_dependency",
        }
    }

    /// Items synthesized by a stage rather than read off a spec node.
    pub fn is_generated(&self) -> bool {
        match self {
            ItemKind::Node { .. }
            | ItemKind::Module { .. }
            | ItemKind::Bootstrap { .. }
            | ItemKind::Endpoint { .. }
            | ItemKind::Agent { .. }
            | ItemKind::Section { .. }
            | ItemKind::Invariant { .. }
            | ItemKind::Requirement { .. }
            | ItemKind::Prose { .. } => false,
            ItemKind::RequiredField { .. }
            | ItemKind::Constraint { .. }
            | ItemKind::Naming { .. }
            | ItemKind::Dependency { .. }
            | ItemKind::CrossReference { .. }
            | ItemKind::FlowEdge { .. }
            | ItemKind::SectionOrder { .. }
            | ItemKind::ResolveCycle { .. }
            | ItemKind::InvariantResolution { .. }
            | ItemKind::SubTask { .. }
            | ItemKind::FixDependency { .. } => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Evidence / Explanation / Hints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evidence {
    pub source_pointer: String,
    pub line: u32,
    pub quote: String,
    /// Digest of the matched prose excerpt; required for prose provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt_digest: Option<String>,
}

impl Evidence {
    pub fn at(pointer: &str, quote: impl Into<String>) -> Self {
        Self {
            source_pointer: pointer.to_string(),
            line: pseudo_line(pointer),
            quote: truncate(&quote.into(), 160),
            excerpt_digest: None,
        }
    }

    pub fn prose(pointer: &str, excerpt: &str) -> Self {
        Self {
            source_pointer: pointer.to_string(),
            line: pseudo_line(pointer),
            quote: truncate(excerpt, 160),
            excerpt_digest: Some(digest_str(excerpt)),
        }
    }

    /// Signature independent of the source location.
    pub fn signature(&self) -> String {
        format!(
            "{}#{}",
            self.quote,
            self.excerpt_digest.as_deref().unwrap_or("-")
        )
    }
}

/// Pseudo line number: a pure function of the pointer, stable across runs.
pub fn pseudo_line(pointer: &str) -> u32 {
    let d = digest_str(pointer);
    let head = u32::from_str_radix(&d[..6], 16).unwrap_or(0);
    1 + head % 9973
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// Typed explainability record, one per decided field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Explanation {
    pub field: String,
    pub provenance: Provenance,
    pub justification: String,
    pub inference_type: InferenceType,
    pub tier: Tier,
}

/// Facts captured at extraction time so enrichment can stay a pure
/// `item -> item` function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// An invariant targets this item's pointer.
    #[serde(default)]
    pub invariant_bound: bool,
    /// Read from an explicit structural field of the spec.
    #[serde(default)]
    pub explicit_field: bool,
    /// Read from the `instructions` section.
    #[serde(default)]
    pub instruction: bool,
}

// ---------------------------------------------------------------------------
// ChecklistItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Empty until canonicalization synthesizes it.
    pub id: String,
    pub pointer: String,
    pub text: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    /// Canonical value string of the source node.
    pub value: String,
    pub kind: ItemKind,
    pub classification: Classification,
    pub severity: Severity,
    pub priority: Priority,
    pub confidence: Confidence,
    pub evidence: Evidence,
    pub intent_category: IntentCategory,
    #[serde(default)]
    pub requirement_refs: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub covers_dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_if_false: Option<String>,
    pub status: ItemStatus,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    pub quality_status: QualityStatus,
    #[serde(default)]
    pub inferred_from_prose: bool,
    pub generated: bool,
    /// Provisional id of the item this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub explain: Vec<Explanation>,
    #[serde(default)]
    pub hints: ItemHints,
    #[serde(default)]
    pub order_rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<u32>,
}

impl ChecklistItem {
    /// A fresh, un-enriched item. Enrichment fills the classification
    /// fields; the placeholders here are never observable after it runs.
    pub fn new(
        kind: ItemKind,
        pointer: impl Into<String>,
        text: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        let generated = kind.is_generated();
        Self {
            id: String::new(),
            pointer: pointer.into(),
            text: text.into(),
            action: String::new(),
            claim: None,
            value: String::new(),
            kind,
            classification: Classification::Core,
            severity: Severity::Medium,
            priority: Priority::P2,
            confidence: Confidence::Medium,
            evidence,
            intent_category: IntentCategory::Implement,
            requirement_refs: Vec::new(),
            depends_on: Vec::new(),
            covers_dimensions: Vec::new(),
            risk_if_false: None,
            status: ItemStatus::Pending,
            blocked_by: Vec::new(),
            quality_status: QualityStatus::Ok,
            inferred_from_prose: false,
            generated,
            parent: None,
            explain: Vec::new(),
            hints: ItemHints::default(),
            order_rank: 0,
            execution_order: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_hints(mut self, hints: ItemHints) -> Self {
        self.hints = hints;
        self
    }

    /// The id this item will receive; a pure function of its final text.
    pub fn provisional_id(&self, namespace: &str) -> String {
        compute_id(namespace, &self.pointer, &self.text)
    }

    /// Replace any explanation for `field` with `explanation`.
    pub fn explain(&mut self, explanation: Explanation) {
        self.explain.retain(|e| e.field != explanation.field);
        self.explain.push(explanation);
    }

    pub fn explanation(&self, field: &str) -> Option<&Explanation> {
        self.explain.iter().find(|e| e.field == field)
    }

    pub fn readiness_impact(&self) -> ReadinessImpact {
        ReadinessImpact::from_priority(self.priority)
    }

    pub fn block(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.blocked_by.contains(&reason) {
            self.blocked_by.push(reason);
        }
        if self.status == ItemStatus::Pending {
            self.status = ItemStatus::Blocked;
        }
    }

    pub fn is_verification(&self) -> bool {
        matches!(&self.kind, ItemKind::SubTask { task } if task.is_verification())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ChecklistItem {
        ChecklistItem::new(
            ItemKind::Module {
                name: "ledger".to_string(),
            },
            "/architecture/modules/0",
            "Define /architecture/modules/0 'ledger'",
            Evidence::at("/architecture/modules/0", "ledger"),
        )
    }

    #[test]
    fn id_is_pure_function_of_inputs() {
        let a = compute_id("ns", "/a", "text");
        let b = compute_id("ns", "/a", "text");
        assert_eq!(a, b);
        assert_eq!(a, digest_str("ns|/a|text"));
        assert_ne!(a, compute_id("other", "/a", "text"));
    }

    #[test]
    fn provisional_id_matches_compute_id() {
        let it = item();
        assert_eq!(it.provisional_id("ns"), compute_id("ns", &it.pointer, &it.text));
        assert!(it.id.is_empty());
    }

    #[test]
    fn pseudo_line_is_stable_and_positive() {
        let a = pseudo_line("/x/y");
        assert_eq!(a, pseudo_line("/x/y"));
        assert!(a >= 1 && a <= 9973);
    }

    #[test]
    fn prose_evidence_carries_digest() {
        let e = Evidence::prose("/sections/0/content", "The system must refuse X");
        assert_eq!(
            e.excerpt_digest.as_deref(),
            Some(digest_str("The system must refuse X").as_str())
        );
        assert!(Evidence::at("/a", "q").excerpt_digest.is_none());
    }

    #[test]
    fn signature_ignores_pointer() {
        let a = Evidence::at("/a", "same quote");
        let b = Evidence::at("/b", "same quote");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn explain_replaces_same_field() {
        let mut it = item();
        for tier in [Tier::Fallback, Tier::Override] {
            it.explain(Explanation {
                field: "classification".to_string(),
                provenance: Provenance::Derived,
                justification: "x".to_string(),
                inference_type: InferenceType::TypeOverride,
                tier,
            });
        }
        assert_eq!(it.explain.len(), 1);
        assert_eq!(it.explanation("classification").unwrap().tier, Tier::Override);
    }

    #[test]
    fn block_marks_status_once() {
        let mut it = item();
        it.block("missing:store");
        it.block("missing:store");
        assert_eq!(it.blocked_by, vec!["missing:store"]);
        assert_eq!(it.status, ItemStatus::Blocked);
    }

    #[test]
    fn generated_follows_kind() {
        assert!(!item().generated);
        let sub = ChecklistItem::new(
            ItemKind::SubTask {
                task: SubTaskKind::Test,
            },
            "/a",
            "test: x",
            Evidence::at("/a", "x"),
        );
        assert!(sub.generated);
        assert!(sub.is_verification());
    }

    #[test]
    fn kind_serializes_tagged() {
        let json = serde_json::to_string(&ItemKind::SubTask {
            task: SubTaskKind::Init,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"sub_task\""));
        assert!(json.contains("\"task\":\"init\""));
    }
}
