//! Persona governance: observers, auditors and governance reviewers may
//! annotate or veto checklist items. Everything recorded here is advisory;
//! no request ever changes an item.

use crate::config::PersonaConfig;
use crate::context::{FindingLevel, PipelineContext, Stage};
use crate::digest::short;
use crate::error::PersonaError;
use crate::item::ChecklistItem;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Item fields a persona may never change, even as a suggestion.
pub const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "pointer",
    "generated",
    "artifact",
    "severity",
    "refusal_outcome",
];

// ---------------------------------------------------------------------------
// Role / Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Observe,
    Annotate,
    Veto,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Observe => "observe",
            Action::Annotate => "annotate",
            Action::Veto => "veto",
        };
        f.write_str(s)
    }
}

/// Ordered by authority: `Observer < Auditor < Governance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Observer,
    Auditor,
    Governance,
}

impl Role {
    /// The capability matrix.
    pub fn capabilities(self) -> &'static [Action] {
        match self {
            Role::Observer => &[Action::Observe],
            Role::Auditor => &[Action::Observe, Action::Annotate],
            Role::Governance => &[Action::Observe, Action::Annotate, Action::Veto],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub role: Role,
    /// Narrows the role's capabilities; it can never widen them.
    pub allowed_actions: Vec<Action>,
}

impl Persona {
    pub fn can(&self, action: Action) -> bool {
        self.allowed_actions.contains(&action) && self.role.capabilities().contains(&action)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewAction {
    Observe,
    Annotate {
        note: String,
        #[serde(default)]
        changes: BTreeMap<String, Value>,
    },
    Veto {
        code: String,
        explanation: String,
        #[serde(default)]
        changes: BTreeMap<String, Value>,
    },
}

impl ReviewAction {
    pub fn kind(&self) -> Action {
        match self {
            ReviewAction::Observe => Action::Observe,
            ReviewAction::Annotate { .. } => Action::Annotate,
            ReviewAction::Veto { .. } => Action::Veto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub persona: String,
    pub phase: String,
    /// Item id or a unique id prefix.
    pub item: String,
    #[serde(flatten)]
    pub action: ReviewAction,
}

/// Personas and their requests for one run, as read from a review file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewBundle {
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub requests: Vec<ReviewRequest>,
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub persona: String,
    pub phase: String,
    pub item_id: String,
    pub note: String,
    /// Requested changes, recorded and never applied.
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Veto {
    pub id: String,
    pub persona: String,
    pub phase: String,
    pub item_id: String,
    pub code: String,
    pub explanation: String,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAttempt {
    pub persona: String,
    pub phase: String,
    pub action: Action,
    /// Resolved item id, or the raw reference when it did not resolve.
    pub item: String,
    pub reason: String,
}

/// Append-only record of governance activity for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceLedger {
    pub annotations: Vec<Annotation>,
    pub vetoes: Vec<Veto>,
    pub rejected: Vec<RejectedAttempt>,
    #[serde(skip)]
    usage: BTreeMap<(String, String), u32>,
}

fn veto_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid regex"))
}

/// Resolve an exact id or a unique id prefix.
pub fn resolve_item<'a>(items: &'a [ChecklistItem], reference: &str) -> Option<&'a ChecklistItem> {
    if reference.is_empty() {
        return None;
    }
    if let Some(exact) = items.iter().find(|i| i.id == reference) {
        return Some(exact);
    }
    let mut matches = items.iter().filter(|i| i.id.starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

impl GovernanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn veto_codes(&self) -> Vec<String> {
        self.vetoes.iter().map(|v| v.code.clone()).collect()
    }

    pub fn rejected_for(&self, item_id: &str) -> Vec<&RejectedAttempt> {
        self.rejected.iter().filter(|r| r.item == item_id).collect()
    }

    fn reject(&mut self, req: &ReviewRequest, item: &str, err: &PersonaError) {
        self.rejected.push(RejectedAttempt {
            persona: req.persona.clone(),
            phase: req.phase.clone(),
            action: req.action.kind(),
            item: item.to_string(),
            reason: err.to_string(),
        });
    }

    /// Split requested changes into suggestions, rejecting protected fields.
    fn screen_changes(
        &mut self,
        req: &ReviewRequest,
        item_id: &str,
        changes: &BTreeMap<String, Value>,
    ) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        for (field, value) in changes {
            if PROTECTED_FIELDS.contains(&field.as_str()) {
                self.rejected.push(RejectedAttempt {
                    persona: req.persona.clone(),
                    phase: req.phase.clone(),
                    action: req.action.kind(),
                    item: item_id.to_string(),
                    reason: format!("field '{field}' is protected"),
                });
            } else {
                suggestions.push(Suggestion {
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }
        suggestions
    }

    /// Apply one request. Failures are recorded as rejected attempts and
    /// also returned so the caller can report them.
    pub fn submit(
        &mut self,
        personas: &[Persona],
        req: &ReviewRequest,
        items: &[ChecklistItem],
        config: &PersonaConfig,
    ) -> Result<(), PersonaError> {
        let action = req.action.kind();

        let Some(persona) = personas.iter().find(|p| p.name == req.persona) else {
            let err = PersonaError::UnknownPersona(req.persona.clone());
            self.reject(req, &req.item, &err);
            return Err(err);
        };
        let Some(item) = resolve_item(items, &req.item) else {
            let err = PersonaError::UnknownItem(req.item.clone());
            self.reject(req, &req.item, &err);
            return Err(err);
        };
        let item_id = item.id.clone();

        if !persona.can(action) {
            let err = PersonaError::CapabilityDenied {
                persona: persona.name.clone(),
                action: action.to_string(),
            };
            self.reject(req, &item_id, &err);
            return Err(err);
        }
        if action == Action::Observe {
            return Ok(());
        }

        let key = (persona.name.clone(), req.phase.clone());
        let used = self.usage.get(&key).copied().unwrap_or(0);
        if used >= config.rate_limit_per_phase {
            let err = PersonaError::RateLimited {
                persona: persona.name.clone(),
                phase: req.phase.clone(),
                limit: config.rate_limit_per_phase,
            };
            self.reject(req, &item_id, &err);
            return Err(err);
        }
        self.usage.insert(key, used + 1);

        match &req.action {
            ReviewAction::Observe => {}
            ReviewAction::Annotate { note, changes } => {
                let suggestions = self.screen_changes(req, &item_id, changes);
                self.annotations.push(Annotation {
                    id: format!("A{}", self.annotations.len() + 1),
                    persona: persona.name.clone(),
                    phase: req.phase.clone(),
                    item_id,
                    note: note.clone(),
                    suggestions,
                });
            }
            ReviewAction::Veto {
                code,
                explanation,
                changes,
            } => {
                if !veto_code_re().is_match(code) {
                    let err = PersonaError::InvalidVeto(format!(
                        "code '{code}' must be uppercase letters, digits or '_'"
                    ));
                    self.reject(req, &item_id, &err);
                    return Err(err);
                }
                if explanation.trim().is_empty() {
                    let err = PersonaError::InvalidVeto("explanation is empty".to_string());
                    self.reject(req, &item_id, &err);
                    return Err(err);
                }
                let suggestions = self.screen_changes(req, &item_id, changes);
                self.vetoes.push(Veto {
                    id: format!("V{}", self.vetoes.len() + 1),
                    persona: persona.name.clone(),
                    phase: req.phase.clone(),
                    item_id,
                    code: code.clone(),
                    explanation: explanation.clone(),
                    suggestions,
                });
            }
        }
        Ok(())
    }
}

/// Run every request of `bundle` against the final checklist.
pub fn review(
    bundle: &ReviewBundle,
    items: &[ChecklistItem],
    ctx: &mut PipelineContext,
) -> GovernanceLedger {
    let config = ctx.config.persona.clone();
    let mut ledger = GovernanceLedger::new();
    for req in &bundle.requests {
        if let Err(err) = ledger.submit(&bundle.personas, req, items, &config) {
            ctx.finding(
                "persona_rejected",
                FindingLevel::Warning,
                &req.persona,
                err.to_string(),
            );
        }
    }
    for veto in &ledger.vetoes {
        ctx.finding(
            "persona_veto",
            FindingLevel::Warning,
            short(&veto.item_id),
            format!("{} vetoed with {}: {}", veto.persona, veto.code, veto.explanation),
        );
    }
    ctx.record(
        Stage::Persona,
        bundle.requests.len(),
        format!(
            "{} annotation(s), {} veto(es), {} rejected",
            ledger.annotations.len(),
            ledger.vetoes.len(),
            ledger.rejected.len()
        ),
    );
    ledger
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
