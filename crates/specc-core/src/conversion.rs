//! The conversion-state machine: ACCEPTED < CONVERTIBLE < STRUCTURED <
//! VALID < READY. A spec sits at the highest tier whose preconditions, and
//! those of every lower tier, hold.

use crate::ast::Ast;
use crate::coverage::{BlockingReason, SufficiencyVerdict};
use crate::digest::short;
use crate::error::{Result, SpeccError};
use crate::gate::GateResult;
use crate::schema::SchemaViolation;
use crate::types::{ConversionState, EffortTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub code: String,
    /// The tier this precondition guards.
    pub tier: ConversionState,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub target: ConversionState,
    pub effort: EffortTier,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub state: ConversionState,
    pub reason: String,
    pub blockers: Vec<Blocker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<NextStep>,
    #[serde(default)]
    pub gates: Vec<GateResult>,
}

impl ConversionReport {
    pub fn is_ready(&self) -> bool {
        self.state == ConversionState::Ready
    }

    pub fn blocker_codes(&self) -> Vec<&str> {
        self.blockers.iter().map(|b| b.code.as_str()).collect()
    }
}

/// Everything the tiers are judged on. Later-stage inputs are `None` or
/// empty when the run stopped before producing them.
pub struct ConversionInput<'a> {
    pub ast: &'a Ast,
    pub required_sections: &'a [String],
    pub schema_violations: &'a [SchemaViolation],
    pub validation_reasons: &'a [String],
    pub sufficiency: Option<&'a SufficiencyVerdict>,
    pub gates: &'a [GateResult],
}

// ---------------------------------------------------------------------------
// Tier checks
// ---------------------------------------------------------------------------

fn convertible(input: &ConversionInput, out: &mut Vec<Blocker>) {
    if input.ast.root().children.is_empty() {
        out.push(Blocker {
            code: "empty_document".to_string(),
            tier: ConversionState::Convertible,
            message: "provide a non-empty specification document".to_string(),
        });
    }
}

fn structured(input: &ConversionInput, out: &mut Vec<Blocker>) {
    for section in input.required_sections {
        let (code, message) = match input.ast.root().child(section) {
            None => (
                format!("missing_{section}"),
                format!("add a top-level '{section}' section"),
            ),
            Some(node) if node.is_empty_value() => (
                format!("empty_{section}"),
                format!("fill in the '{section}' section"),
            ),
            Some(_) => continue,
        };
        out.push(Blocker {
            code,
            tier: ConversionState::Structured,
            message,
        });
    }
}

fn valid(input: &ConversionInput, out: &mut Vec<Blocker>) {
    for v in input.schema_violations {
        out.push(Blocker {
            code: format!("schema_violation:{}", v.pointer),
            tier: ConversionState::Valid,
            message: format!("fix the structure at {v}"),
        });
    }
    for reason in input.validation_reasons {
        out.push(Blocker {
            code: reason.clone(),
            tier: ConversionState::Valid,
            message: validation_action(reason),
        });
    }
}

fn validation_action(reason: &str) -> String {
    let (kind, detail) = reason.split_once(':').unwrap_or((reason, ""));
    match kind {
        "empty_section" => format!("write content for section '{detail}'"),
        "missing_field" => format!("supply the field {detail}"),
        "naming" => format!("rename to satisfy {detail}"),
        "invariant_violated" => format!("change the spec so invariant {detail} holds"),
        _ => format!("resolve {reason}"),
    }
}

fn sufficiency_blocker(reason: &BlockingReason) -> Blocker {
    let code = match reason {
        BlockingReason::BelowThreshold { .. } => "below_threshold".to_string(),
        BlockingReason::RequirementNotComplete { requirement_id, .. } => {
            format!("requirement_incomplete:{requirement_id}")
        }
        BlockingReason::Cycle { members } => format!(
            "dependency_cycle:{}",
            members.first().map(|m| short(m)).unwrap_or_default()
        ),
        BlockingReason::MissingArtifact { item_id, .. } => {
            format!("missing_artifact:{}", short(item_id))
        }
        BlockingReason::PriorityInversion { item_id, .. } => {
            format!("priority_inversion:{}", short(item_id))
        }
    };
    Blocker {
        code,
        tier: ConversionState::Ready,
        message: reason.to_string(),
    }
}

fn ready(input: &ConversionInput, out: &mut Vec<Blocker>) {
    match input.sufficiency {
        Some(verdict) => out.extend(verdict.reasons.iter().map(sufficiency_blocker)),
        None => out.push(Blocker {
            code: "sufficiency_unavailable".to_string(),
            tier: ConversionState::Ready,
            message: "no checklist was produced to score".to_string(),
        }),
    }
    for gate in input.gates.iter().filter(|g| g.holds_back()) {
        out.push(Blocker {
            code: format!("gate_failed:{}", gate.gate),
            tier: ConversionState::Ready,
            message: gate.output.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

pub fn evaluate(input: &ConversionInput) -> ConversionReport {
    let mut all = Vec::new();
    convertible(input, &mut all);
    structured(input, &mut all);
    valid(input, &mut all);
    ready(input, &mut all);

    let mut seen = BTreeSet::new();
    all.retain(|b| seen.insert(b.code.clone()));
    all.sort_by_key(|b| b.tier);

    let state = ConversionState::all()
        .iter()
        .copied()
        .take_while(|tier| all.iter().all(|b| b.tier > *tier))
        .last()
        .unwrap_or(ConversionState::Accepted);

    let next_step = state.next().map(|target| {
        let actions: Vec<String> = all
            .iter()
            .filter(|b| b.tier == target)
            .map(|b| b.message.clone())
            .collect();
        NextStep {
            target,
            effort: EffortTier::for_blockers(actions.len()),
            actions,
        }
    });

    let reason = match &next_step {
        None => "all readiness preconditions hold".to_string(),
        Some(step) => format!(
            "{} precondition(s) block {}",
            step.actions.len(),
            step.target
        ),
    };

    ConversionReport {
        state,
        reason,
        blockers: all,
        next_step,
        gates: input.gates.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// StateTracker
// ---------------------------------------------------------------------------

/// Records the state after each stage of a run and refuses regression.
#[derive(Debug, Default, Clone)]
pub struct StateTracker {
    history: Vec<ConversionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConversionState {
        self.history
            .last()
            .copied()
            .unwrap_or(ConversionState::Accepted)
    }

    pub fn observe(&mut self, state: ConversionState) -> Result<ConversionState> {
        let current = self.current();
        if state < current {
            return Err(SpeccError::ContractViolation(format!(
                "conversion state regressed from {current} to {state}"
            )));
        }
        self.history.push(state);
        Ok(state)
    }

    pub fn history(&self) -> &[ConversionState] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
