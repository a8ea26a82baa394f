//! Readiness gates. Each gate is a pure check over artifacts the pipeline
//! already computed; the pipeline owns the replays that feed them.

use crate::config::Enforcement;
use crate::digest::short;
use crate::item::{ChecklistItem, ItemKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// GateKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    TestAttachment,
    DeterminismReplay,
    FuzzStability,
    PersonaNonVeto,
}

impl GateKind {
    pub fn all() -> &'static [GateKind] {
        &[
            GateKind::TestAttachment,
            GateKind::DeterminismReplay,
            GateKind::FuzzStability,
            GateKind::PersonaNonVeto,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateKind::TestAttachment => "test_attachment",
            GateKind::DeterminismReplay => "determinism_replay",
            GateKind::FuzzStability => "fuzz_stability",
            GateKind::PersonaNonVeto => "persona_non_veto",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateKind,
    pub passed: bool,
    /// A failed non-blocking gate is reported but does not hold back READY.
    pub blocking: bool,
    pub output: String,
}

impl GateResult {
    fn new(gate: GateKind, passed: bool, blocking: bool, output: impl Into<String>) -> Self {
        Self {
            gate,
            passed,
            blocking,
            output: output.into(),
        }
    }

    pub fn holds_back(&self) -> bool {
        self.blocking && !self.passed
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Every module and bootstrap item has a test or verify sub-item.
pub fn test_attachment(items: &[ChecklistItem], required: bool) -> GateResult {
    let verified: BTreeSet<&str> = items
        .iter()
        .filter(|i| i.is_verification())
        .filter_map(|i| i.parent.as_deref())
        .collect();
    let missing: Vec<&str> = items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Module { .. } | ItemKind::Bootstrap { .. }))
        .filter(|i| !verified.contains(i.id.as_str()))
        .map(|i| short(&i.id))
        .collect();
    let output = if missing.is_empty() {
        "every module and bootstrap item has a verification sub-item".to_string()
    } else {
        format!("no verification sub-item for {}", missing.join(", "))
    };
    GateResult::new(GateKind::TestAttachment, missing.is_empty(), required, output)
}

/// The checklist digest is identical across replays of the same input, and
/// matches a prior run of the same fingerprint when one exists.
pub fn determinism_replay(current: &str, replays: &[String], prior: Option<&str>) -> GateResult {
    if let Some(bad) = replays.iter().find(|d| d.as_str() != current) {
        return GateResult::new(
            GateKind::DeterminismReplay,
            false,
            true,
            format!("replay produced {} instead of {}", short(bad), short(current)),
        );
    }
    match prior {
        Some(p) if p != current => GateResult::new(
            GateKind::DeterminismReplay,
            false,
            true,
            format!(
                "prior run of the same input produced {}, now {}",
                short(p),
                short(current)
            ),
        ),
        // Same text either way so unchanged input keeps an unchanged bundle.
        _ => GateResult::new(
            GateKind::DeterminismReplay,
            true,
            true,
            format!("{} replay(s) agree", replays.len()),
        ),
    }
}

/// Perturbed re-encodings of the input (labelled) all produce the baseline
/// digest.
pub fn fuzz_stability(baseline: &str, variants: &[(String, String)]) -> GateResult {
    let unstable: Vec<&str> = variants
        .iter()
        .filter(|(_, digest)| digest != baseline)
        .map(|(label, _)| label.as_str())
        .collect();
    let output = if unstable.is_empty() {
        format!("{} perturbation(s) stable", variants.len())
    } else {
        format!("unstable under {}", unstable.join(", "))
    };
    GateResult::new(GateKind::FuzzStability, unstable.is_empty(), true, output)
}

/// Vetoes only hold back readiness under `Enforcement::Enforce`.
pub fn persona_non_veto(veto_codes: &[String], enforcement: Enforcement) -> GateResult {
    let blocking = enforcement == Enforcement::Enforce;
    let output = match (veto_codes.is_empty(), blocking) {
        (true, _) => "no vetoes recorded".to_string(),
        (false, true) => format!("vetoed: {}", veto_codes.join(", ")),
        (false, false) => format!("advisory veto(es): {}", veto_codes.join(", ")),
    };
    GateResult::new(GateKind::PersonaNonVeto, veto_codes.is_empty(), blocking, output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
