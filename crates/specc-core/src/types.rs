use crate::error::SpeccError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Helper macro: closed string-tagged enums
// ---------------------------------------------------------------------------

/// Generates `all()`, `as_str()`, `Display` and `FromStr` for a fieldless
/// enum whose serde names match the listed strings.
macro_rules! string_enum {
    ($name:ident, $kind:expr, { $($variant:ident => $s:expr),+ $(,)? }) => {
        impl $name {
            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = SpeccError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($name::$variant),)+
                    _ => Err(SpeccError::InvalidValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Ordered most to least severe, so `Critical < Low` and sorting ascending
/// puts the most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

string_enum!(Severity, "severity", {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
});

impl Severity {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

string_enum!(Priority, "priority", {
    P0 => "P0",
    P1 => "P1",
    P2 => "P2",
});

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::P0,
            Severity::High => Priority::P1,
            Severity::Medium | Severity::Low => Priority::P2,
        }
    }

    /// P0 and P1 requirements must be complete for a spec to be sufficient.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Priority::P0 | Priority::P1)
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

string_enum!(Confidence, "confidence", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Core,
    Structure,
    Interface,
    Agent,
    Dependency,
    Constraint,
    Validation,
    Flow,
    Ordering,
    Invariant,
    Test,
    Setup,
    Documentation,
    Governance,
}

string_enum!(Classification, "classification", {
    Core => "core",
    Structure => "structure",
    Interface => "interface",
    Agent => "agent",
    Dependency => "dependency",
    Constraint => "constraint",
    Validation => "validation",
    Flow => "flow",
    Ordering => "ordering",
    Invariant => "invariant",
    Test => "test",
    Setup => "setup",
    Documentation => "documentation",
    Governance => "governance",
});

// ---------------------------------------------------------------------------
// IntentCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Implement,
    Verify,
    Configure,
    Document,
    Resolve,
}

string_enum!(IntentCategory, "intent category", {
    Implement => "implement",
    Verify => "verify",
    Configure => "configure",
    Document => "document",
    Resolve => "resolve",
});

// ---------------------------------------------------------------------------
// ItemStatus / QualityStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Blocked,
    InCycle,
}

string_enum!(ItemStatus, "item status", {
    Pending => "pending",
    Blocked => "blocked",
    InCycle => "in_cycle",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Ok,
    NeedsReview,
    Violation,
}

string_enum!(QualityStatus, "quality status", {
    Ok => "ok",
    NeedsReview => "needs_review",
    Violation => "violation",
});

// ---------------------------------------------------------------------------
// ReadinessImpact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessImpact {
    Blocking,
    Degrading,
    Neutral,
}

impl ReadinessImpact {
    pub fn from_priority(priority: Priority) -> Self {
        match priority {
            Priority::P0 => ReadinessImpact::Blocking,
            Priority::P1 => ReadinessImpact::Degrading,
            Priority::P2 => ReadinessImpact::Neutral,
        }
    }
}

// ---------------------------------------------------------------------------
// Explainability vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Derived,
    Coerced,
    Inferred,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceType {
    TypeOverride,
    ExplicitField,
    PointerPrefix,
    Keyword,
    Structural,
    Invariant,
    Graph,
    SafeDefault,
}

/// The precedence tier at which a value was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Override,
    Explicit,
    Heuristic,
    Fallback,
}

// ---------------------------------------------------------------------------
// ConversionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionState {
    Accepted,
    Convertible,
    Structured,
    Valid,
    Ready,
}

string_enum!(ConversionState, "conversion state", {
    Accepted => "ACCEPTED",
    Convertible => "CONVERTIBLE",
    Structured => "STRUCTURED",
    Valid => "VALID",
    Ready => "READY",
});

impl ConversionState {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<ConversionState> {
        ConversionState::all().get(self.index() + 1).copied()
    }
}

// ---------------------------------------------------------------------------
// EffortTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortTier {
    Low,
    Medium,
    High,
}

string_enum!(EffortTier, "effort tier", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl EffortTier {
    pub fn for_blockers(count: usize) -> Self {
        match count {
            0 | 1 => EffortTier::Low,
            2 | 3 => EffortTier::Medium,
            _ => EffortTier::High,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
