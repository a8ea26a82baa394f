use crate::config::CompilerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ast,
    Schema,
    Extract,
    Derive,
    Invariant,
    Subtask,
    Enrich,
    Graph,
    Canonical,
    Equivalence,
    Coverage,
    Validation,
    Persona,
    Gates,
    Conversion,
    Evidence,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ast => "ast",
            Stage::Schema => "schema",
            Stage::Extract => "extract",
            Stage::Derive => "derive",
            Stage::Invariant => "invariant",
            Stage::Subtask => "subtask",
            Stage::Enrich => "enrich",
            Stage::Graph => "graph",
            Stage::Canonical => "canonical",
            Stage::Equivalence => "equivalence",
            Stage::Coverage => "coverage",
            Stage::Validation => "validation",
            Stage::Persona => "persona",
            Stage::Gates => "gates",
            Stage::Conversion => "conversion",
            Stage::Evidence => "evidence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TraceEvent / Finding
// ---------------------------------------------------------------------------

/// Deterministic record of what a stage did. No timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: Stage,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingLevel {
    Info,
    Warning,
    Blocking,
}

/// A non-fatal audit observation surfaced alongside the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub level: FindingLevel,
    pub subject: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Staged
// ---------------------------------------------------------------------------

/// Output of a stage that can degrade instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Staged<T> {
    Complete(T),
    Degraded { value: T, reasons: Vec<String> },
}

impl<T> Staged<T> {
    pub fn from_reasons(value: T, reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Staged::Complete(value)
        } else {
            Staged::Degraded { value, reasons }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Staged::Degraded { .. })
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Staged::Complete(_) => &[],
            Staged::Degraded { reasons, .. } => reasons,
        }
    }

    pub fn into_parts(self) -> (T, Vec<String>) {
        match self {
            Staged::Complete(value) => (value, Vec::new()),
            Staged::Degraded { value, reasons } => (value, reasons),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineContext
// ---------------------------------------------------------------------------

/// Run-scoped state threaded explicitly through every stage.
pub struct PipelineContext<'a> {
    pub namespace: String,
    pub config: &'a CompilerConfig,
    /// Diagnostic marker only; never read by a stage that affects output.
    pub replay_seed: Option<u64>,
    trace: Vec<TraceEvent>,
    findings: Vec<Finding>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(namespace: impl Into<String>, config: &'a CompilerConfig) -> Self {
        Self {
            namespace: namespace.into(),
            config,
            replay_seed: None,
            trace: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.replay_seed = seed;
        self
    }

    pub fn record(&mut self, stage: Stage, count: usize, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(stage = stage.as_str(), count, "{message}");
        self.trace.push(TraceEvent {
            stage,
            count,
            message,
        });
    }

    pub fn finding(
        &mut self,
        code: impl Into<String>,
        level: FindingLevel,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let finding = Finding {
            code: code.into(),
            level,
            subject: subject.into(),
            message: message.into(),
        };
        if level >= FindingLevel::Warning {
            tracing::warn!(code = %finding.code, subject = %finding.subject, "{}", finding.message);
        }
        self.findings.push(finding);
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn into_parts(self) -> (Vec<TraceEvent>, Vec<Finding>) {
        (self.trace, self.findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_records_trace_in_order() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        ctx.record(Stage::Ast, 4, "built tree");
        ctx.record(Stage::Extract, 3, "raw items");
        let stages: Vec<_> = ctx.trace().iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Ast, Stage::Extract]);
    }

    #[test]
    fn findings_are_kept() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg).with_seed(Some(7));
        ctx.finding("not_load_bearing", FindingLevel::Info, "abc", "primary is redundant");
        assert_eq!(ctx.replay_seed, Some(7));
        let (_, findings) = ctx.into_parts();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, "not_load_bearing");
    }

    #[test]
    fn staged_from_reasons() {
        let ok: Staged<u8> = Staged::from_reasons(1, vec![]);
        assert!(!ok.is_degraded());
        let bad = Staged::from_reasons(1, vec!["empty section".to_string()]);
        assert!(bad.is_degraded());
        assert_eq!(bad.reasons().len(), 1);
        let (v, reasons) = bad.into_parts();
        assert_eq!(v, 1);
        assert_eq!(reasons, vec!["empty section"]);
    }
}
