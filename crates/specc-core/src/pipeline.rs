//! The compiler: spec tree in, exactly one primary artifact out.
//!
//! `compile_core` is the pure checklist pipeline. `compile` wraps it with
//! structural validation, governance, readiness gates, the conversion
//! state and the evidence bundle.

use crate::ast::Ast;
use crate::canonical;
use crate::config::CompilerConfig;
use crate::context::{Finding, PipelineContext, Stage};
use crate::conversion::{self, ConversionInput, ConversionReport, StateTracker};
use crate::coverage::{self, CompletenessReport, CoverageEdge, SufficiencyVerdict};
use crate::derive;
use crate::digest::hash_artifact;
use crate::enrich::enrich_all;
use crate::equivalence::{self, EquivalenceReport};
use crate::error::Result;
use crate::evidence::{EvidenceBuilder, EvidenceBundle};
use crate::extract;
use crate::gate::{self, GateResult};
use crate::graph::{self, GraphReport};
use crate::ingest::{self, Format};
use crate::invariant::{self, InvariantResult};
use crate::item::ChecklistItem;
use crate::manifest::{drift, DriftReport, Manifest, RefusalReport, Rollups, MANIFEST_VERSION};
use crate::paths::validate_namespace;
use crate::persona::{self, GovernanceLedger, ReviewBundle};
use crate::requirement::{self, Requirement};
use crate::schema::{self, SchemaViolation};
use crate::validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Salt for every item id.
    pub namespace: String,
    /// Diagnostic marker recorded in the evidence bundle only.
    pub replay_seed: Option<u64>,
    /// Structural schema; the built-in one when `None`.
    pub schema: Option<Value>,
    pub reviews: ReviewBundle,
}

impl CompileOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.replay_seed = seed;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_reviews(mut self, reviews: ReviewBundle) -> Self {
        self.reviews = reviews;
        self
    }
}

// ---------------------------------------------------------------------------
// Core run
// ---------------------------------------------------------------------------

/// Output of the checklist pipeline proper.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreRun {
    pub fingerprint: String,
    pub items: Vec<ChecklistItem>,
    pub requirements: Vec<Requirement>,
    pub coverage_edges: Vec<CoverageEdge>,
    pub completeness: CompletenessReport,
    pub sufficiency: SufficiencyVerdict,
    pub equivalence: EquivalenceReport,
    pub graph: GraphReport,
    pub invariants: Vec<InvariantResult>,
    /// Ordered semantic-strictness failures; empty when valid.
    pub validation_reasons: Vec<String>,
}

#[derive(Serialize)]
struct CoreView<'a> {
    items: &'a [ChecklistItem],
    requirements: &'a [Requirement],
    completeness: &'a CompletenessReport,
    sufficiency: &'a SufficiencyVerdict,
    equivalence: &'a EquivalenceReport,
    graph: &'a GraphReport,
    invariants: &'a [InvariantResult],
    validation_reasons: &'a [String],
}

impl CoreRun {
    /// Digest of everything the pipeline decided. Replays of the same input
    /// must reproduce it exactly.
    pub fn digest(&self) -> Result<String> {
        hash_artifact(&CoreView {
            items: &self.items,
            requirements: &self.requirements,
            completeness: &self.completeness,
            sufficiency: &self.sufficiency,
            equivalence: &self.equivalence,
            graph: &self.graph,
            invariants: &self.invariants,
            validation_reasons: &self.validation_reasons,
        })
    }
}

fn run_core(doc: &Value, ctx: &mut PipelineContext) -> Result<CoreRun> {
    let ast = Ast::build(doc);
    ctx.record(Stage::Ast, ast.len(), format!("{} node(s)", ast.len()));
    let entities = ast.entities();

    let mut items = extract::extract(&ast, &entities, ctx);
    items.extend(derive::derive(&ast, &entities, ctx));
    let (items, invariants) = invariant::apply(items, &ast, ctx);
    let items = derive::derive_subtasks(items, ctx);
    let items = enrich_all(items);
    ctx.record(Stage::Enrich, items.len(), "enriched");

    let items = canonical::normalize(items, ctx);
    let (items, mut graph) = graph::analyze(items, ctx);
    let items = canonical::finalize(items, &ast, ctx)?;

    let requirements = requirement::extract_requirements(&ast, ctx);
    let (mut items, equivalence) = equivalence::collapse(items, &requirements, ctx);
    if !equivalence.groups.is_empty() {
        graph::reorder(&mut items, &mut graph, ctx);
    }

    let completeness = coverage::completeness(&requirements, &items);
    let coverage_edges = coverage::coverage_edges(&requirements, &items);
    let sufficiency = coverage::sufficiency(
        &completeness,
        &items,
        &graph,
        ctx.config.sufficiency_threshold,
    );
    ctx.record(
        Stage::Coverage,
        completeness.total,
        format!(
            "{}/{} complete, sufficient={}",
            completeness.complete, completeness.total, sufficiency.ok
        ),
    );

    let (items, validation_reasons) = validate::check(items, &ast, ctx).into_parts();

    Ok(CoreRun {
        fingerprint: ast.fingerprint(),
        items,
        requirements,
        coverage_edges,
        completeness,
        sufficiency,
        equivalence,
        graph,
        invariants,
        validation_reasons,
    })
}

/// The checklist pipeline alone, in a fresh context. The seed is carried
/// for tracing and never read.
pub fn compile_core(
    doc: &Value,
    namespace: &str,
    config: &CompilerConfig,
    seed: Option<u64>,
) -> Result<CoreRun> {
    let mut ctx = PipelineContext::new(namespace, config).with_seed(seed);
    run_core(doc, &mut ctx)
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Exactly one of these per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "artifact", rename_all = "snake_case")]
pub enum PrimaryArtifact {
    Checklist(Box<Manifest>),
    Refusal(Box<RefusalReport>),
}

/// Secondary artifacts of a run that produced a checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reports {
    pub requirements: Vec<Requirement>,
    pub completeness: CompletenessReport,
    pub coverage_edges: Vec<CoverageEdge>,
    pub sufficiency: SufficiencyVerdict,
    pub equivalence: EquivalenceReport,
    pub graph: GraphReport,
    pub invariants: Vec<InvariantResult>,
    pub governance: GovernanceLedger,
    pub evidence: EvidenceBundle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub primary: PrimaryArtifact,
    pub conversion: ConversionReport,
    pub reports: Option<Reports>,
    pub findings: Vec<Finding>,
    /// Present when a prior manifest was supplied.
    pub drift: Option<DriftReport>,
}

impl RunOutcome {
    pub fn manifest(&self) -> Option<&Manifest> {
        match &self.primary {
            PrimaryArtifact::Checklist(m) => Some(m.as_ref()),
            PrimaryArtifact::Refusal(_) => None,
        }
    }

    pub fn refusal(&self) -> Option<&RefusalReport> {
        match &self.primary {
            PrimaryArtifact::Checklist(_) => None,
            PrimaryArtifact::Refusal(r) => Some(r.as_ref()),
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.refusal().is_some()
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Source text for one fuzz round: every map's keys reversed on odd rounds
/// and rotated by `round / 2`, nested `round` spaces deep. The text is
/// JSON flow syntax, which both ingest formats accept.
fn perturbed_text(value: &Value, round: usize) -> Result<String> {
    let mut out = String::new();
    write_perturbed(value, round, 0, &mut out)?;
    out.push('\n');
    Ok(out)
}

fn write_perturbed(value: &Value, round: usize, depth: usize, out: &mut String) -> Result<()> {
    fn pad(out: &mut String, width: usize) {
        out.push('\n');
        out.push_str(&" ".repeat(width));
    }
    match value {
        Value::Object(map) if !map.is_empty() => {
            let mut keys: Vec<&String> = map.keys().collect();
            if round % 2 == 1 {
                keys.reverse();
            }
            let shift = (round / 2) % keys.len();
            keys.rotate_left(shift);
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                pad(out, round * (depth + 1));
                out.push_str(&serde_json::to_string(key)?);
                out.push_str(": ");
                write_perturbed(&map[key.as_str()], round, depth + 1, out)?;
            }
            pad(out, round * depth);
            out.push('}');
        }
        Value::Array(items) if !items.is_empty() => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                pad(out, round * (depth + 1));
                write_perturbed(item, round, depth + 1, out)?;
            }
            pad(out, round * depth);
            out.push(']');
        }
        other => out.push_str(&serde_json::to_string(other)?),
    }
    Ok(())
}

fn fuzz_variants(
    doc: &Value,
    namespace: &str,
    config: &CompilerConfig,
) -> Result<Vec<(String, String)>> {
    let mut variants = Vec::new();

    let json_text = serde_json::to_string(doc)?;
    let via_json = ingest::normalize(&json_text, Format::Json)?;
    variants.push((
        "json-roundtrip".to_string(),
        compile_core(&via_json, namespace, config, None)?.digest()?,
    ));

    let yaml_text = serde_yaml::to_string(doc)?;
    let via_yaml = ingest::normalize(&yaml_text, Format::Yaml)?;
    variants.push((
        "yaml-roundtrip".to_string(),
        compile_core(&via_yaml, namespace, config, None)?.digest()?,
    ));

    // Odd rounds go through the JSON reader, even rounds through YAML.
    for round in 1..=config.gates.fuzz_rounds {
        let text = perturbed_text(doc, round as usize)?;
        let format = if round % 2 == 1 { Format::Json } else { Format::Yaml };
        let input = ingest::normalize(&text, format)?;
        variants.push((
            format!("reorder-{round}"),
            compile_core(&input, namespace, config, Some(u64::from(round)))?.digest()?,
        ));
    }
    Ok(variants)
}

fn readiness_gates(
    doc: &Value,
    core: &CoreRun,
    ledger: &GovernanceLedger,
    prior_digest: Option<&str>,
    ctx: &mut PipelineContext,
) -> Result<Vec<GateResult>> {
    let config = ctx.config;
    let namespace = ctx.namespace.clone();
    let digest = core.digest()?;
    let replay = compile_core(doc, &namespace, config, None)?.digest()?;

    let gates = vec![
        gate::test_attachment(&core.items, config.gates.require_test_attachment),
        gate::determinism_replay(&digest, &[replay], prior_digest),
        gate::fuzz_stability(&digest, &fuzz_variants(doc, &namespace, config)?),
        gate::persona_non_veto(&ledger.veto_codes(), config.persona.enforcement),
    ];
    let failed: Vec<&str> = gates
        .iter()
        .filter(|g| g.holds_back())
        .map(|g| g.gate.as_str())
        .collect();
    ctx.record(
        Stage::Gates,
        gates.len(),
        if failed.is_empty() {
            "all blocking gates pass".to_string()
        } else {
            format!("failed: {}", failed.join(", "))
        },
    );
    Ok(gates)
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

fn refuse(
    ast: &Ast,
    violations: Vec<SchemaViolation>,
    options: &CompileOptions,
    mut ctx: PipelineContext,
) -> Result<RunOutcome> {
    let conversion = conversion::evaluate(&ConversionInput {
        ast,
        required_sections: &ctx.config.required_sections,
        schema_violations: &violations,
        validation_reasons: &[],
        sufficiency: None,
        gates: &[],
    });
    ctx.record(Stage::Conversion, 1, conversion.state.to_string());
    tracing::warn!(
        violations = violations.len(),
        "spec refused at structural validation"
    );

    let mut evidence = EvidenceBuilder::new();
    evidence
        .add("violations", &violations)?
        .add("conversion", &conversion)?;
    ctx.record(Stage::Evidence, 2, "refusal bundle");
    let (trace, findings) = ctx.into_parts();
    evidence.add("findings", &findings)?.add("trace", &trace)?;
    let evidence = evidence.finish(trace, options.replay_seed)?;

    let report = RefusalReport {
        version: MANIFEST_VERSION,
        fingerprint: ast.fingerprint(),
        namespace: options.namespace.clone(),
        reason: format!("{} structural violation(s)", violations.len()),
        violations,
        conversion: conversion.clone(),
        findings: findings.clone(),
        evidence,
    };
    Ok(RunOutcome {
        primary: PrimaryArtifact::Refusal(Box::new(report)),
        conversion,
        reports: None,
        findings,
        drift: None,
    })
}

/// Compile `doc`. `Err` only for unusable configuration and broken internal
/// contracts; structural and semantic failures are reported in the outcome.
pub fn compile(
    doc: &Value,
    options: &CompileOptions,
    config: &CompilerConfig,
    prior: Option<&Manifest>,
) -> Result<RunOutcome> {
    config.ensure_usable()?;
    validate_namespace(&options.namespace)?;

    let mut ctx =
        PipelineContext::new(options.namespace.clone(), config).with_seed(options.replay_seed);
    let ast = Ast::build(doc);
    let fingerprint = ast.fingerprint();
    let config_digest = hash_artifact(config)?;

    let schema = options.schema.clone().unwrap_or_else(schema::default_schema);
    let violations = schema::validate(doc, &schema);
    ctx.record(Stage::Schema, violations.len(), "structural validation");
    if !violations.is_empty() {
        return refuse(&ast, violations, options, ctx);
    }

    let core = run_core(doc, &mut ctx)?;

    let mut tracker = StateTracker::new();
    let provisional = conversion::evaluate(&ConversionInput {
        ast: &ast,
        required_sections: &config.required_sections,
        schema_violations: &[],
        validation_reasons: &core.validation_reasons,
        sufficiency: None,
        gates: &[],
    });
    tracker.observe(provisional.state)?;

    let ledger = persona::review(&options.reviews, &core.items, &mut ctx);

    let prior_digest = prior
        .filter(|p| p.same_input(&fingerprint, &options.namespace, &config_digest))
        .map(|p| p.checklist_digest.as_str());
    let gates = readiness_gates(doc, &core, &ledger, prior_digest, &mut ctx)?;

    let conversion = conversion::evaluate(&ConversionInput {
        ast: &ast,
        required_sections: &config.required_sections,
        schema_violations: &[],
        validation_reasons: &core.validation_reasons,
        sufficiency: Some(&core.sufficiency),
        gates: &gates,
    });
    tracker.observe(conversion.state)?;
    ctx.record(Stage::Conversion, conversion.blockers.len(), conversion.state.to_string());

    let checklist_digest = core.digest()?;
    let rollups = Rollups::of(&core.items);

    let mut evidence = EvidenceBuilder::new();
    evidence
        .add("checklist", &core.items)?
        .add("rollups", &rollups)?
        .add("requirements", &core.requirements)?
        .add("completeness", &core.completeness)?
        .add("coverage_edges", &core.coverage_edges)?
        .add("sufficiency", &core.sufficiency)?
        .add("equivalence", &core.equivalence)?
        .add("graph", &core.graph)?
        .add("invariants", &core.invariants)?
        .add("conversion", &conversion)?
        .add("governance", &ledger)?;
    ctx.record(Stage::Evidence, 11, "artifacts hashed");
    let (trace, findings) = ctx.into_parts();
    evidence.add("findings", &findings)?.add("trace", &trace)?;
    let evidence = evidence.finish(trace, options.replay_seed)?;

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        fingerprint,
        namespace: options.namespace.clone(),
        config_digest,
        checklist_digest,
        items: core.items,
        rollups,
        coverage: core.completeness.clone(),
        sufficiency: core.sufficiency.clone(),
        conversion_state: conversion.state,
        evidence_hash: evidence.bundle_hash.clone(),
    };
    let drift = prior.map(|p| drift(p, &manifest)).transpose()?;

    tracing::info!(
        namespace = %manifest.namespace,
        items = manifest.items.len(),
        state = %manifest.conversion_state,
        sufficient = manifest.sufficiency.ok,
        "compiled checklist"
    );

    Ok(RunOutcome {
        reports: Some(Reports {
            requirements: core.requirements,
            completeness: core.completeness,
            coverage_edges: core.coverage_edges,
            sufficiency: core.sufficiency,
            equivalence: core.equivalence,
            graph: core.graph,
            invariants: core.invariants,
            governance: ledger,
            evidence,
        }),
        primary: PrimaryArtifact::Checklist(Box::new(manifest)),
        conversion,
        findings,
        drift,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
