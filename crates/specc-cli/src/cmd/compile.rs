use crate::output::{print_conversion, print_json, write_json};
use anyhow::Context;
use clap::Args;
use serde_json::Value;
use specc_core::config::CompilerConfig;
use specc_core::emit::ChecklistDocEmitter;
use specc_core::io::atomic_write;
use specc_core::manifest::RefusalReport;
use specc_core::paths::{self, validate_namespace};
use specc_core::persona::ReviewBundle;
use specc_core::pipeline::{compile, CompileOptions, Reports, RunOutcome};
use specc_core::ports::{CodeEmitter, ManifestStore, SpecSource};
use specc_core::store::{FileManifestStore, FileSpecSource};
use std::path::{Path, PathBuf};

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Args)]
pub struct CompileArgs {
    /// Spec file (.json, otherwise read as YAML)
    pub spec: PathBuf,

    /// Output directory for the manifest and reports
    #[arg(long, default_value = "specc-out")]
    pub out: PathBuf,

    /// Id namespace (default: metadata.name when usable)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Persona review bundle (YAML)
    #[arg(long)]
    pub reviews: Option<PathBuf>,

    /// Structural schema (JSON) replacing the built-in one
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Replay seed, recorded in the evidence bundle only
    #[arg(long)]
    pub seed: Option<u64>,

    /// Also write one Markdown task file per item under <out>/checklist
    #[arg(long)]
    pub emit: bool,
}

enum Verdict {
    Checklist,
    Refused(usize),
}

pub fn run(config_path: &Path, args: CompileArgs, json: bool) -> anyhow::Result<()> {
    match execute(config_path, &args, json) {
        Ok(Verdict::Checklist) => Ok(()),
        Ok(Verdict::Refused(n)) => anyhow::bail!(
            "spec refused with {n} structural violation(s); see {}",
            paths::refusal_path(&args.out).display()
        ),
        Err(e) => {
            write_error(&args.out, &e);
            Err(e)
        }
    }
}

fn execute(config_path: &Path, args: &CompileArgs, json: bool) -> anyhow::Result<Verdict> {
    let config = CompilerConfig::load_or_default(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let source = FileSpecSource::new(&args.spec);
    let doc = source
        .load()
        .with_context(|| format!("failed to read spec {}", source.describe()))?;

    let mut options = CompileOptions::new(namespace_for(args.namespace.as_deref(), &doc))
        .with_seed(args.seed);
    if let Some(path) = &args.reviews {
        options = options.with_reviews(load_reviews(path)?);
    }
    if let Some(path) = &args.schema {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema {}", path.display()))?;
        let schema: Value = serde_json::from_str(&text)
            .with_context(|| format!("schema {} is not JSON", path.display()))?;
        options = options.with_schema(schema);
    }

    let store = FileManifestStore::new(&args.out);
    let prior = store
        .load_prior()
        .context("failed to load prior manifest")?;

    let outcome = compile(&doc, &options, &config, prior.as_ref()).context("compilation failed")?;
    write_outcome(&store, &outcome, args.emit)?;

    if json {
        print_json(&outcome.conversion)?;
    } else {
        print_summary(&outcome);
    }

    Ok(match outcome.refusal() {
        Some(r) => Verdict::Refused(r.violations.len()),
        None => Verdict::Checklist,
    })
}

/// The explicit namespace, else a lowercased `metadata.name` when it is a
/// valid namespace, else the default.
fn namespace_for(explicit: Option<&str>, doc: &Value) -> String {
    if let Some(ns) = explicit {
        return ns.to_string();
    }
    doc.pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(|name| name.trim().to_lowercase().replace(' ', "-"))
        .filter(|ns| validate_namespace(ns).is_ok())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

fn load_reviews(path: &Path) -> anyhow::Result<ReviewBundle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reviews {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid review bundle {}", path.display()))
}

// ---------------------------------------------------------------------------
// Writing artifacts
// ---------------------------------------------------------------------------

fn write_outcome(store: &FileManifestStore, outcome: &RunOutcome, emit: bool) -> anyhow::Result<()> {
    let out = store.dir();
    if let Some(refusal) = outcome.refusal() {
        return write_refusal(out, refusal);
    }

    if let (Some(manifest), Some(reports)) = (outcome.manifest(), &outcome.reports) {
        write_reports(out, reports)?;
        write_json(&out.join(paths::CONVERSION_FILE), &outcome.conversion)?;
        if let Some(drift) = &outcome.drift {
            write_json(&out.join(paths::DRIFT_FILE), drift)?;
        }
        if emit {
            for file in ChecklistDocEmitter::default().emit(&manifest.items)? {
                atomic_write(&out.join(&file.path), file.content.as_bytes())
                    .with_context(|| format!("failed to write {}", file.path))?;
            }
        }
        // The manifest goes last: its presence marks a complete output set.
        store.save(manifest).context("failed to save manifest")?;
        remove_stale(&paths::refusal_path(out))?;
        remove_stale(&paths::error_path(out))?;
    }
    Ok(())
}

fn write_reports(out: &Path, reports: &Reports) -> anyhow::Result<()> {
    let completeness = serde_json::json!({
        "requirements": reports.requirements,
        "completeness": reports.completeness,
        "coverage_edges": reports.coverage_edges,
    });
    write_json(&out.join(paths::COMPLETENESS_FILE), &completeness)?;
    write_json(&out.join(paths::SUFFICIENCY_FILE), &reports.sufficiency)?;
    write_json(&out.join(paths::EQUIVALENCE_FILE), &reports.equivalence)?;
    write_json(&out.join(paths::GOVERNANCE_FILE), &reports.governance)?;
    write_json(&out.join(paths::EVIDENCE_FILE), &reports.evidence)?;
    Ok(())
}

/// A refusal replaces the previous checklist outputs.
fn write_refusal(out: &Path, refusal: &RefusalReport) -> anyhow::Result<()> {
    write_json(&paths::refusal_path(out), refusal)?;
    remove_stale(&paths::manifest_path(out))?;
    for file in paths::REPORT_FILES {
        remove_stale(&out.join(file))?;
    }
    remove_stale(&paths::error_path(out))
}

fn remove_stale(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Best effort: a failure here must not mask the original error.
fn write_error(out: &Path, err: &anyhow::Error) {
    let body = serde_json::json!({
        "error": err.to_string(),
        "chain": err.chain().skip(1).map(|c| c.to_string()).collect::<Vec<_>>(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Err(e) = write_json(&paths::error_path(out), &body) {
        tracing::warn!("could not write error report: {e:#}");
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

fn print_summary(outcome: &RunOutcome) {
    if let Some(refusal) = outcome.refusal() {
        println!("refused: {}", refusal.reason);
        for v in &refusal.violations {
            println!("  {v}");
        }
    }
    if let Some(manifest) = outcome.manifest() {
        println!(
            "{} item(s), {}/{} requirement(s) complete, sufficient: {}",
            manifest.items.len(),
            manifest.coverage.complete,
            manifest.coverage.total,
            if manifest.sufficiency.ok { "yes" } else { "no" }
        );
    }
    print_conversion(&outcome.conversion);
}
