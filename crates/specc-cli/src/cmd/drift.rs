use crate::output::print_json;
use anyhow::Context;
use specc_core::digest::short;
use specc_core::manifest::{drift, Manifest};
use std::path::Path;

/// Accepts a manifest file or an output directory holding one.
fn load(path: &Path) -> anyhow::Result<Manifest> {
    let file = if path.is_dir() {
        specc_core::paths::manifest_path(path)
    } else {
        path.to_path_buf()
    };
    Manifest::load(&file).with_context(|| format!("failed to load manifest {}", file.display()))
}

pub fn run(prior: &Path, current: &Path, json: bool) -> anyhow::Result<()> {
    let current = load(current)?;
    let report = drift(&load(prior)?, &current).context("failed to compare manifests")?;

    if json {
        return print_json(&report);
    }

    if report.is_stable() {
        println!("No drift: {} item(s) unchanged.", current.items.len());
        return Ok(());
    }
    if report.fingerprint_changed {
        println!(
            "input changed: {} -> {}",
            short(&report.prior_fingerprint),
            short(&report.current_fingerprint)
        );
    }
    if report.prior_state != report.current_state {
        println!("state: {} -> {}", report.prior_state, report.current_state);
    }
    for id in &report.added {
        println!("+ {}", short(id));
    }
    for id in &report.removed {
        println!("- {}", short(id));
    }
    for change in &report.changed {
        println!(
            "~ {} ({})",
            short(&change.id),
            change.fields.join(", ")
        );
    }
    let items_unchanged =
        report.added.is_empty() && report.removed.is_empty() && report.changed.is_empty();
    if report.evidence_changed && items_unchanged {
        println!("items unchanged; evidence bundle differs");
    }
    Ok(())
}
