use crate::output::{print_json, print_table};
use anyhow::Context;
use specc_core::digest::short;
use specc_core::item::ChecklistItem;
use specc_core::manifest::Manifest;
use specc_core::paths;
use specc_core::types::{ItemStatus, Severity};
use std::path::Path;

pub fn run(
    out: &Path,
    status: Option<&str>,
    severity: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let path = paths::manifest_path(out);
    let manifest = Manifest::load(&path)
        .with_context(|| format!("failed to load manifest {}", path.display()))?;

    let status: Option<ItemStatus> = status
        .map(str::parse)
        .transpose()
        .context("invalid --status")?;
    let severity: Option<Severity> = severity
        .map(str::parse)
        .transpose()
        .context("invalid --severity")?;

    let mut items: Vec<&ChecklistItem> = manifest
        .items
        .iter()
        .filter(|i| status.map_or(true, |s| i.status == s))
        .filter(|i| severity.map_or(true, |s| i.severity == s))
        .collect();
    items.sort_by_key(|i| (i.execution_order.unwrap_or(u32::MAX), i.order_rank));

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|i| {
            vec![
                i.execution_order.map_or("-".to_string(), |o| o.to_string()),
                short(&i.id).to_string(),
                i.kind.tag().to_string(),
                i.severity.to_string(),
                i.priority.to_string(),
                i.status.to_string(),
                i.action.clone(),
            ]
        })
        .collect();
    print_table(
        &["ORDER", "ID", "KIND", "SEVERITY", "PRIORITY", "STATUS", "ACTION"],
        &rows,
    );
    Ok(())
}
