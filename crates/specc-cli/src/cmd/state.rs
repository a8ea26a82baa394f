use crate::output::{print_conversion, print_json};
use anyhow::Context;
use specc_core::conversion::ConversionReport;
use specc_core::io::read_json;
use specc_core::manifest::RefusalReport;
use specc_core::paths;
use std::path::Path;

/// The conversion report of the last run in `out`, from the refusal when
/// the run was refused.
pub fn load_conversion(out: &Path) -> anyhow::Result<ConversionReport> {
    let refusal = paths::refusal_path(out);
    let report: Option<RefusalReport> = read_json(&refusal)
        .with_context(|| format!("invalid refusal report {}", refusal.display()))?;
    if let Some(report) = report {
        return Ok(report.conversion);
    }

    let path = paths::report_path(out, paths::CONVERSION_FILE);
    read_json(&path)
        .with_context(|| format!("invalid conversion report {}", path.display()))?
        .with_context(|| {
            format!(
                "no compiled output in {}; run `specc compile` first",
                out.display()
            )
        })
}

pub fn run(out: &Path, json: bool) -> anyhow::Result<()> {
    let report = load_conversion(out)?;
    if json {
        print_json(&report)
    } else {
        print_conversion(&report);
        Ok(())
    }
}
