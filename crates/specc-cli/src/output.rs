use anyhow::Context;
use serde::Serialize;
use specc_core::conversion::ConversionReport;
use std::path::Path;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Pretty JSON to `path`, replacing any previous file atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    specc_core::io::write_json(path, value)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(String::len)
                .fold(h.len(), usize::max)
        })
        .collect();

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(headers.to_vec());
    line(rule.iter().map(String::as_str).collect());
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
}

/// State line plus one line per blocker, tier first.
pub fn print_conversion(report: &ConversionReport) {
    println!("state: {}", report.state);
    println!("reason: {}", report.reason);
    for b in &report.blockers {
        println!("  [{}] {}: {}", b.tier, b.code, b.message);
    }
    if let Some(next) = &report.next_step {
        println!("next: {} ({} effort)", next.target, next.effort);
    }
}
