use super::DeriveInput;
use crate::item::{ChecklistItem, ItemKind};
use crate::types::QualityStatus;
use regex::Regex;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

fn naming_item(input: &DeriveInput, pointer: &str, rule: &str, subject: &str) -> Option<ChecklistItem> {
    let node = input.ast.get(pointer)?;
    let mut item = input.item(
        node,
        ItemKind::Naming {
            rule: rule.to_string(),
            subject: subject.to_string(),
        },
        format!("naming: '{subject}' violates {rule}"),
    );
    item.quality_status = QualityStatus::NeedsReview;
    Some(item)
}

pub fn derive(input: &DeriveInput) -> Vec<ChecklistItem> {
    let mut out = Vec::new();
    let identifier = match Regex::new(r"^[a-z][a-z0-9_-]*$") {
        Ok(re) => re,
        Err(_) => return out,
    };

    for pattern in ["/architecture/modules/*/name", "/agents/*/name"] {
        for node in input.ast.matching(pattern) {
            let Some(name) = node.value.as_str() else {
                continue;
            };
            if !identifier.is_match(name) {
                out.extend(naming_item(input, &node.path, "lower_identifier", name));
            }
        }
    }

    for node in input.ast.matching("/api/endpoints/*") {
        if let Some(path) = node.child("path") {
            let p = path.value.as_str().unwrap_or_default();
            if !p.starts_with('/') {
                out.extend(naming_item(input, &path.path, "absolute_path", p));
            }
        }
        if let Some(method) = node.child("method") {
            let m = method.value.as_str().unwrap_or_default();
            if !HTTP_METHODS.contains(&m.to_uppercase().as_str()) {
                out.extend(naming_item(input, &method.path, "http_method", m));
            }
        }
    }

    // Later declarations of an already-declared name.
    for dup in input.entities.duplicates() {
        out.extend(naming_item(input, &dup.pointer, "unique_name", &dup.name));
    }

    out
}
