use crate::error::{Result, SpeccError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Output layout
// ---------------------------------------------------------------------------

pub const MANIFEST_FILE: &str = "manifest.json";
pub const COMPLETENESS_FILE: &str = "completeness.json";
pub const SUFFICIENCY_FILE: &str = "sufficiency.json";
pub const EQUIVALENCE_FILE: &str = "equivalence.json";
pub const CONVERSION_FILE: &str = "conversion.json";
pub const GOVERNANCE_FILE: &str = "governance.json";
pub const EVIDENCE_FILE: &str = "evidence.json";
pub const REFUSAL_FILE: &str = "refusal.json";
pub const ERROR_FILE: &str = "error.json";
pub const DRIFT_FILE: &str = "drift.json";
pub const CHECKLIST_DIR: &str = "checklist";

/// Every artifact file a successful run writes, besides the manifest.
pub const REPORT_FILES: &[&str] = &[
    COMPLETENESS_FILE,
    SUFFICIENCY_FILE,
    EQUIVALENCE_FILE,
    CONVERSION_FILE,
    GOVERNANCE_FILE,
    EVIDENCE_FILE,
];

pub fn manifest_path(out: &Path) -> PathBuf {
    out.join(MANIFEST_FILE)
}

pub fn refusal_path(out: &Path) -> PathBuf {
    out.join(REFUSAL_FILE)
}

pub fn error_path(out: &Path) -> PathBuf {
    out.join(ERROR_FILE)
}

pub fn report_path(out: &Path, file: &str) -> PathBuf {
    out.join(file)
}

// ---------------------------------------------------------------------------
// Namespace validation
// ---------------------------------------------------------------------------

static NAMESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn namespace_re() -> &'static Regex {
    NAMESPACE_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._\-]*$").unwrap())
}

/// Namespaces salt every item id, so they are restricted to a stable
/// lowercase alphabet.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() || namespace.len() > 64 || !namespace_re().is_match(namespace) {
        return Err(SpeccError::InvalidValue {
            kind: "namespace",
            value: namespace.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_namespaces() {
        for ns in ["payments", "a", "acme.billing-v2", "x_1"] {
            validate_namespace(ns).unwrap_or_else(|_| panic!("expected valid: {ns}"));
        }
    }

    #[test]
    fn invalid_namespaces() {
        for ns in ["", "-dash", "has spaces", "UPPER", "a|b"] {
            assert!(validate_namespace(ns).is_err(), "expected invalid: {ns}");
        }
    }

    #[test]
    fn path_helpers() {
        let out = Path::new("/tmp/run");
        assert_eq!(manifest_path(out), PathBuf::from("/tmp/run/manifest.json"));
        assert_eq!(refusal_path(out), PathBuf::from("/tmp/run/refusal.json"));
        assert_eq!(
            report_path(out, SUFFICIENCY_FILE),
            PathBuf::from("/tmp/run/sufficiency.json")
        );
    }
}
