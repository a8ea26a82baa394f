//! The manifest: the only entity that outlives a run. Also the refusal
//! report (the other possible primary artifact) and the drift report
//! comparing two manifests.

use crate::context::Finding;
use crate::conversion::ConversionReport;
use crate::coverage::{CompletenessReport, SufficiencyVerdict};
use crate::error::Result;
use crate::evidence::EvidenceBundle;
use crate::item::ChecklistItem;
use crate::schema::SchemaViolation;
use crate::types::ConversionState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollups {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_classification: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

impl Rollups {
    pub fn of(items: &[ChecklistItem]) -> Self {
        let mut r = Rollups {
            total: items.len(),
            ..Rollups::default()
        };
        for item in items {
            *r.by_severity.entry(item.severity.to_string()).or_default() += 1;
            *r.by_classification
                .entry(item.classification.to_string())
                .or_default() += 1;
            *r.by_kind.entry(item.kind.tag().to_string()).or_default() += 1;
            *r.by_priority.entry(item.priority.to_string()).or_default() += 1;
            *r.by_status.entry(item.status.to_string()).or_default() += 1;
        }
        r
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Digest of the input tree.
    pub fingerprint: String,
    pub namespace: String,
    /// Digest of the compiler configuration the run used.
    pub config_digest: String,
    /// Digest of the checklist and its scoring; compared by the
    /// determinism-replay gate.
    pub checklist_digest: String,
    pub items: Vec<ChecklistItem>,
    pub rollups: Rollups,
    pub coverage: CompletenessReport,
    pub sufficiency: SufficiencyVerdict,
    pub conversion_state: ConversionState,
    pub evidence_hash: String,
}

impl Manifest {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn item(&self, id: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Same input under the same configuration and namespace.
    pub fn same_input(&self, fingerprint: &str, namespace: &str, config_digest: &str) -> bool {
        self.fingerprint == fingerprint
            && self.namespace == namespace
            && self.config_digest == config_digest
    }
}

// ---------------------------------------------------------------------------
// RefusalReport
// ---------------------------------------------------------------------------

/// Primary artifact of a run refused at structural validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefusalReport {
    pub version: u32,
    /// Fingerprint of the partial manifest the run would have produced.
    pub fingerprint: String,
    pub namespace: String,
    pub reason: String,
    pub violations: Vec<SchemaViolation>,
    pub conversion: ConversionReport,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub evidence: EvidenceBundle,
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub id: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub prior_fingerprint: String,
    pub current_fingerprint: String,
    pub fingerprint_changed: bool,
    pub evidence_changed: bool,
    pub prior_state: ConversionState,
    pub current_state: ConversionState,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<ItemChange>,
}

impl DriftReport {
    pub fn is_stable(&self) -> bool {
        !self.evidence_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}

fn changed_fields(a: &ChecklistItem, b: &ChecklistItem) -> Result<Vec<String>> {
    let (Value::Object(x), Value::Object(y)) = (serde_json::to_value(a)?, serde_json::to_value(b)?)
    else {
        return Ok(Vec::new());
    };
    let keys: BTreeSet<&String> = x.keys().chain(y.keys()).collect();
    Ok(keys
        .into_iter()
        .filter(|k| x.get(*k) != y.get(*k))
        .cloned()
        .collect())
}

pub fn drift(prior: &Manifest, current: &Manifest) -> Result<DriftReport> {
    let before: BTreeMap<&str, &ChecklistItem> =
        prior.items.iter().map(|i| (i.id.as_str(), i)).collect();
    let after: BTreeMap<&str, &ChecklistItem> =
        current.items.iter().map(|i| (i.id.as_str(), i)).collect();

    let added = after
        .keys()
        .filter(|id| !before.contains_key(*id))
        .map(|id| id.to_string())
        .collect();
    let removed = before
        .keys()
        .filter(|id| !after.contains_key(*id))
        .map(|id| id.to_string())
        .collect();

    let mut changed = Vec::new();
    for (id, old) in &before {
        if let Some(new) = after.get(id) {
            let fields = changed_fields(old, new)?;
            if !fields.is_empty() {
                changed.push(ItemChange {
                    id: id.to_string(),
                    fields,
                });
            }
        }
    }

    Ok(DriftReport {
        prior_fingerprint: prior.fingerprint.clone(),
        current_fingerprint: current.fingerprint.clone(),
        fingerprint_changed: prior.fingerprint != current.fingerprint,
        evidence_changed: prior.evidence_hash != current.evidence_hash,
        prior_state: prior.conversion_state,
        current_state: current.conversion_state,
        added,
        removed,
        changed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
