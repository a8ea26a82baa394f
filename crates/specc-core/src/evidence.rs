//! Evidence bundle: the canonical hash of every artifact a run produced,
//! plus one hash over all of them.

use crate::context::TraceEvent;
use crate::digest::hash_artifact;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Artifact name → SHA-256 of its canonical JSON.
    pub artifacts: BTreeMap<String, String>,
    pub bundle_hash: String,
    pub trace: Vec<TraceEvent>,
    /// Diagnostic only. Not part of any hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_seed: Option<u64>,
}

/// Collects artifact hashes in any order; the result is order independent.
#[derive(Debug, Default)]
pub struct EvidenceBuilder {
    artifacts: BTreeMap<String, String>,
}

impl EvidenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: Serialize>(&mut self, name: &str, artifact: &T) -> Result<&mut Self> {
        self.artifacts
            .insert(name.to_string(), hash_artifact(artifact)?);
        Ok(self)
    }

    pub fn finish(self, trace: Vec<TraceEvent>, replay_seed: Option<u64>) -> Result<EvidenceBundle> {
        let bundle_hash = hash_artifact(&self.artifacts)?;
        Ok(EvidenceBundle {
            artifacts: self.artifacts,
            bundle_hash,
            trace,
            replay_seed,
        })
    }
}

impl EvidenceBundle {
    /// Recompute the bundle hash and compare.
    pub fn verify(&self) -> Result<bool> {
        Ok(hash_artifact(&self.artifacts)? == self.bundle_hash)
    }

    /// Names of artifacts whose hash differs from `other`, or that exist on
    /// only one side.
    pub fn changed_artifacts(&self, other: &EvidenceBundle) -> Vec<String> {
        let mut names: Vec<&String> = self.artifacts.keys().chain(other.artifacts.keys()).collect();
        names.sort();
        names.dedup();
        names
            .into_iter()
            .filter(|n| self.artifacts.get(*n) != other.artifacts.get(*n))
            .cloned()
            .collect()
    }
}
