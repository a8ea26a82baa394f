//! Boundaries between the compute core and the outside world. The core
//! only ever sees these traits; adapters live in `store` and `emit`.

use crate::error::Result;
use crate::item::ChecklistItem;
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Spec ingestion: produce the canonical nested tree.
pub trait SpecSource {
    fn load(&self) -> Result<Value>;

    /// Human description of where the spec came from.
    fn describe(&self) -> String;
}

/// Persistence of the manifest between runs.
pub trait ManifestStore {
    /// The previous run's manifest, if one was saved.
    fn load_prior(&self) -> Result<Option<Manifest>>;

    fn save(&self, manifest: &Manifest) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Relative path the caller may write the content to.
    pub path: String,
    pub content: String,
}

/// Code emission. Implementations describe files; they never write them.
pub trait CodeEmitter {
    fn emit(&self, items: &[ChecklistItem]) -> Result<Vec<GeneratedFile>>;
}

/// A spec already held in memory.
pub struct InlineSpec(pub Value);

impl SpecSource for InlineSpec {
    fn load(&self) -> Result<Value> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "<inline>".to_string()
    }
}
