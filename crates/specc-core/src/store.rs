//! Filesystem adapters for the ingestion and persistence ports.

use crate::error::Result;
use crate::ingest::{self, Format};
use crate::io;
use crate::manifest::Manifest;
use crate::paths;
use crate::ports::{ManifestStore, SpecSource};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct FileSpecSource {
    path: PathBuf,
}

impl FileSpecSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SpecSource for FileSpecSource {
    fn load(&self) -> Result<Value> {
        let text = std::fs::read_to_string(&self.path)?;
        ingest::normalize(&text, Format::for_path(&self.path))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps `manifest.json` in an output directory.
pub struct FileManifestStore {
    dir: PathBuf,
}

impl FileManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ManifestStore for FileManifestStore {
    fn load_prior(&self) -> Result<Option<Manifest>> {
        io::read_json(&paths::manifest_path(&self.dir))
    }

    fn save(&self, manifest: &Manifest) -> Result<()> {
        io::write_json(&paths::manifest_path(&self.dir), manifest)
    }
}
