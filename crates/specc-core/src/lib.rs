pub mod ast;
pub mod canonical;
pub mod config;
pub mod context;
pub mod conversion;
pub mod coverage;
pub mod derive;
pub mod digest;
pub mod emit;
pub mod enrich;
pub mod equivalence;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod gate;
pub mod graph;
pub mod ingest;
pub mod invariant;
pub mod io;
pub mod item;
pub mod manifest;
pub mod paths;
pub mod persona;
pub mod pipeline;
pub mod ports;
pub mod requirement;
pub mod schema;
pub mod store;
pub mod types;
pub mod validate;

pub use error::{Result, SpeccError};
pub use pipeline::{compile, compile_core, CompileOptions, PrimaryArtifact, RunOutcome};
