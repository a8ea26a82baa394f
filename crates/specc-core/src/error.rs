use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeccError {
    #[error("schema violation: {0}")]
    Schema(String),

    #[error("semantic validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("cannot ingest spec: {0}")]
    Ingest(String),

    #[error("invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Governance failures. These are recorded against the offending item and
/// never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersonaError {
    #[error("persona '{persona}' is not allowed to {action}")]
    CapabilityDenied { persona: String, action: String },

    #[error("persona '{persona}' exceeded {limit} action(s) in phase '{phase}'")]
    RateLimited {
        persona: String,
        phase: String,
        limit: u32,
    },

    #[error("invalid veto: {0}")]
    InvalidVeto(String),

    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error("unknown checklist item: {0}")]
    UnknownItem(String),
}

pub type Result<T> = std::result::Result<T, SpeccError>;
