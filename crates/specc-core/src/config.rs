use crate::error::{Result, SpeccError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "specc.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PersonaConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Vetoes surface as diagnostics only.
    Advisory,
    /// Any recorded veto fails the persona-non-veto readiness gate.
    Enforce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_phase: u32,
    #[serde(default = "default_enforcement")]
    pub enforcement: Enforcement,
}

fn default_rate_limit() -> u32 {
    3
}

fn default_enforcement() -> Enforcement {
    Enforcement::Advisory
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_phase: default_rate_limit(),
            enforcement: default_enforcement(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Number of perturbed replays for the fuzz-stability gate.
    #[serde(default = "default_fuzz_rounds")]
    pub fuzz_rounds: u32,
    #[serde(default = "default_true")]
    pub require_test_attachment: bool,
}

fn default_fuzz_rounds() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fuzz_rounds: default_fuzz_rounds(),
            require_test_attachment: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// CompilerConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Minimum fraction of complete requirements for sufficiency.
    #[serde(default = "default_threshold")]
    pub sufficiency_threshold: f64,
    /// Top-level keys that must be non-empty to reach STRUCTURED.
    #[serde(default = "default_required_sections")]
    pub required_sections: Vec<String>,
    /// Words that mark a prose sentence as obligation-bearing.
    #[serde(default = "default_prose_keywords")]
    pub prose_keywords: Vec<String>,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub gates: GateConfig,
}

fn default_version() -> u32 {
    1
}

fn default_threshold() -> f64 {
    0.8
}

fn default_required_sections() -> Vec<String> {
    vec![
        "sections".to_string(),
        "model".to_string(),
        "instructions".to_string(),
    ]
}

fn default_prose_keywords() -> Vec<String> {
    ["must", "shall", "should", "required", "never", "refuse"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            sufficiency_threshold: default_threshold(),
            required_sections: default_required_sections(),
            prose_keywords: default_prose_keywords(),
            persona: PersonaConfig::default(),
            gates: GateConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: CompilerConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Reject configs that would make the pipeline meaningless.
    pub fn ensure_usable(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SpeccError::Config(errors.join("; ")))
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Threshold must be a fraction
        if !(0.0..=1.0).contains(&self.sufficiency_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "sufficiency_threshold must be within 0.0..=1.0, got {}",
                    self.sufficiency_threshold
                ),
            });
        } else if self.sufficiency_threshold < 0.5 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "sufficiency_threshold={} lets most requirements stay unbound",
                    self.sufficiency_threshold
                ),
            });
        }

        // 2. No prose keywords means no prose requirements at all
        if self.prose_keywords.iter().all(|k| k.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "prose_keywords is empty: prose sections yield no requirements"
                    .to_string(),
            });
        }

        // 3. Rate limit of zero disables governance entirely
        if self.persona.rate_limit_per_phase == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "persona.rate_limit_per_phase=0 rejects every persona action"
                    .to_string(),
            });
        }

        // 4. Fuzz rounds
        if self.gates.fuzz_rounds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "gates.fuzz_rounds=0 makes the fuzz-stability gate vacuous"
                    .to_string(),
            });
        } else if self.gates.fuzz_rounds > 32 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "gates.fuzz_rounds={} (>32 is unusual and slow)",
                    self.gates.fuzz_rounds
                ),
            });
        }

        for section in &self.required_sections {
            if section.trim().is_empty() || section.contains('/') {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "required section '{section}' must be a bare top-level key"
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
