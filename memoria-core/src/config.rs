//! Configuration types (§6 Configuration surface, §10 Ambient Stack).
//!
//! `MemoriaConfig` is the single master configuration struct for the daemon.
//! Every knob named in the configuration surface has a field here; nothing
//! is looked up from an environment variable mid-request. `validate()` is
//! called once at startup and the resulting config is then shared read-only
//! by every component.

use crate::{ConfigError, MemoriaResult};
use serde::{Deserialize, Serialize};

/// Per-mode token budget allocation, expressed as fractions of `max_tokens`
/// that sum to 1.0 (§4.H budget fraction table).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SectionBudgetFractions {
    pub rules: f32,
    pub task_state: f32,
    pub decisions: f32,
    pub evidence: f32,
    pub recent: f32,
    pub capsules: f32,
}

impl SectionBudgetFractions {
    pub fn sum(&self) -> f32 {
        self.rules + self.task_state + self.decisions + self.evidence + self.recent + self.capsules
    }
}

/// Token budget configuration (§4.H, §4.I).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BudgetConfig {
    /// Total ACB token budget before any per-section split.
    pub max_tokens: u32,
    /// Per-mode section fractions, keyed by the mode's db string (§4.H).
    pub per_mode_fractions: Vec<(String, SectionBudgetFractions)>,
}

/// Hybrid retrieval scoring and pool-size configuration (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetrievalConfig {
    pub candidate_pool_max: u32,
    pub retrieved_chunks_max: u32,
    /// Similarity weight in the score fusion formula.
    pub alpha: f32,
    /// Recency weight in the score fusion formula.
    pub beta: f32,
    /// Importance weight in the score fusion formula.
    pub gamma: f32,
    /// Default recency half-life, in seconds, absent a per-mode override.
    pub recency_half_life_secs: u32,
}

/// Ingestion limits (§4.C Recorder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IngestionConfig {
    pub max_bytes_per_tool_result: u32,
    pub default_scope: crate::Scope,
}

/// Privacy / redaction configuration (§4.K).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PrivacyConfig {
    pub never_store_secrets: bool,
    /// Channel (db string) to the set of sensitivities it may carry.
    pub channel_sensitivity_allowlist: Vec<(String, Vec<String>)>,
}

/// Capsule defaults (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CapsuleConfig {
    pub default_ttl_days: u32,
}

/// Graph traversal bounds (§4.J).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GraphConfig {
    pub max_traversal_depth: u32,
}

/// Master configuration struct. All values are required; nothing falls back
/// to an undocumented default at call time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoriaConfig {
    pub budget: BudgetConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
    pub privacy: PrivacyConfig,
    pub capsules: CapsuleConfig,
    pub graph: GraphConfig,
}

impl MemoriaConfig {
    /// Reference configuration using the literal defaults named in the
    /// configuration surface. Suitable for tests and examples; production
    /// deployments are expected to override individual fields.
    pub fn reference() -> Self {
        let even_split = SectionBudgetFractions {
            rules: 0.10,
            task_state: 0.20,
            decisions: 0.20,
            evidence: 0.30,
            recent: 0.15,
            capsules: 0.05,
        };
        Self {
            budget: BudgetConfig {
                max_tokens: 65_000,
                per_mode_fractions: vec![
                    ("task".to_string(), even_split),
                    ("exploration".to_string(), even_split),
                    ("debugging".to_string(), even_split),
                    ("learning".to_string(), even_split),
                    ("general".to_string(), even_split),
                ],
            },
            retrieval: RetrievalConfig {
                candidate_pool_max: 2000,
                retrieved_chunks_max: 200,
                alpha: 0.6,
                beta: 0.3,
                gamma: 0.1,
                recency_half_life_secs: 86_400,
            },
            ingestion: IngestionConfig {
                max_bytes_per_tool_result: 64 * 1024,
                default_scope: crate::Scope::Global,
            },
            privacy: PrivacyConfig {
                never_store_secrets: true,
                channel_sensitivity_allowlist: vec![
                    ("private".to_string(), vec!["none".into(), "low".into(), "high".into()]),
                    ("public".to_string(), vec!["none".into()]),
                    ("team".to_string(), vec!["none".into(), "low".into()]),
                    ("agent".to_string(), vec!["none".into(), "low".into(), "high".into()]),
                ],
            },
            capsules: CapsuleConfig { default_ttl_days: 7 },
            graph: GraphConfig { max_traversal_depth: 5 },
        }
    }

    /// Validate the configuration. Called once at daemon startup.
    pub fn validate(&self) -> MemoriaResult<()> {
        if self.budget.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "budget.max_tokens".to_string(),
                value: self.budget.max_tokens.to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.budget.per_mode_fractions.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "budget.per_mode_fractions".to_string(),
            }
            .into());
        }

        for (mode, fractions) in &self.budget.per_mode_fractions {
            let sum = fractions.sum();
            if (sum - 1.0).abs() > 0.01 {
                return Err(ConfigError::InvalidValue {
                    field: format!("budget.per_mode_fractions[{mode}]"),
                    value: sum.to_string(),
                    reason: "section fractions must sum to 1.0".to_string(),
                }
                .into());
            }
        }

        let weights_sum = self.retrieval.alpha + self.retrieval.beta + self.retrieval.gamma;
        if (weights_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.{alpha,beta,gamma}".to_string(),
                value: weights_sum.to_string(),
                reason: "score fusion weights must sum to 1.0".to_string(),
            }
            .into());
        }

        if self.retrieval.retrieved_chunks_max > self.retrieval.candidate_pool_max {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.retrieved_chunks_max".to_string(),
                value: self.retrieval.retrieved_chunks_max.to_string(),
                reason: "must not exceed retrieval.candidate_pool_max".to_string(),
            }
            .into());
        }

        if self.ingestion.max_bytes_per_tool_result == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ingestion.max_bytes_per_tool_result".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.graph.max_traversal_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "graph.max_traversal_depth".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for MemoriaConfig {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_validates() {
        MemoriaConfig::reference().validate().expect("reference config must be valid");
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let mut cfg = MemoriaConfig::reference();
        cfg.budget.max_tokens = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retrieval_weights_must_sum_to_one() {
        let mut cfg = MemoriaConfig::reference();
        cfg.retrieval.alpha = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retrieved_chunks_max_cannot_exceed_candidate_pool() {
        let mut cfg = MemoriaConfig::reference();
        cfg.retrieval.retrieved_chunks_max = cfg.retrieval.candidate_pool_max + 1;
        assert!(cfg.validate().is_err());
    }
}
