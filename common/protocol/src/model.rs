//! Model identifiers and the model catalog.
//!
//! Models are addressed as `provider/modelId`. The model id itself may
//! contain `/` (e.g. `openrouter/meta-llama/llama-3-70b`), so parsing splits
//! on the first separator only. A bare model id is not an error at the
//! grammar level: it is carried as [`ModelRef::Bare`] and resolved against
//! the provider registry's precedence list.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::usage::CostTotal;
use crate::usage::TokenUsage;

/// Error parsing a model identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelSpecError {
    /// The identifier was empty.
    #[error("empty model identifier")]
    Empty,
    /// A component of the identifier was empty.
    #[error("invalid model identifier: {0:?}")]
    Invalid(String),
}

/// A fully qualified model identifier: provider id plus model id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider id (registry key).
    pub provider: String,
    /// Model id within the provider; may contain `/`.
    pub model: String,
}

impl ModelSpec {
    /// Create a spec from provider and model ids.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// The `provider/model` form.
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

impl std::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl std::str::FromStr for ModelSpec {
    type Err = ModelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ModelRef::parse(s)? {
            ModelRef::Full(spec) => Ok(spec),
            ModelRef::Bare(model) => Err(ModelSpecError::Invalid(model)),
        }
    }
}

/// A model reference as written by the user: qualified or bare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// `provider/modelId`.
    Full(ModelSpec),
    /// A bare model id; the registry picks the provider.
    Bare(String),
}

impl ModelRef {
    /// Parse a model reference.
    ///
    /// Splits on the first `/`; everything after it is the model id, which
    /// may itself contain `/`.
    pub fn parse(s: &str) -> Result<Self, ModelSpecError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelSpecError::Empty);
        }
        match s.split_once('/') {
            Some((provider, model)) => {
                if provider.is_empty() || model.is_empty() {
                    return Err(ModelSpecError::Invalid(s.to_string()));
                }
                Ok(ModelRef::Full(ModelSpec::new(provider, model)))
            }
            None => Ok(ModelRef::Bare(s.to_string())),
        }
    }
}

/// Per-MTok pricing for a model, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    /// Input tokens.
    pub input_per_mtok: f64,
    /// Output tokens.
    pub output_per_mtok: f64,
    /// Cache reads.
    #[serde(default)]
    pub cache_read_per_mtok: f64,
    /// Cache writes.
    #[serde(default)]
    pub cache_write_per_mtok: f64,
}

/// Static metadata about a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Context window size in tokens.
    pub context_window: i64,
    /// Output token ceiling.
    pub max_output_tokens: i64,
    /// Pricing, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<ModelCost>,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            context_window: 200_000,
            max_output_tokens: 16_384,
            cost: None,
        }
    }
}

impl ModelInfo {
    /// Compute the cost of a step from its usage.
    ///
    /// Unknown whenever pricing is missing or either primary count is
    /// unknown. Reasoning and cache counts contribute only when known.
    pub fn compute_cost(&self, usage: &TokenUsage) -> CostTotal {
        let Some(cost) = &self.cost else {
            return CostTotal::Unknown;
        };
        let (Some(input), Some(output)) = (usage.input.value(), usage.output.value()) else {
            return CostTotal::Unknown;
        };

        let per_tok = |count: Option<i64>, rate: f64| -> f64 {
            count.unwrap_or(0) as f64 * rate / 1_000_000.0
        };

        let total = per_tok(Some(input), cost.input_per_mtok)
            + per_tok(Some(output), cost.output_per_mtok)
            + per_tok(usage.cache.read.value(), cost.cache_read_per_mtok)
            + per_tok(usage.cache.write.value(), cost.cache_write_per_mtok);
        CostTotal::Known(total)
    }
}

/// Catalog of known models, keyed by the qualified `provider/model` id.
///
/// Unknown models resolve to [`ModelInfo::default`], which has no pricing and
/// therefore yields unknown cost.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog of commonly routed models.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(
            "openai/gpt-4o",
            ModelInfo {
                context_window: 128_000,
                max_output_tokens: 16_384,
                cost: Some(ModelCost {
                    input_per_mtok: 2.50,
                    output_per_mtok: 10.00,
                    cache_read_per_mtok: 1.25,
                    cache_write_per_mtok: 0.0,
                }),
            },
        );
        catalog.insert(
            "openai/gpt-4o-mini",
            ModelInfo {
                context_window: 128_000,
                max_output_tokens: 16_384,
                cost: Some(ModelCost {
                    input_per_mtok: 0.15,
                    output_per_mtok: 0.60,
                    cache_read_per_mtok: 0.075,
                    cache_write_per_mtok: 0.0,
                }),
            },
        );
        catalog.insert(
            "anthropic/claude-sonnet-4-20250514",
            ModelInfo {
                context_window: 200_000,
                max_output_tokens: 64_000,
                cost: Some(ModelCost {
                    input_per_mtok: 3.00,
                    output_per_mtok: 15.00,
                    cache_read_per_mtok: 0.30,
                    cache_write_per_mtok: 3.75,
                }),
            },
        );
        catalog
    }

    /// Register or replace a model entry.
    pub fn insert(&mut self, qualified: impl Into<String>, info: ModelInfo) {
        self.entries.insert(qualified.into(), info);
    }

    /// Look up a model, falling back to defaults.
    pub fn info(&self, spec: &ModelSpec) -> ModelInfo {
        self.entries
            .get(&spec.qualified())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of catalogued models.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "model.test.rs"]
mod tests;
