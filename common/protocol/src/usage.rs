//! Token usage and cost accounting with an explicit unknown marker.
//!
//! Providers do not always report usage. When they do not, the engine must
//! say so rather than report zero: a `step_finish` with `tokens.input: 0`
//! reads as "free request" while `tokens.input: "unknown"` reads as "the
//! provider did not tell us". [`TokenCount`] and [`CostTotal`] encode that
//! distinction in the type and in the JSON.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

/// The serialized form of an unknown count or cost.
const UNKNOWN: &str = "unknown";

/// A token count that is either known or explicitly unknown.
///
/// Serializes as a JSON number when known and as the string `"unknown"`
/// otherwise. `null` deserializes as unknown for tolerance of older writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenCount {
    /// The provider reported this count.
    Known(i64),
    /// The provider did not report this count.
    #[default]
    Unknown,
}

impl TokenCount {
    /// Build from an optional provider-reported value.
    ///
    /// Negative values are treated as unknown; counts are non-negative by
    /// contract.
    pub fn from_option(value: Option<i64>) -> Self {
        match value {
            Some(v) if v >= 0 => TokenCount::Known(v),
            _ => TokenCount::Unknown,
        }
    }

    /// The known value, if any.
    pub fn value(&self) -> Option<i64> {
        match self {
            TokenCount::Known(v) => Some(*v),
            TokenCount::Unknown => None,
        }
    }

    /// Whether the count is known.
    pub fn is_known(&self) -> bool {
        matches!(self, TokenCount::Known(_))
    }

    /// Sum of two counts; unknown if either side is unknown.
    pub fn saturating_add(self, other: TokenCount) -> TokenCount {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => TokenCount::Known(a.saturating_add(b)),
            _ => TokenCount::Unknown,
        }
    }

    /// Prefer this count, falling back to `other` when unknown.
    pub fn or(self, other: TokenCount) -> TokenCount {
        match self {
            TokenCount::Known(_) => self,
            TokenCount::Unknown => other,
        }
    }
}

impl From<i64> for TokenCount {
    fn from(value: i64) -> Self {
        TokenCount::from_option(Some(value))
    }
}

impl Serialize for TokenCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TokenCount::Known(v) => serializer.serialize_i64(*v),
            TokenCount::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for TokenCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(TokenCount::Unknown),
            serde_json::Value::Number(n) => n
                .as_i64()
                .filter(|v| *v >= 0)
                .map(TokenCount::Known)
                .ok_or_else(|| de::Error::custom("token count must be a non-negative integer")),
            serde_json::Value::String(s) if s == UNKNOWN => Ok(TokenCount::Unknown),
            other => Err(de::Error::custom(format!(
                "invalid token count: {other}"
            ))),
        }
    }
}

/// Cache token accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheUsage {
    /// Tokens read from the prompt cache.
    #[serde(default)]
    pub read: TokenCount,
    /// Tokens written to the prompt cache.
    #[serde(default)]
    pub write: TokenCount,
}

/// Token usage for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    #[serde(default)]
    pub input: TokenCount,
    /// Output (completion) tokens.
    #[serde(default)]
    pub output: TokenCount,
    /// Reasoning tokens, where the provider reports them separately.
    #[serde(default)]
    pub reasoning: TokenCount,
    /// Cache read/write tokens.
    #[serde(default)]
    pub cache: CacheUsage,
}

impl TokenUsage {
    /// Usage with known input and output counts.
    pub fn new(input: i64, output: i64) -> Self {
        Self {
            input: TokenCount::from(input),
            output: TokenCount::from(output),
            reasoning: TokenCount::Unknown,
            cache: CacheUsage::default(),
        }
    }

    /// Fully unknown usage.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Whether both primary counts are known.
    pub fn is_complete(&self) -> bool {
        self.input.is_known() && self.output.is_known()
    }

    /// Merge with a fallback source: every unknown field takes the fallback's
    /// value. Known fields are never overwritten.
    pub fn or(self, fallback: TokenUsage) -> TokenUsage {
        TokenUsage {
            input: self.input.or(fallback.input),
            output: self.output.or(fallback.output),
            reasoning: self.reasoning.or(fallback.reasoning),
            cache: CacheUsage {
                read: self.cache.read.or(fallback.cache.read),
                write: self.cache.write.or(fallback.cache.write),
            },
        }
    }
}

/// A monetary cost that is either known or explicitly unknown.
///
/// Same serialization convention as [`TokenCount`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CostTotal {
    /// Cost in USD.
    Known(f64),
    /// Cost could not be computed (unknown usage or unpriced model).
    #[default]
    Unknown,
}

impl CostTotal {
    /// The known value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            CostTotal::Known(v) => Some(*v),
            CostTotal::Unknown => None,
        }
    }
}

impl Serialize for CostTotal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CostTotal::Known(v) => serializer.serialize_f64(*v),
            CostTotal::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for CostTotal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(CostTotal::Unknown),
            serde_json::Value::Number(n) => n
                .as_f64()
                .filter(|v| *v >= 0.0)
                .map(CostTotal::Known)
                .ok_or_else(|| de::Error::custom("cost must be a non-negative number")),
            serde_json::Value::String(s) if s == UNKNOWN => Ok(CostTotal::Unknown),
            other => Err(de::Error::custom(format!("invalid cost: {other}"))),
        }
    }
}

#[cfg(test)]
#[path = "usage.test.rs"]
mod tests;
