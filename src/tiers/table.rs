//! Model tier tables per provider mode

use crate::error::{Result, SidekickError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Whether requests go straight to the provider or through a routing gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Direct,
    Gateway,
}

impl ProviderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMode::Direct => "direct",
            ProviderMode::Gateway => "gateway",
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named model configuration with its context capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTier {
    pub name: String,
    pub max_tokens: usize,
    pub provider_mode: ProviderMode,
}

const DIRECT_TIERS: &[(&str, usize)] = &[
    ("gpt-4", 8192),
    ("gpt-4-32k", 32768),
    ("gpt-3.5-turbo", 4096),
    ("gpt-3.5-turbo-16k", 16384),
];

const GATEWAY_TIERS: &[(&str, usize)] = &[("openai/gpt-4", 8192), ("openai/gpt-4-32k", 32768)];

/// Tiers for one provider mode, ordered by ascending capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    mode: ProviderMode,
    tiers: Vec<ModelTier>,
}

impl TierTable {
    /// Build a table; names must be unique. Input order does not matter.
    pub fn new<'a, I>(mode: ProviderMode, tiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let mut seen = HashSet::new();
        let mut list = Vec::new();

        for (name, max_tokens) in tiers {
            if !seen.insert(name) {
                return Err(SidekickError::Configuration(format!(
                    "duplicate model tier {} in {} table",
                    name, mode
                )));
            }
            list.push(ModelTier {
                name: name.to_string(),
                max_tokens,
                provider_mode: mode,
            });
        }

        // stable: equal capacities keep their declared order
        list.sort_by_key(|t| t.max_tokens);

        Ok(Self { mode, tiers: list })
    }

    /// Built-in table for a mode
    pub fn for_mode(mode: ProviderMode) -> Self {
        let source = match mode {
            ProviderMode::Direct => DIRECT_TIERS,
            ProviderMode::Gateway => GATEWAY_TIERS,
        };
        let mut tiers: Vec<ModelTier> = source
            .iter()
            .map(|(name, max_tokens)| ModelTier {
                name: name.to_string(),
                max_tokens: *max_tokens,
                provider_mode: mode,
            })
            .collect();
        tiers.sort_by_key(|t| t.max_tokens);
        Self { mode, tiers }
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    pub fn tiers(&self) -> &[ModelTier] {
        &self.tiers
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tiers.iter().map(|t| t.name.as_str())
    }

    /// Largest capacity in the table
    pub fn max_capacity(&self) -> usize {
        self.tiers.iter().map(|t| t.max_tokens).max().unwrap_or(0)
    }

    pub fn get(&self, name: &str) -> Option<&ModelTier> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_ascending() {
        for mode in [ProviderMode::Direct, ProviderMode::Gateway] {
            let table = TierTable::for_mode(mode);
            let caps: Vec<usize> = table.tiers().iter().map(|t| t.max_tokens).collect();
            let mut sorted = caps.clone();
            sorted.sort();
            assert_eq!(caps, sorted);
            assert!(table.tiers().iter().all(|t| t.provider_mode == mode));
        }
    }

    #[test]
    fn test_direct_table_order() {
        let table = TierTable::for_mode(ProviderMode::Direct);
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["gpt-3.5-turbo", "gpt-4", "gpt-3.5-turbo-16k", "gpt-4-32k"]);
        assert_eq!(table.max_capacity(), 32768);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = TierTable::new(ProviderMode::Direct, [("a", 1), ("a", 2)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_table_sorted() {
        let table = TierTable::new(ProviderMode::Gateway, [("big", 100), ("small", 10)]).unwrap();
        assert_eq!(table.tiers()[0].name, "small");
        assert_eq!(table.get("big").unwrap().max_tokens, 100);
        assert!(table.get("missing").is_none());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ProviderMode::Direct.to_string(), "direct");
        assert_eq!(ProviderMode::Gateway.to_string(), "gateway");
    }
}
