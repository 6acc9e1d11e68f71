//! Model tier selection: smallest tier that fits the compensated request

use super::provider::ProviderContext;
use super::table::{ModelTier, ProviderMode, TierTable};
use crate::context::TokenBudget;
use crate::error::{Result, SidekickError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Outcome of a successful selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub model: String,
    pub max_tokens: usize,
    /// Request size after compensation
    pub compensated_tokens: usize,
}

/// Picks the cheapest tier that can hold a request.
///
/// Holds no per-call state; availability comes from the [`ProviderContext`].
#[derive(Debug, Clone)]
pub struct ModelTierSelector {
    direct: TierTable,
    gateway: TierTable,
    budget: TokenBudget,
}

impl ModelTierSelector {
    pub fn new(budget: TokenBudget) -> Self {
        Self {
            direct: TierTable::for_mode(ProviderMode::Direct),
            gateway: TierTable::for_mode(ProviderMode::Gateway),
            budget,
        }
    }

    /// Replace the table for the table's own mode
    pub fn with_table(mut self, table: TierTable) -> Self {
        match table.mode() {
            ProviderMode::Direct => self.direct = table,
            ProviderMode::Gateway => self.gateway = table,
        }
        self
    }

    pub fn table(&self, mode: ProviderMode) -> &TierTable {
        match mode {
            ProviderMode::Direct => &self.direct,
            ProviderMode::Gateway => &self.gateway,
        }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Choose a model for `required_tokens` using the provider's availability
    pub async fn choose(&self, required_tokens: usize, provider: &ProviderContext) -> Result<Selection> {
        let table = self.table(provider.mode());
        let available = provider.available_models(table).await?;
        self.choose_from(required_tokens, table, &available)
    }

    /// Pure first-fit over an ascending table
    pub fn choose_from(
        &self,
        required_tokens: usize,
        table: &TierTable,
        available: &HashSet<String>,
    ) -> Result<Selection> {
        let compensated = self.budget.compensate(required_tokens);

        let candidates: Vec<&ModelTier> = table
            .tiers()
            .iter()
            .filter(|t| available.contains(&t.name))
            .collect();

        if candidates.is_empty() {
            debug!(
                "None of the {} models are available for this credential",
                table.mode()
            );
            return Err(SidekickError::ModelUnavailable {
                required: compensated,
                mode: table.mode().to_string(),
            });
        }

        if let Some(tier) = candidates.into_iter().find(|t| compensated <= t.max_tokens) {
            info!("Using {} for token size {}", tier.name, compensated);
            return Ok(Selection {
                model: tier.name.clone(),
                max_tokens: tier.max_tokens,
                compensated_tokens: compensated,
            });
        }

        error!(
            "The context is too large ({}) for any of the models supported by your key",
            compensated
        );
        if table.mode() == ProviderMode::Direct {
            error!(
                "A gateway key gives access to larger models, up to {} tokens",
                self.gateway.max_capacity()
            );
        }

        Err(SidekickError::TokenBudgetExceeded {
            required: compensated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ModelTierSelector {
        ModelTierSelector::new(TokenBudget::new(1.05, 0).unwrap())
    }

    fn ab_table() -> TierTable {
        TierTable::new(ProviderMode::Direct, [("modelA", 8192), ("modelB", 32768)]).unwrap()
    }

    fn all(table: &TierTable) -> HashSet<String> {
        table.names().map(String::from).collect()
    }

    #[test]
    fn test_exact_fit_after_compensation() {
        let table = ab_table();
        let selection = selector().choose_from(7800, &table, &all(&table)).unwrap();
        assert_eq!(selection.model, "modelA");
        assert_eq!(selection.compensated_tokens, 8190);
    }

    #[test]
    fn test_compensation_pushes_to_next_tier() {
        let table = ab_table();
        let selection = selector().choose_from(8000, &table, &all(&table)).unwrap();
        assert_eq!(selection.model, "modelB");
        assert_eq!(selection.compensated_tokens, 8400);
    }

    #[test]
    fn test_too_large_for_every_tier() {
        let table = ab_table();
        let result = selector().choose_from(40_000, &table, &all(&table));
        assert!(matches!(
            result,
            Err(SidekickError::TokenBudgetExceeded { required: 42_000 })
        ));
    }

    #[test]
    fn test_unavailable_tiers_skipped() {
        let table = ab_table();
        let available: HashSet<String> = ["modelB".to_string()].into_iter().collect();
        let selection = selector().choose_from(100, &table, &available).unwrap();
        assert_eq!(selection.model, "modelB");
    }

    #[test]
    fn test_nothing_available() {
        let table = ab_table();
        let available: HashSet<String> = ["other".to_string()].into_iter().collect();
        let result = selector().choose_from(100, &table, &available);
        assert!(matches!(result, Err(SidekickError::ModelUnavailable { .. })));
    }

    #[test]
    fn test_first_fit_is_smallest_capacity() {
        let table = TierTable::for_mode(ProviderMode::Direct);
        let available = all(&table);
        let sel = selector();

        for required in [0usize, 1000, 3900, 4000, 7000, 9000, 15000, 20000, 31000] {
            let selection = sel.choose_from(required, &table, &available).unwrap();
            let compensated = sel.budget().compensate(required);
            let expected = table
                .tiers()
                .iter()
                .filter(|t| t.max_tokens >= compensated)
                .map(|t| t.max_tokens)
                .min()
                .unwrap();
            assert_eq!(selection.max_tokens, expected, "required={}", required);
        }
    }

    #[test]
    fn test_with_table_replaces_mode_table() {
        let sel = selector().with_table(ab_table());
        assert_eq!(sel.table(ProviderMode::Direct).tiers()[0].name, "modelA");
        assert_eq!(sel.table(ProviderMode::Gateway).mode(), ProviderMode::Gateway);
    }
}
