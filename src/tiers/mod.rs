//! Token-aware model tier selection
//!
//! Tier tables are provider-mode specific and ordered by capacity; the
//! selector picks the smallest available tier that holds the compensated
//! request size.

pub mod availability;
pub mod provider;
pub mod selector;
pub mod table;

pub use availability::{AvailabilityCache, AvailableModels, ModelCatalog};
pub use provider::ProviderContext;
pub use selector::{ModelTierSelector, Selection};
pub use table::{ModelTier, ProviderMode, TierTable};
