//! Loop phases and the model handle carried between turns

use crate::llm::ModelInvoker;
use crate::tiers::Selection;
use std::fmt;
use std::sync::Arc;

/// Where the loop is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Init,
    AwaitingInput,
    /// Holds the pending request text
    Processing(String),
    Terminated,
}

impl Phase {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Phase::Terminated)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::AwaitingInput => "awaiting-input",
            Phase::Processing(_) => "processing",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The model in use; replaced as a whole when the tier changes
#[derive(Clone)]
pub struct ActiveModel {
    pub selection: Selection,
    pub invoker: Arc<dyn ModelInvoker>,
}

impl ActiveModel {
    pub fn name(&self) -> &str {
        &self.selection.model
    }
}

impl fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveModel")
            .field("selection", &self.selection)
            .field("invoker", &self.invoker.model_name())
            .finish()
    }
}
