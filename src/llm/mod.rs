//! Language model access: prompt, memory, catalog and invocation

pub mod catalog;
pub mod client;
pub mod memory;
pub mod prompts;

pub use catalog::OpenAiCatalog;
pub use client::{
    BufferSink, ChatCompletionClient, ChatCompletionFactory, ModelFactory, ModelInvoker, ModelSpec,
    ResponseSink, TurnRequest,
};
pub use memory::{ConversationMemory, Exchange, SharedMemory};
pub use prompts::{render_sidekick_prompt, SIDEKICK_TEMPLATE};
