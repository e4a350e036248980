//! Haku: governance-gated routing across language-model backends.
//!
//! A request is classified for privacy tier and task class, routed to the
//! backend bound to the right organ, and, when the plan calls for it,
//! checked by the TT-01 truth validator before the reply is released.
//! Tier-3 requests never leave the local backend.

pub mod backends;
pub mod config;
pub mod context;
pub mod governance;
pub mod history;
pub mod pipeline;

pub use backends::{Backend, BackendError, BackendRegistry, ChatMessage, Role};
pub use config::Config;
pub use context::{ContextLookup, ContextSnippet, InMemoryKnowledge};
pub use history::{ConversationStore, ConversationTurn, InMemoryConversationStore};
pub use pipeline::{Classification, Pipeline, PipelineError, PipelineResponse};
