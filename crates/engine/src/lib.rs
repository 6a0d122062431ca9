//! # Ragline Engine
//!
//! Turns a query into a grounded answer:
//!
//! ```text
//! query → Retriever → ContextAssembler → PromptBuilder → Dispatcher → ResponseAssembler
//! ```
//!
//! [`QueryEngine`] owns the pipeline. The document store and model registry
//! are built once and shared read-only across concurrent queries.

pub mod context;
pub mod lifecycle;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod store;

pub use context::{AssembledContext, AssemblyMetadata, ContextAssembler, ContextOverflow, estimate_tokens};
pub use lifecycle::{LifecycleError, RequestLifecycle, RequestState};
pub use orchestrator::{MAX_TOP_K, QueryEngine, RetrievalSettings};
pub use prompt::{Prompt, PromptBuilder};
pub use response::ResponseAssembler;
pub use store::{DocumentStore, SharedDocumentStore};
