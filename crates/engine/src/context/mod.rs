//! Document-level context assembly.
//!
//! Fragment hits are rolled up to their documents, ranked, and whole
//! documents are packed into a token budget.

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextOverflow, DOCUMENT_SEPARATOR,
};
pub use token::estimate_tokens;
