//! # Ragline Core
//!
//! Domain types, traits, and error definitions for the Ragline answering engine.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The two network-facing collaborators, generation backends and the
//! retrieval service, are traits here. Implementations live in
//! `ragline-providers` and `ragline-retrieval`, so the engine can be tested
//! against in-process mocks.

pub mod document;
pub mod error;
pub mod generation;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use document::{Document, Fragment};
pub use error::{DocumentStoreError, Error, ErrorKind, ProviderError, Result, RetrievalError};
pub use generation::{
    GenerationConfig, GenerationRequest, GenerationResult, QueryFailure, Source, Stage,
};
pub use provider::{Backend, GenerationOptions, OUTPUT_LIMIT_KEYS};
pub use retrieval::{DateRange, Filters, HitMetadata, RetrievalHit, Retriever};
