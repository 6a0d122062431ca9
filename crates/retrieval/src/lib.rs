//! Retrieval collaborator adapters for Ragline.
//!
//! Both adapters implement `ragline_core::Retriever`:
//! - [`HttpRetriever`] forwards queries to a remote retrieval service.
//! - [`InMemoryRetriever`] does keyword matching over loaded documents, for
//!   local runs and tests.

pub mod http;
pub mod in_memory;

pub use http::HttpRetriever;
pub use in_memory::InMemoryRetriever;
