//! Retrieval collaborator contract.
//!
//! The similarity search itself lives outside this system. The engine only
//! sees ranked [`RetrievalHit`]s returned through the [`Retriever`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::document::Document;
use crate::error::RetrievalError;

/// Metadata snapshot carried by every hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "newspaper")]
    pub source: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub subjects: BTreeSet<String>,
    #[serde(default)]
    pub locations: BTreeSet<String>,
}

impl From<&Document> for HitMetadata {
    fn from(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            source: doc.source.clone(),
            date: doc.date.clone(),
            subjects: doc.subjects.clone(),
            locations: doc.locations.clone(),
        }
    }
}

/// One ranked fragment returned for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub fragment_id: String,
    pub document_id: String,
    /// Relevance score; higher is better.
    pub score: f32,
    #[serde(default)]
    pub metadata: HitMetadata,
    /// Text snippet of the fragment.
    #[serde(default)]
    pub text: String,
}

impl RetrievalHit {
    pub fn new(
        fragment_id: impl Into<String>,
        document_id: impl Into<String>,
        score: f32,
    ) -> Self {
        Self {
            fragment_id: fragment_id.into(),
            document_id: document_id.into(),
            score,
            metadata: HitMetadata::default(),
            text: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_metadata(mut self, metadata: HitMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Inclusive ISO date bounds. Either end may be open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// Optional query filters forwarded to the retrieval collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, alias = "newspaper", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.date_range.is_none()
            && self.subjects.is_empty()
            && self.locations.is_empty()
    }

    /// Whether a metadata snapshot passes every active filter.
    ///
    /// ISO dates compare correctly as strings. A record with no date fails
    /// any date bound.
    pub fn matches(&self, metadata: &HitMetadata) -> bool {
        if let Some(source) = &self.source {
            if metadata.source != *source {
                return false;
            }
        }

        if let Some(range) = &self.date_range {
            if let Some(from) = &range.from {
                if metadata.date.is_empty() || metadata.date.as_str() < from.as_str() {
                    return false;
                }
            }
            if let Some(to) = &range.to {
                if metadata.date.is_empty() || metadata.date.as_str() > to.as_str() {
                    return false;
                }
            }
        }

        if !self.subjects.is_empty()
            && !self.subjects.iter().any(|s| metadata.subjects.contains(s))
        {
            return false;
        }

        if !self.locations.is_empty()
            && !self.locations.iter().any(|l| metadata.locations.contains(l))
        {
            return false;
        }

        true
    }
}

/// The retrieval collaborator.
///
/// Implementations return hits in descending relevance order.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn retrieve(
        &self,
        query: &str,
        filters: &Filters,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievalHit>, RetrievalError>;
}
