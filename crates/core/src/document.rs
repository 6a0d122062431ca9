//! Document and fragment types.
//!
//! A [`Document`] is the full source record that retrieved fragments point
//! back to. Documents are immutable once loaded; the engine's document store
//! owns them and hands out shared references only.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A full source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier.
    pub id: String,

    /// Document title.
    #[serde(default)]
    pub title: String,

    /// Publication or collection label (e.g. the newspaper name).
    #[serde(default, alias = "newspaper")]
    pub source: String,

    /// Publication date, ISO `YYYY-MM-DD` when known.
    #[serde(default)]
    pub date: String,

    /// Subject tags. Accepts a single string or a list on input.
    #[serde(default, alias = "subject", deserialize_with = "one_or_many")]
    pub subjects: BTreeSet<String>,

    /// Location tags. Accepts a single string or a list on input.
    #[serde(default, alias = "spatial", deserialize_with = "one_or_many")]
    pub locations: BTreeSet<String>,

    /// Short summary, may be empty.
    #[serde(default)]
    pub summary: String,

    /// The complete document text.
    #[serde(default, alias = "content")]
    pub text: String,

    /// External reference link, when the record carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Document {
    /// Minimal constructor, mostly for tests and in-memory fixtures.
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: String::new(),
            date: String::new(),
            subjects: BTreeSet::new(),
            locations: BTreeSet::new(),
            summary: String::new(),
            text: text.into(),
            url: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }
}

/// A retrievable unit of text belonging to exactly one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// `{document_id}_chunk_{index}`.
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    /// Metadata mirrored from the owning document.
    pub metadata: crate::retrieval::HitMetadata,
}

impl Fragment {
    /// Build a fragment of `document`. The id is derived, so a fragment can
    /// never claim a different owner than the one it was cut from.
    pub fn of(document: &Document, index: usize, text: impl Into<String>) -> Self {
        Self {
            id: Self::fragment_id(&document.id, index),
            document_id: document.id.clone(),
            index,
            text: text.into(),
            metadata: crate::retrieval::HitMetadata::from(document),
        }
    }

    pub fn fragment_id(document_id: &str, index: usize) -> String {
        format!("{document_id}_chunk_{index}")
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => BTreeSet::new(),
        OneOrMany::One(s) => BTreeSet::from([s]),
        OneOrMany::Many(v) => v.into_iter().filter(|s| !s.trim().is_empty()).collect(),
        OneOrMany::Null(()) => BTreeSet::new(),
    })
}
