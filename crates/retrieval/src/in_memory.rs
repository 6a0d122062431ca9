//! In-memory retriever: useful for testing and local runs without a vector store.

use async_trait::async_trait;
use ragline_core::{Document, Filters, Fragment, RetrievalError, RetrievalHit, Retriever};
use tracing::debug;

/// Fragments are cut at paragraph breaks and grown up to this many chars.
const TARGET_FRAGMENT_CHARS: usize = 1200;

/// Query terms shorter than this are ignored.
const MIN_TERM_CHARS: usize = 3;

/// Keyword retriever over fragments cut from full documents.
pub struct InMemoryRetriever {
    fragments: Vec<Fragment>,
}

impl InMemoryRetriever {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    /// Cut every document into paragraph-aligned fragments.
    pub fn from_documents<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let fragments = documents.into_iter().flat_map(fragment_document).collect();
        Self { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn score(fragment: &Fragment, terms: &[String]) -> f32 {
        let text = fragment.text.to_lowercase();
        let title = fragment.metadata.title.to_lowercase();

        let mut occurrences = 0usize;
        for term in terms {
            occurrences += text.matches(term.as_str()).count();
            if title.contains(term.as_str()) {
                occurrences += 1;
            }
        }
        if occurrences == 0 {
            return 0.0;
        }

        occurrences as f32 / (text.len() as f32 / 100.0).max(1.0)
    }
}

/// Split a document at blank lines, merging short paragraphs.
pub fn fragment_document(document: &Document) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut current = String::new();

    for paragraph in document
        .text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > TARGET_FRAGMENT_CHARS {
            fragments.push(Fragment::of(document, fragments.len(), std::mem::take(&mut current)));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        fragments.push(Fragment::of(document, fragments.len(), current));
    }

    fragments
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn retrieve(
        &self,
        query: &str,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<RetrievalHit> = self
            .fragments
            .iter()
            .filter(|f| filters.matches(&f.metadata))
            .filter_map(|f| {
                let score = Self::score(f, &terms);
                (score > 0.0).then(|| {
                    RetrievalHit::new(&f.id, &f.document_id, score)
                        .with_text(&f.text)
                        .with_metadata(f.metadata.clone())
                })
            })
            .collect();

        // Stable sort keeps corpus order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        debug!(retriever = "in_memory", hits = hits.len(), "Keyword retrieval done");
        Ok(hits)
    }
}
