//! Response assembler: answer text plus cited sources and accounting.

use std::time::Duration;

use ragline_core::{GenerationResult, RetrievalHit, Source};

use crate::context::{AssembledContext, estimate_tokens};
use crate::store::DocumentStore;

/// Snippets longer than this many characters are cut.
pub const SNIPPET_CHARS: usize = 500;

/// Substituted when a backend returns nothing.
pub const EMPTY_ANSWER: &str = "No answer generated.";

#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    link_base: String,
}

impl ResponseAssembler {
    pub fn new(link_base: impl Into<String>) -> Self {
        Self {
            link_base: link_base.into(),
        }
    }

    /// Build the result for one answered query.
    pub fn assemble(
        &self,
        store: &DocumentStore,
        context: &AssembledContext,
        answer: String,
        prompt_token_count: usize,
        model_id: &str,
        elapsed: Duration,
    ) -> GenerationResult {
        let answer = if answer.trim().is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            answer
        };

        let sources = context
            .cited_hits
            .iter()
            .map(|hit| self.source(store, hit))
            .collect();

        GenerationResult {
            answer_token_count: estimate_tokens(&answer),
            answer,
            sources,
            query_time: elapsed.as_secs_f64(),
            prompt_token_count,
            model_id: model_id.to_string(),
            document_ids: context.document_ids.clone(),
        }
    }

    fn source(&self, store: &DocumentStore, hit: &RetrievalHit) -> Source {
        let document = store.find(&hit.document_id);
        let pick = |stored: Option<&String>, snapshot: &String| -> String {
            match stored {
                Some(value) if !value.is_empty() => value.clone(),
                _ => snapshot.clone(),
            }
        };

        let snippet_source = match (hit.text.is_empty(), document) {
            (true, Some(doc)) => doc.text.as_str(),
            _ => hit.text.as_str(),
        };

        let link = document
            .and_then(|d| d.url.as_deref())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", self.link_base, hit.document_id));

        Source {
            id: hit.document_id.clone(),
            fragment_id: hit.fragment_id.clone(),
            title: pick(document.map(|d| &d.title), &hit.metadata.title),
            source: pick(document.map(|d| &d.source), &hit.metadata.source),
            date: pick(document.map(|d| &d.date), &hit.metadata.date),
            snippet: snippet(snippet_source),
            link,
            score: hit.score,
        }
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new("/documents/")
    }
}

/// First [`SNIPPET_CHARS`] characters, with `...` when cut.
pub fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
