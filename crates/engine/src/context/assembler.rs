//! Context assembler: fragment hits in, whole documents out.
//!
//! # Algorithm
//!
//! 1. Group hits by document. A document ranks by its best hit score.
//! 2. Sort documents by score, descending. The sort is stable, so ties keep
//!    the order in which documents were first seen in the hit list.
//! 3. `budget = context_window - reserved_overhead - reserved_output_tokens`,
//!    saturating at zero.
//! 4. Walk the ranking and append each document that still fits. The first
//!    document that does not fit ends the walk: nothing ranked below it is
//!    considered, and no document is ever cut short.
//!
//! # Determinism
//!
//! Assembly is a pure function of the hits, the config, and the store.
//! Nothing depends on hashing order or time.

use std::collections::{HashMap, HashSet};

use ragline_core::{Document, GenerationConfig, RetrievalHit};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::token;
use crate::store::DocumentStore;

/// Placed between consecutive documents in the context.
pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// Why the context came out empty although documents were available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ContextOverflow {
    /// Overhead and reserved output leave no room at all.
    ZeroBudget,
    /// The best-ranked document alone is larger than the budget.
    FirstDocumentTooLarge { document_id: String, tokens: usize },
}

/// Diagnostics for one assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub budget: usize,
    pub tokens_used: usize,
    /// Distinct documents present in the store that the hits pointed at.
    pub documents_considered: usize,
    pub documents_selected: usize,
    /// The document that ended the walk, if any.
    pub stopped_at: Option<String>,
    pub overflow: Option<ContextOverflow>,
    /// Hit document ids absent from the store, first-seen order.
    pub missing_documents: Vec<String>,
}

/// The assembled context block plus what it was built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub context: String,
    /// Selected document ids, in context order.
    pub document_ids: Vec<String>,
    /// Original hits that belong to selected documents, in hit order.
    pub cited_hits: Vec<RetrievalHit>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

struct Candidate<'a> {
    document: &'a Document,
    score: f32,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Stateless over a borrowed store snapshot.
pub struct ContextAssembler<'a> {
    store: &'a DocumentStore,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(store: &'a DocumentStore) -> Self {
        Self { store }
    }

    /// `context_window - reserved_overhead - reserved_output_tokens`, floored at zero.
    pub fn budget(config: &GenerationConfig, reserved_overhead: usize) -> usize {
        config
            .context_window
            .saturating_sub(reserved_overhead)
            .saturating_sub(config.reserved_output_tokens())
    }

    /// Render one document block. Every block after the first starts with
    /// the separator, so the context is the plain concatenation of blocks.
    pub fn render_block(document: &Document, first: bool) -> String {
        let mut block = String::new();
        if !first {
            block.push_str(DOCUMENT_SEPARATOR);
        }
        block.push_str("### ");
        block.push_str(&document.title);

        let details: Vec<&str> = [document.source.as_str(), document.date.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            block.push_str(" (");
            block.push_str(&details.join(", "));
            block.push(')');
        }

        block.push('\n');
        block.push_str(&document.text);
        block
    }

    pub fn assemble(
        &self,
        hits: &[RetrievalHit],
        config: &GenerationConfig,
        reserved_overhead: usize,
    ) -> AssembledContext {
        let budget = Self::budget(config, reserved_overhead);
        let (ranked, missing) = self.rank(hits);

        let mut metadata = AssemblyMetadata {
            budget,
            documents_considered: ranked.len(),
            missing_documents: missing,
            ..Default::default()
        };

        if ranked.is_empty() {
            return AssembledContext {
                metadata,
                ..Default::default()
            };
        }

        if budget == 0 {
            warn!(
                model = %config.id,
                context_window = config.context_window,
                reserved_overhead,
                "No context budget left, proceeding with empty context"
            );
            metadata.overflow = Some(ContextOverflow::ZeroBudget);
            metadata.stopped_at = Some(ranked[0].document.id.clone());
            return AssembledContext {
                metadata,
                ..Default::default()
            };
        }

        let mut context = String::new();
        let mut selected: Vec<&Document> = Vec::new();
        let mut remaining = budget;

        for candidate in &ranked {
            let block = Self::render_block(candidate.document, selected.is_empty());
            let cost = token::estimate_tokens(&block);

            if cost > remaining {
                debug!(
                    document = %candidate.document.id,
                    score = candidate.score,
                    cost,
                    remaining,
                    "Document does not fit, stopping"
                );
                if selected.is_empty() {
                    warn!(
                        document = %candidate.document.id,
                        tokens = cost,
                        budget,
                        "Top document exceeds context budget, proceeding with empty context"
                    );
                    metadata.overflow = Some(ContextOverflow::FirstDocumentTooLarge {
                        document_id: candidate.document.id.clone(),
                        tokens: cost,
                    });
                }
                metadata.stopped_at = Some(candidate.document.id.clone());
                break;
            }

            debug!(
                document = %candidate.document.id,
                score = candidate.score,
                cost,
                "Selected document"
            );
            context.push_str(&block);
            remaining -= cost;
            selected.push(candidate.document);
        }

        let selected_ids: HashSet<&str> = selected.iter().map(|d| d.id.as_str()).collect();
        let cited_hits = hits
            .iter()
            .filter(|h| selected_ids.contains(h.document_id.as_str()))
            .cloned()
            .collect();

        metadata.tokens_used = budget - remaining;
        metadata.documents_selected = selected.len();

        AssembledContext {
            context,
            document_ids: selected.iter().map(|d| d.id.clone()).collect(),
            cited_hits,
            metadata,
        }
    }

    /// Group hits by document and rank by max score, ties by first sight.
    fn rank(&self, hits: &[RetrievalHit]) -> (Vec<Candidate<'a>>, Vec<String>) {
        let mut candidates: Vec<Candidate<'a>> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for hit in hits {
            let id = hit.document_id.as_str();
            if let Some(&i) = position.get(id) {
                let candidate = &mut candidates[i];
                if hit.score > candidate.score {
                    candidate.score = hit.score;
                }
                continue;
            }

            match self.store.find(id) {
                Some(document) => {
                    position.insert(id, candidates.len());
                    candidates.push(Candidate {
                        document,
                        score: hit.score,
                    });
                }
                None => {
                    if !missing.iter().any(|m| m == id) {
                        warn!(document = %id, fragment = %hit.fragment_id, "Hit references unknown document, skipping");
                        missing.push(id.to_string());
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        (candidates, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Text of exactly `tokens` estimated tokens.
    fn text_of(tokens: usize) -> String {
        "x".repeat(tokens * 4)
    }

    fn store(docs: Vec<Document>) -> DocumentStore {
        DocumentStore::from_documents(docs).unwrap()
    }

    fn hit(doc: &str, score: f32) -> RetrievalHit {
        RetrievalHit::new(format!("{doc}_chunk_0"), doc, score).with_text("snippet")
    }

    /// Config whose budget equals `budget` when overhead is zero.
    fn config_with_budget(budget: usize) -> GenerationConfig {
        GenerationConfig::new("m", "mock", budget + 100).with_reserved_output_tokens(100)
    }

    #[test]
    fn budget_saturates_at_zero() {
        let config = GenerationConfig::new("m", "mock", 1000).with_reserved_output_tokens(800);
        assert_eq!(ContextAssembler::budget(&config, 150), 50);
        assert_eq!(ContextAssembler::budget(&config, 500), 0);
    }

    #[test]
    fn budget_uses_option_derived_reserve() {
        let config = GenerationConfig::new("m", "gemini", 10_000).with_option("maxOutputTokens", json!(2000));
        assert_eq!(ContextAssembler::budget(&config, 0), 8000);
    }

    #[test]
    fn selects_top_two_of_three_four_hundred_token_documents() {
        let docs = store(vec![
            Document::new("docA", "A", text_of(396)),
            Document::new("docB", "B", text_of(396)),
            Document::new("docC", "C", text_of(396)),
        ]);
        let hits = vec![hit("docA", 0.9), hit("docB", 0.85), hit("docC", 0.5)];
        let assembled = ContextAssembler::new(&docs).assemble(&hits, &config_with_budget(900), 0);

        assert_eq!(assembled.document_ids, vec!["docA", "docB"]);
        assert_eq!(assembled.metadata.stopped_at.as_deref(), Some("docC"));
        assert!(assembled.metadata.overflow.is_none());
        assert!(assembled.metadata.tokens_used <= 900);
        assert!(token::estimate_tokens(&assembled.context) <= 900);
        assert_eq!(assembled.cited_hits.len(), 2);
    }

    #[test]
    fn ranks_by_max_score_per_document() {
        let docs = store(vec![
            Document::new("a", "A", "alpha"),
            Document::new("b", "B", "beta"),
        ]);
        let hits = vec![hit("a", 0.5), hit("b", 0.7), hit("a", 0.9)];
        let assembled = ContextAssembler::new(&docs).assemble(&hits, &config_with_budget(1000), 0);
        assert_eq!(assembled.document_ids, vec!["a", "b"]);
        // Cited hits keep original hit order.
        let cited: Vec<f32> = assembled.cited_hits.iter().map(|h| h.score).collect();
        assert_eq!(cited, vec![0.5, 0.7, 0.9]);
    }

    #[test]
    fn ties_break_by_first_seen_not_id() {
        let docs = store(vec![
            Document::new("a", "A", "one"),
            Document::new("m", "M", "two"),
            Document::new("z", "Z", "three"),
        ]);
        let hits = vec![hit("z", 0.5), hit("a", 0.5), hit("m", 0.5)];
        let assembler = ContextAssembler::new(&docs);
        let config = config_with_budget(1000);

        let first = assembler.assemble(&hits, &config, 0);
        assert_eq!(first.document_ids, vec!["z", "a", "m"]);
        for _ in 0..10 {
            assert_eq!(assembler.assemble(&hits, &config, 0), first);
        }
    }

    #[test]
    fn stops_at_first_misfit_without_skip_ahead() {
        let docs = store(vec![
            Document::new("big1", "B1", text_of(50)),
            Document::new("huge", "H", text_of(500)),
            Document::new("tiny", "T", "t"),
        ]);
        let hits = vec![hit("big1", 0.9), hit("huge", 0.8), hit("tiny", 0.7)];
        let assembled = ContextAssembler::new(&docs).assemble(&hits, &config_with_budget(200), 0);
        assert_eq!(assembled.document_ids, vec!["big1"]);
        assert_eq!(assembled.metadata.stopped_at.as_deref(), Some("huge"));
    }

    #[test]
    fn oversized_first_document_gives_empty_context_and_overflow() {
        let docs = store(vec![
            Document::new("huge", "H", text_of(5000)),
            Document::new("small", "S", "s"),
        ]);
        let hits = vec![hit("huge", 0.9), hit("small", 0.1)];
        let assembled = ContextAssembler::new(&docs).assemble(&hits, &config_with_budget(100), 0);
        assert!(assembled.is_empty());
        assert!(assembled.cited_hits.is_empty());
        assert!(matches!(
            assembled.metadata.overflow,
            Some(ContextOverflow::FirstDocumentTooLarge { ref document_id, .. }) if document_id == "huge"
        ));
    }

    #[test]
    fn zero_budget_records_overflow() {
        let docs = store(vec![Document::new("a", "A", "alpha")]);
        let config = GenerationConfig::new("m", "mock", 100).with_reserved_output_tokens(100);
        let assembled = ContextAssembler::new(&docs).assemble(&[hit("a", 1.0)], &config, 10);
        assert!(assembled.is_empty());
        assert_eq!(assembled.metadata.budget, 0);
        assert_eq!(assembled.metadata.overflow, Some(ContextOverflow::ZeroBudget));
    }

    #[test]
    fn zero_hits_is_empty_without_overflow() {
        let docs = store(vec![Document::new("a", "A", "alpha")]);
        let assembled = ContextAssembler::new(&docs).assemble(&[], &config_with_budget(100), 0);
        assert!(assembled.is_empty());
        assert!(assembled.metadata.overflow.is_none());
        assert_eq!(assembled.metadata.documents_considered, 0);
    }

    #[test]
    fn unknown_documents_are_skipped_and_reported() {
        let docs = store(vec![Document::new("real", "Real", "body")]);
        let hits = vec![hit("ghost", 0.99), hit("real", 0.5), hit("ghost", 0.98)];
        let assembled = ContextAssembler::new(&docs).assemble(&hits, &config_with_budget(500), 0);
        assert_eq!(assembled.document_ids, vec!["real"]);
        assert_eq!(assembled.metadata.missing_documents, vec!["ghost"]);
        assert_eq!(assembled.metadata.documents_considered, 1);
        assert!(assembled.cited_hits.iter().all(|h| h.document_id == "real"));
    }

    #[test]
    fn blocks_carry_header_and_separator() {
        let doc = Document::new("a", "Title", "Body")
            .with_source("Le Soleil")
            .with_date("1990-01-01");
        assert_eq!(
            ContextAssembler::render_block(&doc, true),
            "### Title (Le Soleil, 1990-01-01)\nBody"
        );
        let bare = Document::new("b", "Bare", "Text");
        assert_eq!(
            ContextAssembler::render_block(&bare, false),
            format!("{DOCUMENT_SEPARATOR}### Bare\nText")
        );
    }

    #[test]
    fn context_never_exceeds_budget_across_shapes() {
        let docs = store(
            (0..12)
                .map(|i| Document::new(format!("d{i}"), format!("Doc {i}"), "y".repeat(37 * i + 3)))
                .collect(),
        );
        let hits: Vec<RetrievalHit> = (0..12)
            .map(|i| hit(&format!("d{i}"), 1.0 - i as f32 * 0.05))
            .collect();
        let assembler = ContextAssembler::new(&docs);

        for window in [50usize, 120, 333, 700, 1500, 4000] {
            for overhead in [0usize, 7, 40] {
                let config = GenerationConfig::new("m", "mock", window).with_reserved_output_tokens(30);
                let assembled = assembler.assemble(&hits, &config, overhead);
                let budget = ContextAssembler::budget(&config, overhead);
                assert!(token::estimate_tokens(&assembled.context) <= budget);
                assert!(assembled.metadata.tokens_used <= budget);
            }
        }
    }
}
