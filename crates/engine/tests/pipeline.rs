//! End-to-end query pipeline against in-process retriever and backend mocks.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragline_config::{AppConfig, ModelRegistry};
use ragline_core::{
    Backend, Document, ErrorKind, Filters, GenerationConfig, GenerationOptions, GenerationRequest,
    ProviderError, RetrievalError, RetrievalHit, Retriever, Stage,
};
use ragline_engine::{
    DocumentStore, PromptBuilder, QueryEngine, RetrievalSettings, SharedDocumentStore,
    estimate_tokens,
};
use ragline_providers::{Dispatcher, RetryPolicy};

const INSTRUCTIONS: &str = "Answer from the context.";
const RESERVED: usize = 100;

// ── Mocks ─────────────────────────────────────────────────────────────────

/// Returns the same hits for every query and records what it was asked.
struct StaticRetriever {
    hits: Vec<RetrievalHit>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    fn new(hits: Vec<RetrievalHit>) -> Self {
        Self {
            hits,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(
        &self,
        query: &str,
        _filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        self.calls.lock().unwrap().push((query.to_string(), top_k));
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    async fn retrieve(
        &self,
        _query: &str,
        _filters: &Filters,
        _top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        Err(RetrievalError::Unavailable("connection refused".into()))
    }
}

struct StalledRetriever;

#[async_trait]
impl Retriever for StalledRetriever {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn retrieve(
        &self,
        _query: &str,
        _filters: &Filters,
        _top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Records prompts and answers from a fixed outcome.
struct RecordingBackend {
    credentials: bool,
    outcome: Result<String, ProviderError>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn answering(answer: &str) -> Self {
        Self {
            credentials: true,
            outcome: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: ProviderError) -> Self {
        Self {
            credentials: true,
            outcome: Err(error),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate_credentials(&self) -> bool {
        self.credentials
    }

    async fn generate(
        &self,
        prompt: &str,
        _model_id: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcome.clone()
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────

/// Roughly 400-token documents.
fn corpus() -> DocumentStore {
    let docs = ["docA", "docB", "docC"]
        .into_iter()
        .map(|id| {
            Document::new(id, format!("Title {id}"), format!("{id} ").repeat(320))
                .with_source("Le Soleil")
                .with_date("1995-06-01")
        })
        .collect();
    DocumentStore::from_documents(docs).unwrap()
}

fn abc_hits() -> Vec<RetrievalHit> {
    vec![
        RetrievalHit::new("docA_chunk_0", "docA", 0.9).with_text("a fragment"),
        RetrievalHit::new("docB_chunk_0", "docB", 0.85).with_text("b fragment"),
        RetrievalHit::new("docC_chunk_0", "docC", 0.5).with_text("c fragment"),
    ]
}

/// A config whose context budget is exactly `budget` for `query`.
fn config_with_budget(query: &str, budget: usize) -> GenerationConfig {
    let overhead = PromptBuilder::new(INSTRUCTIONS).overhead_tokens(query);
    GenerationConfig::new("mock-model", "mock", budget + overhead + RESERVED)
        .with_reserved_output_tokens(RESERVED)
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_attempts: 2,
        backoff_base: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
    }
}

fn engine(
    store: DocumentStore,
    models: Vec<GenerationConfig>,
    retriever: Arc<dyn Retriever>,
    backend: Arc<RecordingBackend>,
) -> QueryEngine {
    let default_id = models[0].id.clone();
    let registry = ModelRegistry::new(models, default_id).unwrap();
    let dispatcher = Dispatcher::new(policy()).with_backend(backend);
    QueryEngine::new(
        Arc::new(SharedDocumentStore::new(store)),
        Arc::new(registry),
        retriever,
        Arc::new(dispatcher),
    )
    .with_prompt_builder(PromptBuilder::new(INSTRUCTIONS))
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn answers_with_documents_that_fit_the_budget() {
    let query = "What happened in 1995?";
    let backend = Arc::new(RecordingBackend::answering("An answer citing Title docA."));
    let engine = engine(
        corpus(),
        vec![config_with_budget(query, 900)],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    );

    let result = engine.query(GenerationRequest::new(query)).await.unwrap();

    assert_eq!(result.document_ids, vec!["docA", "docB"]);
    let cited: Vec<&str> = result.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(cited, vec!["docA", "docB"]);
    assert_eq!(result.sources[0].title, "Title docA");
    assert_eq!(result.sources[0].link, "/documents/docA");
    assert_eq!(result.sources[0].snippet, "a fragment");
    assert_eq!(result.answer, "An answer citing Title docA.");
    assert_eq!(result.answer_token_count, estimate_tokens(&result.answer));
    assert_eq!(result.model_id, "mock-model");
    assert!(result.query_time >= 0.0);

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("### Title docA"));
    assert!(prompts[0].contains("### Title docB"));
    assert!(!prompts[0].contains("### Title docC"));
    assert!(prompts[0].ends_with("User question: What happened in 1995?"));
    assert_eq!(result.prompt_token_count, estimate_tokens(&prompts[0]));
}

#[tokio::test]
async fn zero_hits_still_answers_with_bare_prompt() {
    let backend = Arc::new(RecordingBackend::answering("I could not find anything."));
    let engine = engine(
        corpus(),
        vec![config_with_budget("anything?", 500)],
        Arc::new(StaticRetriever::new(Vec::new())),
        backend.clone(),
    );

    let result = engine.query(GenerationRequest::new("anything?")).await.unwrap();

    assert!(result.sources.is_empty());
    assert!(result.document_ids.is_empty());
    assert_eq!(
        backend.prompts(),
        vec![format!("{INSTRUCTIONS}\n\nUser question: anything?")]
    );
}

#[tokio::test]
async fn unknown_document_hit_is_skipped() {
    let hits = vec![
        RetrievalHit::new("ghost_chunk_0", "ghost", 0.99).with_text("gone"),
        RetrievalHit::new("docB_chunk_0", "docB", 0.6).with_text("b fragment"),
    ];
    let backend = Arc::new(RecordingBackend::answering("ok"));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StaticRetriever::new(hits)),
        backend,
    );

    let result = engine.query(GenerationRequest::new("q")).await.unwrap();
    assert_eq!(result.document_ids, vec!["docB"]);
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].id, "docB");
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let backend = Arc::new(RecordingBackend::failing(ProviderError::AuthenticationFailed(
        "bad key".into(),
    )));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    );

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Auth);
    assert_eq!(failure.stage, Stage::Generating);
    assert_eq!(backend.prompts().len(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_call() {
    let backend = Arc::new(RecordingBackend::answering("never").without_credentials());
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    );

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Auth);
    assert_eq!(failure.stage, Stage::Dispatching);
    assert!(backend.prompts().is_empty());
}

#[tokio::test]
async fn provider_timeouts_exhaust_both_attempts() {
    let backend = Arc::new(RecordingBackend::failing(ProviderError::Timeout("slow".into())));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    );

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(backend.prompts().len(), 2);
}

#[tokio::test]
async fn retrieval_failure_surfaces_at_retrieving() {
    let backend = Arc::new(RecordingBackend::answering("never"));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(FailingRetriever),
        backend.clone(),
    );

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Retrieval);
    assert_eq!(failure.stage, Stage::Retrieving);
    assert!(failure.message.contains("connection refused"));
    assert!(backend.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_retrieval_times_out() {
    let backend = Arc::new(RecordingBackend::answering("never"));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StalledRetriever),
        backend,
    )
    .with_retrieval_settings(RetrievalSettings {
        timeout: Duration::from_secs(2),
        ..Default::default()
    });

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Retrieval);
    assert_eq!(failure.stage, Stage::Retrieving);
    assert!(failure.message.contains("timed out"));
}

#[tokio::test]
async fn invalid_requests_fail_at_received() {
    let retriever = Arc::new(StaticRetriever::new(abc_hits()));
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        retriever.clone(),
        Arc::new(RecordingBackend::answering("never")),
    );

    let empty = engine.query(GenerationRequest::new("   ")).await.unwrap_err();
    assert_eq!(empty.kind, ErrorKind::InvalidRequest);
    assert_eq!(empty.stage, Stage::Received);

    let top_k = engine
        .query(GenerationRequest::new("q").with_top_k(0))
        .await
        .unwrap_err();
    assert_eq!(top_k.kind, ErrorKind::InvalidRequest);

    let model = engine
        .query(GenerationRequest::new("q").with_model("no-such-model"))
        .await
        .unwrap_err();
    assert_eq!(model.kind, ErrorKind::Configuration);
    assert_eq!(model.stage, Stage::Received);
    assert!(model.message.contains("no-such-model"));

    assert!(retriever.calls().is_empty());
}

#[tokio::test]
async fn oversized_instructions_overflow_at_prompting() {
    let backend = Arc::new(RecordingBackend::answering("never"));
    let config = GenerationConfig::new("tiny", "mock", 150).with_reserved_output_tokens(RESERVED);
    let engine = engine(
        corpus(),
        vec![config],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    )
    .with_prompt_builder(PromptBuilder::new("i".repeat(1000)));

    let failure = engine.query(GenerationRequest::new("q")).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::ContextOverflow);
    assert_eq!(failure.stage, Stage::Prompting);
    assert!(backend.prompts().is_empty());
}

#[tokio::test]
async fn large_context_models_widen_retrieval() {
    let retriever = Arc::new(StaticRetriever::new(abc_hits()));
    let engine = engine(
        corpus(),
        vec![GenerationConfig::new("wide", "mock", 1_000_000)],
        retriever.clone(),
        Arc::new(RecordingBackend::answering("ok")),
    );

    let result = engine.query(GenerationRequest::new("q").with_top_k(5)).await.unwrap();
    assert_eq!(retriever.calls(), vec![("q".to_string(), 200)]);
    assert_eq!(result.document_ids, vec!["docA", "docB", "docC"]);
}

#[tokio::test]
async fn prompt_and_reserve_fit_every_configured_window() {
    let windows = [700usize, 1000, 1300, 4096, 8192];
    let models: Vec<GenerationConfig> = windows
        .iter()
        .map(|&w| GenerationConfig::new(format!("m{w}"), "mock", w).with_reserved_output_tokens(RESERVED))
        .collect();
    let backend = Arc::new(RecordingBackend::answering("ok"));
    let engine = engine(
        corpus(),
        models.clone(),
        Arc::new(StaticRetriever::new(abc_hits())),
        backend,
    );

    for model in &models {
        let result = engine
            .query(GenerationRequest::new("what?").with_model(&model.id))
            .await
            .unwrap();
        assert!(result.prompt_token_count + model.reserved_output_tokens() <= model.context_window);
    }
}

#[tokio::test]
async fn concurrent_queries_are_independent() {
    let backend = Arc::new(RecordingBackend::answering("ok"));
    let engine = Arc::new(engine(
        corpus(),
        vec![config_with_budget("q", 900)],
        Arc::new(StaticRetriever::new(abc_hits())),
        backend.clone(),
    ));

    let queries = (0..16).map(|i| {
        let engine = engine.clone();
        async move { engine.query(GenerationRequest::new(format!("q{i}"))).await }
    });
    let results = futures::future::join_all(queries).await;

    assert_eq!(results.len(), 16);
    for result in results {
        let result = result.unwrap();
        assert_eq!(result.document_ids, vec!["docA", "docB"]);
    }
    assert_eq!(backend.prompts().len(), 16);
}

#[tokio::test]
async fn reload_swaps_documents_for_new_queries() {
    let hits = vec![RetrievalHit::new("fresh_chunk_0", "fresh", 0.7).with_text("new")];
    let engine = engine(
        corpus(),
        vec![config_with_budget("q", 2000)],
        Arc::new(StaticRetriever::new(hits)),
        Arc::new(RecordingBackend::answering("ok")),
    );

    let before = engine.query(GenerationRequest::new("q")).await.unwrap();
    assert!(before.document_ids.is_empty());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"id": "fresh", "title": "Fresh", "text": "Fresh text"}]"#)
        .unwrap();
    assert_eq!(engine.reload_documents(file.path()).unwrap(), 1);

    let after = engine.query(GenerationRequest::new("q")).await.unwrap();
    assert_eq!(after.document_ids, vec!["fresh"]);
    assert_eq!(after.sources[0].title, "Fresh");
}

#[test]
fn builds_from_config_with_local_documents() {
    let mut docs = tempfile::NamedTempFile::new().unwrap();
    docs.write_all(
        br#"[{"id": "d1", "title": "Hajj", "newspaper": "Walf", "content": "The hajj season."}]"#,
    )
    .unwrap();

    let config = AppConfig {
        documents_path: docs.path().to_path_buf(),
        ..Default::default()
    };
    let engine = QueryEngine::from_config(&config).unwrap();

    assert_eq!(engine.store().snapshot().len(), 1);
    assert_eq!(engine.registry().default_id(), "gemma3:4b");
    assert_eq!(engine.retriever().name(), "in_memory");
    assert!(engine.dispatcher().get("ollama").is_some());
}

#[test]
fn missing_documents_fail_startup() {
    let config = AppConfig {
        documents_path: "/nonexistent/documents.json".into(),
        ..Default::default()
    };
    let err = QueryEngine::from_config(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
