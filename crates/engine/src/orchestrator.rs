//! The query orchestrator.
//!
//! One call to [`QueryEngine::query`] walks a request through every stage:
//! validate, retrieve, assemble, build the prompt, dispatch, and shape the
//! response. Any failure is caught here and returned as a [`QueryFailure`]
//! naming the stage it happened in; nothing a single request does can take
//! the process down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ragline_config::{AppConfig, ModelRegistry, RetrievalConfig, RetrievalKind};
use ragline_core::{
    DocumentStoreError, Error, Filters, GenerationConfig, GenerationRequest, GenerationResult,
    QueryFailure, RetrievalError, Retriever, Stage,
};
use ragline_providers::{Dispatcher, build_from_config};
use ragline_retrieval::{HttpRetriever, InMemoryRetriever};
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::context::ContextAssembler;
use crate::lifecycle::RequestLifecycle;
use crate::prompt::PromptBuilder;
use crate::response::ResponseAssembler;
use crate::store::{DocumentStore, SharedDocumentStore};

/// Largest `top_k` a client may ask for.
pub const MAX_TOP_K: usize = 200;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How many fragments to ask for, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    pub timeout: Duration,
    /// Models with at least this context window get `large_context_top_k`.
    pub large_context_threshold: usize,
    pub large_context_top_k: usize,
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            default_top_k: config.default_top_k,
            timeout: Duration::from_secs(config.timeout_secs),
            large_context_threshold: config.large_context_threshold,
            large_context_top_k: config.large_context_top_k,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl RetrievalSettings {
    /// Requests at or below this `top_k` are widened for large-context models.
    const WIDEN_AT_MOST: usize = 10;

    /// The `top_k` actually sent to the retriever.
    pub fn effective_top_k(&self, requested: Option<usize>, config: &GenerationConfig) -> usize {
        let top_k = requested.unwrap_or(self.default_top_k);
        if config.context_window >= self.large_context_threshold && top_k <= Self::WIDEN_AT_MOST {
            self.large_context_top_k
        } else {
            top_k
        }
    }
}

/// Answers queries against a document store, a retriever, and a set of
/// generation backends.
///
/// All state is shared read-only, so one engine serves any number of
/// concurrent queries.
pub struct QueryEngine {
    store: Arc<SharedDocumentStore>,
    registry: Arc<ModelRegistry>,
    retriever: Arc<dyn Retriever>,
    dispatcher: Arc<Dispatcher>,
    prompt: PromptBuilder,
    responses: ResponseAssembler,
    retrieval: RetrievalSettings,
}

impl QueryEngine {
    pub fn new(
        store: Arc<SharedDocumentStore>,
        registry: Arc<ModelRegistry>,
        retriever: Arc<dyn Retriever>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            registry,
            retriever,
            dispatcher,
            prompt: PromptBuilder::default(),
            responses: ResponseAssembler::default(),
            retrieval: RetrievalSettings::default(),
        }
    }

    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_response_assembler(mut self, responses: ResponseAssembler) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_retrieval_settings(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Build everything from a validated config: load documents, build the
    /// registry, pick the retriever, register backends.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let registry = config
            .registry()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let store = DocumentStore::load(&config.documents_path)?;

        let retriever: Arc<dyn Retriever> = match config.retrieval.kind {
            RetrievalKind::Memory => Arc::new(InMemoryRetriever::from_documents(store.iter())),
            RetrievalKind::Http => {
                let endpoint = config.retrieval.endpoint.clone().ok_or_else(|| {
                    Error::Configuration("retrieval.endpoint is not set".into())
                })?;
                Arc::new(HttpRetriever::new(
                    endpoint,
                    Duration::from_secs(config.retrieval.timeout_secs),
                ))
            }
        };

        let dispatcher = build_from_config(config);

        info!(
            documents = store.len(),
            models = registry.len(),
            default_model = %registry.default_id(),
            retriever = %retriever.name(),
            backends = ?dispatcher.list(),
            "Query engine ready"
        );

        Ok(Self::new(
            Arc::new(SharedDocumentStore::new(store)),
            Arc::new(registry),
            retriever,
            Arc::new(dispatcher),
        )
        .with_prompt_builder(PromptBuilder::new(config.prompt.instructions.clone()))
        .with_response_assembler(ResponseAssembler::new(config.sources.link_base.clone()))
        .with_retrieval_settings(RetrievalSettings::from(&config.retrieval)))
    }

    pub fn store(&self) -> &SharedDocumentStore {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    /// Swap in a freshly loaded document set. In-flight queries keep the
    /// store they started with.
    pub fn reload_documents(&self, path: &Path) -> Result<usize, DocumentStoreError> {
        self.store.reload(path)
    }

    /// Answer one query.
    pub async fn query(&self, request: GenerationRequest) -> Result<GenerationResult, QueryFailure> {
        let request_id = Uuid::new_v4();
        let span = info_span!("query", %request_id, model = tracing::field::Empty);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: GenerationRequest) -> Result<GenerationResult, QueryFailure> {
        let started = Instant::now();
        let mut lifecycle = RequestLifecycle::new();

        // ── Received ──
        let query = request.query.trim();
        let config = match self.validate(&request) {
            Ok(config) => config,
            Err(e) => return Err(fail(&mut lifecycle, e)),
        };
        Span::current().record("model", config.id.as_str());
        let store = self.store.snapshot();
        let top_k = self.retrieval.effective_top_k(request.top_k, config);
        info!(top_k, filtered = !request.filters.is_empty(), "Query received");

        // ── Retrieving ──
        advance(&mut lifecycle, Stage::Retrieving);
        let retrieval = tokio::time::timeout(
            self.retrieval.timeout,
            self.retriever.retrieve(query, &request.filters, top_k),
        )
        .await;
        let hits = match retrieval {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => return Err(fail(&mut lifecycle, e.into())),
            Err(_) => {
                let e = RetrievalError::Timeout(self.retrieval.timeout.as_secs());
                return Err(fail(&mut lifecycle, e.into()));
            }
        };
        debug!(hits = hits.len(), retriever = %self.retriever.name(), "Retrieved fragments");

        // ── Assembling ──
        advance(&mut lifecycle, Stage::Assembling);
        let overhead = self.prompt.overhead_tokens(query);
        let assembled = ContextAssembler::new(&store).assemble(&hits, config, overhead);
        info!(
            budget = assembled.metadata.budget,
            tokens = assembled.metadata.tokens_used,
            selected = assembled.metadata.documents_selected,
            considered = assembled.metadata.documents_considered,
            missing = assembled.metadata.missing_documents.len(),
            "Context assembled"
        );

        // ── Prompting ──
        advance(&mut lifecycle, Stage::Prompting);
        let prompt = match self.prompt.build(&assembled.context, query, config) {
            Ok(prompt) => prompt,
            Err(e) => return Err(fail(&mut lifecycle, e)),
        };

        // ── Dispatching ──
        advance(&mut lifecycle, Stage::Dispatching);
        let backend = match self.dispatcher.resolve(config) {
            Ok(backend) => backend,
            Err(e) => return Err(fail(&mut lifecycle, e)),
        };

        // ── Generating ──
        advance(&mut lifecycle, Stage::Generating);
        let dispatch = match self
            .dispatcher
            .generate(backend.as_ref(), config, &prompt.text)
            .await
        {
            Ok(dispatch) => dispatch,
            Err(e) => return Err(fail(&mut lifecycle, e)),
        };

        if let Err(e) = lifecycle.complete() {
            warn!(error = %e, "Lifecycle out of order");
        }

        let result = self.responses.assemble(
            &store,
            &assembled,
            dispatch.text,
            prompt.token_count,
            config.model_id(),
            started.elapsed(),
        );

        info!(
            prompt_tokens = result.prompt_token_count,
            answer_tokens = result.answer_token_count,
            sources = result.sources.len(),
            attempts = dispatch.attempts,
            query_time = result.query_time,
            "Query answered"
        );
        Ok(result)
    }

    /// Check the request and resolve its generation config.
    fn validate(&self, request: &GenerationRequest) -> Result<&GenerationConfig, Error> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }

        if let Some(top_k) = request.top_k
            && !(1..=MAX_TOP_K).contains(&top_k)
        {
            return Err(Error::InvalidRequest(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        validate_filters(&request.filters)?;

        self.registry
            .resolve(request.model_name.as_deref())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "unknown model '{}'",
                    request.model_name.as_deref().unwrap_or_default()
                ))
            })
    }
}

fn validate_filters(filters: &Filters) -> Result<(), Error> {
    let Some(range) = &filters.date_range else {
        return Ok(());
    };

    let parse = |value: &Option<String>| -> Result<Option<NaiveDate>, Error> {
        match value.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(Some)
                .map_err(|_| Error::InvalidRequest(format!("invalid date '{raw}', expected YYYY-MM-DD"))),
        }
    };

    if let (Some(from), Some(to)) = (parse(&range.from)?, parse(&range.to)?)
        && from > to
    {
        return Err(Error::InvalidRequest(format!(
            "date range is empty: {from} is after {to}"
        )));
    }
    Ok(())
}

fn advance(lifecycle: &mut RequestLifecycle, stage: Stage) {
    if let Err(e) = lifecycle.advance(stage) {
        warn!(error = %e, "Lifecycle out of order");
    }
}

fn fail(lifecycle: &mut RequestLifecycle, err: Error) -> QueryFailure {
    let kind = err.kind();
    let stage = match lifecycle.fail(kind) {
        Ok(stage) => stage,
        Err(e) => {
            warn!(error = %e, "Lifecycle out of order");
            lifecycle.stage().unwrap_or(Stage::Received)
        }
    };
    warn!(stage = %stage, kind = %kind, error = %err, "Query failed");
    QueryFailure::from_error(stage, &err)
}
