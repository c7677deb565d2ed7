//! The research loop.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use delve_core::defaults::RAG_RETRIEVAL_LIMIT;
use delve_core::{
    ActivityStatus, ActivityTracker, ActivityType, Error, Finding, RagRetrievalResult,
    ResearchEvent, ResearchState, Result, SearchResult, TaskKind,
};

use crate::deps::ResearchDeps;
use crate::prompts;
use crate::schemas::{AnalysisVerdict, ContentExtraction, ResearchPlan};

/// Report body returned when report generation itself fails.
pub const REPORT_FALLBACK: &str =
    "We apologize, but the research report could not be generated. Please try again.";

/// Source label for findings derived from attached images.
const IMAGE_SOURCE: &str = "attached-images";

/// Source label for seeded findings whose document carries no source.
const KNOWLEDGE_BASE_SOURCE: &str = "Knowledge base";

/// Runs one research session to completion and returns the report.
///
/// Progress streams through `tracker`; every stage degrades to a fallback
/// rather than aborting, so the only hard error before the report is an
/// empty topic or a missing chat backend for the session's provider.
pub async fn run_research(
    deps: &ResearchDeps,
    mut state: ResearchState,
    tracker: &ActivityTracker,
) -> Result<String> {
    let topic = state.topic.trim().to_string();
    if topic.is_empty() {
        return Err(Error::InvalidInput("research topic is empty".into()));
    }

    info!(topic, provider = %state.provider, "research session started");

    if let Some(viz) = state.visualization.filter(|v| v.enabled) {
        tracker.add(
            ActivityType::Generate,
            ActivityStatus::Info,
            format!("Visualizations requested: {}", viz.kind),
        );
    }

    // Image analysis feeds the findings before any text research happens.
    if !state.images.is_empty() {
        let text = deps
            .router
            .analyze_images(state.provider, &topic, &state.images, &state, tracker)
            .await;
        if !text.is_empty() {
            state.add_findings([Finding {
                summary: text,
                source: IMAGE_SOURCE.into(),
            }]);
        }
    }

    let rag_context = match (&deps.rag, state.use_rag) {
        (Some(rag), true) => rag.retrieve(&topic, RAG_RETRIEVAL_LIMIT, tracker).await?,
        _ => RagRetrievalResult::empty(),
    };
    // Retrieved knowledge seeds the session as ordinary findings.
    state.add_findings(rag_context.documents.iter().map(|doc| Finding {
        summary: doc.content.clone(),
        source: doc
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or(KNOWLEDGE_BASE_SOURCE)
            .to_string(),
    }));

    let plan = plan_research(deps, &state, &topic, &rag_context, tracker).await;

    let mut queries = plan.queries;
    let mut attempted: HashSet<String> = HashSet::new();
    let mut iteration = 0usize;
    // The bound check runs before the increment, so a session that never
    // reaches sufficiency performs max_iterations + 1 rounds.
    while !queries.is_empty() && iteration <= deps.config.max_iterations {
        iteration += 1;
        attempted.extend(queries.iter().cloned());
        debug!(iteration, query_count = queries.len(), "research iteration");

        let batches = join_all(
            queries
                .iter()
                .map(|query| search_query(deps, query, tracker)),
        )
        .await;

        let mut seen = HashSet::new();
        let results: Vec<SearchResult> = batches
            .into_iter()
            .flatten()
            .filter(|r| !state.processed_urls.contains(&r.url))
            .filter(|r| seen.insert(r.url.clone()))
            .collect();

        let extracted = join_all(
            results
                .iter()
                .map(|result| extract_result(deps, &state, &topic, result, tracker)),
        )
        .await;

        for result in &results {
            state.processed_urls.insert(result.url.clone());
        }
        state.add_findings(extracted.into_iter().flatten());

        let verdict = analyze_findings(deps, &state, &topic, iteration, tracker).await;

        if verdict.sufficient {
            tracker.add(
                ActivityType::Analyze,
                ActivityStatus::Complete,
                "Findings are sufficient, moving to report generation",
            );
            queries.clear();
        } else {
            tracker.add(
                ActivityType::Analyze,
                ActivityStatus::Complete,
                format!(
                    "Identified {} gap(s), continuing research",
                    verdict.gaps.len()
                ),
            );
            // Exact-string dedup so the loop never re-runs a query it
            // already tried this session.
            queries = verdict
                .queries
                .into_iter()
                .filter(|q| !attempted.contains(q))
                .collect();
        }
    }

    if state.use_rag {
        if let Some(rag) = &deps.rag {
            rag.store_research(&topic, &state.findings, tracker).await;
        }
    }

    let report = generate_report(deps, &state, &topic, tracker).await;

    tracker.emit(ResearchEvent::Report {
        content: report.clone(),
    });
    tracker.add(
        ActivityType::Generate,
        ActivityStatus::Complete,
        format!(
            "Research complete: {} finding(s), {} tokens used",
            state.findings.len(),
            state.token_used()
        ),
    );

    info!(
        topic,
        findings = state.findings.len(),
        tokens = state.token_used(),
        steps = state.completed_steps(),
        "research session finished"
    );
    Ok(report)
}

async fn plan_research(
    deps: &ResearchDeps,
    state: &ResearchState,
    topic: &str,
    rag_context: &RagRetrievalResult,
    tracker: &ActivityTracker,
) -> ResearchPlan {
    tracker.add(
        ActivityType::Planning,
        ActivityStatus::Pending,
        format!("Planning research approach for: {topic}"),
    );

    let prompt = prompts::planning_prompt(topic, &state.clarifications, rag_context);
    match deps
        .router
        .call_structured::<ResearchPlan>(
            state.provider,
            TaskKind::Planning,
            Some(prompts::planning_system()),
            &prompt,
            state,
            tracker,
        )
        .await
    {
        Ok(plan) if !plan.queries.is_empty() => {
            tracker.add(
                ActivityType::Planning,
                ActivityStatus::Complete,
                format!("Planned {} search queries", plan.queries.len()),
            );
            plan
        }
        Ok(_) => {
            warn!(topic, "planning returned no queries, using defaults");
            tracker.add(
                ActivityType::Planning,
                ActivityStatus::Warning,
                "Planning produced no queries, using default search queries",
            );
            ResearchPlan::fallback(topic)
        }
        Err(e) => {
            warn!(topic, error = %e, "planning failed, using default queries");
            tracker.add(
                ActivityType::Planning,
                ActivityStatus::Warning,
                "Planning failed, using default search queries",
            );
            ResearchPlan::fallback(topic)
        }
    }
}

async fn search_query(
    deps: &ResearchDeps,
    query: &str,
    tracker: &ActivityTracker,
) -> Vec<SearchResult> {
    tracker.add(
        ActivityType::Search,
        ActivityStatus::Pending,
        format!("Searching for: {query}"),
    );

    match deps
        .search
        .search(query, deps.config.max_search_results)
        .await
    {
        Ok(results) => {
            tracker.add(
                ActivityType::Search,
                ActivityStatus::Complete,
                format!("Found {} result(s) for: {query}", results.len()),
            );
            results
        }
        Err(e) => {
            warn!(query, error = %e, "search failed");
            tracker.add(
                ActivityType::Search,
                ActivityStatus::Error,
                format!("Search failed for: {query}"),
            );
            Vec::new()
        }
    }
}

async fn extract_result(
    deps: &ResearchDeps,
    state: &ResearchState,
    topic: &str,
    result: &SearchResult,
    tracker: &ActivityTracker,
) -> Option<Finding> {
    tracker.add(
        ActivityType::Extract,
        ActivityStatus::Pending,
        format!("Extracting content from: {}", result.url),
    );

    let content: String = result
        .content
        .chars()
        .take(deps.config.max_content_chars)
        .collect();
    let prompt = prompts::extraction_prompt(topic, &result.title, &result.url, &content);
    match deps
        .router
        .call_structured::<ContentExtraction>(
            state.provider,
            TaskKind::Extraction,
            Some(prompts::extraction_system()),
            &prompt,
            state,
            tracker,
        )
        .await
    {
        Ok(extraction) => {
            tracker.add(
                ActivityType::Extract,
                ActivityStatus::Complete,
                format!("Extracted learnings from: {}", result.url),
            );
            Some(Finding {
                summary: extraction.summary,
                source: result.url.clone(),
            })
        }
        Err(e) => {
            warn!(url = %result.url, error = %e, "extraction failed");
            tracker.add(
                ActivityType::Extract,
                ActivityStatus::Warning,
                format!("Could not extract content from: {}", result.url),
            );
            None
        }
    }
}

async fn analyze_findings(
    deps: &ResearchDeps,
    state: &ResearchState,
    topic: &str,
    iteration: usize,
    tracker: &ActivityTracker,
) -> AnalysisVerdict {
    tracker.add(
        ActivityType::Analyze,
        ActivityStatus::Pending,
        format!("Analyzing findings (round {iteration})"),
    );

    let prompt = prompts::analysis_prompt(topic, &state.findings, iteration);
    match deps
        .router
        .call_structured::<AnalysisVerdict>(
            state.provider,
            TaskKind::Analysis,
            Some(prompts::analysis_system()),
            &prompt,
            state,
            tracker,
        )
        .await
    {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(topic, iteration, error = %e, "analysis failed, using fallback verdict");
            tracker.add(
                ActivityType::Analyze,
                ActivityStatus::Warning,
                "Analysis failed, assuming findings are incomplete",
            );
            AnalysisVerdict::fallback()
        }
    }
}

async fn generate_report(
    deps: &ResearchDeps,
    state: &ResearchState,
    topic: &str,
    tracker: &ActivityTracker,
) -> String {
    tracker.add(
        ActivityType::Generate,
        ActivityStatus::Pending,
        format!("Generating report for: {topic}"),
    );

    let prompt = prompts::report_prompt(
        topic,
        &state.clarifications,
        &state.findings,
        state.visualization.as_ref(),
    );
    match deps
        .router
        .call_text(
            state.provider,
            TaskKind::Report,
            Some(prompts::report_system()),
            &prompt,
            state,
            tracker,
        )
        .await
    {
        Ok(completion) => completion.text,
        Err(e) => {
            error!(topic, error = %e, "report generation failed");
            tracker.add(
                ActivityType::Generate,
                ActivityStatus::Error,
                format!("Report generation failed: {e}"),
            );
            REPORT_FALLBACK.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use delve_cache::MemoryCache;
    use delve_core::{
        Cache, CacheHandle, ChatBackend, Completion, DocumentStore, EmbeddingBackend,
        EmbeddingProvider, ModelProvider, RagDocument, StoredDocument, VisualizationKind,
        VisualizationOptions, WebSearchProvider,
    };
    use delve_inference::{ModelRouter, RetryConfig};
    use delve_rag::{EmbeddingService, RagService};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Dispatches on stage-specific prompt markers so one backend can serve
    /// the whole pipeline.
    struct StagedBackend {
        plan: Result<String>,
        extraction: Result<String>,
        analysis: Mutex<Vec<Result<String>>>,
        report: Result<String>,
        analysis_calls: AtomicUsize,
        extraction_calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl StagedBackend {
        fn new() -> Self {
            Self {
                plan: Ok(r#"{"queries": ["q1", "q2"]}"#.into()),
                extraction: Ok(r#"{"summary": "a learning"}"#.into()),
                analysis: Mutex::new(vec![Ok(
                    r#"{"sufficient": true, "gaps": [], "queries": []}"#.into(),
                )]),
                report: Ok("# Final Report".into()),
                analysis_calls: AtomicUsize::new(0),
                extraction_calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn always_insufficient() -> Self {
            let mut backend = Self::new();
            backend.analysis = Mutex::new(vec![]);
            backend
        }
    }

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            total_tokens: 10,
        }
    }

    #[async_trait]
    impl ChatBackend for StagedBackend {
        async fn generate(
            &self,
            _model: &str,
            _system: Option<&str>,
            prompt: &str,
            _json_output: bool,
        ) -> Result<Completion> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("Plan web research") {
                return self.plan.as_ref().map(|t| completion(t)).map_err(clone_err);
            }
            if prompt.contains("Summarize the learnings") {
                self.extraction_calls.fetch_add(1, Ordering::SeqCst);
                return self
                    .extraction
                    .as_ref()
                    .map(|t| completion(t))
                    .map_err(clone_err);
            }
            if prompt.contains("Decide whether these findings") {
                let round = self.analysis_calls.fetch_add(1, Ordering::SeqCst);
                let mut scripted = self.analysis.lock().unwrap();
                if scripted.is_empty() {
                    // Default when the script runs out: never sufficient,
                    // with a fresh query so the loop keeps going.
                    return Ok(completion(&format!(
                        r#"{{"sufficient": false, "gaps": ["g"], "queries": ["next query {round}"]}}"#,
                    )));
                }
                return scripted.remove(0).map(|t| completion(&t));
            }
            if prompt.contains("Write a research report") {
                return self
                    .report
                    .as_ref()
                    .map(|t| completion(t))
                    .map_err(clone_err);
            }
            Err(Error::Internal(format!("unmatched prompt: {prompt}")))
        }
    }

    fn clone_err(e: &Error) -> Error {
        Error::Inference(e.to_string())
    }

    struct FixedSearch {
        results: Vec<SearchResult>,
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FixedSearch {
        fn new(results: Vec<SearchResult>) -> Self {
            Self {
                results,
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl WebSearchProvider for FixedSearch {
        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
            self.calls.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(Error::Search("search down".into()));
            }
            Ok(self.results.clone())
        }
    }

    fn result(title: &str, url: &str) -> SearchResult {
        SearchResult {
            title: title.into(),
            url: url.into(),
            content: "page content".into(),
        }
    }

    fn deps(backend: Arc<StagedBackend>, search: Arc<FixedSearch>) -> ResearchDeps {
        let router = ModelRouter::new(RetryConfig {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        })
        .with_backend(ModelProvider::Google, backend);
        ResearchDeps::new(router, search, None, crate::EngineConfig::default())
    }

    fn state(topic: &str) -> ResearchState {
        ResearchState::new(topic, ModelProvider::Google)
    }

    struct StubEmbed;

    #[async_trait]
    impl EmbeddingBackend for StubEmbed {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; 4])
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Document store stub: serves fixed documents and records upserts.
    #[derive(Default)]
    struct SeedStore {
        documents: Vec<RagDocument>,
        upserted: Mutex<Vec<StoredDocument>>,
    }

    #[async_trait]
    impl DocumentStore for SeedStore {
        async fn upsert(&self, documents: Vec<StoredDocument>) -> Result<Vec<String>> {
            let ids = documents.iter().map(|d| d.id.clone()).collect();
            self.upserted.lock().unwrap().extend(documents);
            Ok(ids)
        }

        async fn similarity_search(
            &self,
            _embedding: &[f32],
            _limit: i64,
        ) -> Result<Vec<RagDocument>> {
            Ok(self.documents.clone())
        }

        async fn keyword_search(
            &self,
            _keywords: &[String],
            _limit: i64,
        ) -> Result<Vec<RagDocument>> {
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<RagDocument>> {
            Ok(None)
        }

        async fn delete_by_id(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn deps_with_rag(
        backend: Arc<StagedBackend>,
        search: Arc<FixedSearch>,
        store: Arc<SeedStore>,
    ) -> ResearchDeps {
        let router = ModelRouter::new(RetryConfig {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        })
        .with_backend(ModelProvider::Google, backend);
        let cache = CacheHandle::new(Arc::new(MemoryCache::new()) as Arc<dyn Cache>);
        let embeddings =
            EmbeddingService::new(Arc::new(StubEmbed), cache.clone(), EmbeddingProvider::OpenAi);
        let rag = RagService::new(store, embeddings, cache);
        ResearchDeps::new(router, search, Some(rag), crate::EngineConfig::default())
    }

    #[tokio::test]
    async fn test_happy_path_single_iteration() {
        let backend = Arc::new(StagedBackend::new());
        let search = Arc::new(FixedSearch::new(vec![
            result("A", "https://a.example"),
            result("B", "https://b.example"),
        ]));
        let deps = deps(backend.clone(), search.clone());
        let (tracker, mut sink) = ActivityTracker::channel();

        let report = run_research(&deps, state("rust async"), &tracker)
            .await
            .unwrap();
        assert_eq!(report, "# Final Report");

        // Two queries planned, both searched, analysis ran once.
        assert_eq!(search.calls.lock().unwrap().len(), 2);
        assert_eq!(backend.analysis_calls.load(Ordering::SeqCst), 1);
        // Both queries return the same two urls; extraction runs once per
        // deduplicated url.
        assert_eq!(backend.extraction_calls.load(Ordering::SeqCst), 2);

        let mut saw_report_event = false;
        while let Ok(event) = sink.try_recv() {
            if matches!(event, ResearchEvent::Report { ref content } if content == "# Final Report")
            {
                saw_report_event = true;
            }
        }
        assert!(saw_report_event);
    }

    #[tokio::test]
    async fn test_empty_topic_is_invalid_input() {
        let deps = deps(
            Arc::new(StagedBackend::new()),
            Arc::new(FixedSearch::new(vec![])),
        );
        let (tracker, _sink) = ActivityTracker::channel();

        let err = run_research(&deps, state("   "), &tracker).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_planning_failure_uses_fallback_queries() {
        let mut backend = StagedBackend::new();
        backend.plan = Err(Error::Inference("planner down".into()));
        let search = Arc::new(FixedSearch::new(vec![result("A", "https://a.example")]));
        let deps = deps(Arc::new(backend), search.clone());
        let (tracker, _sink) = ActivityTracker::channel();

        run_research(&deps, state("rust lifetimes"), &tracker)
            .await
            .unwrap();

        let calls = search.calls.lock().unwrap();
        assert!(calls.contains(&"rust lifetimes best practices".to_string()));
        assert!(calls.contains(&"rust lifetimes guidelines".to_string()));
        assert!(calls.contains(&"rust lifetimes examples".to_string()));
    }

    #[tokio::test]
    async fn test_iteration_bound_allows_one_extra_round() {
        let backend = Arc::new(StagedBackend::always_insufficient());
        let search = Arc::new(FixedSearch::new(vec![]));
        let deps = deps(backend.clone(), search);
        let (tracker, _sink) = ActivityTracker::channel();

        run_research(&deps, state("endless topic"), &tracker)
            .await
            .unwrap();

        // The bound check precedes the increment, admitting one round more
        // than max_iterations.
        assert_eq!(
            backend.analysis_calls.load(Ordering::SeqCst),
            deps.config.max_iterations + 1
        );
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_fallback_loop() {
        let backend = Arc::new(StagedBackend::always_insufficient());
        let mut search = FixedSearch::new(vec![]);
        search.fail = true;
        let deps = deps(backend.clone(), Arc::new(search));
        let (tracker, mut sink) = ActivityTracker::channel();

        let report = run_research(&deps, state("topic"), &tracker).await.unwrap();
        assert_eq!(report, "# Final Report");
        assert_eq!(backend.extraction_calls.load(Ordering::SeqCst), 0);

        let mut saw_search_error = false;
        while let Ok(event) = sink.try_recv() {
            if let ResearchEvent::Activity(a) = event {
                if a.activity_type == ActivityType::Search && a.status == ActivityStatus::Error {
                    saw_search_error = true;
                }
            }
        }
        assert!(saw_search_error);
    }

    #[tokio::test]
    async fn test_report_failure_returns_apology() {
        let mut backend = StagedBackend::new();
        backend.report = Err(Error::Inference("writer down".into()));
        let deps = deps(
            Arc::new(backend),
            Arc::new(FixedSearch::new(vec![result("A", "https://a.example")])),
        );
        let (tracker, _sink) = ActivityTracker::channel();

        let report = run_research(&deps, state("topic"), &tracker).await.unwrap();
        assert_eq!(report, REPORT_FALLBACK);
    }

    #[tokio::test]
    async fn test_processed_urls_not_re_extracted() {
        let backend = Arc::new(StagedBackend::always_insufficient());
        // Every query in every round returns the same single url.
        let search = Arc::new(FixedSearch::new(vec![result("A", "https://a.example")]));
        let deps = deps(backend.clone(), search);
        let (tracker, _sink) = ActivityTracker::channel();

        run_research(&deps, state("topic"), &tracker).await.unwrap();

        // First round extracts the url; later rounds skip it.
        assert_eq!(backend.extraction_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieved_documents_are_seeded_as_findings() {
        let backend = Arc::new(StagedBackend::new());
        let store = Arc::new(SeedStore {
            documents: vec![
                RagDocument {
                    id: "kb-1".into(),
                    content: "prior knowledge body".into(),
                    metadata: serde_json::json!({"source": "kb://notes"}),
                    similarity: 0.9,
                },
                RagDocument {
                    id: "kb-2".into(),
                    content: "untagged knowledge".into(),
                    metadata: serde_json::Value::Null,
                    similarity: 0.8,
                },
            ],
            ..SeedStore::default()
        });
        let search = Arc::new(FixedSearch::new(vec![result("A", "https://a.example")]));
        let deps = deps_with_rag(backend.clone(), search, store);
        let (tracker, _sink) = ActivityTracker::channel();

        let mut session = state("seed topic");
        session.use_rag = true;
        run_research(&deps, session, &tracker).await.unwrap();

        let prompts = backend.prompts.lock().unwrap();
        let analysis = prompts
            .iter()
            .find(|p| p.contains("Decide whether these findings"))
            .expect("analysis prompt missing");
        assert!(analysis.contains("[kb://notes] prior knowledge body"));
        assert!(analysis.contains("[Knowledge base] untagged knowledge"));
    }

    #[tokio::test]
    async fn test_findings_stored_per_finding_even_when_report_fails() {
        let mut backend = StagedBackend::new();
        backend.report = Err(Error::Inference("writer down".into()));
        let store = Arc::new(SeedStore::default());
        let search = Arc::new(FixedSearch::new(vec![result("A", "https://a.example")]));
        let deps = deps_with_rag(Arc::new(backend), search, store.clone());
        let (tracker, _sink) = ActivityTracker::channel();

        let mut session = state("store topic");
        session.use_rag = true;
        let report = run_research(&deps, session, &tracker).await.unwrap();
        assert_eq!(report, REPORT_FALLBACK);

        // One document per finding, written before the report attempt.
        let upserted = store.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].content, "a learning");
        assert_eq!(upserted[0].metadata["source"], "https://a.example");
        assert_eq!(upserted[0].metadata["topic"], "store topic");
        assert!(upserted[0].metadata["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_already_attempted_queries_are_not_rerun() {
        let mut backend = StagedBackend::new();
        // Planning yields q1 and q2; the verdict re-proposes q1 only.
        backend.analysis = Mutex::new(vec![Ok(
            r#"{"sufficient": false, "gaps": ["g"], "queries": ["q1"]}"#.into(),
        )]);
        let backend = Arc::new(backend);
        let search = Arc::new(FixedSearch::new(vec![]));
        let deps = deps(backend.clone(), search.clone());
        let (tracker, _sink) = ActivityTracker::channel();

        run_research(&deps, state("dedup topic"), &tracker)
            .await
            .unwrap();

        // The repeated query is filtered out, so the loop ends after one
        // round instead of re-searching q1.
        assert_eq!(backend.analysis_calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_visualization_request_emits_info_activity() {
        let backend = Arc::new(StagedBackend::new());
        let deps = deps(backend, Arc::new(FixedSearch::new(vec![])));
        let (tracker, mut sink) = ActivityTracker::channel();

        let mut session = state("topic");
        session.visualization = Some(VisualizationOptions {
            enabled: true,
            kind: VisualizationKind::Mermaid,
        });
        run_research(&deps, session, &tracker).await.unwrap();

        let mut saw_info = false;
        while let Ok(event) = sink.try_recv() {
            if let ResearchEvent::Activity(a) = event {
                if a.status == ActivityStatus::Info && a.message.contains("mermaid") {
                    saw_info = true;
                }
            }
        }
        assert!(saw_info);
    }
}
