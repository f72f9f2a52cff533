//! Request orchestration: plans the request, starts every stage of the
//! evidence DAG eagerly, emits thinking events in a fixed order, generates
//! the answer and finalizes the run exactly once.
//!
//! DAG (each arrow is an await on a memoized [`Stage`]):
//!
//! ```text
//! roadmap -> {decompose, files, scope guard} -> kb search -> entity resolve
//!   -> refine -> sanitize -> {compress, key info, code search, conflict}
//!   -> {gap, outline, assumption, action plan} -> prepared -> prompt -> generation
//! ```

use std::{
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use ai_llm_service::{
    BackendRegistry, GenerationBackend, VisionService, config::default_config::config_vision,
};
use attachments::{
    AttachmentConfig, AttachmentExtractor, DocumentUnderstanding, Downloader, FileInsights, FileItem,
    RemoteUnderstanding,
};
use futures::{Stream, StreamExt};
use rag_store::{HttpKbBackend, KbBackend, RagConfig, RetrievalCoordinator, RetrievalResult};
use services::{
    WorkerPool,
    ids::run_id,
    text::{error_summary, uniq_limit},
};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    analytics::{AnalyticsSink, HttpAnalyticsSink, LogAnalyticsSink, RunRecord, RunSummary},
    api_types::{AnswerRequest, RagAnswer, ResolvedSession, ScopeMode, ThinkingEvent},
    cfg::ContextorConfig,
    context::{ContextParts, PreparedContext, assemble},
    error::{ContextorError, Result},
    events,
    key_info::{MAX_KEY_INFO, extract_key_info},
    memory::{ConversationMemory, HISTORY_MESSAGES, InMemoryMemory, render_recent},
    prompt::{PromptMeta, SYSTEM_PROMPT, build_prompt},
    qa,
    roadmap::{self, RoadmapPlan},
    sanitize::SanitizedEvidence,
    stage::{Stage, StageTasks},
    tools::{
        EvidenceModel,
        action_plan::{self, ActionPlan},
        assumption::{self, AssumptionCheck},
        code_search::{self, CodeSearch},
        compress,
        conflict::{self, ConflictReport},
        decompose::decompose,
        entity_resolve::{self, EntityTerms},
        evidence_gap::{self, EvidenceGap},
        outline::{self, AnswerOutline},
        scope_guard::{self, ScopeVerdict},
        track_correct::{self, TrackCorrection},
        verify::verify,
    },
};

/// Buffered events between the orchestrator task and a slow client.
const EVENT_BUFFER: usize = 64;
const ERROR_MESSAGE_CHARS: usize = 300;
const ANALYTICS_BUDGET: Duration = Duration::from_secs(2);

/// Collaborators of an [`AnswerEngine`].
pub struct EngineDeps {
    pub registry: Arc<BackendRegistry>,
    pub kb: Arc<dyn KbBackend>,
    pub understanding: Arc<dyn DocumentUnderstanding>,
    pub attachments: AttachmentConfig,
    pub memory: Arc<dyn ConversationMemory>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

/// Shared, cheaply clonable answer engine.
#[derive(Clone)]
pub struct AnswerEngine {
    registry: Arc<BackendRegistry>,
    retrieval: RetrievalCoordinator,
    attachments: Arc<AttachmentExtractor>,
    memory: Arc<dyn ConversationMemory>,
    analytics: Arc<dyn AnalyticsSink>,
    evidence: EvidenceModel,
    pool: WorkerPool,
    cfg: Arc<ContextorConfig>,
}

impl AnswerEngine {
    pub fn new(deps: EngineDeps, cfg: ContextorConfig) -> Self {
        let pool = WorkerPool::new(cfg.worker_pool_size);
        let evidence = EvidenceModel::new(deps.registry.evidence_backend(), pool.clone(), cfg.evidence_timeout);
        Self {
            attachments: Arc::new(AttachmentExtractor::new(
                deps.understanding,
                pool.clone(),
                deps.attachments,
            )),
            retrieval: RetrievalCoordinator::new(deps.kb),
            registry: deps.registry,
            memory: deps.memory,
            analytics: deps.analytics,
            evidence,
            pool,
            cfg: Arc::new(cfg),
        }
    }

    /// Wires every collaborator from environment variables.
    ///
    /// # Errors
    /// Missing generation backends or KB URL, invalid vision config, or an
    /// HTTP client that cannot be built.
    pub fn from_env() -> Result<Self> {
        let cfg = ContextorConfig::from_env();
        let registry = Arc::new(BackendRegistry::from_env()?);

        let rag_cfg = RagConfig::from_env()?;
        let kb: Arc<dyn KbBackend> = Arc::new(HttpKbBackend::new(&rag_cfg)?);

        let attach_cfg = AttachmentConfig::from_env();
        let vision = match config_vision()? {
            Some(vc) => Some(Arc::new(VisionService::new(vc)?)),
            None => {
                warn!("VISION_MODEL is not set; image attachments will be reported as unsupported");
                None
            }
        };
        let downloader = Downloader::new(attach_cfg.timeout, attach_cfg.max_bytes, attach_cfg.allow_private_hosts)?;
        let understanding: Arc<dyn DocumentUnderstanding> = Arc::new(RemoteUnderstanding::new(downloader, vision));

        let analytics: Arc<dyn AnalyticsSink> = match &cfg.analytics_url {
            Some(url) => Arc::new(HttpAnalyticsSink::new(url.clone())?),
            None => Arc::new(LogAnalyticsSink),
        };
        let memory: Arc<dyn ConversationMemory> = Arc::new(InMemoryMemory::new(cfg.history_ttl));

        info!(
            pool = cfg.worker_pool_size,
            code_search = cfg.code_search_root.is_some(),
            qa_fast_path = cfg.qa_fast_path,
            "answer engine ready"
        );
        Ok(Self::new(
            EngineDeps {
                registry,
                kb,
                understanding,
                attachments: attach_cfg,
                memory,
                analytics,
            },
            cfg,
        ))
    }

    pub fn config(&self) -> &ContextorConfig {
        &self.cfg
    }

    /// Single-shot answer. The run continues to completion (and is persisted)
    /// even if the caller stops waiting.
    pub async fn answer(&self, req: AnswerRequest) -> Result<RagAnswer> {
        let ask = self.resolve(&req)?;
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.drive(ask, Emitter::silent(), Generation::Call).await });
        let (outcome, agg) = handle.await.map_err(services::PoolError::from)?;
        match outcome {
            Ok(()) | Err(Stop::Cancelled) => Ok(RagAnswer {
                answer: agg.answer,
                documents: agg.retrieval.documents.iter().map(|d| d.document.clone()).collect(),
            }),
            Err(Stop::Failed(e)) => Err(e),
        }
    }

    /// Ordered thinking events ending in `answer_final` (or a terminal `error`).
    ///
    /// Dropping the stream cancels the run; finalization still happens.
    pub fn stream_events(&self, req: AnswerRequest) -> Result<EventStream> {
        let ask = self.resolve(&req)?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(ask, Emitter::to(tx), Generation::Stream).await;
        });
        Ok(EventStream { rx })
    }

    /// Answer text deltas only; errors arrive as the last item.
    pub fn stream_plain(&self, req: AnswerRequest) -> Result<PlainStream> {
        Ok(PlainStream {
            events: self.stream_events(req)?,
        })
    }

    fn resolve(&self, req: &AnswerRequest) -> Result<Ask> {
        let question = req.question.trim();
        if question.is_empty() {
            return Err(ContextorError::InvalidRequest("question is required".into()));
        }
        Ok(Ask {
            question: question.to_string(),
            session: req.resolve_session(),
            deep: req.resolve_deep_thinking(),
            scope_mode: req.resolve_scope_mode(),
            top_k: req.resolve_top_k(self.cfg.default_top_k),
            min_score: req.resolve_min_score(self.cfg.default_min_score),
            model: req.resolve_model().map(str::to_string),
            vision_model: req.resolve_vision_model().map(str::to_string),
            file_urls: self.attachments.select_urls(&req.resolve_file_urls(usize::MAX)),
            run_id: run_id(),
        })
    }

    /// Runs the request and finalizes it, whatever the outcome.
    async fn drive(&self, ask: Ask, emitter: Emitter, mode: Generation) -> (std::result::Result<(), Stop>, Aggregate) {
        let span = info_span!("answer", run = %ask.run_id, session = %ask.session.id, deep = ask.deep);
        async move {
            let started = Instant::now();
            let ask = Arc::new(ask);
            let mut agg = Aggregate::default();

            let outcome = match emitter.closed_signal() {
                Some(tx) => tokio::select! {
                    r = self.run(&ask, &emitter, mode, &mut agg) => r,
                    _ = tx.closed() => Err(Stop::Cancelled),
                },
                None => self.run(&ask, &emitter, mode, &mut agg).await,
            };

            self.finalize(&ask, &agg, &outcome, started).await;
            if let Err(Stop::Failed(e)) = &outcome {
                // Receiver may be gone already; nothing else to do then.
                let _ = emitter.emit(events::error(&error_summary(&e.to_string(), ERROR_MESSAGE_CHARS))).await;
            }
            (outcome, agg)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        ask: &Arc<Ask>,
        em: &Emitter,
        mode: Generation,
        agg: &mut Aggregate,
    ) -> std::result::Result<(), Stop> {
        let p = self.start_pipeline(ask.clone());
        let flags = p.plan.flags;
        debug!(steps = ?p.plan.steps, "roadmap planned");

        em.emit(events::start()).await?;
        if ask.deep {
            em.emit(events::roadmap(&p.plan)).await?;
            em.emit(events::deep_mode()).await?;
            if flags.decompose && !p.sub_questions.is_empty() {
                em.emit(events::question_decompose(&p.sub_questions)).await?;
            }
        }
        if p.fetch_files {
            em.emit(events::file_fetch_start(&ask.file_urls)).await?;
            let batch = p.files.clone().await;
            em.emit(events::file_fetch(&batch.items)).await?;
            em.emit(events::file_extract(&batch.items, &batch.insights)).await?;
        }
        if ask.deep {
            em.emit(events::scope_guard(&p.scope_guard.clone().await)).await?;
            if flags.track_correct {
                em.emit(events::track_correct(&p.track.clone().await)).await?;
            }
            if flags.entity_resolve {
                em.emit(events::entity_resolve(&p.entities.clone().await.terms)).await?;
            }
            let code = if flags.code_search {
                let code = p.code_search.clone().await;
                em.emit(events::code_search(&code)).await?;
                Some(code)
            } else {
                None
            };
            let sanitized = p.sanitized.clone().await;
            em.emit(events::privacy_sanitize(sanitized.hits)).await?;
            em.emit(events::evidence(&sanitized, code.as_ref())).await?;
        }

        let history = p.history.clone().await;
        em.emit(events::history(&history)).await?;
        let retrieval = p.retrieval.clone().await;
        em.emit(events::rag(&retrieval)).await?;
        agg.retrieval = retrieval.clone();

        if ask.deep {
            if retrieval.has_documents() {
                em.emit(events::kb_docs(&retrieval)).await?;
            }
            if let Some(compressed) = p.compressed.clone().await {
                em.emit(events::context_compress(&compressed)).await?;
            }
            if flags.key_info {
                em.emit(events::key_info(&p.key_info.clone().await)).await?;
            }
            if flags.evidence_gap {
                em.emit(events::evidence_gap(&p.gap.clone().await)).await?;
            }
            if flags.answer_outline {
                em.emit(events::answer_outline(&p.outline.clone().await)).await?;
            }
            if flags.assumption_check {
                em.emit(events::assumption_check(&p.assumption.clone().await)).await?;
            }
            if flags.action_plan {
                em.emit(events::action_plan(&p.action_plan.clone().await)).await?;
            }
            if let Some(report) = p.conflict.clone().await {
                em.emit(events::conflict_detect(&report)).await?;
            }
        }

        let prepared = p.prepared.clone().await;
        let meta = PromptMeta {
            question: &ask.question,
            scope_mode: ask.scope_mode,
            deep_thinking: ask.deep,
        };
        let prompt = build_prompt(meta, &prepared, &history);
        let (key, backend) = self.registry.resolve(ask.model.as_deref());
        agg.model = backend.model().to_string();
        agg.prompt = prompt.clone();
        agg.no_evidence = prepared.no_evidence();
        debug!(backend = key, prompt_chars = prompt.chars().count(), "prompt ready");

        if let Some(hit) = self.fast_path_answer(ask, &prepared) {
            info!(candidate = %hit.0, "answered from QA fast path");
            agg.answer = hit.1.clone();
            em.emit(events::answer_delta(&hit.1)).await?;
        } else {
            self.generate(backend, &prompt, mode, em, agg).await?;
        }

        if flags.verify {
            let issues = p.conflict.clone().await.map(|c| c.issues).unwrap_or_default();
            em.emit(events::answer_verify(&verify(prepared.no_evidence(), &issues))).await?;
        }
        em.emit(events::answer_final(&agg.answer)).await?;
        Ok(())
    }

    async fn generate(
        &self,
        backend: Arc<dyn GenerationBackend>,
        prompt: &str,
        mode: Generation,
        em: &Emitter,
        agg: &mut Aggregate,
    ) -> std::result::Result<(), Stop> {
        match mode {
            Generation::Call => {
                agg.answer = backend.call(SYSTEM_PROMPT, prompt).await.map_err(ContextorError::from)?;
                em.emit(events::answer_delta(&agg.answer)).await?;
            }
            Generation::Stream => {
                let mut deltas = backend.stream(SYSTEM_PROMPT, prompt).await.map_err(ContextorError::from)?;
                while let Some(delta) = deltas.next().await {
                    let delta = delta.map_err(ContextorError::from)?;
                    if delta.is_empty() {
                        continue;
                    }
                    agg.answer.push_str(&delta);
                    em.emit(events::answer_delta(&delta)).await?;
                }
            }
        }
        Ok(())
    }

    /// `(candidate id, answer)` when the QA fast path is enabled and applies.
    fn fast_path_answer(&self, ask: &Ask, prepared: &PreparedContext) -> Option<(String, String)> {
        if !self.cfg.qa_fast_path || !prepared.scope_guard.scoped {
            return None;
        }
        qa::fast_path(&prepared.qa_candidates, ask.min_score).map(|c| (c.id.clone(), c.full_answer.clone()))
    }

    async fn finalize(
        &self,
        ask: &Ask,
        agg: &Aggregate,
        outcome: &std::result::Result<(), Stop>,
        started: Instant,
    ) {
        let persist = match outcome {
            Ok(()) => true,
            Err(Stop::Cancelled) => !agg.answer.is_empty() || self.cfg.persist_empty_on_cancel,
            Err(Stop::Failed(_)) => !agg.answer.is_empty(),
        };
        if persist {
            if let Err(e) = self
                .memory
                .append_turn(&ask.session.id, &ask.question, &agg.answer, ask.session.temporary)
                .await
            {
                warn!(error = %e, "failed to persist turn");
            }
        }

        let error = match outcome {
            Err(Stop::Failed(e)) => Some(error_summary(&e.to_string(), ERROR_MESSAGE_CHARS)),
            _ => None,
        };
        let failed = error.is_some();
        let summary = RunSummary::build(RunRecord {
            session_id: &ask.session.id,
            model: &agg.model,
            top_k: ask.top_k,
            min_score: ask.min_score,
            no_evidence: agg.no_evidence,
            latency: started.elapsed(),
            error,
            question: &ask.question,
            answer: &agg.answer,
            prompt: &agg.prompt,
            retrieval: &agg.retrieval,
        });
        info!(
            latency_ms = summary.latency_ms,
            answer_chars = agg.answer.chars().count(),
            cancelled = matches!(outcome, Err(Stop::Cancelled)),
            failed,
            persisted = persist,
            "run finished"
        );

        let sink = self.analytics.clone();
        let write = async move { sink.record(&summary).await };
        if failed {
            if tokio::time::timeout(ANALYTICS_BUDGET, write).await.is_err() {
                warn!("analytics write timed out");
            }
        } else {
            tokio::spawn(write.in_current_span());
        }
    }

    /// Starts every stage the plan needs; nothing is awaited here.
    fn start_pipeline(&self, ask: Arc<Ask>) -> Pipeline {
        let plan = roadmap::plan(&ask.question, ask.scope_mode, ask.deep, !ask.file_urls.is_empty());
        let flags = plan.flags;
        let sub_questions = if flags.decompose {
            decompose(&ask.question)
        } else {
            Vec::new()
        };
        let fetch_files = flags.use_files && !ask.file_urls.is_empty();
        let mut tasks = StageTasks::default();

        let files: Stage<Arc<FileBatch>> = if fetch_files {
            let (x, ask) = (self.attachments.clone(), ask.clone());
            tasks.spawn("files", async move {
                let items = x.extract_all(&ask.file_urls, ask.vision_model.as_deref()).await;
                let insights = FileInsights::from_items(&items);
                Arc::new(FileBatch { items, insights })
            })
        } else {
            StageTasks::ready(Arc::default())
        };

        let scope_guard: Stage<ScopeVerdict> = if ask.deep {
            let (m, ask) = (self.evidence.clone(), ask.clone());
            tasks.spawn("scope_guard", async move { scope_guard::check(&m, &ask.question).await })
        } else {
            StageTasks::ready(ScopeVerdict::assumed())
        };

        let first: Stage<Arc<RetrievalResult>> = if flags.use_kb {
            let (e, ask) = (self.clone(), ask.clone());
            let queries = if sub_questions.len() > 1 {
                sub_questions.clone()
            } else {
                vec![ask.question.clone()]
            };
            tasks.spawn("kb_search", async move { Arc::new(e.first_search(&ask, queries).await) })
        } else {
            StageTasks::ready(Arc::new(RetrievalResult::empty(ask.question.clone())))
        };

        let entities: Stage<Arc<EntityTerms>> = if flags.entity_resolve {
            let (m, ask, files) = (self.evidence.clone(), ask.clone(), files.clone());
            tasks.spawn("entity_resolve", async move {
                let batch = files.await;
                Arc::new(entity_resolve::resolve(&m, &ask.question, &batch.insights.prompt_context).await)
            })
        } else {
            StageTasks::ready(Arc::default())
        };

        let retrieval: Stage<Arc<RetrievalResult>> = if flags.use_kb {
            let (e, ask) = (self.clone(), ask.clone());
            let (first, files, entities) = (first.clone(), files.clone(), entities.clone());
            tasks.spawn("kb_refine", async move {
                let (first, batch, ents) = futures::join!(first, files, entities);
                let terms = uniq_limit(
                    batch.insights.retrieval_terms.iter().chain(ents.terms.iter()),
                    REFINE_TERMS,
                );
                e.refine(&ask, first, terms).await
            })
        } else {
            first.clone()
        };

        let sanitized: Stage<Arc<SanitizedEvidence>> = {
            let (pool, retrieval, files) = (self.pool.clone(), retrieval.clone(), files.clone());
            tasks.spawn("privacy_sanitize", async move {
                let (r, batch) = futures::join!(retrieval, files);
                let run = pool.run_blocking(move || {
                    SanitizedEvidence::from_sources(&r.context, &batch.insights.prompt_context)
                });
                match run.await {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        warn!(error = %e, "sanitizer job failed; dropping evidence");
                        Arc::default()
                    }
                }
            })
        };

        let code_search: Stage<CodeSearch> = if flags.code_search {
            let (pool, root, ask) = (self.pool.clone(), self.cfg.code_search_root.clone(), ask.clone());
            tasks.spawn("code_search", async move { search_code(&pool, root, &ask.question).await })
        } else {
            StageTasks::ready(CodeSearch::default())
        };

        let compressed: Stage<Option<String>> = if flags.compress {
            let (m, ask) = (self.evidence.clone(), ask.clone());
            let (retrieval, files, sanitized) = (retrieval.clone(), files.clone(), sanitized.clone());
            tasks.spawn("context_compress", async move {
                let (r, batch, s) = futures::join!(retrieval, files, sanitized);
                if r.context.trim().is_empty() && !batch.insights.has_content {
                    debug!("no evidence to compress");
                    return None;
                }
                Some(compress::compress(&m, &ask.question, &s.context, &s.file_text).await)
            })
        } else {
            StageTasks::ready(None)
        };

        let key_info: Stage<Arc<Vec<String>>> = if flags.key_info {
            let sanitized = sanitized.clone();
            tasks.spawn("key_info", async move {
                Arc::new(extract_key_info(&sanitized.await.combined(), MAX_KEY_INFO))
            })
        } else {
            StageTasks::ready(Arc::default())
        };

        let gap: Stage<EvidenceGap> = if flags.evidence_gap {
            let (ask, sanitized, key_info) = (ask.clone(), sanitized.clone(), key_info.clone());
            tasks.spawn("evidence_gap", async move {
                let (s, k) = futures::join!(sanitized, key_info);
                evidence_gap::check(&ask.question, &s.combined(), &k)
            })
        } else {
            StageTasks::ready(EvidenceGap::default())
        };

        let outline: Stage<AnswerOutline> = if flags.answer_outline {
            let (ask, key_info) = (ask.clone(), key_info.clone());
            tasks.spawn("answer_outline", async move { outline::outline(&ask.question, &key_info.await) })
        } else {
            StageTasks::ready(AnswerOutline::default())
        };

        let assumption: Stage<AssumptionCheck> = if flags.assumption_check {
            let (ask, sanitized) = (ask.clone(), sanitized.clone());
            tasks.spawn("assumption_check", async move {
                assumption::check(&ask.question, &sanitized.await.combined())
            })
        } else {
            StageTasks::ready(AssumptionCheck::default())
        };

        let action_plan: Stage<ActionPlan> = if flags.action_plan {
            let (ask, key_info) = (ask.clone(), key_info.clone());
            tasks.spawn("action_plan", async move { action_plan::plan(&ask.question, &key_info.await) })
        } else {
            StageTasks::ready(ActionPlan::default())
        };

        let conflict: Stage<Option<ConflictReport>> = if flags.conflict_detect {
            let sanitized = sanitized.clone();
            tasks.spawn("conflict_detect", async move {
                let s = sanitized.await;
                if s.context.trim().is_empty() || s.file_text.trim().is_empty() {
                    return None;
                }
                Some(conflict::detect(&s.context, &s.file_text))
            })
        } else {
            StageTasks::ready(None)
        };

        let prepared: Stage<Arc<PreparedContext>> = {
            let (coordinator, ask) = (self.retrieval.clone(), ask.clone());
            let inputs = (
                retrieval.clone(),
                files.clone(),
                sanitized.clone(),
                scope_guard.clone(),
                entities.clone(),
                compressed.clone(),
                key_info.clone(),
            );
            let derived = (gap.clone(), outline.clone(), assumption.clone(), action_plan.clone());
            tasks.spawn("prepare", async move {
                let (retrieval, batch, sanitized, guard, ents, compressed, key_info) =
                    futures::join!(inputs.0, inputs.1, inputs.2, inputs.3, inputs.4, inputs.5, inputs.6);
                let (gap, outline, assumptions, action_plan) =
                    futures::join!(derived.0, derived.1, derived.2, derived.3);
                let compressed = compressed.unwrap_or_default();
                Arc::new(assemble(ContextParts {
                    question: &ask.question,
                    deep_thinking: ask.deep,
                    scope_mode: ask.scope_mode,
                    retrieval: &retrieval,
                    kb_out_of_scope: coordinator.is_out_of_scope(&retrieval),
                    sanitized: &sanitized,
                    files_have_content: batch.insights.has_content,
                    scope_guard: &guard,
                    entity_terms: &ents.terms,
                    compressed: &compressed,
                    key_info: &key_info,
                    gap: &gap,
                    outline: &outline,
                    assumptions: &assumptions,
                    action_plan: &action_plan,
                }))
            })
        };

        let track: Stage<TrackCorrection> = if flags.track_correct {
            let (ask, prepared) = (ask.clone(), prepared.clone());
            let summary = plan.steps.join(" -> ");
            tasks.spawn("track_correct", async move {
                let ctx = prepared.await;
                let status = if !ctx.scope_guard.scoped {
                    "out_of_scope"
                } else if ctx.has_any_ref {
                    ""
                } else {
                    "no_evidence"
                };
                track_correct::check(&ask.question, status, &summary)
            })
        } else {
            StageTasks::ready(TrackCorrection::default())
        };

        let history: Stage<String> = {
            let (memory, ask) = (self.memory.clone(), ask.clone());
            tasks.spawn("history", async move {
                match memory.load_history(&ask.session.id).await {
                    Ok(h) => render_recent(&h, HISTORY_MESSAGES),
                    Err(e) => {
                        warn!(error = %e, "history unavailable");
                        String::new()
                    }
                }
            })
        };

        debug!(stages = tasks.len(), "pipeline started");
        Pipeline {
            plan,
            sub_questions,
            fetch_files,
            files,
            scope_guard,
            entities,
            retrieval,
            sanitized,
            code_search,
            compressed,
            key_info,
            gap,
            outline,
            assumption,
            action_plan,
            conflict,
            prepared,
            track,
            history,
            _tasks: tasks,
        }
    }

    /// First KB pass: merged multi-query search for decomposed questions.
    async fn first_search(&self, ask: &Ask, queries: Vec<String>) -> RetrievalResult {
        let coordinator = self.retrieval.clone();
        let (question, k, min) = (ask.question.clone(), ask.top_k, ask.min_score);
        let job = async move {
            if queries.len() > 1 {
                coordinator.search_multi(&queries, k, min).await
            } else {
                coordinator.search(&question, k, min).await
            }
        };
        match self.pool.run(job).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(error = %e, "kb search failed; continuing without KB evidence");
                RetrievalResult::empty(ask.question.clone())
            }
            Err(e) => {
                warn!(error = %e, "kb search job failed");
                RetrievalResult::empty(ask.question.clone())
            }
        }
    }

    async fn refine(&self, ask: &Ask, first: Arc<RetrievalResult>, terms: Vec<String>) -> Arc<RetrievalResult> {
        if !self.retrieval.should_refine(&first, &terms) {
            return first;
        }
        let coordinator = self.retrieval.clone();
        let (question, k, min) = (ask.question.clone(), ask.top_k, ask.min_score);
        let base = (*first).clone();
        match self
            .pool
            .run(async move { coordinator.refine(&question, base, &terms, k, min).await })
            .await
        {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!(error = %e, "refinement job failed; keeping first result");
                first
            }
        }
    }
}

/// Term budget for refinement: file retrieval terms plus entity terms.
const REFINE_TERMS: usize = attachments::insights::MAX_RETRIEVAL_TERMS + entity_resolve::MAX_ENTITY_TERMS;

async fn search_code(pool: &WorkerPool, root: Option<PathBuf>, question: &str) -> CodeSearch {
    let query = question.to_string();
    match pool
        .run_blocking(move || code_search::search(root.as_deref(), &query))
        .await
    {
        Ok(found) => found,
        Err(e) => CodeSearch {
            status: format!("search_failed: {}", error_summary(&e.to_string(), ERROR_MESSAGE_CHARS)),
            snippets: Vec::new(),
        },
    }
}

/// Resolved, immutable view of one request.
struct Ask {
    question: String,
    session: ResolvedSession,
    deep: bool,
    scope_mode: ScopeMode,
    top_k: usize,
    min_score: f64,
    model: Option<String>,
    vision_model: Option<String>,
    file_urls: Vec<String>,
    run_id: String,
}

#[derive(Debug, Default)]
struct FileBatch {
    items: Vec<FileItem>,
    insights: FileInsights,
}

struct Pipeline {
    plan: RoadmapPlan,
    sub_questions: Vec<String>,
    fetch_files: bool,
    files: Stage<Arc<FileBatch>>,
    scope_guard: Stage<ScopeVerdict>,
    entities: Stage<Arc<EntityTerms>>,
    retrieval: Stage<Arc<RetrievalResult>>,
    sanitized: Stage<Arc<SanitizedEvidence>>,
    code_search: Stage<CodeSearch>,
    compressed: Stage<Option<String>>,
    key_info: Stage<Arc<Vec<String>>>,
    gap: Stage<EvidenceGap>,
    outline: Stage<AnswerOutline>,
    assumption: Stage<AssumptionCheck>,
    action_plan: Stage<ActionPlan>,
    conflict: Stage<Option<ConflictReport>>,
    prepared: Stage<Arc<PreparedContext>>,
    track: Stage<TrackCorrection>,
    history: Stage<String>,
    /// Aborts unfinished stages when the run ends early.
    _tasks: StageTasks,
}

/// What the run produced so far; read by finalization.
#[derive(Default)]
struct Aggregate {
    answer: String,
    prompt: String,
    model: String,
    no_evidence: bool,
    retrieval: Arc<RetrievalResult>,
}

#[derive(Clone, Copy)]
enum Generation {
    Call,
    Stream,
}

enum Stop {
    Failed(ContextorError),
    Cancelled,
}

impl From<ContextorError> for Stop {
    fn from(e: ContextorError) -> Self {
        Stop::Failed(e)
    }
}

/// Event sink of one run; silent for single-shot answers.
struct Emitter {
    tx: Option<mpsc::Sender<ThinkingEvent>>,
}

impl Emitter {
    fn silent() -> Self {
        Self { tx: None }
    }

    fn to(tx: mpsc::Sender<ThinkingEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn closed_signal(&self) -> Option<mpsc::Sender<ThinkingEvent>> {
        self.tx.clone()
    }

    async fn emit(&self, event: ThinkingEvent) -> std::result::Result<(), Stop> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| Stop::Cancelled),
            None => Ok(()),
        }
    }
}

/// Ordered thinking events of one run.
pub struct EventStream {
    rx: mpsc::Receiver<ThinkingEvent>,
}

impl Stream for EventStream {
    type Item = ThinkingEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Answer deltas of one run; a terminal `error` event becomes an `Err`.
pub struct PlainStream {
    events: EventStream,
}

impl Stream for PlainStream {
    type Item = std::result::Result<String, String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(ev) = futures::ready!(self.events.poll_next_unpin(cx)) else {
                return Poll::Ready(None);
            };
            match ev.stage.as_str() {
                "answer_delta" => {
                    if let Some(text) = ev.payload.as_str() {
                        return Poll::Ready(Some(Ok(text.to_string())));
                    }
                }
                "error" => {
                    let msg = ev.payload["message"].as_str().unwrap_or("generation failed");
                    return Poll::Ready(Some(Err(msg.to_string())));
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ai_llm_service::GenerationBackend;
    use attachments::{AttachmentError, Understanding};
    use rag_store::{KbDocument, ScoredDocument};

    use super::*;
    use crate::tools::testing::Scripted;

    /// Returns the same result for every query, optionally after a delay.
    struct StaticKb {
        result: RetrievalResult,
        delay: Duration,
    }

    impl KbBackend for StaticKb {
        fn search<'a>(
            &'a self,
            query: &'a str,
            _top_k: usize,
            _min_score: f64,
        ) -> rag_store::BoxFuture<'a, rag_store::Result<RetrievalResult>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(RetrievalResult {
                    question: query.to_string(),
                    ..self.result.clone()
                })
            })
        }
    }

    struct DownKb;

    impl KbBackend for DownKb {
        fn search<'a>(
            &'a self,
            _query: &'a str,
            _top_k: usize,
            _min_score: f64,
        ) -> rag_store::BoxFuture<'a, rag_store::Result<RetrievalResult>> {
            Box::pin(async { Err(rag_store::RagError::Config("kb unreachable".into())) })
        }
    }

    fn empty_kb() -> Arc<dyn KbBackend> {
        Arc::new(StaticKb {
            result: RetrievalResult::default(),
            delay: Duration::ZERO,
        })
    }

    fn kb_with(content: &str, doc_type: &str, score: f64) -> Arc<dyn KbBackend> {
        Arc::new(StaticKb {
            result: RetrievalResult {
                question: String::new(),
                documents: vec![ScoredDocument {
                    document: KbDocument {
                        id: "42".into(),
                        doc_type: Some(doc_type.into()),
                        content: content.into(),
                    },
                    score,
                }],
                context: content.into(),
            },
            delay: Duration::ZERO,
        })
    }

    struct Unreadable;

    impl DocumentUnderstanding for Unreadable {
        fn understand<'a>(
            &'a self,
            _url: &'a str,
            _mime_hint: Option<&'a str>,
            _vision_model: Option<&'a str>,
        ) -> attachments::understanding::BoxFuture<'a, attachments::errors::Result<Understanding>> {
            Box::pin(async { Err(AttachmentError::Unsupported("image/png".into())) })
        }
    }

    #[derive(Default)]
    struct Recorder {
        runs: Mutex<Vec<RunSummary>>,
    }

    impl AnalyticsSink for Recorder {
        fn record<'a>(&'a self, summary: &'a RunSummary) -> rag_store::BoxFuture<'a, ()> {
            Box::pin(async move { self.runs.lock().unwrap().push(summary.clone()) })
        }
    }

    struct Harness {
        engine: AnswerEngine,
        memory: Arc<InMemoryMemory>,
        analytics: Arc<Recorder>,
    }

    fn harness(backend: Arc<Scripted>, kb: Arc<dyn KbBackend>, cfg: ContextorConfig) -> Harness {
        let backend: Arc<dyn GenerationBackend> = backend;
        let registry = BackendRegistry::new(vec![("scripted".to_string(), backend)], None).unwrap();
        let memory = Arc::new(InMemoryMemory::new(Duration::from_secs(60)));
        let analytics = Arc::new(Recorder::default());
        let engine = AnswerEngine::new(
            EngineDeps {
                registry: Arc::new(registry),
                kb,
                understanding: Arc::new(Unreadable),
                attachments: AttachmentConfig::default(),
                memory: memory.clone(),
                analytics: analytics.clone(),
            },
            cfg,
        );
        Harness {
            engine,
            memory,
            analytics,
        }
    }

    fn request(question: &str, session: &str) -> AnswerRequest {
        let mut req = AnswerRequest::new(question);
        req.session_id = Some(session.into());
        req
    }

    #[tokio::test]
    async fn deep_stream_emits_stages_in_order() {
        let backend = Scripted::streaming(&["Hello", ", ", "world"]);
        let h = harness(backend, empty_kb(), ContextorConfig::default());
        let mut req = request("Yuqi's retry code in the loader", "s-deep");
        req.deep_thinking = Some(true);
        req.file_urls = vec!["https://files.example.com/shot.png".into()];

        let events: Vec<ThinkingEvent> = h.engine.stream_events(req).unwrap().collect().await;
        let mut stages: Vec<&str> = events.iter().map(|e| e.stage.as_str()).collect();
        stages.dedup();
        assert_eq!(
            stages,
            [
                "start",
                "roadmap",
                "deep_mode",
                "file_fetch_start",
                "file_fetch",
                "file_extract",
                "scope_guard",
                "entity_resolve",
                "code_search",
                "privacy_sanitize",
                "evidence",
                "history",
                "rag",
                "answer_delta",
                "answer_verify",
                "answer_final",
            ]
        );

        let streamed: String = events
            .iter()
            .filter(|e| e.stage == "answer_delta")
            .filter_map(|e| e.payload.as_str())
            .collect();
        assert_eq!(streamed, "Hello, world");
        assert_eq!(events.last().unwrap().payload, "Hello, world");

        let fetched = &events[4].payload["files"][0];
        assert!(fetched["error"].as_str().unwrap().starts_with("extract_failed"));
        assert_eq!(events[8].payload["status"], "code_root_not_configured");
        assert_eq!(events[16].payload["supportScore"], 0.2);
    }

    #[tokio::test]
    async fn blocking_answer_returns_documents_and_persists_turn() {
        let backend = Scripted::replying("Yuqi works on search.");
        let kb = kb_with("Yuqi works on the search team.", "note", 0.92);
        let h = harness(backend.clone(), kb, ContextorConfig::default());

        let out = h.engine.answer(request("Where does Yuqi work?", "s-block")).await.unwrap();
        assert_eq!(out.answer, "Yuqi works on search.");
        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0].id, "42");
        assert!(backend.last_prompt().contains("Yuqi works on the search team."));

        let history = h.memory.load_history("s-block").await.unwrap();
        assert_eq!(render_recent(&history, 2), "user: Where does Yuqi work?\nassistant: Yuqi works on search.");
    }

    #[tokio::test]
    async fn kb_outage_degrades_to_no_evidence() {
        let backend = Scripted::replying("ok");
        let h = harness(backend.clone(), Arc::new(DownKb), ContextorConfig::default());

        let out = h.engine.answer(request("Where does Yuqi work?", "s-down")).await.unwrap();
        assert_eq!(out.answer, "ok");
        assert!(out.documents.is_empty());
        assert!(backend.last_prompt().starts_with("Meta: noEvidence=true, kbWeak=true"));
        assert_eq!(h.memory.load_history("s-down").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_question_is_rejected_up_front() {
        let h = harness(Scripted::replying("x"), empty_kb(), ContextorConfig::default());
        let err = h.engine.answer(AnswerRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, ContextorError::InvalidRequest(_)));
        assert!(h.engine.stream_events(AnswerRequest::new("")).is_err());
    }

    #[tokio::test]
    async fn generation_failure_ends_with_error_event() {
        let h = harness(Scripted::failing(), empty_kb(), ContextorConfig::default());
        let events: Vec<ThinkingEvent> = h
            .engine
            .stream_events(request("Where does Yuqi work?", "s-err"))
            .unwrap()
            .collect()
            .await;

        let last = events.last().unwrap();
        assert_eq!(last.stage, "error");
        assert!(last.payload["message"].as_str().unwrap().contains("generation failed"));
        assert!(events.iter().all(|e| e.stage != "answer_final"));

        // Failed runs are recorded before the error event goes out.
        let runs = h.analytics.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].error.is_some());
        drop(runs);
        assert!(h.memory.load_history("s-err").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_stream_yields_deltas_then_error() {
        let h = harness(Scripted::streaming(&["a", "b"]), empty_kb(), ContextorConfig::default());
        let chunks: Vec<_> = h.engine.stream_plain(request("hi", "s-plain")).unwrap().collect().await;
        assert_eq!(chunks, [Ok("a".to_string()), Ok("b".to_string())]);

        let h = harness(Scripted::failing(), empty_kb(), ContextorConfig::default());
        let chunks: Vec<_> = h.engine.stream_plain(request("hi", "s-plain")).unwrap().collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_err());
    }

    #[tokio::test]
    async fn dropped_stream_still_finalizes() {
        let kb: Arc<dyn KbBackend> = Arc::new(StaticKb {
            result: RetrievalResult::default(),
            delay: Duration::from_secs(30),
        });
        let cfg = ContextorConfig {
            persist_empty_on_cancel: true,
            ..ContextorConfig::default()
        };
        let h = harness(Scripted::replying("never"), kb, cfg);

        let mut stream = h.engine.stream_events(request("slow one", "s-cancel")).unwrap();
        assert_eq!(stream.next().await.unwrap().stage, "start");
        drop(stream);

        let mut stored = Vec::new();
        for _ in 0..100 {
            stored = h.memory.load_history("s-cancel").await.unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(render_recent(&stored, 2), "user: slow one\nassistant: ");
    }

    #[tokio::test]
    async fn strong_qa_match_skips_generation() {
        let content = "question: Where does Yuqi work now?\nanswer: At the search lab.";
        let cfg = ContextorConfig {
            qa_fast_path: true,
            ..ContextorConfig::default()
        };
        let backend = Scripted::replying("generated");
        let h = harness(backend.clone(), kb_with(content, "chat_qa", 0.9), cfg);

        let mut req = request("Where does Yuqi work now?", "s-qa");
        req.min_score = Some(0.5);
        let out = h.engine.answer(req).await.unwrap();
        assert_eq!(out.answer, "At the search lab.");
        assert_eq!(backend.calls(), 0);
    }
}
