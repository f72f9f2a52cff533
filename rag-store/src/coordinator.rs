//! Retrieval coordination on top of a [`KbBackend`].
//!
//! - `search` / `search_multi`: single and merged multi-query searches.
//! - `refine`: second search with an expanded query when the first one is weak,
//!   merged with the first result and reranked by lexical term overlap.
//! - `is_out_of_scope`: relevance floor check used by the prompt builder.

use std::{cmp::Ordering, collections::HashSet, sync::Arc};

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::{
    backend::KbBackend,
    errors::Result,
    record::{RetrievalResult, ScoredDocument},
};

/// Thresholds that drive refinement and the out-of-scope decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrievalPolicy {
    /// Top score below this marks the KB result as out of scope.
    pub relevance_floor: f64,
    /// Top score below this triggers a refinement search.
    pub refine_threshold: f64,
    /// Budget for characters of terms appended to the expanded query.
    pub max_term_chars: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            relevance_floor: 0.15,
            refine_threshold: 0.25,
            max_term_chars: 480,
        }
    }
}

#[derive(Clone)]
pub struct RetrievalCoordinator {
    kb: Arc<dyn KbBackend>,
    policy: RetrievalPolicy,
}

impl RetrievalCoordinator {
    pub fn new(kb: Arc<dyn KbBackend>) -> Self {
        Self::with_policy(kb, RetrievalPolicy::default())
    }

    pub fn with_policy(kb: Arc<dyn KbBackend>, policy: RetrievalPolicy) -> Self {
        Self { kb, policy }
    }

    pub fn policy(&self) -> RetrievalPolicy {
        self.policy
    }

    /// Delegates one search to the KB backend.
    pub async fn search(&self, query: &str, top_k: usize, min_score: f64) -> Result<RetrievalResult> {
        self.kb.search(query, top_k, min_score).await
    }

    /// Runs every non-blank query concurrently and merges the results in query order.
    ///
    /// Documents are de-duplicated by id (first seen wins); non-blank contexts are
    /// joined with newlines. The merged question is the first query. A failing
    /// sub-query is skipped; the call only fails when every query failed.
    #[instrument(skip_all, fields(queries = queries.len(), top_k))]
    pub async fn search_multi(
        &self,
        queries: &[String],
        top_k: usize,
        min_score: f64,
    ) -> Result<RetrievalResult> {
        let Some(first) = queries.first() else {
            return Ok(RetrievalResult::empty(""));
        };

        let active: Vec<&str> = queries
            .iter()
            .map(String::as_str)
            .filter(|q| !q.trim().is_empty())
            .collect();

        let results = join_all(active.iter().map(|q| self.kb.search(q, top_k, min_score))).await;

        let mut merged = RetrievalResult::empty(first.clone());
        let mut seen: HashSet<String> = HashSet::new();
        let mut ctx = String::new();
        let mut failures = Vec::new();
        for (query, result) in active.iter().zip(results) {
            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(query = %query, error = %e, "sub-query failed; skipping");
                    failures.push(e);
                    continue;
                }
            };
            for doc in result.documents {
                if seen.insert(doc.document.id.clone()) {
                    merged.documents.push(doc);
                }
            }
            if !result.context.trim().is_empty() {
                ctx.push_str(&result.context);
                ctx.push('\n');
            }
        }
        if failures.len() == active.len() && !failures.is_empty() {
            return Err(failures.swap_remove(0));
        }
        merged.context = ctx;
        debug!(docs = merged.documents.len(), "multi-query merge done");
        Ok(merged)
    }

    /// True when `terms` exist and the first result is empty or below the refine threshold.
    pub fn should_refine(&self, first: &RetrievalResult, terms: &[String]) -> bool {
        if terms.is_empty() {
            return false;
        }
        match first.top_score() {
            None => true,
            Some(top) => top < self.policy.refine_threshold,
        }
    }

    /// `question | term | term …`, adding terms until the term-char budget is spent.
    pub fn expanded_query(&self, question: &str, terms: &[String]) -> String {
        let mut out = question.to_string();
        let mut added = 0usize;
        for term in terms.iter().filter(|t| !t.trim().is_empty()) {
            if added >= self.policy.max_term_chars {
                break;
            }
            out.push_str(" | ");
            out.push_str(term);
            added += term.chars().count();
        }
        out
    }

    /// Refines a weak first result.
    ///
    /// Returns `first` unchanged when no refinement is needed, when the expanded
    /// query equals the question, or when the second search fails.
    #[instrument(skip_all, fields(terms = terms.len(), top_k))]
    pub async fn refine(
        &self,
        question: &str,
        first: RetrievalResult,
        terms: &[String],
        top_k: usize,
        min_score: f64,
    ) -> RetrievalResult {
        if !self.should_refine(&first, terms) {
            return first;
        }
        let expanded = self.expanded_query(question, terms);
        if expanded == question {
            return first;
        }

        match self.kb.search(&expanded, top_k, min_score).await {
            Ok(second) => {
                let context = if second.context.trim().is_empty() {
                    first.context.clone()
                } else {
                    second.context.clone()
                };
                let mut docs = merge_by_id(first.documents, second.documents);
                rerank(&mut docs, terms);
                docs.truncate(top_k.max(1));
                debug!(docs = docs.len(), "refined retrieval");
                RetrievalResult {
                    question: question.to_string(),
                    documents: docs,
                    context,
                }
            }
            Err(e) => {
                warn!(error = %e, "refinement search failed; keeping first result");
                first
            }
        }
    }

    /// No documents, or the top score is under the relevance floor.
    pub fn is_out_of_scope(&self, result: &RetrievalResult) -> bool {
        match result.top_score() {
            None => true,
            Some(top) => top < self.policy.relevance_floor,
        }
    }
}

/// Appends `extra` to `base`, skipping ids already present.
pub fn merge_by_id(base: Vec<ScoredDocument>, extra: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
    let mut seen: HashSet<String> = base.iter().map(|d| d.document.id.clone()).collect();
    let mut out = base;
    for doc in extra {
        if seen.insert(doc.document.id.clone()) {
            out.push(doc);
        }
    }
    out
}

/// Sorts by term overlap (case-insensitive containment count) desc, then score desc.
pub fn rerank(docs: &mut [ScoredDocument], terms: &[String]) {
    let lowered: Vec<String> = terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    let overlap = |d: &ScoredDocument| {
        let text = d.document.content.to_lowercase();
        lowered.iter().filter(|t| text.contains(t.as_str())).count()
    };

    docs.sort_by(|a, b| {
        overlap(b)
            .cmp(&overlap(a))
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
    });
}
