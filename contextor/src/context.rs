//! The immutable evidence bundle handed to prompt assembly.

use rag_store::RetrievalResult;

use crate::{
    api_types::ScopeMode,
    qa::{QaCandidate, extract_candidates},
    sanitize::SanitizedEvidence,
    tools::{
        action_plan::ActionPlan, assumption::AssumptionCheck, compress, evidence_gap::EvidenceGap,
        outline::AnswerOutline, scope_guard::ScopeVerdict,
    },
};

/// Everything the prompt needs, assembled once per request.
///
/// `retrieval.context` is the sanitized KB context and `file_text` the
/// sanitized file section.
#[derive(Clone, Debug, Default)]
pub struct PreparedContext {
    pub retrieval: RetrievalResult,
    pub file_text: String,
    pub out_of_scope_kb: bool,
    pub has_any_ref: bool,
    pub scope_guard: ScopeVerdict,
    pub entity_terms: Vec<String>,
    pub compressed_context: String,
    pub key_info: Vec<String>,
    pub gap: EvidenceGap,
    pub outline: AnswerOutline,
    pub assumptions: AssumptionCheck,
    pub action_plan: ActionPlan,
    pub qa_candidates: Vec<QaCandidate>,
}

impl PreparedContext {
    pub fn no_evidence(&self) -> bool {
        !self.has_any_ref
    }
}

/// Stage outputs that feed [`assemble`].
pub struct ContextParts<'a> {
    pub question: &'a str,
    pub deep_thinking: bool,
    pub scope_mode: ScopeMode,
    /// Refined retrieval (raw KB context).
    pub retrieval: &'a RetrievalResult,
    /// Relevance floor verdict on `retrieval`.
    pub kb_out_of_scope: bool,
    pub sanitized: &'a SanitizedEvidence,
    /// At least one attachment produced usable content.
    pub files_have_content: bool,
    pub scope_guard: &'a ScopeVerdict,
    pub entity_terms: &'a [String],
    pub compressed: &'a str,
    pub key_info: &'a [String],
    pub gap: &'a EvidenceGap,
    pub outline: &'a AnswerOutline,
    pub assumptions: &'a AssumptionCheck,
    pub action_plan: &'a ActionPlan,
}

/// Applies the evidence rules:
/// - any KB document, KB context or file content counts as a reference;
/// - in deep mode a rejecting scope guard clears references, usable
///   compressed evidence restores them;
/// - owner-only scope with a rejecting guard always clears them.
pub fn assemble(p: ContextParts<'_>) -> PreparedContext {
    let mut out_of_scope_kb = p.kb_out_of_scope;
    let mut has_any_ref =
        p.files_have_content || p.retrieval.has_documents() || !p.retrieval.context.trim().is_empty();

    if p.deep_thinking {
        if !p.scope_guard.scoped {
            out_of_scope_kb = true;
            has_any_ref = false;
        }
        if compress::is_usable(p.compressed) {
            has_any_ref = true;
        }
    }
    if p.scope_mode == ScopeMode::YuqiOnly && !p.scope_guard.scoped {
        out_of_scope_kb = true;
        has_any_ref = false;
    }

    let retrieval = RetrievalResult {
        question: p.retrieval.question.clone(),
        documents: p.retrieval.documents.clone(),
        context: p.sanitized.context.clone(),
    };
    let qa_candidates = extract_candidates(&retrieval, p.question);
    let compressed_context = if compress::is_usable(p.compressed) {
        p.compressed.trim().to_string()
    } else {
        String::new()
    };

    PreparedContext {
        retrieval,
        file_text: p.sanitized.file_text.clone(),
        out_of_scope_kb,
        has_any_ref,
        scope_guard: p.scope_guard.clone(),
        entity_terms: p.entity_terms.to_vec(),
        compressed_context,
        key_info: p.key_info.to_vec(),
        gap: p.gap.clone(),
        outline: p.outline.clone(),
        assumptions: p.assumptions.clone(),
        action_plan: p.action_plan.clone(),
        qa_candidates,
    }
}
