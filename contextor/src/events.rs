//! Thinking-event payloads, one constructor per stage.

use attachments::{FileInsights, FileItem};
use chrono::Utc;
use rag_store::RetrievalResult;
use serde_json::{Value, json};
use services::text::{truncate_chars, uniq_limit};

use crate::{
    api_types::ThinkingEvent,
    roadmap::RoadmapPlan,
    sanitize::{SanitizeHits, SanitizedEvidence},
    tools::{
        action_plan::ActionPlan, assumption::AssumptionCheck, code_search::CodeSearch,
        conflict::ConflictReport, evidence_gap::EvidenceGap, outline::AnswerOutline,
        scope_guard::ScopeVerdict, track_correct::TrackCorrection, verify::Verification,
    },
};

const EVIDENCE_PREVIEW_CHARS: usize = 1000;
const HISTORY_PREVIEW_CHARS: usize = 500;
const DOC_PREVIEW_CHARS: usize = 200;
const COMPRESS_PREVIEW_CHARS: usize = 900;
const FILE_PREVIEW_CHARS: usize = 400;
const FILE_KEYWORDS: usize = 8;
const FILE_QUERIES: usize = 4;

fn event(stage: &str, label: &str, payload: Value) -> ThinkingEvent {
    ThinkingEvent::new(stage, label, payload)
}

pub fn start() -> ThinkingEvent {
    event("start", "Init", json!({ "ts": Utc::now().timestamp_millis() }))
}

pub fn roadmap(plan: &RoadmapPlan) -> ThinkingEvent {
    event(
        "roadmap",
        "Roadmap plan",
        json!({ "steps": plan.steps, "skips": plan.skips, "rationale": plan.rationale }),
    )
}

pub fn deep_mode() -> ThinkingEvent {
    event("deep_mode", "Thinking", json!({ "enabled": true }))
}

pub fn question_decompose(sub_questions: &[String]) -> ThinkingEvent {
    event(
        "question_decompose",
        "Question decomposition",
        json!({ "subQuestions": sub_questions }),
    )
}

pub fn file_fetch_start(urls: &[String]) -> ThinkingEvent {
    event(
        "file_fetch_start",
        "Fetching files",
        json!({ "count": urls.len(), "urls": urls }),
    )
}

pub fn file_fetch(files: &[FileItem]) -> ThinkingEvent {
    let files: Vec<Value> = files
        .iter()
        .map(|f| json!({ "url": f.url, "name": f.name, "mime": f.mime, "error": f.error }))
        .collect();
    event("file_fetch", "Fetched", json!({ "files": files }))
}

pub fn file_extract(files: &[FileItem], insights: &FileInsights) -> ThinkingEvent {
    let per_file: Vec<Value> = files
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "mime": f.mime,
                "keywords": uniq_limit(&f.keywords, FILE_KEYWORDS),
                "queries": uniq_limit(&f.queries, FILE_QUERIES),
                "preview": truncate_chars(&f.key_text, FILE_PREVIEW_CHARS),
                "error": f.error,
            })
        })
        .collect();
    event(
        "file_extract",
        "Extracted files' key info",
        json!({
            "files": per_file,
            "keywords": insights.progress_terms,
            "excerpts": insights.prompt_excerpt,
        }),
    )
}

pub fn scope_guard(v: &ScopeVerdict) -> ThinkingEvent {
    event("scope_guard", "Scope guard", json!(v))
}

pub fn track_correct(t: &TrackCorrection) -> ThinkingEvent {
    event("track_correct", "Track correction", json!(t))
}

pub fn entity_resolve(terms: &[String]) -> ThinkingEvent {
    event("entity_resolve", "Entity resolution", json!({ "terms": terms }))
}

pub fn code_search(c: &CodeSearch) -> ThinkingEvent {
    event("code_search", "Code search", json!(c))
}

pub fn privacy_sanitize(hits: SanitizeHits) -> ThinkingEvent {
    event("privacy_sanitize", "Privacy sanitize", json!({ "hits": hits }))
}

/// Combined sanitized evidence, code snippets appended, cut to a preview.
pub fn evidence(sanitized: &SanitizedEvidence, code: Option<&CodeSearch>) -> ThinkingEvent {
    let mut text = sanitized.combined();
    if let Some(c) = code.filter(|c| !c.snippets.is_empty()) {
        text.push_str("\nCODE_SNIPPETS:\n");
        for s in &c.snippets {
            text.push_str(s);
            text.push('\n');
        }
    }
    event(
        "evidence",
        "Sanitized evidence",
        json!({ "preview": truncate_chars(&text, EVIDENCE_PREVIEW_CHARS) }),
    )
}

pub fn history(history: &str) -> ThinkingEvent {
    let payload = if history.trim().is_empty() {
        json!([])
    } else {
        json!([{ "preview": truncate_chars(history, HISTORY_PREVIEW_CHARS) }])
    };
    event("history", "History", payload)
}

pub fn rag(retrieval: &RetrievalResult) -> ThinkingEvent {
    let docs: Vec<Value> = retrieval
        .documents
        .iter()
        .map(|d| {
            json!({
                "id": d.document.id,
                "type": d.document.doc_type,
                "score": d.score,
                "preview": truncate_chars(&d.document.content, DOC_PREVIEW_CHARS),
            })
        })
        .collect();
    event("rag", "Retrieval", Value::Array(docs))
}

pub fn kb_docs(retrieval: &RetrievalResult) -> ThinkingEvent {
    let ids: Vec<&str> = retrieval.documents.iter().map(|d| d.document.id.as_str()).collect();
    event("kb_docs", "KB documents", json!({ "count": ids.len(), "ids": ids }))
}

pub fn context_compress(compressed: &str) -> ThinkingEvent {
    event(
        "context_compress",
        "Compressed context",
        json!({ "preview": truncate_chars(compressed, COMPRESS_PREVIEW_CHARS) }),
    )
}

pub fn key_info(items: &[String]) -> ThinkingEvent {
    event("key_info", "Key info", json!({ "items": items }))
}

pub fn evidence_gap(g: &EvidenceGap) -> ThinkingEvent {
    event("evidence_gap", "Evidence gap check", json!(g))
}

pub fn answer_outline(o: &AnswerOutline) -> ThinkingEvent {
    event("answer_outline", "Answer outline", json!(o))
}

pub fn assumption_check(a: &AssumptionCheck) -> ThinkingEvent {
    event("assumption_check", "Assumption check", json!(a))
}

pub fn action_plan(p: &ActionPlan) -> ThinkingEvent {
    event("action_plan", "Action plan", json!(p))
}

pub fn conflict_detect(c: &ConflictReport) -> ThinkingEvent {
    event("conflict_detect", "Conflict detect", json!(c))
}

pub fn answer_delta(delta: &str) -> ThinkingEvent {
    event("answer_delta", "Generating", Value::String(delta.to_string()))
}

pub fn answer_verify(v: &Verification) -> ThinkingEvent {
    event("answer_verify", "Answer verification", json!(v))
}

pub fn answer_final(answer: &str) -> ThinkingEvent {
    event("answer_final", "Done", Value::String(answer.to_string()))
}

pub fn error(message: &str) -> ThinkingEvent {
    event("error", "Error", json!({ "message": message }))
}

#[cfg(test)]
mod tests {
    use rag_store::{KbDocument, ScoredDocument};

    use super::*;

    #[test]
    fn payload_shapes_use_wire_names() {
        let v = scope_guard(&ScopeVerdict::assumed());
        assert_eq!(v.payload["rewriteHint"], "");
        assert_eq!(v.label, "Scope guard");

        let g = evidence_gap(&EvidenceGap::default());
        assert_eq!(g.payload["status"], "skipped");
        assert!(g.payload["missingFacts"].as_array().is_some());

        let t = track_correct(&TrackCorrection::default());
        assert_eq!(t.payload["onTrack"], true);
    }

    #[test]
    fn rag_and_kb_docs_list_documents() {
        let r = RetrievalResult {
            question: "q".into(),
            documents: vec![ScoredDocument {
                document: KbDocument {
                    id: "7".into(),
                    doc_type: Some("chat_qa".into()),
                    content: "z".repeat(300),
                },
                score: 0.5,
            }],
            context: String::new(),
        };
        let e = rag(&r);
        assert_eq!(e.payload[0]["type"], "chat_qa");
        assert_eq!(e.payload[0]["preview"].as_str().unwrap().chars().count(), 200);
        assert_eq!(kb_docs(&r).payload, json!({"count": 1, "ids": ["7"]}));
    }

    #[test]
    fn evidence_preview_appends_code_snippets() {
        let ev = SanitizedEvidence::from_sources("kb", "file");
        let code = CodeSearch {
            status: "ok".into(),
            snippets: vec!["src/a.rs:\nfn a()".into()],
        };
        let e = evidence(&ev, Some(&code));
        assert_eq!(e.payload["preview"], "kb\nfile\nCODE_SNIPPETS:\nsrc/a.rs:\nfn a()\n");
        assert_eq!(history("").payload, json!([]));
        assert_eq!(answer_delta("hi").payload, Value::String("hi".into()));
    }
}
