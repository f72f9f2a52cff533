//! Prompt assembly: system message, budgeted sections in a fixed order.
//!
//! Every section is cut to its own char budget before concatenation, so one
//! oversized source never pushes the others out of the prompt.

use serde::Deserialize;
use serde_json::Value;
use services::text::truncate_chars;

use crate::{api_types::ScopeMode, context::PreparedContext};

/// Canonical refusal used when the owner-only scope has no grounding.
pub const OUT_OF_SCOPE_REPLY: &str = "I can only answer Yuqi's related stuff.";

pub const SYSTEM_PROMPT: &str = "You are Mr Pot, Yuqi's assistant and a general-purpose helpful AI. \
Reply in the user's language. Be friendly and concise; never make up facts. \
For questions about Yuqi (blog, projects, work, background) use only the evidence in CTX, FILE and HIS; \
if that evidence does not contain the answer, do not guess. \
If a Yuqi-mode question lacks evidence, reply exactly: \"I can only answer Yuqi's related stuff.\" \
Lines marked 【回答】 in the evidence are strong evidence. \
When the instruction or the meta line says the question is out of scope in owner-only mode, \
reply exactly with: I can only answer Yuqi's related stuff. \
General questions that are not about Yuqi are answered normally.";

pub const MAX_FILE_CHARS: usize = 3500;
pub const MAX_CONTEXT_CHARS: usize = 7000;
pub const MAX_HISTORY_CHARS: usize = 2500;
const MAX_TERMS_CHARS: usize = 600;
const MAX_SCOPE_NOTE_CHARS: usize = 600;
const MAX_LIST_SECTION_CHARS: usize = 1200;
const MAX_QA_CHARS: usize = 1800;
const QA_QUESTION_CHARS: usize = 140;
const QA_ANSWER_CHARS: usize = 220;
const MAX_LOG_ROWS: usize = 8;
const LOG_QUESTION_CHARS: usize = 160;
const LOG_ANSWER_CHARS: usize = 220;

/// Request-level knobs echoed in the prompt.
#[derive(Clone, Copy, Debug)]
pub struct PromptMeta<'a> {
    pub question: &'a str,
    pub scope_mode: ScopeMode,
    pub deep_thinking: bool,
}

/// User message for the generator.
pub fn build_prompt(meta: PromptMeta<'_>, ctx: &PreparedContext, history: &str) -> String {
    let guard = &ctx.scope_guard;
    let mut out = format!(
        "Meta: noEvidence={}, kbWeak={}, scopeScoped={}, deepThinking={}, scopeMode={}\n\n",
        ctx.no_evidence(),
        ctx.out_of_scope_kb,
        guard.scoped,
        meta.deep_thinking,
        meta.scope_mode
    );

    push_line(&mut out, "Scope note: ", &guard.reason, MAX_SCOPE_NOTE_CHARS);
    push_line(&mut out, "Rewrite hint: ", &guard.rewrite_hint, MAX_SCOPE_NOTE_CHARS);
    if !guard.scoped {
        match meta.scope_mode {
            ScopeMode::YuqiOnly => {
                out.push_str(&format!("Instruction: reply exactly with {OUT_OF_SCOPE_REPLY}.\n\n"))
            }
            ScopeMode::PrivacySafe => out.push_str(
                "Instruction: refuse to provide private contact details; suggest safe public info topics.\n\n",
            ),
        }
    } else if ctx.no_evidence() {
        out.push_str(&format!(
            "Instruction: no evidence was found; if the question is about Yuqi, reply exactly with {OUT_OF_SCOPE_REPLY}\n\n"
        ));
    }

    let file_section = truncate_chars(ctx.file_text.trim(), MAX_FILE_CHARS);
    if !file_section.is_empty() {
        out.push_str(&file_section);
        out.push_str("\n\n");
    }
    if !ctx.entity_terms.is_empty() {
        push_line(
            &mut out,
            "Entity/keyword terms: ",
            &ctx.entity_terms.join(", "),
            MAX_TERMS_CHARS,
        );
    }

    if meta.deep_thinking {
        push_list(&mut out, "Key info candidates:", &ctx.key_info);
        push_list(&mut out, "Potential evidence gaps:", &ctx.gap.missing_facts);
        push_list(&mut out, "Follow-up questions:", &ctx.gap.follow_ups);
        push_list(
            &mut out,
            &format!("Answer outline (style={}):", ctx.outline.style),
            &ctx.outline.sections,
        );
        push_list(
            &mut out,
            &format!("Assumptions (risk={}):", ctx.assumptions.risk),
            &ctx.assumptions.assumptions,
        );
        push_list(
            &mut out,
            &format!("Action plan (style={}):", ctx.action_plan.style),
            &ctx.action_plan.steps,
        );
    }

    if !ctx.qa_candidates.is_empty() {
        let mut qa = String::from("QA References (hint only; do not copy blindly):\n");
        for (i, c) in ctx.qa_candidates.iter().enumerate() {
            qa.push_str(&format!(
                "- #{} (score={}, match={}) ",
                i + 1,
                round3(c.score),
                c.match_label()
            ));
            let q = truncate_chars(&c.question, QA_QUESTION_CHARS);
            if !q.trim().is_empty() {
                qa.push_str(&format!("Q: {q} | "));
            }
            qa.push_str(&format!("A: {}\n", truncate_chars(&c.answer, QA_ANSWER_CHARS)));
        }
        out.push_str(&truncate_chars(&qa, MAX_QA_CHARS));
        out.push_str("\n\n");
    }

    let context = compact_log_context(&ctx.retrieval.context, MAX_CONTEXT_CHARS);
    let compressed = truncate_chars(ctx.compressed_context.trim(), MAX_CONTEXT_CHARS);
    if meta.deep_thinking && !compressed.is_empty() {
        out.push_str(&format!("CTX_COMPRESSED:\n{compressed}\n\n"));
        if !context.trim().is_empty() {
            out.push_str(&format!("CTX_RAW:\n{context}\n\n"));
        }
    } else {
        out.push_str(&format!("CTX:\n{context}\n\n"));
    }
    out.push_str(&format!(
        "HIS:\n{}\n\nQ:\n{}\n",
        truncate_chars(history, MAX_HISTORY_CHARS),
        meta.question
    ));
    out
}

fn push_line(out: &mut String, label: &str, value: &str, budget: usize) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    out.push_str(label);
    out.push_str(&truncate_chars(value, budget));
    out.push_str("\n\n");
}

fn push_list(out: &mut String, header: &str, items: &[String]) {
    let lines: Vec<&str> = items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if lines.is_empty() {
        return;
    }
    let mut section = format!("{header}\n");
    for line in lines {
        section.push_str("- ");
        section.push_str(line);
        section.push('\n');
    }
    out.push_str(&truncate_chars(&section, MAX_LIST_SECTION_CHARS));
    out.push('\n');
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRow {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    out_of_scope: bool,
}

/// Context that is a JSON dump of Q&A log rows is rendered compactly,
/// newest first; anything else is truncated as plain text.
pub fn compact_log_context(raw: &str, max_chars: usize) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if !(s.starts_with('[') || s.starts_with('{')) {
        return truncate_chars(s, max_chars);
    }

    let rows: Vec<Value> = match serde_json::from_str::<Value>(s) {
        Ok(Value::Array(items)) => items,
        Ok(obj @ Value::Object(_)) => vec![obj],
        _ => return truncate_chars(s, max_chars),
    };

    let mut kept: Vec<LogRow> = rows
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|v| serde_json::from_value::<LogRow>(v).ok())
        .filter(|r| !r.out_of_scope)
        .filter(|r| r.answer.trim() != OUT_OF_SCOPE_REPLY)
        .filter(|r| !(r.question.trim().is_empty() && r.answer.trim().is_empty()))
        .collect();
    kept.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut out = String::from("Log rows:\n");
    for r in kept.iter().take(MAX_LOG_ROWS) {
        let id = match &r.id {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        out.push_str(&format!(
            "- (id={id}, t={}) Q: {} A: {}\n",
            r.created_at,
            truncate_chars(&r.question, LOG_QUESTION_CHARS),
            truncate_chars(&r.answer, LOG_ANSWER_CHARS)
        ));
    }
    truncate_chars(&out, max_chars)
}
