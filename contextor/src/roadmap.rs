//! Roadmap planning: classifies the question and toggles optional steps.
//!
//! Classification is an ordered table of `(capability, pattern)` pairs; every
//! matching row contributes its capability. The plan is a pure function of
//! `(question, scope mode, deep thinking, has files)` and never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::api_types::ScopeMode;

/// Question length (chars) from which a deep question is decomposed.
const DECOMPOSE_MIN_CHARS: usize = 80;
const DECOMPOSE_MIN_SEPARATORS: usize = 2;
const DECOMPOSE_MIN_QUESTION_MARKS: usize = 2;

/// Signal detected in the question text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Mentions the assistant's owner.
    Owner,
    CommonSense,
    Code,
    Debug,
    Strategy,
    Learn,
    HowTo,
    Compare,
    Why,
}

static CLASSIFIERS: LazyLock<Vec<(Capability, Regex)>> = LazyLock::new(|| {
    [
        (Capability::Owner, r"(?i)(yuqi|郭宇琦|于琪|郭瑜琦)"),
        (Capability::CommonSense, r"(?i)(what|why|how|explain|define|什么|解释|为什么|怎么)"),
        (
            Capability::Code,
            r"(?i)(code|bug|stacktrace|traceback|exception|api|endpoint|class|method|java|spring|yaml|config|代码)",
        ),
        (Capability::Debug, r"(?i)(debug|error|issue|fix|错误|问题|修复)"),
        (Capability::Strategy, r"(?i)(strategy|plan|roadmap|策略|规划)"),
        (Capability::Learn, r"(?i)(learn|study|practice|学习|练习)"),
        (Capability::HowTo, r"(?i)(how to|guide|tutorial|steps|procedure|怎么|如何|教程|步骤)"),
        (Capability::Compare, r"(?i)(compare|difference|vs\.?|versus|对比|比较|区别)"),
        (Capability::Why, r"(?i)(why|reason|cause|为什么|原因)"),
    ]
    .into_iter()
    .map(|(cap, pat)| (cap, Regex::new(pat).expect("classifier regex is valid")))
    .collect()
});

static CLAUSE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，;；。\n]").expect("separator regex is valid"));

/// Capabilities found in `question`, in table order.
pub fn classify(question: &str) -> Vec<Capability> {
    CLASSIFIERS
        .iter()
        .filter(|(_, re)| re.is_match(question))
        .map(|(cap, _)| *cap)
        .collect()
}

/// Enabled optional steps of one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFlags {
    pub use_kb: bool,
    pub use_files: bool,
    pub decompose: bool,
    pub entity_resolve: bool,
    pub compress: bool,
    pub key_info: bool,
    pub code_search: bool,
    pub evidence_gap: bool,
    pub answer_outline: bool,
    pub assumption_check: bool,
    pub action_plan: bool,
    pub track_correct: bool,
    pub conflict_detect: bool,
    pub verify: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoadmapPlan {
    pub steps: Vec<&'static str>,
    pub skips: Vec<&'static str>,
    pub rationale: Vec<&'static str>,
    #[serde(skip)]
    pub flags: PlanFlags,
}

/// Plans the request. Non-deep requests always get the fixed minimal plan.
pub fn plan(question: &str, scope_mode: ScopeMode, deep_thinking: bool, has_files: bool) -> RoadmapPlan {
    if !deep_thinking {
        return minimal_plan(has_files);
    }

    let q = question.trim();
    let caps = classify(q);
    let has = |c: Capability| caps.contains(&c);

    let mentions_owner = has(Capability::Owner);
    let common_sense = has(Capability::CommonSense) && !mentions_owner;

    let use_kb = !common_sense;
    let use_files = has_files && !common_sense;
    let decompose = q.chars().count() >= DECOMPOSE_MIN_CHARS
        || CLAUSE_SEPARATOR.find_iter(q).count() >= DECOMPOSE_MIN_SEPARATORS
        || q.chars().filter(|c| matches!(c, '?' | '？')).count() >= DECOMPOSE_MIN_QUESTION_MARKS;

    let strategy = has(Capability::Strategy);
    let debug = has(Capability::Debug);
    let learn = has(Capability::Learn);
    let how_to = has(Capability::HowTo);
    let compare = has(Capability::Compare);

    let evidence_gap = how_to || compare || has(Capability::Why);
    let answer_outline = how_to || compare || learn;
    let action_plan = debug || strategy || learn || how_to;

    let flags = PlanFlags {
        use_kb,
        use_files,
        decompose,
        entity_resolve: use_kb,
        compress: use_kb || use_files,
        key_info: evidence_gap || answer_outline || action_plan,
        code_search: has(Capability::Code),
        evidence_gap,
        answer_outline,
        assumption_check: debug || strategy,
        action_plan,
        track_correct: decompose || strategy,
        conflict_detect: use_kb && use_files,
        verify: true,
    };

    let mut out = RoadmapPlan {
        flags,
        ..RoadmapPlan::default()
    };

    out.steps.push("scope_guard");
    for (step, enabled, reason) in optional_steps(&flags, has_files) {
        match (enabled, reason) {
            (true, _) => out.steps.push(step),
            (false, Some(reason)) => {
                out.skips.push(step);
                out.rationale.push(reason);
            }
            (false, None) => {}
        }
    }

    if scope_mode == ScopeMode::YuqiOnly && !mentions_owner {
        out.rationale.push("YUQI_ONLY mode -> out of scope unless explicitly about Yuqi");
    }
    out
}

/// `(step, enabled, reason when disabled)` in execution order.
///
/// `privacy_sanitize` always runs; a disabled `file_fetch` is only reported
/// when files were attached.
fn optional_steps(f: &PlanFlags, has_files: bool) -> Vec<(&'static str, bool, Option<&'static str>)> {
    vec![
        (
            "question_decompose",
            f.decompose,
            Some("short single-part question -> no decomposition"),
        ),
        ("kb_search", f.use_kb, Some("common_sense_question -> skip KB")),
        (
            "file_fetch",
            f.use_files,
            has_files.then_some("common_sense_question -> skip files"),
        ),
        (
            "entity_resolve",
            f.entity_resolve,
            Some("entity resolve only when KB retrieval is needed"),
        ),
        ("privacy_sanitize", true, None),
        ("context_compress", f.compress, Some("no evidence to compress")),
        (
            "key_info",
            f.key_info,
            Some("key info only feeds gap check, outline or action plan"),
        ),
        ("code_search", f.code_search, Some("question not code-related")),
        (
            "evidence_gap",
            f.evidence_gap,
            Some("no how-to/compare/why intent -> skip gap check"),
        ),
        (
            "answer_outline",
            f.answer_outline,
            Some("no how-to/compare/learn intent -> skip outline"),
        ),
        (
            "assumption_check",
            f.assumption_check,
            Some("no debug/strategy intent -> skip assumption check"),
        ),
        (
            "action_plan",
            f.action_plan,
            Some("no actionable intent -> skip action plan"),
        ),
        (
            "track_correct",
            f.track_correct,
            Some("single-part question without strategy intent -> skip track correction"),
        ),
        (
            "conflict_detect",
            f.conflict_detect,
            Some("conflict detection requires both KB and file evidence"),
        ),
        ("answer_verify", f.verify, None),
    ]
}

/// Fixed plan for non-deep requests: no skips, no rationale.
pub fn minimal_plan(has_files: bool) -> RoadmapPlan {
    let mut steps = vec!["scope_guard", "kb_search"];
    if has_files {
        steps.push("file_fetch");
    }
    steps.push("privacy_sanitize");

    RoadmapPlan {
        steps,
        skips: Vec::new(),
        rationale: Vec::new(),
        flags: PlanFlags {
            use_kb: true,
            use_files: has_files,
            ..PlanFlags::default()
        },
    }
}
