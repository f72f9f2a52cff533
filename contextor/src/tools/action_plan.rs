use serde::Serialize;

use crate::roadmap::{Capability, classify};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionPlan {
    pub style: &'static str,
    pub steps: Vec<String>,
}

impl Default for ActionPlan {
    fn default() -> Self {
        Self {
            style: "bullets",
            steps: Vec::new(),
        }
    }
}

/// Template plan for the dominant intent (debug, then strategy, then learning).
pub fn plan(question: &str, key_info: &[String]) -> ActionPlan {
    let caps = classify(question);
    let (style, steps): (&'static str, &[&str]) = if caps.contains(&Capability::Debug) {
        (
            "steps",
            &[
                "Reproduce the issue with minimal input.",
                "Inspect logs/metrics around the failure.",
                "Isolate the root cause and propose a fix.",
                "Validate the fix with tests or checks.",
            ],
        )
    } else if caps.contains(&Capability::Strategy) {
        (
            "bullets",
            &[
                "Clarify objectives and success metrics.",
                "Identify constraints and resources.",
                "Prioritize initiatives and milestones.",
                "Define owners and timeline.",
            ],
        )
    } else if caps.contains(&Capability::Learn) {
        (
            "bullets",
            &[
                "Set a learning goal and scope.",
                "Pick curated resources or examples.",
                "Practice with small exercises.",
                "Review and iterate based on feedback.",
            ],
        )
    } else {
        (
            "bullets",
            &[
                "Summarize the goal.",
                "List key inputs or evidence needed.",
                "Outline the primary response steps.",
                "Confirm next actions or open questions.",
            ],
        )
    };

    let mut out = Vec::with_capacity(steps.len() + 1);
    if !key_info.is_empty() {
        out.push("Review key facts and constraints.".to_string());
    }
    out.extend(steps.iter().map(|s| s.to_string()));
    ActionPlan { style, steps: out }
}
