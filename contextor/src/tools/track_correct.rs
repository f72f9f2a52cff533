use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCorrection {
    pub on_track: bool,
    pub hint: &'static str,
    pub status: &'static str,
}

impl Default for TrackCorrection {
    fn default() -> Self {
        Self {
            on_track: true,
            hint: "Proceed with the planned steps.",
            status: "ok",
        }
    }
}

/// Progress check against the roadmap; the first failing rule wins.
///
/// `status` is the pipeline state so far (`out_of_scope`, `no_evidence` or empty).
pub fn check(question: &str, status: &str, roadmap_summary: &str) -> TrackCorrection {
    let off = |hint, status| TrackCorrection {
        on_track: false,
        hint,
        status,
    };
    if question.trim().is_empty() {
        return off("Ask the user to provide a concrete question.", "empty_question");
    }
    let status = status.to_lowercase();
    if status.contains("no_evidence") {
        return off("Ask for more context or files to ground the answer.", "no_evidence");
    }
    if status.contains("error") {
        return off("Retry the step or fall back to a simpler response.", "error_detected");
    }
    if roadmap_summary.trim().is_empty() {
        return off("Clarify the goal and pick a minimal set of steps.", "missing_roadmap");
    }
    TrackCorrection::default()
}
