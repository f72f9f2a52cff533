//! Implicit assumptions behind an answer, with a coarse risk level.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(budget|cost|time|timeline|resource|成本|时间|预算)").expect("resource regex is valid")
});
static DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(data|metric|log|evidence|数据|指标|日志|证据)").expect("data regex is valid")
});
static ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(prod|production|environment|runtime|环境|生产)").expect("env regex is valid")
});

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssumptionCheck {
    pub assumptions: Vec<String>,
    pub risk: &'static str,
}

impl Default for AssumptionCheck {
    fn default() -> Self {
        Self {
            assumptions: Vec::new(),
            risk: "low",
        }
    }
}

pub fn check(question: &str, evidence: &str) -> AssumptionCheck {
    let rules: [(bool, &str); 4] = [
        (
            evidence.trim().is_empty(),
            "Assuming the answer can be given without concrete evidence.",
        ),
        (
            RESOURCE.is_match(question),
            "Assuming acceptable budget/timeline constraints are known.",
        ),
        (
            DATA.is_match(question),
            "Assuming the required data or logs are available.",
        ),
        (
            ENV.is_match(question),
            "Assuming the target environment matches the expected runtime.",
        ),
    ];
    let assumptions: Vec<String> = rules
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, text)| text.to_string())
        .collect();

    let risk = match assumptions.len() {
        0 => "low",
        n if n >= 3 => "high",
        _ => "medium",
    };
    AssumptionCheck { assumptions, risk }
}
