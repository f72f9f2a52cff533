use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub support_score: f64,
    pub issues: Vec<String>,
}

/// Coarse post-generation support estimate: evidence presence plus conflict issues.
pub fn verify(no_evidence: bool, conflict_issues: &[String]) -> Verification {
    let mut issues = Vec::with_capacity(conflict_issues.len() + 1);
    if no_evidence {
        issues.push("no_evidence".to_string());
    }
    issues.extend(conflict_issues.iter().cloned());
    Verification {
        support_score: if no_evidence { 0.2 } else { 0.7 },
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_and_issues() {
        let v = verify(true, &["Potential mismatch number: KB has 1 while file has 2".into()]);
        assert_eq!(v.support_score, 0.2);
        assert_eq!(v.issues.len(), 2);
        assert_eq!(v.issues[0], "no_evidence");

        let v = verify(false, &[]);
        assert_eq!(v.support_score, 0.7);
        assert!(v.issues.is_empty());
    }
}
