const MAX_EVIDENCE_LENGTH: usize = 200;

/// Shorten response excerpts kept as oracle evidence.
pub fn truncate_evidence(evidence: &str) -> String {
    if evidence.chars().count() <= MAX_EVIDENCE_LENGTH {
        evidence.to_string()
    } else {
        let head: String = evidence.chars().take(MAX_EVIDENCE_LENGTH).collect();
        format!("{}... [truncated]", head)
    }
}
