use uuid::Uuid;

/// Prefix marking a session id generated for an anonymous request.
pub const TEMP_SESSION_PREFIX: &str = "temp-";

/// Fresh id for a request that arrived without a session.
pub fn temp_session_id() -> String {
    format!("{TEMP_SESSION_PREFIX}{}", Uuid::new_v4())
}

/// Random id used to correlate log lines of one answer run.
pub fn run_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_prefixed_and_unique() {
        let a = temp_session_id();
        let b = temp_session_id();
        assert!(a.starts_with(TEMP_SESSION_PREFIX));
        assert_ne!(a, b);
        assert_eq!(a.len(), TEMP_SESSION_PREFIX.len() + 36);
    }
}
