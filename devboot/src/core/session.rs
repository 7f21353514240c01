//! File-synchronization session states and the transition the engine issues.
//!
//! The daemon owns the session; we only look at a just-in-time query result.
//! `Active -> Paused` happens outside this tool and is never issued here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NonExistent,
    Active,
    Paused,
}

/// Transition needed to reach `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Create,
    Resume,
    None,
}

pub fn plan_activation(state: SessionState) -> SessionAction {
    match state {
        SessionState::NonExistent => SessionAction::Create,
        SessionState::Paused => SessionAction::Resume,
        SessionState::Active => SessionAction::None,
    }
}

/// Interpret the output of a session listing.
///
/// A failed listing, or one that names no session, means the session does not
/// exist. Otherwise a `Paused` status marker wins over anything else.
pub fn parse_listing(success: bool, stdout: &str) -> SessionState {
    if !success {
        return SessionState::NonExistent;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        return parse_json_listing(&value);
    }
    let text = stdout.trim();
    if text.is_empty() || text.contains("No synchronization sessions found") {
        return SessionState::NonExistent;
    }
    if text.contains("[Paused]") || text.lines().any(|l| l.trim() == "Paused: Yes") {
        SessionState::Paused
    } else {
        SessionState::Active
    }
}

fn parse_json_listing(value: &serde_json::Value) -> SessionState {
    let sessions = match value {
        serde_json::Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    let Some(session) = sessions.first() else {
        return SessionState::NonExistent;
    };
    if session.get("paused").and_then(|p| p.as_bool()) == Some(true) {
        SessionState::Paused
    } else {
        SessionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_every_state() {
        assert_eq!(plan_activation(SessionState::NonExistent), SessionAction::Create);
        assert_eq!(plan_activation(SessionState::Paused), SessionAction::Resume);
        assert_eq!(plan_activation(SessionState::Active), SessionAction::None);
    }

    #[test]
    fn failed_listing_is_nonexistent() {
        assert_eq!(
            parse_listing(false, "Error: unable to locate requested sessions"),
            SessionState::NonExistent
        );
    }

    #[test]
    fn text_listing() {
        let active = "Name: devboot\nStatus: Watching for changes\n";
        let paused = "Name: devboot\nStatus: [Paused]\n";
        assert_eq!(parse_listing(true, active), SessionState::Active);
        assert_eq!(parse_listing(true, paused), SessionState::Paused);
        assert_eq!(parse_listing(true, "\n"), SessionState::NonExistent);
    }

    #[test]
    fn json_listing() {
        assert_eq!(parse_listing(true, "[]"), SessionState::NonExistent);
        assert_eq!(
            parse_listing(true, r#"[{"name":"devboot","paused":true}]"#),
            SessionState::Paused
        );
        assert_eq!(
            parse_listing(true, r#"[{"name":"devboot","paused":false}]"#),
            SessionState::Active
        );
    }
}
