// Thread messages posted by the bridge.

pub fn new_session(name: &str) -> String {
    format!("*[{name}]* New Claude Code session")
}

pub fn reconnected(name: &str) -> String {
    format!("*[{name}]* Reconnected")
}

pub fn renamed(old_name: &str, new_name: &str) -> String {
    format!("*[{new_name}]* Renamed from _{old_name}_")
}

pub fn closed(name: &str) -> String {
    format!("*[{name}]* Session closed")
}

pub fn notification(name: &str, message: &str) -> String {
    format!("*[{name}]* {message}")
}

pub fn finished(name: &str, message: &str) -> String {
    if message.is_empty() {
        format!("*[{name}]* Claude finished")
    } else {
        format!("*[{name}]* Claude finished:\n{message}")
    }
}

pub fn sent(name: &str, keys: &str) -> String {
    format!("Sent to {name}: `{keys}`")
}

pub fn send_failed(pane_handle: &str, error: &str) -> String {
    format!("Failed to send to pane {pane_handle}: {error}")
}

pub fn disconnected(name: &str, session: &str) -> String {
    format!(
        "*[{name}]* This session is disconnected, so the reply was not delivered. \
         Reopen the `{name}` pane in tmux session `{session}` to reconnect."
    )
}

/// First 80 chars of `message`, for log lines.
pub fn preview(message: &str) -> String {
    if message.chars().count() > 80 {
        let head: String = message.chars().take(80).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_with_and_without_message() {
        assert_eq!(finished("api", ""), "*[api]* Claude finished");
        assert_eq!(finished("api", "done"), "*[api]* Claude finished:\ndone");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 83);
        assert!(p.ends_with("..."));
    }
}
