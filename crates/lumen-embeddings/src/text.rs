//! Source-text and key construction for each collection.

use uuid::Uuid;

/// Status word appended to task text.
pub fn task_status(completed: bool) -> &'static str {
    if completed { "completed" } else { "pending" }
}

/// Text embedded for a task: its title followed by its status.
pub fn task_source_text(task_text: &str, completed: bool) -> String {
    format!("{} {}", task_text.trim(), task_status(completed))
}

/// Fresh, unique key for a content record.
pub fn new_content_key() -> String {
    format!("content_{}", Uuid::now_v7())
}

/// Key of a profile record: one per user and version.
pub fn profile_key(user_id: i64, profile_version: i64) -> String {
    format!("{user_id}:{profile_version}")
}

/// Trim and cap `text` at `max_chars` characters.
///
/// Truncation counts Unicode scalar values, never splits one, and always
/// yields the same prefix for the same input. Returns `None` when nothing
/// is left after trimming.
pub fn prepare_input(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(trimmed[..cut].to_string()),
        None => Some(trimmed.to_string()),
    }
}
