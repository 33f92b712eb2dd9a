//! Text rendering for the prompt.

use std::fmt::Write;

use todo_sync::cache::TodoEntry;

pub const HELP: &str = "\
Commands:
  ls                               show the list
  add <title>                      add a todo
  done <id> | undo <id>            mark complete / incomplete
  rename <id> <title>              change the title
  describe <id> [text]             set the description (empty clears)
  due <id> <YYYYMMDD|YYYY-MM-DD|->  set or clear the due date
  rm <id>                          delete a todo
  refresh                          reload from the backend
  help                             show this text
  quit                             leave";

/// Renders the list, one todo per line. Entries the backend has not
/// acknowledged yet show `*` in place of their id.
pub fn render_list(entries: &[TodoEntry]) -> String {
    if entries.is_empty() {
        return "No todos yet.".to_string();
    }

    let width = entries
        .iter()
        .filter_map(|entry| entry.id().map(|id| id.to_string().len()))
        .max()
        .unwrap_or(1);

    let mut output = String::new();
    for entry in entries {
        let id = entry.id().map_or_else(|| "*".to_string(), |id| id.to_string());
        let mark = if entry.completed { 'x' } else { ' ' };
        let _ = write!(output, "[{mark}] {id:>width$}  {}", entry.title);
        if let Some(due_date) = entry.due_date {
            let _ = write!(output, "  (due {due_date})");
        }
        if entry.is_pending() {
            output.push_str("  saving...");
        }
        output.push('\n');
        if let Some(description) = &entry.description {
            let _ = writeln!(output, "    {:width$}  {description}", "");
        }
    }
    output.pop();
    output
}
