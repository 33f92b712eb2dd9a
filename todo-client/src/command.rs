//! Prompt command parsing.

use chrono::NaiveDate;
use thiserror::Error;

use todo_sync::domain::{ParseTodoIdError, TodoId, normalize_due_date_input, parse_due_date};

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add(String),
    Done(TodoId),
    Undo(TodoId),
    Rename(TodoId, String),
    /// An empty text clears the description.
    Describe(TodoId, String),
    /// `None` clears the due date.
    Due(TodoId, Option<NaiveDate>),
    Remove(TodoId),
    Refresh,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    InvalidId(#[from] ParseTodoIdError),

    #[error("{0}")]
    InvalidDate(String),
}

/// Parses a prompt line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns `CommandError` for unknown commands, missing arguments, bad ids
/// or bad dates.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, rest) = split_word(line);

    let command = match name {
        "ls" | "list" => Command::List,
        "add" => Command::Add(required_text(rest, "add <title>")?),
        "done" => Command::Done(id_only(rest, "done <id>")?),
        "undo" => Command::Undo(id_only(rest, "undo <id>")?),
        "rename" => {
            let (id, title) = id_and_text(rest, "rename <id> <title>")?;
            if title.is_empty() {
                return Err(CommandError::Usage("rename <id> <title>"));
            }
            Command::Rename(id, title)
        }
        "describe" => {
            let (id, text) = id_and_text(rest, "describe <id> [text]")?;
            Command::Describe(id, text)
        }
        "due" => {
            let (id, date) = id_and_text(rest, "due <id> <YYYYMMDD|YYYY-MM-DD|->")?;
            Command::Due(id, due_date(&date)?)
        }
        "rm" | "delete" => Command::Remove(id_only(rest, "rm <id>")?),
        "refresh" => Command::Refresh,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn required_text(input: &str, usage: &'static str) -> Result<String, CommandError> {
    if input.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(input.to_string())
    }
}

fn id_only(input: &str, usage: &'static str) -> Result<TodoId, CommandError> {
    let (id, rest) = split_word(input);
    if id.is_empty() || !rest.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(id.parse()?)
}

fn id_and_text(input: &str, usage: &'static str) -> Result<(TodoId, String), CommandError> {
    let (id, rest) = split_word(input);
    if id.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok((id.parse()?, rest.to_string()))
}

fn due_date(input: &str) -> Result<Option<NaiveDate>, CommandError> {
    match input {
        "" => Err(CommandError::Usage("due <id> <YYYYMMDD|YYYY-MM-DD|->")),
        "-" => Ok(None),
        _ => parse_due_date(&normalize_due_date_input(input))
            .map(Some)
            .map_err(|error| CommandError::InvalidDate(error.message)),
    }
}
