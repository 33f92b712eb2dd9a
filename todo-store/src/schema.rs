//! Schema statements, executed one by one on connect.

pub const SQLITE_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT UNIQUE,
    title TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    description TEXT,
    due_date TEXT
)";

pub const POSTGRES_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    id BIGSERIAL PRIMARY KEY,
    client_id UUID UNIQUE,
    title TEXT NOT NULL,
    completed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    description TEXT,
    due_date DATE
)";

/// Same syntax in both dialects.
pub const CREATE_UNIQUE_TITLE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS todos_title_key ON todos (title)";

pub const DROP_UNIQUE_TITLE_INDEX: &str = "DROP INDEX IF EXISTS todos_title_key";

/// Statements to run for the given uniqueness setting.
pub fn statements(table: &'static str, unique_titles: bool) -> [&'static str; 2] {
    let index = if unique_titles {
        CREATE_UNIQUE_TITLE_INDEX
    } else {
        DROP_UNIQUE_TITLE_INDEX
    };
    [table, index]
}
