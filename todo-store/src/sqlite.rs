//! `SQLite` store.
//!
//! Client ids are stored as text and dates as ISO-8601 text.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use todo_sync::domain::{ClientId, NewTodo, Timestamp, Todo, TodoId, TodoPatch};
use todo_sync::service::{ServiceFuture, TodoError, TodoService};

use crate::StoreOptions;
use crate::error::{StoreError, corrupt_row, database_error, is_unique_violation, write_error};
use crate::schema;

const COLUMNS: &str = "id, client_id, title, completed, created_at, description, due_date";

#[derive(Debug, FromRow)]
struct TodoRow {
    id: i64,
    client_id: Option<String>,
    title: String,
    completed: bool,
    created_at: DateTime<Utc>,
    description: Option<String>,
    due_date: Option<NaiveDate>,
}

impl TryFrom<TodoRow> for Todo {
    type Error = TodoError;

    fn try_from(row: TodoRow) -> Result<Self, Self::Error> {
        let id = TodoId::new(row.id);
        let client_id = row
            .client_id
            .map(|raw| raw.parse::<ClientId>())
            .transpose()
            .map_err(|error| corrupt_row(id, error))?;
        Ok(Self {
            id,
            client_id,
            title: row.title,
            completed: row.completed,
            created_at: Timestamp::from_datetime(row.created_at),
            description: row.description,
            due_date: row.due_date,
        })
    }
}

/// Todo store backed by an `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteTodoStore {
    pool: SqlitePool,
    options: StoreOptions,
}

impl SqliteTodoStore {
    /// Opens (creating if missing) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// prepared.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(StoreError::Connection)?;
        tracing::debug!(path = %path.as_ref().display(), "Opened SQLite store");
        Self::with_pool(pool, options).await
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be prepared.
    pub async fn in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        // Every connection to `:memory:` is a separate database, so keep one forever.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await
            .map_err(StoreError::Connection)?;
        Self::with_pool(pool, options).await
    }

    /// Wraps an existing pool, preparing the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be prepared.
    pub async fn with_pool(pool: SqlitePool, options: StoreOptions) -> Result<Self, StoreError> {
        for statement in schema::statements(schema::SQLITE_TABLE, options.unique_titles) {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(StoreError::Schema)?;
        }
        Ok(Self { pool, options })
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Todo>, TodoError> {
        let row: Option<TodoRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM todos WHERE client_id = ?1"))
                .bind(client_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| database_error(&error))?;
        row.map(Todo::try_from).transpose()
    }
}

impl TodoService for SqliteTodoStore {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        async move {
            let rows: Vec<TodoRow> =
                sqlx::query_as(&format!("SELECT {COLUMNS} FROM todos ORDER BY id DESC"))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|error| database_error(&error))?;
            rows.into_iter().map(Todo::try_from).collect()
        }
        .boxed()
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        async move {
            let new_todo = self.options.constraints.validate_new(&new_todo)?;

            if let Some(client_id) = new_todo.client_id
                && let Some(existing) = self.find_by_client_id(client_id).await?
            {
                return Ok(existing);
            }

            let inserted: Result<TodoRow, sqlx::Error> = sqlx::query_as(&format!(
                "INSERT INTO todos (client_id, title, completed, created_at, due_date) \
                 VALUES (?1, ?2, 0, ?3, ?4) RETURNING {COLUMNS}"
            ))
            .bind(new_todo.client_id.map(|client_id| client_id.to_string()))
            .bind(&new_todo.title)
            .bind(Utc::now())
            .bind(new_todo.due_date)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => Todo::try_from(row),
                Err(error) => {
                    // A concurrent create with the same key may have won the race.
                    if let Some(client_id) = new_todo.client_id
                        && is_unique_violation(&error)
                        && let Some(existing) = self.find_by_client_id(client_id).await?
                    {
                        return Ok(existing);
                    }
                    Err(write_error(&error, &new_todo.title))
                }
            }
        }
        .boxed()
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo> {
        async move {
            let patch = self.options.constraints.validate_patch(&patch)?;
            let mut transaction = self
                .pool
                .begin()
                .await
                .map_err(|error| database_error(&error))?;

            let row: Option<TodoRow> =
                sqlx::query_as(&format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"))
                    .bind(id.get())
                    .fetch_optional(&mut *transaction)
                    .await
                    .map_err(|error| database_error(&error))?;
            let mut todo = Todo::try_from(row.ok_or(TodoError::NotFound(id))?)?;
            todo.apply(&patch);

            sqlx::query(
                "UPDATE todos SET title = ?1, completed = ?2, description = ?3, due_date = ?4 \
                 WHERE id = ?5",
            )
            .bind(&todo.title)
            .bind(todo.completed)
            .bind(&todo.description)
            .bind(todo.due_date)
            .bind(id.get())
            .execute(&mut *transaction)
            .await
            .map_err(|error| write_error(&error, &todo.title))?;

            transaction
                .commit()
                .await
                .map_err(|error| database_error(&error))?;
            Ok(todo)
        }
        .boxed()
    }

    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()> {
        async move {
            let result = sqlx::query("DELETE FROM todos WHERE id = ?1")
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(|error| database_error(&error))?;
            if result.rows_affected() == 0 {
                return Err(TodoError::NotFound(id));
            }
            Ok(())
        }
        .boxed()
    }
}
