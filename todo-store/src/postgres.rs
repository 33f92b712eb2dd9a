//! `PostgreSQL` store.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE todos (
//!     id BIGSERIAL PRIMARY KEY,
//!     client_id UUID UNIQUE,
//!     title TEXT NOT NULL,
//!     completed BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     description TEXT,
//!     due_date DATE
//! );
//! CREATE UNIQUE INDEX todos_title_key ON todos (title); -- when titles are unique
//! ```

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use todo_sync::domain::{ClientId, NewTodo, Timestamp, Todo, TodoId, TodoPatch};
use todo_sync::service::{ServiceFuture, TodoError, TodoService};

use crate::StoreOptions;
use crate::error::{StoreError, database_error, write_error};
use crate::schema;

const COLUMNS: &str = "id, client_id, title, completed, created_at, description, due_date";

#[derive(Debug, FromRow)]
struct TodoRow {
    id: i64,
    client_id: Option<Uuid>,
    title: String,
    completed: bool,
    created_at: DateTime<Utc>,
    description: Option<String>,
    due_date: Option<NaiveDate>,
}

impl From<TodoRow> for Todo {
    fn from(row: TodoRow) -> Self {
        Self {
            id: TodoId::new(row.id),
            client_id: row.client_id.map(ClientId::from_uuid),
            title: row.title,
            completed: row.completed,
            created_at: Timestamp::from_datetime(row.created_at),
            description: row.description,
            due_date: row.due_date,
        }
    }
}

/// Todo store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresTodoStore {
    pool: PgPool,
    options: StoreOptions,
}

impl PostgresTodoStore {
    /// Connects to `database_url` and prepares the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema preparation fails.
    pub async fn connect(database_url: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(StoreError::Connection)?;
        Self::with_pool(pool, options).await
    }

    /// Wraps an existing pool, preparing the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be prepared.
    pub async fn with_pool(pool: PgPool, options: StoreOptions) -> Result<Self, StoreError> {
        for statement in schema::statements(schema::POSTGRES_TABLE, options.unique_titles) {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(StoreError::Schema)?;
        }
        Ok(Self { pool, options })
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TodoService for PostgresTodoStore {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        async move {
            let rows: Vec<TodoRow> =
                sqlx::query_as(&format!("SELECT {COLUMNS} FROM todos ORDER BY id DESC"))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|error| database_error(&error))?;
            Ok(rows.into_iter().map(Todo::from).collect())
        }
        .boxed()
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        async move {
            let new_todo = self.options.constraints.validate_new(&new_todo)?;
            let client_id = new_todo.client_id.map(|client_id| *client_id.as_uuid());

            // The no-op update makes RETURNING yield the existing row on a key clash.
            let row: TodoRow = sqlx::query_as(&format!(
                "INSERT INTO todos (client_id, title, due_date) VALUES ($1, $2, $3) \
                 ON CONFLICT (client_id) DO UPDATE SET client_id = EXCLUDED.client_id \
                 RETURNING {COLUMNS}"
            ))
            .bind(client_id)
            .bind(&new_todo.title)
            .bind(new_todo.due_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| write_error(&error, &new_todo.title))?;

            Ok(Todo::from(row))
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

            let row: Option<TodoRow> = sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM todos WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.get())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| database_error(&error))?;
            let mut todo = Todo::from(row.ok_or(TodoError::NotFound(id))?);
            todo.apply(&patch);

            sqlx::query(
                "UPDATE todos SET title = $1, completed = $2, description = $3, due_date = $4 \
                 WHERE id = $5",
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
            let result = sqlx::query("DELETE FROM todos WHERE id = $1")
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
