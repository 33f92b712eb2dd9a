//! Interactive session: runs prompt commands against a `TodoClient`.
//!
//! Mutations run as spawned tasks so the prompt stays responsive. Their
//! results arrive later on the output channel.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;

use todo_sync::client::TodoClient;
use todo_sync::domain::{TodoId, TodoPatch};
use todo_sync::reconcile::{Outcome, RefreshOutcome};
use todo_sync::service::TodoService;

use crate::command::{self, Command};
use crate::render::{HELP, render_list};

pub type Client = TodoClient<dyn TodoService>;

/// Whether the prompt loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    client: Client,
    output: UnboundedSender<String>,
    tasks: JoinSet<()>,
}

impl Session {
    pub fn new(client: Client, output: UnboundedSender<String>) -> Self {
        Self {
            client,
            output,
            tasks: JoinSet::new(),
        }
    }

    fn print(&self, line: impl Into<String>) {
        // The receiver only goes away at shutdown.
        let _ = self.output.send(line.into());
    }

    /// Loads the initial list.
    pub async fn start(&self) {
        match self.client.refresh().await {
            RefreshOutcome::Failed(error) => self.print(format!("Failed to load todos: {error}")),
            _ => self.print(render_list(&self.client.todos())),
        }
    }

    /// Reads commands from `input` until `quit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading `input` fails.
    pub async fn run(&mut self, input: impl AsyncBufRead + Unpin) -> std::io::Result<()> {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if self.handle_line(&line).await == Flow::Quit {
                break;
            }
        }
        self.finish().await;
        Ok(())
    }

    /// Parses and executes one prompt line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match command::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Flow::Continue,
            Err(error) => {
                self.print(error.to_string());
                Flow::Continue
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::List => self.print(render_list(&self.client.todos())),
            Command::Help => self.print(HELP),
            Command::Quit => return Flow::Quit,
            Command::Refresh => {
                let client = self.client.clone();
                let output = self.output.clone();
                self.tasks.spawn(async move {
                    let line = match client.refresh().await {
                        RefreshOutcome::Applied { .. } => render_list(&client.todos()),
                        RefreshOutcome::Stale => return,
                        RefreshOutcome::Failed(error) => format!("Failed to load todos: {error}"),
                    };
                    let _ = output.send(line);
                });
            }
            Command::Add(title) => self.mutate(Mutation::Create(title)).await,
            Command::Done(id) => self.mutate(Mutation::Update(id, TodoPatch::completed(true))).await,
            Command::Undo(id) => self.mutate(Mutation::Update(id, TodoPatch::completed(false))).await,
            Command::Rename(id, title) => self.mutate(Mutation::Update(id, TodoPatch::title(title))).await,
            Command::Describe(id, text) => {
                let patch = TodoPatch::default().with_description(text);
                self.mutate(Mutation::Update(id, patch)).await;
            }
            Command::Due(id, due_date) => {
                let patch = TodoPatch::default().with_due_date(due_date);
                self.mutate(Mutation::Update(id, patch)).await;
            }
            Command::Remove(id) => self.mutate(Mutation::Delete(id)).await,
        }
        Flow::Continue
    }

    /// Spawns the mutation, lets it apply its optimistic change, then shows
    /// the list.
    async fn mutate(&mut self, mutation: Mutation) {
        let client = self.client.clone();
        let output = self.output.clone();
        self.tasks.spawn(async move {
            let outcome = match &mutation {
                Mutation::Create(title) => client.create(title).await,
                Mutation::Update(id, patch) => client.update(*id, patch.clone()).await,
                Mutation::Delete(id) => client.delete(*id).await,
            };
            let _ = output.send(report(&mutation, &outcome));
        });
        tokio::task::yield_now().await;
        self.print(render_list(&self.client.todos()));
    }

    /// Waits for in-flight mutations before leaving.
    pub async fn finish(&mut self) {
        if !self.tasks.is_empty() {
            self.print(format!("Waiting for {} pending change(s)...", self.tasks.len()));
        }
        while let Some(result) = self.tasks.join_next().await {
            if let Err(error) = result {
                tracing::error!(%error, "Mutation task failed");
            }
        }
    }
}

enum Mutation {
    Create(String),
    Update(TodoId, TodoPatch),
    Delete(TodoId),
}

fn report(mutation: &Mutation, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Confirmed(entry) => match mutation {
            Mutation::Create(_) => format!("Added \"{}\"", entry.title),
            Mutation::Update(..) => format!("Saved \"{}\"", entry.title),
            Mutation::Delete(_) => format!("Deleted \"{}\"", entry.title),
        },
        Outcome::Reverted(failure) => failure.message.clone(),
        Outcome::Rejected(rejection) => rejection.to_string(),
    }
}
