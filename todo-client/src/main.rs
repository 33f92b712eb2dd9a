//! Terminal todo list.
//!
//! ```bash
//! todo-client remote --url http://localhost:8000
//! todo-client local --database todos.db
//! todo-client --failure-rate 0.3 --delay-ms 800 remote
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default
//! `todo_client=info,todo_sync=info`.

mod cli;
mod command;
mod render;
mod session;

use std::io::Write;

use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_sync::client::TodoClient;

use crate::cli::Cli;
use crate::render::HELP;
use crate::session::Session;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_client=info,todo_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = cli.open_service().await?;
    let client = TodoClient::new(service, cli.options.reconciler_config());

    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = receiver.recv().await {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
            let _ = stdout.flush();
        }
    });

    println!("{HELP}\n");
    let mut session = Session::new(client, sender);
    session.start().await;
    session.run(BufReader::new(tokio::io::stdin())).await?;

    drop(session);
    printer.await?;
    Ok(())
}
