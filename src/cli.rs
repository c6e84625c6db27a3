use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::backend::LocalBackend;
use crate::config::{load_settings, toggle_theme, ConfigWatcher};
use crate::engine::SyncEngine;
use crate::events::ViewPayload;
use crate::gateway::RemoteGateway;
use crate::models::{OrderedView, Settings, TaskId, Theme};
use crate::mutations::{Mutations, Outcome};
use crate::notify::{Level, LogNotifier, Notification, Notifier};
use crate::order_store::OrderStore;
use crate::poller::Poller;
use crate::storage::{default_data_dir, Storage, StorageError};

/// How long a one-shot command waits for the first reconciled view.
const FIRST_VIEW_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "todo-sync", about = "Todo list with a persisted manual order", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding tasks, settings and logs (default: ~/.todo)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Poll period in milliseconds (overrides settings.json)
    #[arg(long = "poll-ms", global = true)]
    pub poll_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print open tasks in display order
    List,
    /// Keep polling and print the list whenever it changes
    Watch,
    /// Create a task
    Add(TextArgs),
    /// Change a task's text
    Edit(EditArgs),
    /// Mark a task finished
    Done(IdArgs),
    /// Delete a task
    Del(IdArgs),
    /// Move a task to where another one sits
    Move(MoveArgs),
    /// Purge tasks finished or deleted more than a week ago
    Clean,
    /// Toggle between the light and dark theme
    Theme,
}

#[derive(Args)]
pub struct TextArgs {
    /// Task text; words are joined with spaces
    #[arg(required = true)]
    pub text: Vec<String>,
}

#[derive(Args)]
pub struct EditArgs {
    pub id: TaskId,
    #[arg(required = true)]
    pub text: Vec<String>,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: TaskId,
}

#[derive(Args)]
pub struct MoveArgs {
    /// Task to move
    pub id: TaskId,
    /// Task whose slot it takes
    pub over: TaskId,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("timed out waiting for the task list")]
    NoView,
    #[error("{0}")]
    Failed(&'static str),
}

/// Prints notifications to stderr and mirrors them into the log.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        let tag = match notification.level {
            Level::Success => "ok",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        eprintln!(
            "{tag}: {}: {}",
            notification.message, notification.description
        );
        LogNotifier.notify(notification);
    }
}

struct Session {
    gateway: Arc<RemoteGateway<Arc<LocalBackend>>>,
    notifier: Arc<dyn Notifier>,
    engine: SyncEngine,
    poller: Poller,
    mutations: Mutations<Arc<LocalBackend>>,
}

impl Session {
    fn start(storage: Storage, settings: &Settings) -> Result<Self, CliError> {
        let backend = Arc::new(LocalBackend::open(storage)?);
        let gateway = Arc::new(RemoteGateway::new(backend));
        let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
        let engine = SyncEngine::spawn(OrderStore::new(gateway.clone(), notifier.clone()));
        let poller = Poller::start(
            gateway.clone(),
            settings.poll_interval(),
            engine.handle().task_sink(),
            notifier.clone(),
        );
        let mutations = Mutations::new(
            gateway.clone(),
            poller.handle(),
            engine.handle(),
            notifier.clone(),
        );
        Ok(Self {
            gateway,
            notifier,
            engine,
            poller,
            mutations,
        })
    }

    async fn first_view(&self) -> Result<OrderedView, CliError> {
        let mut view = self.engine.handle().view();
        let ready = tokio::time::timeout(FIRST_VIEW_TIMEOUT, view.wait_for(Option::is_some)).await;
        match ready {
            Ok(Ok(view)) => Ok(view.clone().unwrap_or_default()),
            _ => Err(CliError::NoView),
        }
    }

    async fn close(self) {
        self.poller.stop().await;
        self.engine.shutdown().await;
    }
}

fn print_view(view: &OrderedView, json: bool) -> Result<(), CliError> {
    if json {
        let payload = ViewPayload {
            tasks: view.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if view.is_empty() {
        println!("nothing to do");
    }
    for task in view {
        println!("{:>4}  {}  {}", task.id, task.create_time, task.text);
    }
    Ok(())
}

fn expect_applied(outcome: Outcome, what: &'static str) -> Result<(), CliError> {
    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Skipped | Outcome::Failed => Err(CliError::Failed(what)),
    }
}

async fn execute(cli: Cli, storage: Storage, settings: Settings) -> Result<(), CliError> {
    let session = Session::start(storage, &settings)?;
    let result = match cli.command.unwrap_or(Commands::List) {
        Commands::List => match session.first_view().await {
            Ok(view) => print_view(&view, cli.json),
            Err(error) => Err(error),
        },
        Commands::Watch => watch(&session, cli.json).await,
        Commands::Add(args) => {
            let text = args.text.join(" ");
            expect_applied(session.mutations.create(&text).await, "task not created")
        }
        Commands::Edit(args) => {
            let text = args.text.join(" ");
            expect_applied(
                session.mutations.edit(args.id, &text).await,
                "task not edited",
            )
        }
        Commands::Done(args) => {
            // Lets the success message name the task.
            let _ = session.first_view().await;
            expect_applied(session.mutations.complete(args.id).await, "task not finished")
        }
        Commands::Del(args) => {
            let _ = session.first_view().await;
            expect_applied(session.mutations.delete(args.id).await, "task not deleted")
        }
        Commands::Move(args) => match session.first_view().await {
            Ok(_) => {
                let outcome = session.mutations.reorder(args.id, Some(args.over)).await;
                match outcome {
                    Outcome::Applied => {
                        let view = session.engine.handle().current_view().unwrap_or_default();
                        print_view(&view, cli.json)
                    }
                    _ => Err(CliError::Failed("order unchanged")),
                }
            }
            Err(error) => Err(error),
        },
        Commands::Clean => expect_applied(session.mutations.clean().await, "clean failed"),
        Commands::Theme => match toggle_theme(&*session.gateway, session.notifier.as_ref()).await {
            Some(theme) => {
                println!("{}", theme_name(theme));
                Ok(())
            }
            None => Err(CliError::Failed("theme unchanged")),
        },
    };
    session.close().await;
    result
}

async fn watch(session: &Session, json: bool) -> Result<(), CliError> {
    let config = ConfigWatcher::start(session.gateway.clone(), session.notifier.clone()).await;
    let mut theme = config.config();
    let mut view = session.engine.handle().view();
    eprintln!("theme: {}", theme_name(config.current().theme));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            changed = view.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = view.borrow_and_update().clone();
                if let Some(current) = current {
                    if let Err(error) = print_view(&current, json) {
                        break Err(error);
                    }
                }
            }
            Ok(()) = theme.changed() => {
                let current = theme.borrow_and_update().theme;
                eprintln!("theme: {}", theme_name(current));
            }
        }
    };
    config.stop().await;
    result
}

fn theme_name(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => "dark",
        Theme::Light => "light",
    }
}

fn resolve_data_dir(cli: &Cli) -> Result<PathBuf, StorageError> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir(),
    }
}

/// Parses arguments, sets up logging and runs one command to completion.
pub fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = match resolve_data_dir(&cli) {
        Ok(dir) => dir,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = crate::logging::init_logging(&data_dir) {
        eprintln!("warning: file logging disabled: {error}");
    }

    let storage = Storage::new(data_dir);
    let mut settings = load_settings(&storage);
    if let Some(poll_ms) = cli.poll_ms {
        settings.poll_interval_ms = poll_ms;
    }
    log::info!(
        "starting root={} poll_interval_ms={}",
        storage.root().display(),
        settings.poll_interval().as_millis()
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: {}", CliError::Runtime(error));
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(execute(cli, storage, settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("command failed: {error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
