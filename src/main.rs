//! envpanel - Control panel for a systemd service's environment file
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! Each invocation:
//! 1. Initializes logging (daily rotated file, console with `--debug`)
//! 2. Creates a tokio runtime for subprocess and file I/O
//! 3. Loads `envpanel.yaml` through [`ConfigManager`], applies flag overrides
//! 4. Opens an [`EditorSession`] on the environment file and runs one command
//! 5. Stops the session's background tasks and shuts the runtime down
//!
//! Editing commands (`set`, `enable`, `disable`, `quote`, `add`, `remove`)
//! save immediately, syntax-checking with `bash -n` first unless
//! `--no-validate` is given. `--restart` / `--reload` chain a service verb.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use envpanel::logging::{LogOptions, setup_logging};
use envpanel::services::{CommandRunner, SystemCommandRunner};
use envpanel::session::LoadOrigin;
use envpanel::{APP_NAME, ConfigManager, EditorSession, QuoteStyle, RenderMode, ServiceAction, SessionEvent, VERSION};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Upper bound for one-shot commands such as `systemctl restart`.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "envpanel", version, about = "Edit a service's environment file and control the service")]
struct Cli {
    /// Directory containing envpanel.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Environment file to edit (default: /etc/default/<service>)
    #[arg(long, global = true)]
    env_file: Option<Utf8PathBuf>,

    /// Service to manage
    #[arg(long, global = true)]
    service: Option<String>,

    /// Directory for log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Debug logging, mirrored to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct SaveArgs {
    /// Restart the service after saving
    #[arg(long, conflicts_with = "reload")]
    restart: bool,

    /// Reload the service after saving
    #[arg(long)]
    reload: bool,

    /// Skip the shell syntax check before saving
    #[arg(long)]
    no_validate: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List variables, including known ones the file lacks
    Show,
    /// Print the file as it would be saved
    Preview {
        /// Regenerate from scratch instead of keeping the layout
        #[arg(long)]
        fresh: bool,
        /// Do not double-quote unquoted values containing spaces
        #[arg(long)]
        no_auto_quote: bool,
    },
    /// Set a variable's value
    Set {
        name: String,
        value: String,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Uncomment a variable
    Enable {
        name: String,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Comment a variable out
    Disable {
        name: String,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Change how a variable is quoted
    Quote {
        name: String,
        style: QuoteStyle,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Add a new variable
    Add {
        name: String,
        #[arg(default_value = "")]
        value: String,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Remove a variable
    Remove {
        name: String,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Syntax-check the file with the configured shell
    Check,
    /// Source the file and list what it exports
    TestEnv,
    /// Show service status
    Status,
    /// Run a lifecycle verb (start, stop, restart, reload, enable, disable)
    Service { action: ServiceAction },
    /// Show recent journal entries
    Logs {
        #[arg(short = 'n', long)]
        lines: Option<u32>,
        /// Keep streaming new entries until interrupted
        #[arg(short, long)]
        follow: bool,
    },
    /// Poll service status until interrupted
    Watch,
}

impl Commands {
    fn save_args(&self) -> Option<&SaveArgs> {
        match self {
            Commands::Set { save, .. }
            | Commands::Enable { save, .. }
            | Commands::Disable { save, .. }
            | Commands::Quote { save, .. }
            | Commands::Add { save, .. }
            | Commands::Remove { save, .. } => Some(save),
            _ => None,
        }
    }

    fn needs_file(&self) -> bool {
        !matches!(
            self,
            Commands::Status | Commands::Service { .. } | Commands::Logs { .. } | Commands::Watch
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(
        &cli.log_dir,
        "envpanel",
        LogOptions {
            debug: cli.debug,
            console: cli.debug,
            json: cli.log_json,
        },
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("envpanel-worker")
        .build()?;

    let result = runtime.block_on(run(cli));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut config = config_manager.load_panel_config()?;

    if let Some(service) = cli.service {
        config.service_name = service;
    }
    if let Some(env_file) = cli.env_file {
        config.env_file = Some(env_file);
    }
    if cli.command.save_args().is_some_and(|save| save.no_validate) {
        config.validate_shell = false;
    }

    let registry = config_manager.build_registry(&config)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::with_timeout(COMMAND_TIMEOUT));
    let session = EditorSession::new(config, registry, runner);

    if cli.command.needs_file() && session.load().await? == LoadOrigin::Template {
        eprintln!("{} does not exist, starting from the template", session.env_path());
    }

    let result = execute(&session, cli.command).await;
    session.stop().await;
    result
}

async fn execute(session: &EditorSession, command: Commands) -> Result<()> {
    let save = command.save_args().cloned();

    match command {
        Commands::Show => print_variables(session),
        Commands::Preview {
            fresh,
            no_auto_quote,
        } => {
            let mode = if fresh {
                RenderMode::Fresh
            } else {
                session.config().render_mode()
            };
            let auto_quote = session.config().auto_quote && !no_auto_quote;
            println!("{}", session.preview_with(mode, auto_quote));
        }
        Commands::Set { name, value, .. } => session.set_value(&name, &value),
        Commands::Enable { name, .. } => require(session.set_commented(&name, false), &name)?,
        Commands::Disable { name, .. } => require(session.set_commented(&name, true), &name)?,
        Commands::Quote { name, style, .. } => require(session.set_quote_style(&name, style), &name)?,
        Commands::Add { name, value, .. } => {
            let name = session.add_variable(&name, &value)?;
            println!("Added {}", name);
        }
        Commands::Remove { name, .. } => require(session.remove(&name).is_some(), &name)?,
        Commands::Check => {
            session.check_syntax().await?;
            println!("Syntax OK");
        }
        Commands::TestEnv => {
            for line in session.test_environment().await? {
                println!("{}", line);
            }
        }
        Commands::Status => {
            let status = session.refresh_status().await?;
            println!("{}: {}", session.controller().unit(), status.summary(SystemTime::now()));
        }
        Commands::Service { action } => {
            session.service_action(action).await?;
            println!("{} {}: done", action, session.controller().unit());
        }
        Commands::Logs { lines, follow } => {
            if follow {
                follow_logs(session).await?;
            } else {
                print!("{}", session.logs(lines).await?);
            }
        }
        Commands::Watch => watch_status(session).await?,
    }

    if let Some(save) = save {
        session.save().await?;
        println!("Saved {}", session.env_path());

        if save.restart {
            session.service_action(ServiceAction::Restart).await?;
            println!("Restarted {}", session.controller().unit());
        } else if save.reload {
            session.service_action(ServiceAction::Reload).await?;
            println!("Reloaded {}", session.controller().unit());
        }
    }

    Ok(())
}

fn require(found: bool, name: &str) -> Result<()> {
    if !found {
        bail!("Unknown variable: {}", name);
    }
    Ok(())
}

fn print_variables(session: &EditorSession) {
    for view in session.variables() {
        let state = match (view.suggested, view.assignment.commented) {
            (true, _) => "  +",
            (false, true) => "off",
            (false, false) => " on",
        };
        let mut notes = String::new();
        if let Some(placeholder) = view.placeholder() {
            notes.push_str(&format!("  <{}>", placeholder));
        }
        if view.needs_quoting() {
            notes.push_str("  [should be quoted]");
        }
        if !view.valid {
            notes.push_str("  [invalid]");
        }
        println!(
            "{} {}={}  ({}, {}) {}{}",
            state,
            view.assignment.name,
            view.assignment.value,
            view.definition.var_type.as_str(),
            view.assignment.quote_style,
            view.definition.description,
            notes
        );
    }
}

async fn follow_logs(session: &EditorSession) -> Result<()> {
    let mut chunks = session.follow_logs();

    loop {
        tokio::select! {
            chunk = chunks.recv() => match chunk {
                Some(chunk) => print!("{}", chunk),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    session.stop_following_logs().await;
    Ok(())
}

async fn watch_status(session: &EditorSession) -> Result<()> {
    let mut events = session.subscribe();
    session.start();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::StatusUpdated(status)) => {
                    println!("{}", status.summary(SystemTime::now()));
                }
                Ok(SessionEvent::StatusFailed { message }) => eprintln!("status failed: {}", message),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} session events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    Ok(())
}
