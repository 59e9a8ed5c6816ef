//! Timetrack CLI - a local time tracker
//!
//! One session can be running at a time. The daemon owns the timer and the
//! SQLite store; every other command talks to it over a Unix socket.

use anyhow::Result;
use chrono::{Datelike, Local};
use clap::{CommandFactory, Parser};

use timetrack::cli::{Cli, Commands, DaemonError, Display, IpcClient, ProjectCommands, Watcher};
use timetrack::config::AppConfig;
use timetrack::daemon::run_daemon;
use timetrack::types::{AddParams, EditParams, MonthKey, NewProject, ProjectPatch};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose || matches!(cli.command, Some(Commands::Daemon)));

    // Execute command
    if let Err(e) = execute(cli).await {
        match e.downcast_ref::<DaemonError>() {
            Some(daemon_error) => {
                Display::show_error_with_code(&daemon_error.message, daemon_error.code.as_deref())
            }
            None => Display::show_error(&format!("{:#}", e)),
        }
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins; otherwise `info` when verbose, `warn` when not.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let client = IpcClient::with_socket_path(config.socket_path());

    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Start(args) => {
            let response = client.start(args.description, args.project).await?;
            Display::show_start_success(&response);
        }
        Commands::Stop { description } => {
            let response = client.stop(description).await?;
            Display::show_stop_success(&response);
        }
        Commands::Toggle(args) => {
            let response = client.toggle(args.description, args.project).await?;
            Display::show_toggle_success(&response);
        }
        Commands::Status => {
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Commands::Annotate {
            description,
            project,
        } => {
            if description.is_none() && project.is_none() {
                anyhow::bail!("--description か --project のどちらかを指定してください");
            }
            let response = client.annotate(description, project).await?;
            Display::show_message(&response);
        }
        Commands::List { limit } => {
            let response = client.list(limit).await?;
            Display::show_sessions(&response);
        }
        Commands::Range { from, to } => {
            let response = client.range(from, to).await?;
            Display::show_sessions(&response);
        }
        Commands::Add(args) => {
            let response = client
                .add(AddParams {
                    start: args.start,
                    end: args.end,
                    description: args.description,
                    project: args.project,
                })
                .await?;
            Display::show_session_result(&response);
        }
        Commands::Edit(args) => {
            let response = client
                .edit(
                    args.id,
                    EditParams {
                        start: args.start,
                        end: args.end,
                        description: args.description,
                        project: args.project,
                        unassign: args.unassign,
                    },
                )
                .await?;
            Display::show_session_result(&response);
        }
        Commands::Delete { id } => {
            let response = client.delete(id).await?;
            Display::show_message(&response);
        }
        Commands::Split { id, at } => {
            let response = client.split(id, at).await?;
            Display::show_message(&response);
            Display::show_sessions(&response);
        }
        Commands::Report(args) => {
            let now = Local::now();
            let month = args
                .month
                .unwrap_or_else(|| MonthKey::new(now.year(), now.month()));
            let offset_minutes = args
                .utc_offset
                .unwrap_or_else(|| now.offset().local_minus_utc() / 60);
            let response = client
                .report(month.year, month.month, offset_minutes)
                .await?;
            Display::show_report(&response);
        }
        Commands::Project(project_command) => match project_command {
            ProjectCommands::Add {
                name,
                description,
                color,
            } => {
                let response = client
                    .project_add(NewProject {
                        name,
                        description,
                        color,
                    })
                    .await?;
                Display::show_message(&response);
                Display::show_projects(&response);
            }
            ProjectCommands::List => {
                let response = client.project_list().await?;
                Display::show_projects(&response);
            }
            ProjectCommands::Edit {
                project,
                name,
                description,
                color,
            } => {
                let patch = ProjectPatch {
                    name,
                    description,
                    color,
                };
                if patch.is_empty() {
                    anyhow::bail!("--name, --description, --color のいずれかを指定してください");
                }
                let response = client.project_edit(project, patch).await?;
                Display::show_message(&response);
                Display::show_projects(&response);
            }
            ProjectCommands::Delete { project } => {
                let response = client.project_delete(project).await?;
                Display::show_message(&response);
            }
        },
        Commands::Watch { interval_ms, once } => {
            let mut watcher =
                Watcher::new(client, std::time::Duration::from_millis(interval_ms));
            if once {
                println!("{}", watcher.once().await?);
            } else {
                watcher.run().await?;
            }
        }
        Commands::Daemon => {
            run_daemon(&config).await?;
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
        }
    }

    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
