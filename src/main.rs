use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod adapters;
mod clipboard;
mod commands;
mod compiler;
mod config;
mod error;
mod fsutil;
mod git;
mod hooks;
mod refresh;
mod registry;
mod rules;
mod session;
mod watcher;

use registry::Registry;

#[derive(Parser)]
#[command(name = "ctx", version)]
#[command(about = "Keep AI coding-assistant context in sync across tools")]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .ctx/ in the current directory
    Init {
        /// Skip importing existing tool configs as rules
        #[arg(long)]
        no_import: bool,

        /// Skip installing git hooks
        #[arg(long)]
        no_hooks: bool,
    },
    /// Save a snapshot of the current work
    Save {
        /// What you are working on
        message: String,

        /// Tool the session was saved from
        #[arg(long)]
        tool: Option<String>,

        /// A decision made (repeatable)
        #[arg(long = "decision")]
        decisions: Vec<String>,

        /// A next step (repeatable)
        #[arg(long = "next")]
        next_steps: Vec<String>,
    },
    /// Generate a tool's config from the latest session and copy its resume prompt
    Resume {
        #[arg(short, long)]
        tool: String,

        /// Resume a specific session instead of the latest
        #[arg(short, long)]
        session: Option<String>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        no_clipboard: bool,
    },
    /// Save the current work and switch to another tool
    Switch {
        tool: String,

        /// Task description; defaults to the branch
        message: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Write rules to every enabled tool
    Sync {
        /// Comma-separated tools, overriding config
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,

        /// Include the latest session
        #[arg(long)]
        with_session: bool,

        #[arg(long)]
        dry_run: bool,
    },
    /// Show project, rules and session state
    Status,
    /// Inspect saved sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Manage rule documents
    #[command(subcommand)]
    Rules(RulesCommand),
    /// List or detect supported tools
    #[command(subcommand)]
    Tools(ToolsCommand),
    /// Manage git hooks that refresh context
    #[command(subcommand)]
    Hooks(HooksCommand),
    /// Keep the live session current in the foreground
    Watch {
        /// Seconds between refreshes
        #[arg(long)]
        interval: Option<u64>,

        /// Only use the timer
        #[arg(long)]
        no_file_watch: bool,

        /// Stop the running watcher
        #[arg(long)]
        stop: bool,
    },
    /// Refresh the live session and resume prompts once
    Refresh {
        /// Set the live task
        #[arg(long)]
        task: Option<String>,
    },
    /// Projects registered on this machine
    #[command(subcommand)]
    Projects(ProjectsCommand),
}

#[derive(Subcommand)]
enum SessionCommand {
    List {
        #[arg(long)]
        branch: Option<String>,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    List,
    Add {
        name: Option<String>,

        /// Import the rule content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        priority: Option<u32>,
    },
    #[command(alias = "remove")]
    Delete {
        name: String,
    },
    /// Check rule size against every tool's budget
    Validate,
}

#[derive(Subcommand)]
enum ToolsCommand {
    List,
    /// Detect which tools are installed
    Check,
}

#[derive(Subcommand)]
enum HooksCommand {
    Install,
    Uninstall,
    Status,
}

#[derive(Subcommand)]
enum ProjectsCommand {
    List,
    Remove { path: PathBuf },
}

/// Logs go to stderr so command output stays clean
fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn global_registry() -> anyhow::Result<Registry> {
    Registry::global().ok_or_else(|| anyhow::anyhow!("Could not determine the home directory"))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init {
            no_import,
            no_hooks,
        } => {
            let cwd = std::env::current_dir()?;
            let registry = Registry::global();
            commands::init(
                &cwd,
                commands::InitArgs {
                    no_import,
                    no_hooks,
                },
                registry.as_ref(),
            )
            .await?;
        }
        Commands::Save {
            message,
            tool,
            decisions,
            next_steps,
        } => {
            commands::save(commands::SaveArgs {
                message,
                tool,
                decisions,
                next_steps,
            })
            .await?
        }
        Commands::Resume {
            tool,
            session,
            dry_run,
            no_clipboard,
        } => {
            commands::resume(commands::ResumeArgs {
                tool,
                session,
                dry_run,
                no_clipboard,
            })
            .await?
        }
        Commands::Switch {
            tool,
            message,
            dry_run,
        } => {
            let registry = Registry::global();
            commands::switch(
                commands::SwitchArgs {
                    tool,
                    message,
                    dry_run,
                },
                registry.as_ref(),
            )
            .await?
        }
        Commands::Sync {
            tools,
            with_session,
            dry_run,
        } => {
            commands::sync(commands::SyncArgs {
                tools,
                with_session,
                dry_run,
            })
            .await?
        }
        Commands::Status => commands::status().await?,
        Commands::Session(cmd) => match cmd {
            SessionCommand::List { branch } => commands::session_list(branch).await?,
            SessionCommand::Show { id } => commands::session_show(&id).await?,
            SessionCommand::Delete { id } => commands::session_delete(&id).await?,
        },
        Commands::Rules(cmd) => match cmd {
            RulesCommand::List => commands::rules_list().await?,
            RulesCommand::Add {
                name,
                file,
                priority,
            } => commands::rules_add(name, file.as_deref(), priority).await?,
            RulesCommand::Delete { name } => commands::rules_delete(&name).await?,
            RulesCommand::Validate => commands::rules_validate().await?,
        },
        Commands::Tools(cmd) => match cmd {
            ToolsCommand::List => commands::tools_list().await?,
            ToolsCommand::Check => commands::tools_check().await?,
        },
        Commands::Hooks(cmd) => match cmd {
            HooksCommand::Install => commands::hooks_install().await?,
            HooksCommand::Uninstall => commands::hooks_uninstall().await?,
            HooksCommand::Status => commands::hooks_status().await?,
        },
        Commands::Watch {
            interval,
            no_file_watch,
            stop,
        } => {
            if stop {
                commands::watch_stop().await?
            } else {
                commands::watch(commands::WatchArgs {
                    interval,
                    no_file_watch,
                })
                .await?
            }
        }
        Commands::Refresh { task } => commands::refresh(task, cli.quiet).await?,
        Commands::Projects(cmd) => {
            let registry = global_registry()?;
            match cmd {
                ProjectsCommand::List => commands::projects_list(&registry).await?,
                ProjectsCommand::Remove { path } => {
                    commands::projects_remove(&registry, &path).await?
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
