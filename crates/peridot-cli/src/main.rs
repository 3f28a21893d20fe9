//! Peridot CLI tool.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use peridot_core::{AgentId, Health, JobId, RepoPullId, Status};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "peridot")]
#[command(about = "Peridot job datastore CLI", long_about = None)]
struct Cli {
    /// System configuration file
    #[arg(long, env = "PERIDOT_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the database schema
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Manage jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Manage agents
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Dispatch ready jobs as JSON lines on stdout
    Dispatch {
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },
    /// Validate a job plan without touching the database
    Validate {
        /// Path to the job plan
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the schema and bootstrap the initial admin
    Init,
    /// Drop everything and initialize a fresh schema
    Reset {
        /// Confirm that all data should be dropped
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Show one job
    Get { id: JobId },
    /// List the jobs for a repo pull
    List {
        #[arg(long)]
        repo_pull: RepoPullId,
    },
    /// List jobs that are ready to run
    Ready {
        /// Maximum number of jobs to show (0 for all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },
    /// Add a job
    Add {
        #[arg(long)]
        repo_pull: RepoPullId,
        #[arg(long)]
        agent: AgentId,
        /// Job that must finish first (repeatable)
        #[arg(long = "prior")]
        priors: Vec<JobId>,
        /// JSON file holding the job configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Mark a job as ready or not ready to run
    SetReady {
        id: JobId,
        #[arg(action = clap::ArgAction::Set, default_value = "true")]
        ready: bool,
    },
    /// Record a job's status
    SetStatus {
        id: JobId,
        #[arg(long, default_value = "same")]
        status: Status,
        #[arg(long, default_value = "same")]
        health: Health,
        #[arg(long, default_value = "")]
        output: String,
        /// RFC 3339 start time
        #[arg(long)]
        started_at: Option<DateTime<Utc>>,
        /// RFC 3339 finish time
        #[arg(long)]
        finished_at: Option<DateTime<Utc>>,
    },
    /// Delete a job
    Delete { id: JobId },
    /// Create the jobs described by a job plan
    Plan {
        #[arg(long)]
        repo_pull: RepoPullId,
        /// Path to the job plan
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List all agents
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Validate { path } = &cli.command {
        return commands::validate(path);
    }

    let settings = commands::Settings::load(cli.config.as_deref(), cli.database_url)?;
    let pool = settings.connect().await?;

    match cli.command {
        Commands::Db { command } => match command {
            DbCommands::Init => commands::db::init(&pool, &settings).await?,
            DbCommands::Reset { yes } => commands::db::reset(&pool, &settings, yes).await?,
        },
        Commands::Jobs { command } => match command {
            JobCommands::Get { id } => commands::jobs::get(&pool, id).await?,
            JobCommands::List { repo_pull } => commands::jobs::list(&pool, repo_pull).await?,
            JobCommands::Ready { limit } => commands::jobs::ready(&pool, limit).await?,
            JobCommands::Add {
                repo_pull,
                agent,
                priors,
                config,
            } => {
                commands::jobs::add(&pool, repo_pull, agent, &priors, config.as_deref()).await?;
            }
            JobCommands::SetReady { id, ready } => {
                commands::jobs::set_ready(&pool, id, ready).await?;
            }
            JobCommands::SetStatus {
                id,
                status,
                health,
                output,
                started_at,
                finished_at,
            } => {
                let update = peridot_core::JobStatusUpdate {
                    started_at,
                    finished_at,
                    status,
                    health,
                    output,
                };
                commands::jobs::set_status(&pool, id, &update).await?;
            }
            JobCommands::Delete { id } => commands::jobs::delete(&pool, id).await?,
            JobCommands::Plan { repo_pull, path } => {
                commands::jobs::plan(&pool, repo_pull, &path).await?;
            }
        },
        Commands::Agents { command } => match command {
            AgentCommands::List => commands::agents::list(&pool).await?,
        },
        Commands::Dispatch { once } => commands::dispatch(pool, &settings, once).await?,
        Commands::Validate { .. } => {}
    }

    Ok(())
}
