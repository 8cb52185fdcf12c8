use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ppda_core::{
    AccountDraft, Group, IndicatorSource, Operation, UserProfileDraft, Validate, ValidationContext,
};
use ppda_storage::{open_store, AttachmentStore, PgStore, Store};
use ppda_sync::{maybe_build_scheduler, IngestOutcome, IngestionPipeline, SyncConfig};
use ppda_web::{AppState, AuthConfig, WebConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ppda-cli")]
#[command(about = "PPDA compliance reporting service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API and, when enabled, the ingestion scheduler.
    Serve,
    /// Apply database migrations.
    Migrate,
    /// Run one ingestion for a source (`snifa` or `airecoo`).
    Ingest {
        source: String,
        /// Behave like the scheduler: a run without data is not an error.
        #[arg(long)]
        scheduled: bool,
    },
    #[command(subcommand)]
    Account(AccountCommand),
}

#[derive(Debug, Subcommand)]
enum AccountCommand {
    /// Create an account with its groups.
    Add(AddAccount),
    List,
}

#[derive(Debug, Args)]
struct AddAccount {
    username: String,
    /// admin, user or auditor; repeatable.
    #[arg(long = "group", required = true)]
    groups: Vec<String>,
    /// Role label stored on the user profile.
    #[arg(long)]
    role: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PPDA_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await?,
        Commands::Migrate => {
            let url = require_database(&config)?;
            let store = PgStore::connect(url).await.context("connecting to database")?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
        Commands::Ingest { source, scheduled } => {
            let source = IndicatorSource::from_slug(&source)
                .with_context(|| format!("unknown source `{source}`, expected snifa or airecoo"))?;
            // A fresh in-memory store has no organization to attach indicators to.
            let url = require_database(&config)?;
            let store = open_store(Some(url), false)
                .await
                .context("opening store")?;
            let pipeline = IngestionPipeline::from_settings(store, &config.source_settings()?)?;
            if scheduled {
                match pipeline.run_scheduled(source).await? {
                    IngestOutcome::NoData => println!("{source}: no data received"),
                    IngestOutcome::Persisted(summary) => println!(
                        "{source}: run_id={} indicators={}",
                        summary.run_id, summary.persisted
                    ),
                }
            } else {
                let summary = pipeline.trigger(source).await?;
                println!("{source}: run_id={} indicators={}", summary.run_id, summary.persisted);
            }
        }
        Commands::Account(command) => {
            let url = require_database(&config)?;
            let store: Arc<dyn Store> = Arc::new(PgStore::connect(url).await.context("connecting to database")?);
            account(store.as_ref(), command).await?;
        }
    }

    Ok(())
}

fn require_database(config: &SyncConfig) -> Result<&str> {
    match config.database_url.as_deref() {
        Some(url) => Ok(url),
        None => bail!("DATABASE_URL must be set for this command"),
    }
}

async fn serve(config: &SyncConfig) -> Result<()> {
    let store = open_store(config.database_url.as_deref(), true)
        .await
        .context("opening store")?;
    let settings = config.source_settings()?;
    let pipeline = Arc::new(IngestionPipeline::from_settings(store.clone(), &settings)?);

    let scheduler = maybe_build_scheduler(config.scheduler_enabled, pipeline.clone(), &settings).await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting scheduler")?;
        info!("ingestion scheduler started");
    }

    let state = AppState::new(store, AttachmentStore::new(&config.attachments_dir), pipeline)
        .with_auth(AuthConfig::from_env());
    ppda_web::serve(state, &WebConfig::from_env()).await?;

    if let Some(mut sched) = scheduler {
        sched.shutdown().await.context("stopping scheduler")?;
    }
    Ok(())
}

async fn account(store: &dyn Store, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::Add(args) => {
            let groups = args
                .groups
                .iter()
                .map(|g| g.parse::<Group>())
                .collect::<Result<Vec<_>, _>>()?;
            let draft = AccountDraft {
                username: args.username,
                groups,
            };
            let ctx = ValidationContext::now(Operation::Create);
            draft.validate(&ctx)?;
            let account = store.accounts().insert(draft).await?;

            if let Some(role) = args.role {
                let profile = UserProfileDraft {
                    account_id: account.id,
                    role,
                };
                profile.validate(&ctx)?;
                store.user_profiles().insert(profile).await?;
            }
            println!("account {} created with id {}", account.username, account.id);
        }
        AccountCommand::List => {
            for account in store.accounts().list(&Default::default()).await? {
                let groups: Vec<_> = account.groups.iter().map(Group::as_str).collect();
                println!("{}\t{}\t{}", account.id, account.username, groups.join(","));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_commands_need_a_database_url() {
        let config = SyncConfig::from_lookup(|_| None);
        let err = require_database(&config).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = SyncConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/ppda".to_string())
        });
        assert_eq!(require_database(&config).unwrap(), "postgres://localhost/ppda");
    }

    #[test]
    fn ingest_arguments_parse() {
        let cli = Cli::try_parse_from(["ppda-cli", "ingest", "snifa", "--scheduled"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Ingest { ref source, scheduled: true }) if source == "snifa"
        ));
        assert!(Cli::try_parse_from(["ppda-cli"]).unwrap().command.is_none());
    }
}
