use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use docstore_migrate::{
    read_config, resolve_path, JsonFileConnector, StateStore, StepTag, StoreHandle, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Docstore Migrate - plan and inspect document-store migrations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the migration path between two versions
    Plan {
        /// JSON file containing an array of step tags
        #[arg(long)]
        steps: PathBuf,

        /// Only consider steps tagged for this database alias
        #[arg(long)]
        database: Option<String>,

        /// Current version (defaults to the lowest version in the steps)
        #[arg(long)]
        from: Option<i64>,

        /// Target version (defaults to the highest reachable version)
        #[arg(long)]
        to: Option<i64>,
    },

    /// Show persisted migration state of each configured database
    Status {
        /// Migration configuration file
        #[arg(long, env = "DOCSTORE_MIGRATE_CONFIG")]
        config: PathBuf,

        /// Root directory for databases without a connection string
        #[arg(long, env = "DOCSTORE_MIGRATE_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,

        /// Only show this database alias
        #[arg(long)]
        database: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Plan {
            steps,
            database,
            from,
            to,
        } => plan(steps, database, from, to).await,
        Command::Status {
            config,
            data_dir,
            database,
        } => status(config, data_dir, database).await,
    }
}

async fn plan(
    steps_path: PathBuf,
    database: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&steps_path)
        .await
        .with_context(|| format!("reading {}", steps_path.display()))?;
    let mut steps: Vec<StepTag> = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", steps_path.display()))?;

    if let Some(alias) = &database {
        steps.retain(|s| &s.database == alias);
    }
    info!(count = steps.len(), "Loaded step tags");

    let path = resolve_path(&steps, from, to)?;
    if path.is_empty() {
        println!("Already at version {}, nothing to do", path.to);
        return Ok(());
    }

    println!(
        "{} from {} to {} in {} step(s):",
        path.direction,
        path.from,
        path.to,
        path.steps.len()
    );
    for (i, step) in path.steps.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, step.database, step);
    }
    Ok(())
}

async fn status(config_path: PathBuf, data_dir: PathBuf, database: Option<String>) -> anyhow::Result<()> {
    let config = read_config(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;

    let databases: Vec<_> = config
        .databases
        .iter()
        .filter(|d| database.as_ref().map_or(true, |alias| &d.alias == alias))
        .collect();
    if databases.is_empty() {
        bail!("no matching database in {}", config_path.display());
    }

    let connector = JsonFileConnector::new(data_dir);
    for db in databases {
        println!("{} ({})", db.alias, db.name);
        let Some(handle) = connector.open_existing(db).await? else {
            println!("  not initialized: {}", connector.database_dir(db).display());
            continue;
        };
        let collection = handle.collection(&db.migration_state_collection_name).await?;
        let state = StateStore::new(db.alias.as_str(), collection, Arc::new(SystemClock));
        let snapshot = state.snapshot().await?;

        match snapshot.current_version() {
            Some(version) => println!("  current version: {}", version),
            None => println!("  current version: none"),
        }
        if let Some(target) = db.fixed_target_version {
            println!("  fixed target:    {}", target);
        }
        println!("  applied steps:   {}", snapshot.applied_count);
        if snapshot.is_corrupt() {
            println!(
                "  INCOMPLETE:      {:?} (manual intervention required)",
                snapshot.incomplete_versions
            );
        }
    }
    Ok(())
}
