//! oxide-reconcile CLI
//!
//! Command-line tool converging a database on a declared schema.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::Connection as _;
use sqlx::{MySqlConnection, PgConnection};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_reconcile::codegen;
use oxide_reconcile::prelude::*;
use oxide_reconcile::version::{DEFAULT_VERSION_KEY, DEFAULT_VERSION_TYPE, INITIAL_VERSION};

/// Declarative schema reconciliation for MySQL and PostgreSQL.
#[derive(Parser)]
#[command(name = "oxide-reconcile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (`mysql://...` or `postgres://...`).
    #[arg(short, long, env = "DATABASE_URL")]
    url: Option<String>,

    /// Database to manage; taken from the URL path when omitted.
    #[arg(short, long, env = "DATABASE_NAME")]
    database: Option<String>,

    /// Namespace inside the database (PostgreSQL schema).
    #[arg(long, env = "DATABASE_SCHEMA")]
    schema: Option<String>,

    /// Default collation for string-like columns.
    #[arg(long)]
    collation: Option<String>,

    /// Default character set for new tables and databases.
    #[arg(long)]
    charset: Option<String>,

    /// Storage engine for new tables (MySQL).
    #[arg(long)]
    engine: Option<String>,

    /// Plan against a JSON schema snapshot instead of a live database.
    #[arg(long, conflicts_with = "url")]
    snapshot: Option<PathBuf>,

    /// Dialect used with `--snapshot`.
    #[arg(long, default_value = "mysql")]
    dialect: Dialect,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the statements that would converge the database.
    Plan {
        /// Declared schema (JSON).
        schema_file: PathBuf,

        /// Keep live columns that are not declared.
        #[arg(long)]
        no_drops: bool,
    },

    /// Converge the database on the declared schema.
    Apply {
        /// Declared schema (JSON).
        schema_file: PathBuf,

        /// Keep live columns that are not declared.
        #[arg(long)]
        no_drops: bool,

        /// Print the statements instead of executing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the live tables.
    Dump {
        /// Only these tables (all if not specified).
        tables: Vec<String>,

        /// Emit a JSON schema instead of builder-call source.
        #[arg(long)]
        json: bool,
    },

    /// Read or record the schema version marker.
    Version {
        #[command(subcommand)]
        action: VersionCommand,
    },

    /// Create the database when it does not exist.
    CreateDatabase {
        /// Print the statement instead of executing it.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Print the recorded version.
    Get {
        #[arg(long, default_value = DEFAULT_VERSION_TYPE)]
        version_type: String,
        #[arg(long, default_value = DEFAULT_VERSION_KEY)]
        key: String,
        /// Reported when nothing is recorded.
        #[arg(long, default_value = INITIAL_VERSION)]
        initial: String,
    },

    /// Record a version.
    Set {
        value: String,
        #[arg(long, default_value = DEFAULT_VERSION_TYPE)]
        version_type: String,
        #[arg(long, default_value = DEFAULT_VERSION_KEY)]
        key: String,
    },
}

impl Commands {
    const fn is_dry_run(&self) -> bool {
        matches!(
            self,
            Self::Apply { dry_run: true, .. } | Self::CreateDatabase { dry_run: true }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut parameters = SchemaParameters::new();
    parameters.collation.clone_from(&cli.collation);
    parameters.charset.clone_from(&cli.charset);
    parameters.engine.clone_from(&cli.engine);

    let mut buffer = Vec::new();
    let mode = if cli.command.is_dry_run() {
        ExecutionMode::DryRun(&mut buffer)
    } else {
        ExecutionMode::Live
    };

    if let Some(path) = &cli.snapshot {
        let live = load_schema(path)?;
        let mut introspector = MemoryIntrospector::with_parameters(live, cli.dialect, &parameters, mode);
        run(&mut introspector, &cli.command).await?;
    } else {
        let Some(url) = cli.url.as_deref() else {
            bail!("either --url or --snapshot is required");
        };
        let database = match &cli.database {
            Some(database) => database.clone(),
            None => database_from_url(url)
                .context("no database named in the URL; pass --database")?,
        };
        let mut settings = ConnectionSettings::new(database).parameters(parameters);
        settings.schema.clone_from(&cli.schema);

        match dialect_from_url(url)? {
            Dialect::MySql => {
                let connection = MySqlConnection::connect(url)
                    .await
                    .context("failed to connect to MySQL")?;
                let mut introspector = MySqlIntrospector::new(connection, &settings, mode);
                run(&mut introspector, &cli.command).await?;
            }
            Dialect::Postgres => {
                let connection = PgConnection::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                let mut introspector = PostgresIntrospector::new(connection, &settings, mode);
                run(&mut introspector, &cli.command).await?;
            }
        }
    }

    for command in &buffer {
        println!("{command};");
    }
    Ok(())
}

async fn run<I>(introspector: &mut I, command: &Commands) -> anyhow::Result<()>
where
    I: Introspector + ?Sized,
{
    if let Commands::CreateDatabase { .. } = command {
        if introspector.create_and_select_database().await? {
            info!(database = %introspector.database_name(), "Database ready");
        }
        return Ok(());
    }

    if !introspector.select_database().await? {
        bail!("database '{}' is not available", introspector.database_name());
    }

    match command {
        Commands::Plan {
            schema_file,
            no_drops,
        } => {
            let schema = load_schema(schema_file)?;
            let reconciler = Reconciler::new(ReconcilerOptions {
                allow_drops: !no_drops,
            });
            let plan = reconciler.prepare(introspector, &schema).await?;

            if plan.is_empty() {
                info!("Database matches the declared schema.");
            }
            for planned in &plan.operations {
                println!("-- {}", planned.operation.description());
                for statement in &planned.statements {
                    println!("{statement};");
                }
            }
            for suppressed in &plan.suppressed {
                println!("-- skipped: {}", suppressed.description());
            }
        }

        Commands::Apply {
            schema_file,
            no_drops,
            ..
        } => {
            let schema = load_schema(schema_file)?;
            let reconciler = Reconciler::new(ReconcilerOptions {
                allow_drops: !no_drops,
            });
            let report = reconciler.reconcile(introspector, &schema).await?;
            info!(
                operations = report.operations,
                statements = report.statements,
                tables = report.tables.len(),
                "Applied"
            );
        }

        Commands::Dump { tables, json } => {
            let mut live = introspector.get_tables(true).await?;
            if !tables.is_empty() {
                live.retain(|t| tables.contains(&t.name));
            }

            if *json {
                println!("{}", Schema { tables: live }.to_json()?);
            } else {
                for table in &live {
                    println!("{}\n", codegen::table_source(introspector.dialect(), table)?);
                }
            }
        }

        Commands::Version { action } => match action {
            VersionCommand::Get {
                version_type,
                key,
                initial,
            } => {
                let version = introspector.get_version(version_type, key, initial).await?;
                println!("{version}");
            }
            VersionCommand::Set {
                value,
                version_type,
                key,
            } => {
                introspector.set_version(version_type, key, value).await?;
            }
        },

        Commands::CreateDatabase { .. } => {}
    }

    Ok(())
}

fn dialect_from_url(url: &str) -> anyhow::Result<Dialect> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .context("database URL has no scheme")?;
    scheme
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
}

fn database_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let path = rest.split(['?', '#']).next()?;
    let (_, database) = path.split_once('/')?;
    (!database.is_empty()).then(|| database.to_string())
}
