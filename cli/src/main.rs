use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use sqlkeep::{Database, DatabaseConfig, InstallOutcome, NoMigration, Row, Step, migration};

/// Output format for `query` results.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "sqlkeep")]
#[command(about = "Install, migrate, and query sqlkeep-managed SQLite databases")]
struct Cli {
    /// Optional YAML file with database settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy a seed database into place unless one already exists.
    Install(InstallArgs),
    /// Print the schema version stored in a database.
    Version(DbArgs),
    /// Execute a SQL script file against a database.
    Exec(ExecArgs),
    /// Run a query and print its rows.
    Query(QueryArgs),
    /// Migrate a database to a target version using per-version SQL scripts.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct InstallArgs {
    /// Seed database to copy from. Falls back to `seed_path` in --config.
    #[arg(long)]
    seed: Option<PathBuf>,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// SQL script with `;`-terminated statements.
    #[arg(long)]
    script: PathBuf,
    /// Run the whole script inside one transaction.
    #[arg(long)]
    transaction: bool,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Output format.
    #[arg(long, default_value = "table")]
    format: CliOutputFormat,
    /// SQL query to run.
    sql: String,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Target schema version.
    #[arg(long)]
    to: u32,
    /// Directory containing `<version>.sql` upgrade scripts.
    #[arg(long)]
    script_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sqlkeep=warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Command::Install(args) => run_install(args, &config),
        Command::Version(args) => run_version(args, &config),
        Command::Exec(args) => run_exec(args, &config),
        Command::Query(args) => run_query(args, &config),
        Command::Migrate(args) => run_migrate(args, &config),
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<DatabaseConfig, String> {
    match path {
        Some(path) => DatabaseConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display())),
        None => Ok(DatabaseConfig::default()),
    }
}

/// Opens `path` at whatever version it already has, so tooling never
/// migrates implicitly.
fn open_as_is(path: &Path, config: &DatabaseConfig) -> Result<Database, String> {
    let version = read_version(path, config)?;
    let config = DatabaseConfig {
        schema_version: version,
        ..config.clone()
    };
    Database::open_with_config(path, &config, NoMigration)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

fn read_version(path: &Path, config: &DatabaseConfig) -> Result<u32, String> {
    let config = DatabaseConfig {
        schema_version: 0,
        ..config.clone()
    };
    // Expecting version 0 never migrates, so this probe never writes.
    match Database::open_with_config(path, &config, NoMigration) {
        Ok(db) => db.schema_version().map_err(|e| e.to_string()),
        Err(sqlkeep::DbError::VersionSkew { installed, .. }) => Ok(installed),
        Err(e) => Err(format!("Failed to open database '{}': {e}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// install command
// ---------------------------------------------------------------------------

fn run_install(args: InstallArgs, config: &DatabaseConfig) -> Result<(), String> {
    let seed = args
        .seed
        .or_else(|| config.seed_path.clone())
        .ok_or("no seed database given (use --seed or seed_path in --config)")?;
    let outcome = sqlkeep::install_seed(&seed, &args.db)
        .map_err(|e| format!("Install failed: {e}"))?;
    match outcome {
        InstallOutcome::Installed => println!(
            "Installed '{}' to '{}'.",
            seed.display(),
            args.db.display()
        ),
        InstallOutcome::AlreadyPresent => {
            println!("Database already present at '{}'; nothing to do.", args.db.display())
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// version command
// ---------------------------------------------------------------------------

fn run_version(args: DbArgs, config: &DatabaseConfig) -> Result<(), String> {
    let version = read_version(&args.db, config)?;
    println!("{version}");
    Ok(())
}

// ---------------------------------------------------------------------------
// exec command
// ---------------------------------------------------------------------------

fn run_exec(args: ExecArgs, config: &DatabaseConfig) -> Result<(), String> {
    let db = open_as_is(&args.db, config)?;
    let script = std::fs::read_to_string(&args.script)
        .map_err(|e| format!("Failed to read script '{}': {e}", args.script.display()))?;

    if args.transaction {
        db.begin_transaction().map_err(|e| e.to_string())?;
    }
    if let Err(e) = db.execute_script(&script) {
        if args.transaction {
            if let Err(rollback) = db.rollback_transaction() {
                tracing::warn!(error = %rollback, "Rollback after failed script reported an error");
            }
        }
        return Err(format!("Script failed: {e}"));
    }
    if args.transaction {
        db.commit_transaction()
            .map_err(|e| format!("Commit failed: {e}"))?;
    }
    println!("Executed '{}'.", args.script.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// query command
// ---------------------------------------------------------------------------

fn run_query(args: QueryArgs, config: &DatabaseConfig) -> Result<(), String> {
    let db = open_as_is(&args.db, config)?;
    let mut stmt = db
        .prepare(&args.sql)
        .map_err(|e| format!("Query failed: {e}"))?;
    let columns: Vec<String> = (0..stmt.column_count())
        .map(|i| stmt.column_name(i).map(str::to_string))
        .collect::<sqlkeep::Result<_>>()
        .map_err(|e| e.to_string())?;

    let mut table = Vec::new();
    let mut rows = stmt.query();
    while let Step::Row(row) = rows.step().map_err(|e| format!("Query failed: {e}"))? {
        table.push(row_cells(&row)?);
    }

    match args.format {
        CliOutputFormat::Table => {
            println!("{}", columns.join("\t"));
            for cells in &table {
                let line: Vec<&str> = cells
                    .iter()
                    .map(|c| c.as_deref().unwrap_or("NULL"))
                    .collect();
                println!("{}", line.join("\t"));
            }
        }
        CliOutputFormat::Json => {
            let records: Vec<serde_json::Value> = table
                .iter()
                .map(|cells| {
                    let object = columns
                        .iter()
                        .zip(cells)
                        .map(|(name, cell)| {
                            let value = cell
                                .clone()
                                .map_or(serde_json::Value::Null, serde_json::Value::String);
                            (name.clone(), value)
                        })
                        .collect();
                    serde_json::Value::Object(object)
                })
                .collect();
            let json = serde_json::to_string_pretty(&records)
                .map_err(|e| format!("Failed to serialize rows: {e}"))?;
            println!("{json}");
        }
    }
    Ok(())
}

fn row_cells(row: &Row<'_, '_>) -> Result<Vec<Option<String>>, String> {
    (0..row.column_count())
        .map(|i| row.column_string(i).map_err(|e| e.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn run_migrate(args: MigrateArgs, config: &DatabaseConfig) -> Result<(), String> {
    let config = DatabaseConfig {
        schema_version: args.to,
        ..config.clone()
    };
    let script_dir = args.script_dir;
    let db = Database::open_with_config(
        &args.db,
        &config,
        migration::from_fn(|db, from, to| {
            for version in from + 1..=to {
                let script = script_dir.join(format!("{version}.sql"));
                db.execute_script_file(&script)
                    .map_err(|e| format!("{}: {e}", script.display()))?;
            }
            Ok(())
        }),
    )
    .map_err(|e| format!("Migration failed: {e}"))?;

    match db.migration_outcome() {
        sqlkeep::MigrationOutcome::UpToDate { version } => {
            println!("Already at version {version}.")
        }
        sqlkeep::MigrationOutcome::Migrated { from, to } => {
            println!("Migrated '{}' from version {from} to {to}.", args.db.display())
        }
    }
    Ok(())
}
