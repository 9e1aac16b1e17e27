use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use employee_batch::{JobConfig, JobDriver, JobRepository, SqliteEmployeeStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "employee-batch", version, about = "Import employees from CSV into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the import job once
    Import(ImportArgs),

    /// List recorded job executions
    History {
        #[arg(long, env = "EMPLOYEE_BATCH_DATABASE", default_value = "employees.db")]
        database: PathBuf,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(clap::Args)]
struct ImportArgs {
    /// YAML config file; flags below override it
    #[arg(long, env = "EMPLOYEE_BATCH_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    source: Option<PathBuf>,

    #[arg(long, env = "EMPLOYEE_BATCH_DATABASE")]
    database: Option<PathBuf>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    threshold: Option<i64>,

    #[arg(long)]
    delimiter: Option<char>,

    /// Abort on the first malformed line
    #[arg(long)]
    strict: bool,

    /// DESTRUCTIVE: drop all stored employees and job history first
    #[arg(long)]
    reset_schema: bool,

    /// Reuse a job instance id (a second run with the same id is refused)
    #[arg(long)]
    run_id: Option<String>,
}

impl ImportArgs {
    fn into_config(self) -> Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::from_file(path)?,
            None => JobConfig::default(),
        };

        if let Some(source) = self.source {
            config.source_path = source;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(threshold) = self.threshold {
            config.salary_threshold = threshold;
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if self.strict {
            config.strict = true;
        }
        if self.reset_schema {
            config.destructive_schema_reset = true;
        }
        if self.run_id.is_some() {
            config.run_id = self.run_id;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Import(args) => run_import(args),
        Command::History { database, limit } => run_history(&database, limit),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_import(args: ImportArgs) -> Result<ExitCode> {
    let config = args.into_config()?;

    println!("🗄️  Employee import: {} → {}", config.source_path.display(), config.database_path.display());

    let store = SqliteEmployeeStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database: {}", config.database_path.display()))?;
    let repository = JobRepository::open(&config.database_path)
        .context("Failed to open job repository")?;

    let mut job = JobDriver::new(&config, store)?.with_repository(repository);

    match job.run() {
        Ok(report) => {
            println!("✓ {}", report.summary());
            for skipped in &report.skipped_lines {
                println!("  skipped {}", skipped);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            match e.line() {
                Some(line) => eprintln!("❌ Job failed at line {}: {}", line, e),
                None => eprintln!("❌ Job failed: {}", e),
            }
            eprintln!("   {}", job.report().summary());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_history(database: &Path, limit: usize) -> Result<ExitCode> {
    let repository = JobRepository::open(database)
        .with_context(|| format!("Failed to open job repository: {}", database.display()))?;
    repository.ensure_schema()?;

    let executions = repository.list_executions(limit)?;
    if executions.is_empty() {
        println!("No job executions recorded in {}", database.display());
        return Ok(ExitCode::SUCCESS);
    }

    for execution in executions {
        println!(
            "{}  {:<11}  read {:>5}  written {:>5}  chunks {:>3}  {}  {}",
            execution.execution_id,
            execution.status.as_str(),
            execution.counts.read,
            execution.counts.written,
            execution.counts.chunks,
            execution
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            execution.exit_message.unwrap_or_default(),
        );
    }

    Ok(ExitCode::SUCCESS)
}
