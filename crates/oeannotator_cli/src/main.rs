//! Command-line entry point for project maintenance.
//!
//! # Responsibility
//! - Expose export, import, listing, statistics and backup operations over a
//!   store file.
//! - Keep stdout output deterministic; diagnostics go to the log file.

use clap::{Parser, Subcommand};
use oeannotator_core::backup::BackupTrigger;
use oeannotator_core::filter::statistics;
use oeannotator_core::repo::{list_project_summaries, ProjectRepository, SqliteProjectRepository};
use oeannotator_core::serializer::to_json_string;
use oeannotator_core::{
    core_version, export_project_by_id, import_project_json, init_logging_from_settings,
    open_db_with_backup, BackupScheduler, ProjectId, Settings,
};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "oeannotator", version, about = "Old English annotation store tools")]
struct Cli {
    /// Project store file.
    #[arg(long, global = true, default_value = "oeannotator.db")]
    db: PathBuf,

    /// Settings file; defaults to `settings.json` next to the store.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory for rolling log files. Logging is off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored projects.
    List,
    /// Create a project from a plain text file.
    Create {
        name: String,
        text_file: PathBuf,
    },
    /// Export a project as JSON.
    Export {
        id: ProjectId,
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Print annotation progress for a project.
    Stats { id: ProjectId },
    /// Import a project JSON document as a new project.
    Import { file: PathBuf },
    /// Take a manual snapshot of the store.
    Backup,
    /// List snapshots, newest first.
    Backups,
    /// Replace the store with a snapshot.
    Restore { file: PathBuf },
    /// Print the core version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Command::Version = cli.command {
        println!("oeannotator_core version={}", core_version());
        return Ok(());
    }

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| sibling(&cli.db, "settings.json"));
    let settings = Settings::load(&settings_path)?;
    if let Some(log_dir) = &cli.log_dir {
        init_logging_from_settings(&settings, absolute(log_dir)?)?;
    }

    let mut scheduler = BackupScheduler::new(&cli.db, &settings.backup)?;
    let mut conn = open_db_with_backup(&cli.db, &mut scheduler, chrono::Utc::now())?;

    match cli.command {
        Command::List => {
            for summary in list_project_summaries(&conn)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    summary.id,
                    summary.name,
                    summary.token_count,
                    summary.updated_at.to_rfc3339()
                );
            }
        }
        Command::Create { name, text_file } => {
            let text = fs::read_to_string(&text_file)?;
            let project =
                SqliteProjectRepository::try_new(&mut conn)?.create_project(&name, &text)?;
            println!("{}", project.id);
        }
        Command::Export { id, out } => {
            let document = export_project_by_id(&mut conn, id)?;
            let json = to_json_string(&document)?;
            match out {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Stats { id } => {
            let project = SqliteProjectRepository::try_new(&mut conn)?
                .load_project(id)?
                .ok_or_else(|| format!("project not found: {id}"))?;
            let stats = statistics(&project);
            println!(
                "tokens={}\tannotated={}\tunannotated={}\tuncertain={}\tincomplete={}\ttodo={}",
                stats.total_tokens,
                stats.annotated_tokens,
                stats.unannotated_tokens,
                stats.uncertain_count,
                stats.incomplete_count,
                stats.todo_count
            );
            for (pos, count) in &stats.pos_distribution {
                println!("{pos}\t{count}");
            }
        }
        Command::Import { file } => {
            let json = fs::read_to_string(&file)?;
            let outcome = import_project_json(&mut conn, &json)?;
            println!(
                "{}\t{}\tsource_version={}\tmigrated={}",
                outcome.project_id, outcome.name, outcome.source_version, outcome.migrated
            );
        }
        Command::Backup => {
            drop(conn);
            let entry = scheduler.snapshot(BackupTrigger::Manual, chrono::Utc::now())?;
            println!("{}", entry.data_path.display());
        }
        Command::Backups => {
            for entry in scheduler.list_backups()? {
                let projects = entry
                    .metadata
                    .as_ref()
                    .map(|metadata| metadata.projects.len().to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}\t{}\tprojects={}",
                    entry.file_name(),
                    entry.created_at.to_rfc3339(),
                    projects
                );
            }
        }
        Command::Restore { file } => {
            let outcome = scheduler.restore(&mut conn, &file, chrono::Utc::now())?;
            println!(
                "restored; previous store saved as {}",
                outcome.pre_restore.file_name()
            );
        }
        Command::Version => unreachable!("handled before the store is opened"),
    }
    Ok(())
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

fn absolute(path: &Path) -> CliResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
