//! QuizWhiz - study data import, export and sync
//!
//! Brings flashcards and quizzes in from JSON, XML, CSV and plain-text files,
//! exports them back out, and keeps the remote store, the local cache and the
//! session state in step.

mod analysis;
mod auth;
mod config;
mod error;
mod export;
mod import;
mod models;
mod pipeline;
mod reconcile;
mod remote;
mod storage;
mod streak;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};

use analysis::ImportAnalysis;
use auth::SessionAuth;
use config::Config;
use export::ExportFormat;
use import::ImportFile;
use models::StreakRecord;
use pipeline::ImportPipeline;
use reconcile::{ImportMode, ImportReconciler};
use remote::DirectoryRemoteStore;
use storage::FileCache;

const REPORT_WIDTH: usize = 76;

// ══════════════════════════════════════════════════════════════════════════
// CLI Arguments
// ══════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "quizwhiz")]
#[command(author, version, about = "Import, export and sync QuizWhiz study data", long_about = None)]
struct Args {
    /// Local cache directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory backing the remote store
    #[arg(long, global = true)]
    remote_dir: Option<PathBuf>,

    /// Log progress (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what a file would import, without importing it
    Analyze { file: PathBuf },

    /// Import flashcards, quizzes and settings from a file
    Import {
        file: PathBuf,

        /// Merge with or replace existing flashcards and quizzes
        #[arg(long, value_enum)]
        mode: Option<ImportMode>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Export everything to a file
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Output path (defaults to a dated file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a study session for today
    Study,

    /// Show the current study streak
    Streak,

    /// Sign in as a user
    Login { user_id: String },

    /// Sign out
    Logout,

    /// Delete all data for the current user
    Reset {
        #[arg(short, long)]
        yes: bool,
    },
}

// ══════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ══════════════════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut config = Config::load().unwrap_or_else(|e| {
        log::warn!("Using default config: {:#}", e);
        Config::default()
    });

    // Session changes only touch the config.
    match &args.command {
        Command::Login { user_id } => return login(&mut config, user_id),
        Command::Logout => return logout(&mut config),
        _ => {}
    }

    let auth = match &config.signed_in_user {
        Some(user_id) => SessionAuth::signed_in(user_id.clone()),
        None => SessionAuth::new(),
    };
    let cache_dir = args.data_dir.clone().unwrap_or_else(|| config.cache_dir());
    let remote_dir = args.remote_dir.clone().unwrap_or_else(|| config.remote_dir());
    let cache = FileCache::new(cache_dir, config.cache_ttl_hours)?;
    log::info!("Local cache: {:?}", cache.dir());
    let remote = DirectoryRemoteStore::new(remote_dir);
    let pipeline = ImportPipeline::new(ImportReconciler::new(remote, cache, auth));

    let today = Local::now().date_naive();
    pipeline.load(today).await;

    match args.command {
        Command::Analyze { file } => {
            let file = ImportFile::read(&file)?;
            let analysis = pipeline.analyze(&file)?;
            print_analysis(&analysis);
        }
        Command::Import { file, mode, yes } => {
            let mode = mode.unwrap_or(config.default_mode);
            let file = ImportFile::read(&file)?;
            let analysis = pipeline.analyze(&file)?;
            print_analysis(&analysis);
            if !analysis.is_valid {
                bail!("Nothing to import from {}", file.name);
            }

            let prompt = match mode {
                ImportMode::Merge => "Add these records to your existing data?".to_string(),
                ImportMode::Replace => "Replace ALL existing flashcards and quizzes with these?".to_string(),
            };
            if !yes && !confirm(&prompt)? {
                println!("Import cancelled.");
                return Ok(());
            }

            let result = match pipeline.import(&file, mode, today).await {
                Err(e) if e.is_parse_error() || e.is_format_error() => {
                    bail!("{} could not be imported: {}", file.name, e)
                }
                other => other?,
            };
            println!(
                "✓ Imported {} flashcards and {} quiz questions ({} mode)",
                result.flashcards_imported, result.quizzes_imported, mode
            );
            for error in &result.errors {
                println!("{}", wrap_item(&format!("! {}", error)));
            }
        }
        Command::Export { format, output } => {
            let outcome = pipeline.export(format, Utc::now()).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&outcome.artifact.file_name));
            fs::write(&path, &outcome.artifact.content)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            println!("✓ Exported to {} ({})", path.display(), outcome.artifact.mime_type);
            if outcome.backed_up {
                println!("  Backup copy saved remotely.");
            }
        }
        Command::Study => {
            let streak = pipeline.study(today).await;
            println!("✓ Study session recorded");
            print_streak(&streak);
        }
        Command::Streak => {
            let state = pipeline.reconciler().snapshot().await;
            print_streak(&state.streak_data);
        }
        Command::Reset { yes } => {
            if !yes && !confirm("Delete ALL flashcards, quizzes, settings and stats?")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            pipeline.reset().await?;
            println!("✓ All data deleted");
        }
        Command::Login { .. } | Command::Logout => {}
    }

    Ok(())
}

fn login(config: &mut Config, user_id: &str) -> Result<()> {
    let auth = SessionAuth::new();
    auth.begin_login(user_id)?;
    if user_id.trim().is_empty() {
        auth.fail_login()?;
        bail!("User id must not be empty");
    }
    auth.complete_login()?;

    config.signed_in_user = Some(user_id.to_string());
    config.save()?;
    println!("✓ Signed in as {}", user_id);
    Ok(())
}

fn logout(config: &mut Config) -> Result<()> {
    let auth = match config.signed_in_user.take() {
        Some(user_id) => SessionAuth::signed_in(user_id),
        None => {
            println!("Not signed in.");
            return Ok(());
        }
    };
    auth.logout();
    config.save()?;
    println!("✓ Signed out");
    Ok(())
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn wrap_item(text: &str) -> String {
    let options = textwrap::Options::new(REPORT_WIDTH)
        .initial_indent("  ")
        .subsequent_indent("    ");
    textwrap::fill(text, options)
}

fn print_analysis(analysis: &ImportAnalysis) {
    println!("{} ({} bytes, {})", analysis.file_name, analysis.file_size, analysis.file_type);

    if let Some(error) = &analysis.error {
        println!("{}", wrap_item(&format!("✗ {}", error)));
        return;
    }

    if let Some(schema) = analysis.schema {
        let label = if analysis.is_complete_backup { " (complete backup)" } else { "" };
        println!("  Format: {}{}", schema.as_str(), label);
    }
    let counts = &analysis.counts;
    println!("  Flashcards: {}", counts.flashcards);
    println!("  Quiz questions: {}", counts.quizzes);
    if counts.settings > 0 {
        println!("  Settings: {}", counts.settings);
    }
    if counts.stats > 0 || counts.scores > 0 {
        println!("  Stats: {} fields, {} score records", counts.stats, counts.scores);
    }
    if counts.user_profile > 0 {
        println!("  Profile fields: {}", counts.user_profile);
    }
    if counts.streak {
        println!("  Streak data: yes");
    }
    if !analysis.decks.is_empty() {
        let decks: Vec<&str> = analysis.decks.iter().map(String::as_str).collect();
        println!("{}", wrap_item(&format!("Decks: {}", decks.join(", "))));
    }
    if !analysis.difficulties.is_empty() {
        let levels: Vec<&str> = analysis.difficulties.iter().map(String::as_str).collect();
        println!("  Difficulties: {}", levels.join(", "));
    }

    if !analysis.preview.is_empty() {
        println!("  Preview:");
        for line in &analysis.preview {
            println!("    {}", line);
        }
    }
    if !analysis.validation_errors.is_empty() {
        println!("  Skipped {} record(s):", analysis.validation_errors.len());
        for warning in &analysis.validation_errors {
            println!("{}", wrap_item(&format!("- {}", warning)));
        }
    }
}

fn print_streak(streak: &StreakRecord) {
    println!("  Current streak: {} day(s)", streak.current_streak);
    println!("  Longest streak: {} day(s)", streak.longest_streak);
    println!("  Total study days: {}", streak.total_study_days);
    match streak.last_study_date {
        Some(date) => println!("  Last studied: {}", date),
        None => println!("  Last studied: never"),
    }
}
