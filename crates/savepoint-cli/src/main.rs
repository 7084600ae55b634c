//! Savepoint CLI - manage and sync versioned game saves from the terminal.
//!
//! State is kept in a local JSON snapshot file between invocations; sync
//! commands need a remote save service configured via `--remote-url` or
//! `SAVEPOINT_REMOTE_URL`.

use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use savepoint_core::{
    AutoSyncScheduler, ConflictRecord, EngineConfig, EngineSnapshot, HttpCloudStore,
    MemoryCloudStore, RemoteLimits, ResolutionStrategy, SaveEngine, SaveId, SaveOptions,
    SaveRecord, SlotRegistry,
};
use serde::Serialize;
use thiserror::Error;

const ENV_REMOTE_URL: &str = "SAVEPOINT_REMOTE_URL";
const ENV_ENCRYPTION_KEY: &str = "SAVEPOINT_ENCRYPTION_KEY";
const ENV_STATE_PATH: &str = "SAVEPOINT_STATE_PATH";

#[derive(Parser)]
#[command(name = "savepoint")]
#[command(about = "Versioned game saves with cloud sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the local state file
    #[arg(long, value_name = "PATH")]
    state_path: Option<PathBuf>,

    /// Remote save service base URL
    #[arg(long, value_name = "URL")]
    remote_url: Option<String>,

    /// Hex AES-256 key used by encrypting slots
    #[arg(long, value_name = "HEX")]
    encryption_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a save from a JSON payload (file or stdin)
    Save {
        user: String,
        game: String,
        /// Target slot (see `savepoint slots`)
        slot: String,
        /// Read the payload from this file instead of stdin
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Human-readable description
        #[arg(long)]
        description: Option<String>,
        /// Tag the save (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Game build identifier
        #[arg(long, default_value = "")]
        game_version: String,
        /// Originating platform
        #[arg(long, default_value = "cli")]
        platform: String,
    },
    /// Decode a save back to JSON
    Load {
        /// Save ID
        id: String,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List a user's saves, newest first
    List {
        user: String,
        /// Filter by game
        #[arg(long)]
        game: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the slot catalog
    Slots,
    /// Delete a save
    Delete {
        /// Save ID
        id: String,
    },
    /// Sync one save, or drain the whole pending queue
    Sync {
        /// Save ID (all pending saves when omitted)
        id: Option<String>,
        /// Upload the local copy even when the remote is newer
        #[arg(long)]
        force: bool,
    },
    /// List pending sync conflicts
    Conflicts {
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a pending conflict
    Resolve {
        /// Save ID
        id: String,
        /// Resolution strategy
        #[arg(value_enum)]
        strategy: StrategyArg,
    },
    /// Export a user's saves to a portable document
    Export {
        user: String,
        /// Filter by game
        #[arg(long)]
        game: Option<String>,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import saves from an export document
    Import {
        /// Export document path
        file: PathBuf,
    },
    /// Show engine statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the auto-sync scheduler until interrupted
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] savepoint_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid save ID: {0}")]
    InvalidSaveId(String),
    #[error("No payload provided. Pass --file or pipe JSON on stdin.")]
    EmptyPayload,
    #[error(
        "No remote configured. Pass --remote-url or set SAVEPOINT_REMOTE_URL to enable sync commands."
    )]
    RemoteNotConfigured,
    #[error("Could not determine a state file location; pass --state-path")]
    NoStatePath,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    UseLocal,
    UseCloud,
    Merge,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::UseLocal => Self::UseLocal,
            StrategyArg::UseCloud => Self::UseCloud,
            StrategyArg::Merge => Self::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("savepoint=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let state_path = resolve_state_path(cli.state_path)?;
    let remote = cli
        .remote_url
        .or_else(|| env::var(ENV_REMOTE_URL).ok())
        .filter(|url| !url.trim().is_empty());
    let encryption_key = cli
        .encryption_key
        .or_else(|| env::var(ENV_ENCRYPTION_KEY).ok());
    let engine = open_engine(remote.as_deref(), encryption_key, &state_path).await?;

    match cli.command {
        Commands::Save {
            user,
            game,
            slot,
            file,
            description,
            tags,
            game_version,
            platform,
        } => {
            let value = read_payload(file.as_deref())?;
            let options = SaveOptions {
                game_version,
                platform,
                tags,
                description,
                ..Default::default()
            };
            let record = engine
                .create_save(&user, &game, &slot, &value, options)
                .await?;
            persist_state(&engine, &state_path).await?;
            println!("{} (version {})", record.id, record.metadata.version);
        }
        Commands::Load { id, output } => {
            let save_id = parse_save_id(&id)?;
            let value: serde_json::Value = engine.load_save(&save_id).await?;
            write_output(&serde_json::to_string_pretty(&value)?, output.as_deref())?;
        }
        Commands::List { user, game, json } => {
            let saves = engine.list_saves(&user, game.as_deref()).await;
            if json {
                let items: Vec<SaveListItem> = saves.iter().map(save_to_list_item).collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if saves.is_empty() {
                println!("No saves found.");
            } else {
                for line in format_save_lines(&saves) {
                    println!("{line}");
                }
            }
        }
        Commands::Slots => {
            for slot in engine.slots().definitions() {
                println!(
                    "{:<12} max {:>8} B  keep {:>3}  sync {:<5}  encrypted {}",
                    slot.name,
                    slot.max_size_bytes,
                    slot.versions_to_keep,
                    slot.sync_with_cloud,
                    slot.encryption_enabled
                );
            }
        }
        Commands::Delete { id } => {
            let save_id = parse_save_id(&id)?;
            if engine.delete_save(&save_id).await {
                persist_state(&engine, &state_path).await?;
                println!("Deleted {save_id}");
            } else {
                println!("Save {save_id} was already gone");
            }
        }
        Commands::Sync { id, force } => {
            require_remote(remote.as_deref())?;
            match id {
                Some(id) => {
                    let save_id = parse_save_id(&id)?;
                    let outcome = engine.sync_with_cloud(&save_id, force).await?;
                    println!("{outcome}");
                }
                None => {
                    savepoint_core::sync::scheduler::run_once(&engine).await;
                    let remaining = engine.pending_sync().await.len();
                    println!("Sync pass finished, {remaining} save(s) still pending");
                }
            }
            persist_state(&engine, &state_path).await?;
        }
        Commands::Conflicts { user, json } => {
            let conflicts = engine.pending_conflicts(&user).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&conflicts)?);
            } else if conflicts.is_empty() {
                println!("No pending conflicts.");
            } else {
                for line in format_conflict_lines(&conflicts) {
                    println!("{line}");
                }
            }
        }
        Commands::Resolve { id, strategy } => {
            require_remote(remote.as_deref())?;
            let save_id = parse_save_id(&id)?;
            let resolved = engine.resolve_conflict(&save_id, strategy.into()).await?;
            persist_state(&engine, &state_path).await?;
            println!(
                "Resolved {save_id} with {} (now version {})",
                ResolutionStrategy::from(strategy),
                resolved.metadata.version
            );
        }
        Commands::Export { user, game, output } => {
            let document = engine.export_saves(&user, game.as_deref()).await;
            write_output(&document.to_json()?, output.as_deref())?;
        }
        Commands::Import { file } => {
            let payload = fs::read_to_string(&file)?;
            let document = savepoint_core::ExportDocument::from_json(&payload)?;
            let imported = engine.import_saves(&document).await?;
            persist_state(&engine, &state_path).await?;
            println!("Imported {imported} save(s)");
        }
        Commands::Stats { json } => {
            let stats = engine.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("saves:     {}", stats.total_saves);
                println!("bytes:     {}", stats.total_payload_bytes);
                println!("pending:   {}", stats.pending_sync);
                println!("conflicts: {}", stats.unresolved_conflicts);
                for (slot, count) in &stats.saves_per_slot {
                    println!("  {slot}: {count}");
                }
            }
        }
        Commands::Watch => {
            require_remote(remote.as_deref())?;
            let interval = engine.sync_interval();
            let scheduler = AutoSyncScheduler::start(engine.clone(), interval);
            println!("Auto-sync running every {}s, Ctrl-C to stop", interval.as_secs());
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown().await;
            persist_state(&engine, &state_path).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

async fn open_engine(
    remote: Option<&str>,
    encryption_key: Option<String>,
    state_path: &Path,
) -> Result<Arc<SaveEngine>, CliError> {
    let config = EngineConfig {
        encryption_key,
        ..Default::default()
    };

    let engine = match remote {
        Some(url) => {
            let store = HttpCloudStore::new(url, RemoteLimits::default())?;
            SaveEngine::new(config, SlotRegistry::with_defaults(), Arc::new(store))?
        }
        None => SaveEngine::new(
            config,
            SlotRegistry::with_defaults(),
            Arc::new(MemoryCloudStore::default()),
        )?,
    };

    if state_path.exists() {
        let payload = fs::read_to_string(state_path)?;
        let snapshot: EngineSnapshot = serde_json::from_str(&payload)?;
        tracing::debug!(
            path = %state_path.display(),
            saves = snapshot.saves.len(),
            "local state loaded"
        );
        engine.restore(snapshot).await;
    }

    Ok(Arc::new(engine))
}

async fn persist_state(engine: &SaveEngine, state_path: &Path) -> Result<(), CliError> {
    if let Some(parent) = state_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let snapshot = engine.snapshot().await;
    fs::write(state_path, serde_json::to_string_pretty(&snapshot)?)?;
    tracing::debug!(
        path = %state_path.display(),
        saves = snapshot.saves.len(),
        "local state persisted"
    );
    Ok(())
}

fn require_remote(remote: Option<&str>) -> Result<(), CliError> {
    if remote.is_none() {
        return Err(CliError::RemoteNotConfigured);
    }
    Ok(())
}

fn resolve_state_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = env::var(ENV_STATE_PATH) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    dirs::data_dir()
        .map(|dir| dir.join("savepoint").join("state.json"))
        .ok_or(CliError::NoStatePath)
}

fn parse_save_id(raw: &str) -> Result<SaveId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidSaveId(raw.to_string()))
}

fn read_payload(file: Option<&Path>) -> Result<serde_json::Value, CliError> {
    let raw = match file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(CliError::EmptyPayload);
            }
            let mut buffer = String::new();
            stdin.read_to_string(&mut buffer)?;
            buffer
        }
    };

    if raw.trim().is_empty() {
        return Err(CliError::EmptyPayload);
    }
    Ok(serde_json::from_str(&raw)?)
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => fs::write(path, content)?,
        None => println!("{content}"),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SaveListItem {
    id: String,
    slot: String,
    game: String,
    version: u64,
    timestamp: String,
    size_bytes: usize,
    description: Option<String>,
    tags: Vec<String>,
}

fn save_to_list_item(record: &SaveRecord) -> SaveListItem {
    SaveListItem {
        id: record.id.to_string(),
        slot: record.slot_name.clone(),
        game: record.game_id.clone(),
        version: record.metadata.version,
        timestamp: record.metadata.timestamp.to_rfc3339(),
        size_bytes: record.metadata.size_bytes,
        description: record.description.clone(),
        tags: record.tags.clone(),
    }
}

fn format_save_lines(saves: &[SaveRecord]) -> Vec<String> {
    saves
        .iter()
        .map(|record| {
            let description = record.description.as_deref().unwrap_or("");
            format!(
                "{}  {:<12} v{:<4} {}  {:>8} B  {}",
                record.id,
                record.slot_name,
                record.metadata.version,
                record.metadata.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.metadata.size_bytes,
                description
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    for conflict in conflicts {
        lines.push(format!(
            "{}  {:?} conflict in {} (local v{} @ {}, cloud v{} @ {})",
            conflict.save_id,
            conflict.conflict_type,
            conflict.local.slot_name,
            conflict.local.metadata.version,
            conflict.local.metadata.timestamp.format("%Y-%m-%d %H:%M:%S"),
            conflict.cloud.metadata.version,
            conflict.cloud.metadata.timestamp.format("%Y-%m-%d %H:%M:%S"),
        ));
        for option in &conflict.options {
            lines.push(format!("    {}: {}", option.strategy, option.consequence));
        }
    }
    lines
}

fn run_completions(shell: CompletionShell, output: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    match output {
        Some(path) => {
            let mut file = fs::File::create(path)?;
            write_completions(shell, &mut command, &mut file);
        }
        None => {
            let mut stdout = io::stdout();
            write_completions(shell, &mut command, &mut stdout);
        }
    }
    Ok(())
}

fn write_completions(shell: CompletionShell, command: &mut clap::Command, writer: &mut dyn Write) {
    match shell {
        CompletionShell::Bash => generate(shells::Bash, command, "savepoint", writer),
        CompletionShell::Zsh => generate(shells::Zsh, command, "savepoint", writer),
        CompletionShell::Fish => generate(shells::Fish, command, "savepoint", writer),
    }
}
