use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use session_core::backend::FileBackend;
use session_core::guard::{check_route, RouteAccess};
use session_core::interaction::{InteractionKind, LocalInteractionSource};
use session_core::paths::{data_dir, settings_path, store_path};
use session_core::settings::load_settings;
use session_core::{ActivityTracker, EncryptedStore, LogoutListener};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-cli")]
#[command(author, version, about = "Encrypted local session store and inactivity tracker", long_about = None)]
struct Cli {
    /// Directory holding the store and settings files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the inactivity timeout (milliseconds)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the signed-in user's record
    Login {
        /// User profile as JSON
        #[arg(long)]
        user: String,
    },
    /// Show session state
    Status,
    /// Record activity now (logs out if the session already expired)
    Touch,
    /// Clear the session
    Logout,
    /// Check whether a route is reachable with the current session
    Route { path: String },
    /// Read and decrypt a record
    Get { key: String },
    /// Encrypt and write a record; JSON values are stored as parsed
    Set { key: String, value: String },
    /// Delete a record
    Remove { key: String },
    /// Track stdin lines as key presses until an inactivity logout or EOF
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let source = Arc::new(LocalInteractionSource::new());
    let tracker = open_tracker(cli.data_dir, cli.timeout_ms, source.clone())?;

    match cli.command {
        Commands::Login { user } => {
            let user: serde_json::Value =
                serde_json::from_str(&user).map_err(|e| anyhow!("user must be JSON: {e}"))?;
            tracker.login(&user)?;
            tracker.initialize()?;
            tracker.stop();
            println!("Signed in as {}", tracker.user_name());
        }
        Commands::Status => status_command(&tracker)?,
        Commands::Touch => {
            if !tracker.is_authenticated() {
                return Err(anyhow!("no active session"));
            }
            tracker.initialize()?;
            tracker.stop();
            if tracker.is_authenticated() {
                println!("Activity recorded");
            } else {
                println!("Session had expired; signed out");
            }
        }
        Commands::Logout => {
            tracker.sign_out();
            println!("Signed out");
        }
        Commands::Route { path } => match check_route(&tracker, &path) {
            RouteAccess::Allow => println!("allow {path}"),
            RouteAccess::Redirect { to, return_to } => match return_to {
                Some(back) => println!("redirect {to} (return to {back})"),
                None => println!("redirect {to}"),
            },
        },
        Commands::Get { key } => match tracker.store().get_item(&key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("null"),
        },
        Commands::Set { key, value } => {
            let parsed = serde_json::from_str::<serde_json::Value>(&value)
                .unwrap_or(serde_json::Value::String(value));
            tracker.store().set_item(&key, &parsed)?;
        }
        Commands::Remove { key } => tracker.store().remove_item(&key)?,
        Commands::Watch => watch_command(&tracker, &source).await?,
    }
    Ok(())
}

fn open_tracker(
    data_dir_override: Option<PathBuf>,
    timeout_override: Option<u64>,
    source: Arc<LocalInteractionSource>,
) -> Result<ActivityTracker> {
    let data = match data_dir_override {
        Some(dir) => dir,
        None => data_dir()?,
    };
    std::fs::create_dir_all(&data)?;
    let mut settings = load_settings(&settings_path(&data))?;
    if let Some(timeout) = timeout_override {
        settings.inactivity_timeout_ms = timeout;
    }
    let backend = FileBackend::open(store_path(&data))?;
    let store = EncryptedStore::from_settings(Box::new(backend), &settings)?;
    Ok(ActivityTracker::new(store, source, settings)?)
}

fn status_command(tracker: &ActivityTracker) -> Result<()> {
    let authenticated = tracker.is_authenticated();
    let status = serde_json::json!({
        "authenticated": authenticated,
        "expired": authenticated && tracker.is_session_expired(),
        "user": authenticated.then(|| tracker.user_name()),
        "email": tracker.user_email(),
        "lastActivity": tracker.last_activity(),
        "timeoutMs": tracker.settings().inactivity_timeout_ms,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn watch_command(
    tracker: &ActivityTracker,
    source: &LocalInteractionSource,
) -> Result<()> {
    if !tracker.is_authenticated() {
        return Err(anyhow!("no active session; run login first"));
    }
    let (tx, mut logged_out) = mpsc::unbounded_channel();
    let listener: LogoutListener = Arc::new(move || {
        let _ = tx.send(());
    });
    tracker.subscribe(Arc::clone(&listener));
    tracker.initialize()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("watching stdin; each line counts as activity");
    loop {
        tokio::select! {
            _ = logged_out.recv() => {
                println!("Signed out after inactivity");
                break;
            }
            line = lines.next_line() => match line? {
                Some(_) => source.emit(InteractionKind::KeyPress),
                None => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }
    tracker.stop();
    tracker.unsubscribe(&listener);
    Ok(())
}
