// ============================================================================
// roast - command line front end for Resume Roast
// ============================================================================
// Usage:
//   roast signup <username> --password P     Create an account
//   roast login <username> --password P      Check credentials
//   roast prefs show --user U --password P   Show roast preferences
//   roast prefs set --user U --password P --style S --intensity I
//   roast run --user U --password P <file>   Roast a resume
//   roast usage --user U --password P [--json]
//   roast export --user U --password P       JSON dump of a user's data
//   roast stats                              Local database statistics
//
// Every per-user command logs in first and only touches the logged-in
// user's own records. The password may come from ROAST_PASSWORD.
// ============================================================================

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use roast_core::{
    create_text_model, detect_file_type, normalize_whitespace, AuthOutcome, BackendKind, Backends,
    FileType, IdentityService, Intensity, PreferenceRecord, PreferenceStore, RoastConfig, RoastDb,
    RoastOrchestrator, RoastSettings, RoastStyle, SessionContext, UsageLog, UsageSummary,
};

/// Resume Roast: AI critiques of your resume
#[derive(Parser)]
#[command(name = "roast", version, about = "Roast resumes with a generative model")]
struct Cli {
    /// Path to a TOML config file (default: $ROAST_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new account
    Signup {
        username: String,
        #[arg(long, env = "ROAST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Check a username and password
    Login {
        username: String,
        #[arg(long, env = "ROAST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show or change roast preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Roast a resume file
    Run {
        /// Account to log in as
        #[arg(long)]
        user: String,

        #[arg(long, env = "ROAST_PASSWORD", hide_env_values = true)]
        password: String,

        /// Resume file (.txt, or .pdf together with --text-from)
        file: PathBuf,

        /// Text already extracted from a PDF (pages may be separated by form feeds)
        #[arg(long)]
        text_from: Option<PathBuf>,
    },

    /// List usage events and the aggregate summary
    Usage {
        #[command(flatten)]
        login: LoginArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export preferences, usage events and summary as JSON
    Export {
        #[command(flatten)]
        login: LoginArgs,
    },

    /// Show local database statistics
    Stats,
}

/// Credentials for commands that act on one user's records
#[derive(Args)]
struct LoginArgs {
    #[arg(long)]
    user: String,

    #[arg(long, env = "ROAST_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum PrefsAction {
    Show {
        #[command(flatten)]
        login: LoginArgs,
    },
    Set {
        #[command(flatten)]
        login: LoginArgs,
        /// gentle, balanced or savage
        #[arg(long)]
        style: RoastStyle,
        /// low, medium or high
        #[arg(long)]
        intensity: Intensity,
    },
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roast_core=info".parse()?)
                .add_directive("roast_cli=info".parse()?),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging()?;
    if let Err(e) = dotenv {
        debug!("No .env loaded: {}", e);
    }

    let config = RoastConfig::load(cli.config.as_deref())?;

    if let Commands::Stats = cli.command {
        return cmd_stats(&config);
    }

    let backends = Backends::from_config(&config.storage)?;
    info!("Storage backend: {}", config.storage.backend.as_str());

    match cli.command {
        Commands::Signup { username, password } => cmd_signup(&backends, &username, &password).await,
        Commands::Login { username, password } => cmd_login(&backends, &username, &password).await,
        Commands::Prefs { action } => cmd_prefs(&backends, action).await,
        Commands::Run {
            user,
            password,
            file,
            text_from,
        } => cmd_run(&config, &backends, &user, &password, &file, text_from.as_deref()).await,
        Commands::Usage { login, json } => cmd_usage(&backends, &login, json).await,
        Commands::Export { login } => cmd_export(&backends, &login).await,
        Commands::Stats => Ok(()),
    }
}

// ============================================================================
// Accounts
// ============================================================================

async fn cmd_signup(backends: &Backends, username: &str, password: &str) -> Result<()> {
    let identity = IdentityService::new(backends.credentials.clone());
    let outcome = SessionContext::new().signup(&identity, username, password).await;
    report_auth(&outcome)
}

async fn cmd_login(backends: &Backends, username: &str, password: &str) -> Result<()> {
    let identity = IdentityService::new(backends.credentials.clone());
    let mut session = SessionContext::new();
    let outcome = session.login(&identity, username, password).await;
    report_auth(&outcome)
}

/// Log in or fail the command. The returned session always has a user.
async fn login(backends: &Backends, username: &str, password: &str) -> Result<SessionContext> {
    let identity = IdentityService::new(backends.credentials.clone());
    let mut session = SessionContext::new();
    let outcome = session.login(&identity, username, password).await;
    if !outcome.is_success() {
        bail!("{}", outcome.message());
    }
    Ok(session)
}

/// Owner key of a session produced by [`login`]
fn owner(session: &SessionContext) -> Result<&str> {
    session.user().ok_or_else(|| anyhow!("Not logged in"))
}

fn report_auth(outcome: &AuthOutcome) -> Result<()> {
    if outcome.is_success() {
        println!("{}", outcome.message());
        Ok(())
    } else {
        bail!("{}", outcome.message())
    }
}

// ============================================================================
// Preferences
// ============================================================================

async fn cmd_prefs(backends: &Backends, action: PrefsAction) -> Result<()> {
    let store = PreferenceStore::new(backends.preferences.clone());

    match action {
        PrefsAction::Show { login: creds } => {
            let session = login(backends, &creds.user, &creds.password).await?;
            let prefs = store.get_for(&session).await;
            println!("Roast style: {}", prefs.roast_style);
            println!("Intensity:   {}", prefs.intensity);
        }
        PrefsAction::Set {
            login: creds,
            style,
            intensity,
        } => {
            let session = login(backends, &creds.user, &creds.password).await?;
            let status = store
                .save_for(&session, PreferenceRecord::new(style, intensity))
                .await;
            if status.is_verified() {
                println!("{}", status.message());
            } else {
                eprintln!("Warning: {}", status.message());
            }
        }
    }

    Ok(())
}

// ============================================================================
// Roasting
// ============================================================================

async fn cmd_run(
    config: &RoastConfig,
    backends: &Backends,
    username: &str,
    password: &str,
    file: &Path,
    text_from: Option<&Path>,
) -> Result<()> {
    let mut session = login(backends, username, password).await?;

    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let declared = file.extension().and_then(|e| e.to_str());
    let file_type = detect_file_type(&bytes, declared);

    let text = match (file_type, text_from) {
        (_, Some(extracted)) => {
            let raw = std::fs::read_to_string(extracted)
                .with_context(|| format!("Failed to read {}", extracted.display()))?;
            let pages: Vec<&str> = raw.split('\u{c}').collect();
            normalize_whitespace(&pages)
        }
        (FileType::Pdf, None) => {
            bail!("PDF text extraction is not built in; pass the extracted text with --text-from")
        }
        (FileType::Txt, None) => String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", file.display()))?,
        (FileType::Unknown, None) => bail!("Unsupported file type: {}", file.display()),
    };
    println!("Extracted {} characters from {} ({})", text.chars().count(), file.display(), file_type);

    let model = create_text_model(&config.model)?;
    let orchestrator = RoastOrchestrator::new(
        PreferenceStore::new(backends.preferences.clone()),
        UsageLog::new(backends.usage.clone()),
        model,
        RoastSettings::from(&config.model),
    );

    let roast = orchestrator.roast(Some(owner(&session)?), &text, file_type).await;
    session.show_result();

    println!();
    if roast.success {
        println!("=== AI's Roast of Your Resume ({} / {}) ===", roast.roast_style, roast.intensity);
        println!("{}", roast.roast_text);
        println!();
        println!("({:.2}s, {} chars, {})", roast.processing_time_seconds, roast.output_length_chars, roast.model_id);
    } else {
        eprintln!("{}", roast.roast_text);
    }

    Ok(())
}

// ============================================================================
// Usage & export
// ============================================================================

fn format_timestamp(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|_| format!("(invalid: {})", ts))
}

fn print_summary(summary: &UsageSummary) {
    println!("Roasts:       {}", summary.count);
    println!("Success rate: {:.1}%", summary.success_rate * 100.0);
    println!("Mean time:    {:.2}s", summary.mean_processing_time);
}

async fn cmd_usage(backends: &Backends, creds: &LoginArgs, json: bool) -> Result<()> {
    let session = login(backends, &creds.user, &creds.password).await?;
    let log = UsageLog::new(backends.usage.clone());
    let events = log.read_all(owner(&session)?).await?;
    let summary = UsageSummary::from_events(&events);

    if json {
        let out = serde_json::json!({ "events": events, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No usage recorded for {}.", creds.user);
        return Ok(());
    }

    println!("{:<24}  {:<8}  {:>8}  {:>7}  {}", "TIMESTAMP", "TYPE", "SECONDS", "CHARS", "OK");
    println!("{}", "-".repeat(60));
    for event in &events {
        println!(
            "{:<24}  {:<8}  {:>8.2}  {:>7}  {}",
            format_timestamp(&event.timestamp),
            event.file_type,
            event.processing_time_seconds,
            event.output_length_chars,
            if event.success { "yes" } else { "no" }
        );
    }
    println!();
    print_summary(&summary);

    Ok(())
}

async fn cmd_export(backends: &Backends, creds: &LoginArgs) -> Result<()> {
    let session = login(backends, &creds.user, &creds.password).await?;
    let user = owner(&session)?;
    let prefs = PreferenceStore::new(backends.preferences.clone());
    let log = UsageLog::new(backends.usage.clone());

    let preferences = prefs.try_get(user).await?;
    let events = log.read_all(user).await?;
    let summary = UsageSummary::from_events(&events);

    let export = serde_json::json!({
        "username": session.username(),
        "user_id": user,
        "preferences": preferences,
        "usage": events,
        "summary": summary,
        "exported_at": Utc::now().to_rfc3339(),
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn cmd_stats(config: &RoastConfig) -> Result<()> {
    if config.storage.backend != BackendKind::Local {
        bail!(
            "stats is only available for the local backend (configured: {})",
            config.storage.backend.as_str()
        );
    }

    let dir = config.storage.resolve_data_dir()?;
    let db = RoastDb::open(Some(dir.join(roast_core::store::DB_FILE).as_path()))?;
    let stats = db.stats()?;

    println!("=== Resume Roast Database Stats ===");
    println!("Database:    {}", db.path().display());
    println!();
    println!("Preferences: {}", stats.preference_records);
    println!("Usage:       {}", stats.usage_events);

    Ok(())
}
