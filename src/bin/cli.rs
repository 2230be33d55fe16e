//! drivediagram: command-line front end for the DriveDiagram service.
//!
//! Turns a road photo into a driving-lesson diagram, manages the account
//! session and the saved-diagram library. Local state (guest counter and
//! session) lives in a small JSON file.

use anyhow::{Context as _, anyhow};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use drivediagram::client::{
    AuthClient, ClientError, DiagramClient, FileStore, GenerateOutcome, Generator, GuestQuota,
    LibraryClient,
};
use drivediagram::models::DiagramResult;
use drivediagram::services::diagram_store::SaveOutcome;
use drivediagram::services::image_processor::{
    ImageFile, ImageProcessor, PROCESSING_EDGE_LIMIT_PX, decode_data_url, guess_mime_type,
};

static PROGRESS_MESSAGES: [&str; 5] = [
    "Analyzing road layout...",
    "Identifying key features...",
    "Simplifying elements...",
    "Applying diagram style...",
    "Finalizing...",
];
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

type SharedStore = Arc<FileStore>;

#[derive(Parser)]
#[command(name = "drivediagram")]
#[command(author, version, about = "Turn road photos into driving-lesson diagrams")]
#[command(propagate_version = true)]
struct Cli {
    /// Base URL of the DriveDiagram server
    #[arg(long, env = "DRIVEDIAGRAM_API_URL", default_value = "http://localhost:8080", global = true)]
    api_url: String,

    /// Supabase project URL (needed for account commands)
    #[arg(long, env = "SUPABASE_URL", global = true)]
    supabase_url: Option<String>,

    /// Supabase anonymous key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true, global = true)]
    supabase_anon_key: Option<String>,

    /// Where password recovery e-mails should point
    #[arg(long, env = "DRIVEDIAGRAM_RESET_REDIRECT", global = true)]
    reset_redirect: Option<String>,

    /// Local state file (guest counter and session)
    #[arg(long, env = "DRIVEDIAGRAM_STATE", default_value = ".drivediagram.json", global = true)]
    state: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a road photo into a diagram
    Generate {
        /// PNG, JPG or WEBP image, at most 5MB
        file: PathBuf,

        /// Write the generated diagram to this file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Save the result to your library (requires sign-in)
        #[arg(long)]
        save: bool,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,

        #[arg(long, env = "DRIVEDIAGRAM_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name
        #[arg(long, default_value = "Instructor")]
        name: String,
    },

    /// Sign in with e-mail and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "DRIVEDIAGRAM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the local session
    Logout,

    /// Send a password recovery e-mail
    ResetPassword {
        #[arg(long)]
        email: String,
    },

    /// Set a new password
    UpdatePassword {
        /// Access token from a recovery link; defaults to the current session
        #[arg(long)]
        recovery_token: Option<String>,

        #[arg(long, env = "DRIVEDIAGRAM_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Manage saved diagrams
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Show remaining guest generations
    Quota,
}

#[derive(Subcommand)]
enum LibraryAction {
    /// List saved diagrams, newest first
    List,

    /// Delete a saved diagram
    Delete { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

struct App {
    cli: Cli,
    store: SharedStore,
}

impl App {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cli.timeout_secs)
    }

    fn auth(&self) -> Result<AuthClient<SharedStore>, ClientError> {
        let auth = AuthClient::new(
            self.cli.supabase_url.clone().unwrap_or_default(),
            self.cli.supabase_anon_key.clone().unwrap_or_default(),
            Arc::clone(&self.store),
        )?;
        Ok(match &self.cli.reset_redirect {
            Some(url) => auth.with_redirect_to(url),
            None => auth,
        })
    }

    /// Guest mode when auth is not configured or nobody is signed in.
    fn access_token(&self) -> Option<String> {
        self.auth().ok().and_then(|auth| auth.access_token())
    }

    fn library(&self) -> Result<LibraryClient<SharedStore>, ClientError> {
        LibraryClient::new(&self.cli.api_url, Arc::new(self.auth()?), self.timeout())
    }
}

/// Logs the technical detail and hands back the short user-facing message.
fn report(e: ClientError) -> anyhow::Error {
    error!("{}", e);
    anyhow!(e.user_message())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(FileStore::new(&cli.state));
    let app = App { cli, store };

    match &app.cli.command {
        Commands::Generate { file, out, save } => {
            cmd_generate(&app, file, out.as_deref(), *save).await
        }
        Commands::Signup {
            email,
            password,
            name,
        } => {
            let user = app
                .auth()
                .map_err(report)?
                .sign_up(email, password, name)
                .await
                .map_err(report)?;
            println!(
                "Account created for {}. Check your e-mail to confirm it.",
                user.email.as_deref().unwrap_or(email)
            );
            Ok(())
        }
        Commands::Login { email, password } => {
            let session = app
                .auth()
                .map_err(report)?
                .sign_in(email, password)
                .await
                .map_err(report)?;
            println!("Welcome back, {}!", session.user.display_name());
            Ok(())
        }
        Commands::Logout => {
            app.auth().map_err(report)?.sign_out().await.map_err(report)?;
            println!("Signed out.");
            Ok(())
        }
        Commands::ResetPassword { email } => {
            app.auth()
                .map_err(report)?
                .request_password_reset(email)
                .await
                .map_err(report)?;
            println!("If an account exists for {}, a reset link is on its way.", email);
            Ok(())
        }
        Commands::UpdatePassword {
            recovery_token,
            password,
        } => {
            let auth = app.auth().map_err(report)?;
            if let Some(token) = recovery_token {
                auth.begin_password_recovery(token).await.map_err(report)?;
            }
            auth.update_password(password).await.map_err(report)?;
            println!("Password updated.");
            Ok(())
        }
        Commands::Library { action } => cmd_library(&app, action).await,
        Commands::Quota => {
            let quota = GuestQuota::new(Arc::clone(&app.store));
            if app.access_token().is_some() {
                println!("Signed in: unlimited generations.");
            } else {
                println!(
                    "{} of {} free generations left.",
                    quota.remaining(),
                    quota.limit()
                );
            }
            Ok(())
        }
    }
}

async fn cmd_generate(app: &App, file: &Path, out: Option<&Path>, save: bool) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Could not read {}", file.display()))?;
    let upload = ImageFile {
        name: file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        mime_type: guess_mime_type(&bytes).to_string(),
        bytes: Bytes::from(bytes),
    };

    let loaded = ImageProcessor::new()
        .load(&upload)
        .map_err(|e| report(e.into()))?;
    if loaded.oversized_for_processing {
        println!(
            "Note: the image is larger than {}px on one side; fine details may be simplified.",
            PROCESSING_EDGE_LIMIT_PX
        );
    }

    let endpoint = format!(
        "{}/api/generate-diagram",
        app.cli.api_url.trim_end_matches('/')
    );
    let client = DiagramClient::new(endpoint, app.timeout()).map_err(report)?;
    let generator = Generator::new(client, GuestQuota::new(Arc::clone(&app.store)));
    let token = app.access_token();

    let progress = tokio::spawn(async {
        for message in PROGRESS_MESSAGES.iter().cycle() {
            tokio::time::sleep(PROGRESS_INTERVAL).await;
            eprintln!("{}", message);
        }
    });
    let mut outcome = generator.generate(&loaded.image, token.as_deref()).await;
    progress.abort();
    if let Ok(auth) = app.auth() {
        outcome = auth.forget_if_expired(outcome);
    }

    let diagram = match outcome.map_err(report)? {
        GenerateOutcome::Blocked { limit, .. } => {
            println!(
                "You've used your {} free diagrams. Sign up for a free account to keep creating and save diagrams to your library.",
                limit
            );
            return Ok(());
        }
        GenerateOutcome::Generated(diagram) => diagram,
    };

    if let Some(explanation) = &diagram.explanation {
        println!("{}", explanation);
    }
    write_output(&diagram, out).await?;

    if token.is_none() {
        println!("{} free generations left.", generator.quota().remaining());
    }

    if save {
        match app.library().map_err(report)?.save(&diagram).await.map_err(report)? {
            SaveOutcome::Created(saved) => println!("Saved to your library as {}.", saved.id),
            SaveOutcome::Existing(saved) => println!("Already in your library as {}.", saved.id),
        }
    }

    Ok(())
}

async fn write_output(diagram: &DiagramResult, out: Option<&Path>) -> anyhow::Result<()> {
    match (out, decode_data_url(&diagram.image_url)) {
        (Some(path), Some((_, bytes))) => {
            tokio::fs::write(path, bytes)
                .await
                .with_context(|| format!("Could not write {}", path.display()))?;
            println!("Diagram written to {}", path.display());
        }
        (_, None) if !diagram.image_url.is_empty() => println!("Diagram: {}", diagram.image_url),
        (_, None) => println!("No diagram image was returned."),
        (None, Some(_)) => println!("Diagram ready. Pass --out <file> to save the image."),
    }
    Ok(())
}

async fn cmd_library(app: &App, action: &LibraryAction) -> anyhow::Result<()> {
    let library = app.library().map_err(report)?;
    match action {
        LibraryAction::List => {
            let listing = library.list().await;
            if let Some(notice) = &listing.notice {
                println!("{}", notice);
            }
            if listing.diagrams.is_empty() && listing.notice.is_none() {
                println!("Your library is empty.");
            }
            for diagram in &listing.diagrams {
                let created = chrono::DateTime::from_timestamp_millis(diagram.created_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}",
                    diagram.id,
                    created,
                    diagram.explanation.as_deref().unwrap_or("")
                );
            }
        }
        LibraryAction::Delete { id } => {
            library.delete(id).await.map_err(report)?;
            println!("Deleted {}.", id);
        }
    }
    Ok(())
}
