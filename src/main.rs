//! sharebox - command-line client for an anonymous file sharing service
//!
//! Uploads files with optional password, expiry and download limit, keeps a
//! local registry of what was uploaded from this machine, and downloads shared
//! files following the server's password flow.

mod api;
mod config;
mod download;
mod session;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use api::{FileOptions, ShareApi, ShareClient};
use config::Config;
use download::{gate, Availability, FlowEvent};
use session::{PasswordPrompt, Session, SessionError};
use store::{FileRecord, FileStore};

#[derive(Debug, Parser)]
#[command(name = "sharebox", version, about = "Share files through an anonymous file sharing service")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

/// Password, download limit and expiry of a shared file
#[derive(Debug, Clone, Args)]
struct Settings {
    /// Password required to download
    #[arg(long)]
    password: Option<String>,

    /// Maximum number of downloads, -1 for unlimited
    #[arg(long, allow_negative_numbers = true)]
    max_downloads: Option<i64>,

    /// Seconds until the file expires, -1 for never
    #[arg(long, allow_negative_numbers = true)]
    expires_in: Option<i64>,
}

impl Settings {
    fn into_options(self, filename: Option<String>) -> FileOptions {
        FileOptions {
            filename,
            password: self.password.filter(|p| !p.is_empty()),
            max_downloads: self.max_downloads,
            expires_in: self.expires_in,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file and add it to the local registry
    Upload {
        path: PathBuf,
        /// Name to show instead of the file name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        settings: Settings,
    },
    /// List files uploaded from this machine
    Files,
    /// Print the download link of an uploaded file
    Link { id: String },
    /// Show the public details of a shared file
    Info { id: String },
    /// Change password, download limit or expiry of an uploaded file
    Update {
        id: String,
        #[command(flatten)]
        settings: Settings,
    },
    /// Delete an uploaded file from the server and the registry
    Delete {
        id: String,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Download a shared file
    Download {
        id: String,
        /// Password to try first
        #[arg(long)]
        password: Option<String>,
        /// Directory to save into
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },
    /// List files known to the server
    Remote {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

/// Reads passwords from standard input
struct StdinPrompt;

impl PasswordPrompt for StdinPrompt {
    fn ask(&mut self, filename: &str, reason: &FlowEvent) -> Option<String> {
        let notice = match reason {
            FlowEvent::IncorrectPassword => "Incorrect password. Try again.",
            FlowEvent::StillPasswordRequired => "The server still requires a password.",
            _ => "Password required to download file",
        };
        eprintln!("{}", notice);
        eprint!("Password for {} (empty to cancel): ", filename);
        io::stderr().flush().ok()?;

        read_line()
    }
}

/// One trimmed line from stdin, None on end of input
fn read_line() -> Option<String> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

fn confirm(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    if io::stderr().flush().is_err() {
        return false;
    }
    matches!(read_line().as_deref().map(str::trim), Some("y" | "Y" | "yes"))
}

fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn format_date(date: Option<DateTime<Utc>>, missing: &str) -> String {
    match date {
        Some(date) => date
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        None => missing.to_string(),
    }
}

/// Management card of an uploaded file. The delete token is never shown.
fn print_card(record: &FileRecord) {
    println!("{}", record.filename);
    println!("  id:       {}", record.id);
    println!("  size:     {}", format_size(record.size));
    if !record.mime_type.is_empty() {
        println!("  type:     {}", record.mime_type);
    }
    println!("  expires:  {}", format_date(record.expires_at, "never"));
    println!("  link:     {}", record.url);
}

async fn run(command: Command, session: &Session, api: &dyn ShareApi) -> Result<(), SessionError> {
    match command {
        Command::Upload {
            path,
            name,
            settings,
        } => {
            let options = settings.into_options(name);
            let record = session.upload(&path, &options).await?;
            println!("File uploaded successfully!");
            print_card(&record);
        }
        Command::Files => {
            let files = session.files();
            if files.is_empty() {
                println!("No files uploaded yet.");
            }
            for record in &files {
                print_card(record);
            }
        }
        Command::Link { id } => {
            println!("{}", session.link(&id)?);
        }
        Command::Info { id } => {
            let descriptor = session.info(&id).await?;
            let meta = &descriptor.meta_data;
            println!("{}", descriptor.display_name());
            println!("  id:        {}", descriptor.id);
            println!("  size:      {}", format_size(meta.size.max(descriptor.size)));
            if !meta.mime_type.is_empty() {
                println!("  type:      {}", meta.mime_type);
            }
            println!("  uploaded:  {}", format_date(meta.uploaded_at, "unknown"));
            println!("  expires:   {}", format_date(meta.expires_at, "never"));
            if meta.max_downloads > 0 {
                println!("  downloads: {} / {}", meta.download_count, meta.max_downloads);
            } else {
                println!("  downloads: {}", meta.download_count);
            }
            println!("  password:  {}", if meta.has_password { "required" } else { "no" });
            if gate::allowed(&descriptor) {
                println!("  status:    available");
            } else {
                println!("  status:    {}", Availability::of(&descriptor));
            }
        }
        Command::Update { id, settings } => {
            let options = settings.into_options(None);
            if options.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            session.update(&id, &options).await?;
            println!("File updated");
        }
        Command::Delete { id, yes } => {
            let record = session.record(&id)?;
            if !yes && !confirm(&format!("Delete {}?", record.filename)) {
                println!("Cancelled.");
                return Ok(());
            }
            session.delete(&id).await?;
            println!("File deleted");
        }
        Command::Download {
            id,
            password,
            output,
        } => {
            let saved = session
                .download(&id, &output, password, &mut StdinPrompt)
                .await?;
            println!("Download complete: {}", saved.display());
        }
        Command::Remote { page, limit } => {
            let listing = api.list_files(page, limit).await?;
            let text = serde_json::to_string_pretty(&listing)
                .map_err(|e| SessionError::Storage(e.into()))?;
            println!("{}", text);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is for command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    debug!(api_url = %cli.config.api_url, origin = %cli.config.origin, "Configuration loaded");

    let client = ShareClient::new(&cli.config.api_url, cli.config.timeout())?;
    let store = Arc::new(FileStore::open(cli.config.data_dir())?);
    debug!(api = client.base_url(), data_dir = %store.dir().display(), "Session starting");

    let api: Arc<dyn ShareApi> = Arc::new(client);
    let session = Session::new(Arc::clone(&api), store, &cli.config.origin);

    if let Err(e) = run(cli.command, &session, api.as_ref()).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e.user_message());
        if matches!(&e, SessionError::Api(api_err) if api_err.is_final()) {
            eprintln!("This cannot be retried.");
        }
        std::process::exit(1);
    }

    Ok(())
}
