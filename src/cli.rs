use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};
use url::Url;

use crate::api::HdRezkaClient;
use crate::app::{self, App, DownloadRequest};
use crate::download::{BlockingDownloader, DownloadOptions, Interrupt};
use crate::error::CliError;
use crate::select::TerminalPrompter;
use crate::session::{Session, default_session_path};

pub const DEFAULT_BASE_URL: &str = "https://hdrezka.ag/";

/// Download movies and series from HDrezka.
#[derive(Parser)]
#[command(name = "rezka", version, about, long_about = None, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Page of the movie or series to download
    #[arg(required = true)]
    url: Option<Url>,

    /// Target directory
    #[arg(short, long, default_value = ".")]
    target_directory: PathBuf,

    /// Download chunk size
    #[arg(short, long, default_value_t = 65_536)]
    chunk_size: usize,

    /// Attempts per file before giving up
    #[arg(short, long, default_value_t = 8)]
    retries: u32,

    /// Keep partial files on failure and resume them next time
    #[arg(long)]
    resume: bool,

    /// Overwrite files that already exist
    #[arg(short, long)]
    overwrite: bool,

    /// Quality to download (e.g. "720p") instead of the best available
    #[arg(short, long)]
    quality: Option<String>,

    /// Translator id to use without asking
    #[arg(long)]
    translator: Option<u32>,

    /// Download every episode of a series without asking
    #[arg(short, long)]
    all: bool,

    /// Where the login session is stored
    #[arg(long, env = "REZKA_SESSION_FILE", global = true)]
    session_file: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session for later downloads
    Login {
        /// Site mirror to sign in to
        #[arg(default_value = DEFAULT_BASE_URL)]
        base_url: Url,
    },
    /// Forget the stored session
    Logout,
}

impl Cli {
    fn session(&self) -> Session {
        Session::new(
            self.session_file
                .clone()
                .unwrap_or_else(default_session_path),
        )
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let session = self.session();
        match &self.command {
            Some(Commands::Login { base_url }) => login(base_url, &session),
            Some(Commands::Logout) => logout(&session),
            None => self.download(&session),
        }
    }

    fn download(&self, session: &Session) -> anyhow::Result<()> {
        let url = self.url.clone().context("Please provide a URL or use 'login'")?;
        std::fs::create_dir_all(&self.target_directory).with_context(|| {
            format!("Failed to create {}", self.target_directory.display())
        })?;

        let api = site_client(session)?;

        let interrupt = Interrupt::new();
        interrupt
            .install()
            .context("Could not set keyboard interrupt handler.")?;

        let options = DownloadOptions {
            chunk_size: self.chunk_size,
            retries: self.retries,
            resume: self.resume,
            ..DownloadOptions::default()
        };
        let mut fetcher =
            BlockingDownloader::new(options, interrupt)?.show_progress(io::stderr().is_terminal());
        let mut prompter = TerminalPrompter::new();

        let request = DownloadRequest {
            url,
            target_dir: self.target_directory.clone(),
            quality: self.quality.clone(),
            translator: self.translator,
            all_episodes: self.all,
            overwrite: self.overwrite,
        };
        let summary = App::new(&api, &mut prompter, &mut fetcher).run(&request)?;
        println!(
            "{}",
            format!(
                "Done: {} downloaded, {} skipped.",
                summary.downloaded.len(),
                summary.skipped
            )
            .green()
        );
        Ok(())
    }
}

/// Client carrying the saved session, or an anonymous one when there is no
/// usable session.
fn site_client(session: &Session) -> anyhow::Result<HdRezkaClient> {
    let Some(saved) = session.load() else {
        return Ok(HdRezkaClient::new()?);
    };
    let client = Url::parse(&saved.origin)
        .map_err(anyhow::Error::from)
        .and_then(|origin| {
            HdRezkaClient::with_session(&origin, &saved.cookies).map_err(anyhow::Error::from)
        });
    match client {
        Ok(client) => {
            info!(origin = %saved.origin, "using saved session");
            Ok(client)
        }
        Err(e) => {
            warn!(error = %e, "saved session unusable, continuing without it");
            Ok(HdRezkaClient::new()?)
        }
    }
}

fn login(base_url: &Url, session: &Session) -> anyhow::Result<()> {
    print!("Login: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().lock().read_line(&mut name)?;
    let password = rpassword::prompt_password("Password: ")?;
    if name.trim().is_empty() {
        return Err(CliError::NoLogin.into());
    }

    println!("Logging in...");
    let api = HdRezkaClient::new().map_err(CliError::LoginFailed)?;
    let path = app::login(&api, base_url, &name, &password, session)?;
    println!("{}", format!("Session saved to {}", path.display()).green());
    Ok(())
}

fn logout(session: &Session) -> anyhow::Result<()> {
    if session.clear()? {
        println!("Removed session {}", session.path().display());
    } else {
        println!("No session stored at {}", session.path().display());
    }
    Ok(())
}
