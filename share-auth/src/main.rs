//! share-auth - Sign in to a social network and manage stored accounts
//!
//! `login` runs the OAuth1 PIN flow: it prints the authorize URL, waits for
//! the PIN the network shows after approval and stores the resulting
//! account.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use libsharekit::account::AccountStore;
use libsharekit::logging;
use libsharekit::oauth::Authorizer;
use libsharekit::service::build_service;
use libsharekit::{CancellationToken, Config, FileAccountStore, Service, SocialError};
use tokio::sync::oneshot;
use url::Url;

#[derive(Parser)]
#[command(name = "share-auth")]
#[command(version)]
#[command(about = "Sign in to social networks and manage stored accounts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Network to manage
    #[arg(short, long, global = true, default_value = "twitter")]
    service: String,

    /// Configuration file
    #[arg(long, global = true, env = "SHAREKIT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize a new account (OAuth PIN flow)
    Login,

    /// List stored accounts (without showing tokens)
    List,

    /// Forget a stored account
    Remove {
        /// Account username
        username: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();

    if let Err(e) = run_command(cli).await {
        let code = e
            .downcast_ref::<SocialError>()
            .map(SocialError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {:#}", e);
        std::process::exit(code);
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let store = FileAccountStore::new(config.accounts.expand_path());
    let service_id = cli.service.to_lowercase();

    match cli.command {
        Commands::Login => login(&cli.service, &config, &store).await,
        Commands::List => list_accounts(&service_id, &store),
        Commands::Remove { username } => {
            store.remove_account(&service_id, &username)?;
            println!("Removed {} account '{}'", service_id, username);
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("Loading {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };
    Ok(config)
}

async fn login(service_id: &str, config: &Config, store: &FileAccountStore) -> Result<()> {
    let service: Box<dyn Service> = build_service(service_id, config, config.http.build_client()?)?;
    let descriptor = service.descriptor();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let authorizer = PromptAuthorizer::new(descriptor.title);
    let account = match service.authenticate(&authorizer, &cancel).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            eprintln!("Authorization cancelled");
            return Ok(());
        }
        Err(SocialError::Cancelled) => {
            eprintln!("Authorization cancelled");
            // The PIN reader thread is still blocked on stdin and would keep
            // the process alive, so leave without unwinding
            std::process::exit(0);
        }
        Err(e) => return Err(e.into()),
    };

    store.save_account(descriptor.id, &account)?;
    tracing::info!(service = descriptor.id, path = %store.path().display(), "Account saved");
    println!(
        "Authorized {} account '{}'",
        descriptor.title,
        account.username()
    );
    Ok(())
}

fn list_accounts(service_id: &str, store: &dyn AccountStore) -> Result<()> {
    let accounts = store.load_accounts(service_id)?;
    if accounts.is_empty() {
        println!("No {} accounts stored", service_id);
        return Ok(());
    }
    for account in accounts {
        println!("{}\t{}", service_id, account.username());
    }
    Ok(())
}

/// Prints the authorize URL and reads the PIN from stdin
///
/// An empty line or end of input means the user gave up.
struct PromptAuthorizer {
    title: &'static str,
}

impl PromptAuthorizer {
    fn new(title: &'static str) -> Self {
        Self { title }
    }
}

#[async_trait]
impl Authorizer for PromptAuthorizer {
    async fn authorize(&self, authorize_url: &Url) -> libsharekit::Result<Option<String>> {
        println!("Open this URL to authorize sharekit on {}:", self.title);
        println!("{}", authorize_url);
        eprint!("Enter PIN: ");
        // A failed flush only loses the prompt
        let _ = io::stderr().flush();

        // Blocking read on a plain thread; the handshake stays free to
        // observe Ctrl-C while it waits
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(read_pin(io::stdin().lock()));
        });

        rx.await
            .map_err(|_| SocialError::InvalidInput("PIN reader stopped unexpectedly".to_string()))?
    }
}

fn read_pin<R: BufRead>(mut reader: R) -> libsharekit::Result<Option<String>> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| SocialError::InvalidInput(format!("Failed to read PIN: {}", e)))?;

    let pin = line.trim();
    if pin.is_empty() {
        Ok(None)
    } else {
        Ok(Some(pin.to_string()))
    }
}
