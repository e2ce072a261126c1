//! share-post - Share text, links and images to a social network

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Parser;
use libsharekit::logging::{self, LogFormat};
use libsharekit::service::build_service;
use libsharekit::{
    Account, CancellationToken, Config, FileAccountStore, FileData, ImageData, Item, Result,
    Service, ShareResult, SocialError,
};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "share-post")]
#[command(version)]
#[command(about = "Share text, links and images to a social network", long_about = None)]
#[command(after_help = "\
EXIT CODES:
    0 - Shared, or cancelled with Ctrl-C
    1 - Network, service or configuration error
    2 - Authentication error (run share-auth first)
    3 - Invalid input (text too long, unreadable attachment)")]
struct Cli {
    /// Text to share (reads from stdin if not provided)
    text: Option<String>,

    /// Link appended to the text; repeat for several
    #[arg(short, long = "link", value_name = "URL")]
    links: Vec<Url>,

    /// Image to attach (jpg, png, gif, webp); repeat for several
    #[arg(short, long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// File to attach; repeat for several
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Network to share to
    #[arg(short, long, default_value = "twitter")]
    service: String,

    /// Stored account to share as (default: first stored account)
    #[arg(short, long)]
    account: Option<String>,

    /// Report the item's length budget and check it without sharing
    #[arg(long)]
    dry_run: bool,

    /// Configuration file
    #[arg(long, env = "SHAREKIT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        if let Some(message) = e.user_message() {
            eprintln!("{}", message);
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = parse_format(&cli.format)?;
    let item = build_item(&cli)?;

    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_path(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };
    let client = config.http.build_client()?;
    let service = build_service(&cli.service, &config, client)?;

    if cli.dry_run {
        print_check(service.as_ref(), &item, format);
        return service.validate_item(&item);
    }

    service.validate_item(&item)?;

    let store = FileAccountStore::new(config.accounts.expand_path());
    let accounts = service.get_accounts(&store).await?;
    let account = select_account(&accounts, cli.account.as_deref(), service.descriptor().id)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling share");
            trigger.cancel();
        }
    });

    match service.share_item(&item, account, &cancel).await? {
        ShareResult::Done => {
            print_done(service.as_ref(), account, format);
            Ok(())
        }
        ShareResult::Cancelled => Ok(()),
    }
}

fn parse_format(format: &str) -> Result<LogFormat> {
    match format.parse::<LogFormat>() {
        Ok(LogFormat::Pretty) | Err(_) => Err(SocialError::InvalidInput(format!(
            "Invalid format: '{}'. Valid options: text, json",
            format
        ))),
        Ok(format) => Ok(format),
    }
}

fn read_text(cli: &Cli) -> Result<String> {
    if let Some(text) = &cli.text {
        return Ok(text.clone());
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(SocialError::InvalidInput(
            "No text given. Pass it as an argument or pipe it via stdin".to_string(),
        ));
    }

    let mut text = String::new();
    stdin
        .lock()
        .read_to_string(&mut text)
        .map_err(|e| SocialError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn build_item(cli: &Cli) -> Result<Item> {
    let mut item = Item::new(read_text(cli)?);
    for link in &cli.links {
        item = item.with_link(link.clone());
    }
    for path in &cli.images {
        item = item.with_image(ImageData::from_path(path)?);
    }
    for path in &cli.files {
        item = item.with_file(FileData::from_path(path)?);
    }
    Ok(item)
}

fn select_account<'a>(
    accounts: &'a [Account],
    username: Option<&str>,
    service_id: &str,
) -> Result<&'a Account> {
    let found = match username {
        Some(name) => accounts.iter().find(|a| a.username() == name),
        None => accounts.first(),
    };

    found.ok_or_else(|| {
        SocialError::Authentication(match username {
            Some(name) => format!(
                "No stored {} account named '{}'. Run share-auth first",
                service_id, name
            ),
            None => format!("No stored {} account. Run share-auth first", service_id),
        })
    })
}

fn print_check(service: &dyn Service, item: &Item, format: LogFormat) {
    let descriptor = service.descriptor();
    let length = service.text_length(item);
    let remaining = service.remaining_text_length(item);

    match format {
        LogFormat::Json => {
            let output = serde_json::json!({
                "service": descriptor.id,
                "text_length": length,
                "max_text_length": descriptor.max_text_length,
                "remaining": remaining,
            });
            println!("{}", output);
        }
        _ => match remaining {
            Some(remaining) => println!(
                "{}: {} characters ({} remaining)",
                descriptor.title, length, remaining
            ),
            None => println!("{}: {} characters", descriptor.title, length),
        },
    }
}

fn print_done(service: &dyn Service, account: &Account, format: LogFormat) {
    let descriptor = service.descriptor();
    match format {
        LogFormat::Json => {
            let output = serde_json::json!({
                "service": descriptor.id,
                "account": account.username(),
                "status": "done",
            });
            println!("{}", output);
        }
        _ => println!(
            "{}: shared as {} ({})",
            descriptor.title,
            account.username(),
            descriptor.share_title
        ),
    }
}
