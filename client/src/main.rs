//! PostCoin CLI - wallet, faucet and feed client for the ledger

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use postcoin_client::sync::latest;
use postcoin_client::{Config, ConsoleSink, Ledger, LedgerClient, SyncError, Synchronizer};
use postcoin_wallet::IdentityStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "postcoin")]
#[command(about = "PostCoin wallet and feed client", version)]
struct Cli {
    /// Ledger API endpoint (overrides config.json)
    #[arg(short, long)]
    api: Option<String>,

    /// Directory holding config.json and the identity database
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show device, wallet and ledger status
    Status,

    /// Create (or recover) the wallet bound to this device
    Generate,

    /// Use an existing wallet address
    Import {
        /// Address to import
        address: String,
    },

    /// Refresh and show the wallet balance
    Balance,

    /// Request coins from the faucet
    Faucet,

    /// Publish a post
    Post {
        /// Post content
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },

    /// Show the latest posts
    Feed {
        /// Number of posts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Keep polling balance and feed until Ctrl-C
    Watch,

    /// Unbind the wallet from this device
    Forget,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        // already shown by the console sink
        Err(e) if e.is::<SyncError>() => std::process::exit(1),
        other => other,
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.data_dir {
        Some(dir) => Config::load_from(dir)?,
        None => Config::load()?,
    };
    if let Some(api) = cli.api {
        config.api_endpoint = api;
    }

    let identity = IdentityStore::open_or_ephemeral(config.identity_path())?;

    if let Commands::Forget = cli.command {
        identity.clear_address()?;
        println!("👋 Wallet forgotten. The device id is kept.");
        return Ok(());
    }

    let feed_limit = match cli.command {
        Commands::Watch => Some(10),
        _ => None,
    };
    let ledger = LedgerClient::with_timeouts(
        config.api_endpoint.clone(),
        config.request_timeout(),
        config.connect_timeout(),
    );
    let sync = Arc::new(Synchronizer::with_faucet_cooldown(
        ledger,
        ConsoleSink::new(feed_limit),
        identity,
        config.faucet_cooldown(),
    ));

    match cli.command {
        Commands::Status => {
            println!("\n📊 PostCoin Status");
            println!("═══════════════════════════════════");
            println!("Ledger:   {}", config.api_endpoint);
            match sync.ledger().home().await {
                Ok(home) => println!(
                    "Online:   {}",
                    home.message.unwrap_or_else(|| "yes".to_string()).green()
                ),
                Err(e) => println!("Online:   {} ({})", "no".red(), e),
            }

            let phase = sync.start().await;
            println!("Device:   {}", sync.device_id().unwrap_or_default());
            match sync.address() {
                Some(address) => println!("Wallet:   {}", address),
                None => println!("Wallet:   {}", "none (run `postcoin generate`)".dimmed()),
            }
            if let Ok(phase) = phase {
                println!("Phase:    {:?}", phase);
            }
            println!();
        }

        Commands::Generate => {
            sync.start().await?;
            let address = sync.generate_wallet().await?;
            println!("👛 Wallet: {}", address.bold());
        }

        Commands::Import { address } => {
            sync.start().await?;
            sync.import_wallet(&address).await?;
        }

        Commands::Balance => {
            sync.start().await?;
            sync.refresh_balance().await?;
        }

        Commands::Faucet => {
            sync.start().await?;
            sync.request_faucet().await?;
        }

        Commands::Post { content } => {
            sync.start().await?;
            sync.submit_post(&content.join(" ")).await?;
        }

        Commands::Feed { limit } => {
            sync.start().await?;
            sync.refresh_feed().await?;

            let feed = sync.feed();
            println!("\n📰 Feed ({} posts)", feed.len());
            println!("═══════════════════════════════════");
            for post in latest(&feed, limit) {
                println!("  [{}] {}", post.address.cyan(), post.content);
            }
            println!();
        }

        Commands::Watch => {
            // a failed first refresh is retried by the poller
            let _ = sync.start().await;
            let poller = sync.spawn_poller(config.poll_interval());
            println!(
                "👀 Watching {} every {}s, Ctrl-C to stop",
                config.api_endpoint,
                config.poll_interval().as_secs()
            );
            tokio::signal::ctrl_c().await?;
            poller.abort();
        }

        Commands::Forget => unreachable!("handled before the ledger client is built"),
    }

    Ok(())
}
