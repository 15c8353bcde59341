mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bridge config file (json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How native callbacks reach the bridge
    #[arg(long, value_enum, default_value_t = Route::Direct)]
    route: Route,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Route {
    /// resolve on the native callback thread
    Direct,
    /// hand callbacks to a dispatcher actor
    Actor,
}

#[derive(Subcommand)]
enum Commands {
    /// Round-trip a string through the native library
    Echo {
        #[arg(long)]
        message: String,
    },
    /// Open a wallet and print its info ("missing" fails)
    OpenWallet {
        #[arg(long)]
        id: String,
    },
    /// Sign a utf-8 string and print the signature as hex
    Sign {
        #[arg(long)]
        data: String,
    },
    /// Issue many concurrent calls and print the dispatcher counters
    Stress {
        #[arg(long, default_value_t = 1000)]
        count: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {:#}", e); // Pretty format with all causes
        std::process::exit(1);
    }
}

async fn run() -> Result<(), anyhow::Error> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => callback_bridge::BridgeConfig::from_json_file(path)?,
        None => callback_bridge::BridgeConfig::default(),
    };

    let session = commands::Session::start(config, cli.route).await?;

    match cli.command {
        Commands::Echo { message } => session.echo(&message).await?,
        Commands::OpenWallet { id } => session.open_wallet(&id).await?,
        Commands::Sign { data } => session.sign(data.as_bytes()).await?,
        Commands::Stress { count } => session.stress(count).await?,
    }

    session.shutdown().await
}
