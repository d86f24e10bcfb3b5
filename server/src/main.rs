use clap::Parser;
use log::info;
use server::config::GameConfig;
use server::network::Server;
use server::stats::LogStatsSink;
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments; anything given here overrides the config file.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long)]
    tick_rate: Option<u32>,
    /// Maximum number of concurrent clients
    #[clap(short, long)]
    max_clients: Option<usize>,
    /// JSON file with game tuning
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Seed for spawn placement, for reproducible sessions
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, Arc::new(LogStatsSink)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
