use clap::Parser;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Player name shown above the entity
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Account to credit finished games to
    #[arg(short = 'a', long)]
    account_id: Option<u64>,

    /// Stop after this many seconds instead of playing until interrupted
    #[arg(short = 'd', long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting headless client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(&args.server, &args.name, args.account_id);
    let duration = args.duration_secs.map(Duration::from_secs);

    tokio::select! {
        result = client.run(duration) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
