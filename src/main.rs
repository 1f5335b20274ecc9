use clap::Parser;

use chatr_calls::config::{RelayConfig, DEFAULT_RELAY_PORT};

#[derive(Parser)]
#[command(name = "chatr-relay", about = "Call signaling relay for Chatr")]
struct Cli {
    /// Address to bind
    #[arg(long, env = "CHATR_CALLS_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Relay port
    #[arg(long, env = "CHATR_CALLS_PORT", default_value_t = DEFAULT_RELAY_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    chatr_calls::init_tracing();

    let config = RelayConfig {
        host: cli.host,
        port: cli.port,
    };
    if let Err(e) = chatr_calls::run_relay(config).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
