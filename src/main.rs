//! Telemetry-hub binary entry point.

use telemetry_hub::cli::{self, parse_args};
use telemetry_hub::config::Config;
use telemetry_hub::{console, logging, TelemetryServer};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> telemetry_hub::Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'telemetry-hub --help' for more information.");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }
    if args.version {
        cli::print_version();
        return Ok(());
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    let server_config = match config.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    logging::init_with_filter(&config.log_filter()).ok();
    info!("telemetry-hub v{}", env!("CARGO_PKG_VERSION"));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(console::report(events_rx));

    let server = TelemetryServer::start(server_config, events_tx).await?;
    let hub = server.hub().clone();

    tokio::select! {
        result = console::run(hub, BufReader::new(tokio::io::stdin())) => {
            if let Err(e) = result {
                error!("Console failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    server.stop().await;
    let _ = reporter.await;

    // A blocked stdin read would otherwise hold the runtime open.
    std::process::exit(0);
}
