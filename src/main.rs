//! LoopKV - An Event-Loop Key-Value Server
//!
//! This is the main entry point for the LoopKV server.
//! It parses arguments, sets up logging, binds the listener and serves
//! until Ctrl+C.

use loopkv::config::{CliAction, ServerConfig};
use loopkv::server::Server;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
LoopKV - An Event-Loop Key-Value Server

USAGE:
    loopkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: {host})
    -p, --port <PORT>              Port to listen on (default: {port})
        --channel-capacity <N>     Dispatcher channel bound (default: 32)
        --read-buffer <BYTES>      Bytes reserved per socket read (default: 4096)
        --max-keys <N>             Refuse new keys once the store holds N
        --pipeline                 Execute every command in a read, not only the first
    -v, --version                  Print version information
        --help                     Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=loopkv=debug

EXAMPLES:
    loopkv                         # Start on {host}:{port}
    loopkv --port 6380             # Start on port 6380
    loopkv --host 127.0.0.1        # Listen on loopback only
"#,
        host = loopkv::DEFAULT_HOST,
        port = loopkv::DEFAULT_PORT,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("LoopKV version {}", loopkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = loopkv::VERSION, "starting LoopKV");

    // Failing to bind is the only fatal error
    let server = Server::bind(config).await?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await?;
    Ok(())
}
