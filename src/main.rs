//! FlashRESP - An Async RESP Protocol Engine
//!
//! This is the main entry point for the FlashRESP server.
//! It loads the configuration, picks an executor and runs the TCP server
//! until a termination signal arrives.

use anyhow::Context;
use flashresp::commands::{CommandHandler, EchoExecutor, Executor};
use flashresp::config::{Config, Invocation};
use flashresp::server::{shutdown_signal, Server};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
FlashRESP - An Async RESP Protocol Engine

USAGE:
    flashresp [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Load a redis.conf-style config file
                         (default: ./redis.conf if present)
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6379)
        --echo           Reply to every command with its own arguments
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    flashresp                        # Start on 127.0.0.1:6379
    flashresp --port 6380            # Start on port 6380
    flashresp -c /etc/redis.conf     # Read settings from a file
    flashresp --echo                 # Run the echo executor

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    PONG
    127.0.0.1:6379> ECHO hello
    "hello"
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
FlashRESP v{} - Async RESP Protocol Engine
──────────────────────────────────────────────────────────────
Server started on {}
Executor: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        flashresp::VERSION,
        config.bind_address(),
        if config.echo { "echo" } else { "commands" }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("FlashRESP version {}", flashresp::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.loglevel))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let executor: Arc<dyn Executor> = if config.echo {
        Arc::new(EchoExecutor::new())
    } else {
        Arc::new(CommandHandler::new(config.databases))
    };

    let server = Server::bind(&config, executor)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    print_banner(&config);
    info!(address = %server.local_addr()?, "Listening");

    server.run(shutdown_signal()).await?;
    Ok(())
}
