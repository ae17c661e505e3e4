// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `rtr-rib` CLI: build RIB snapshots from ROAs, serve them over the RTR
//! protocol, or exercise a running server with a debug client
//! (spec.md §6.4).
//!
//! # Usage
//!
//! ```bash
//! # Build a new snapshot
//! rtr-rib builder --roa-dir /var/rpki/roas --data-dir /var/rtr-rib/data
//!
//! # Serve the current snapshot over stdio
//! rtr-rib server --data-dir /var/rtr-rib/data --wakeup-dir /var/rtr-rib/wakeup
//!
//! # Debug: drive a server subprocess and print what it sends back
//! rtr-rib client --data-dir /var/rtr-rib/data --wakeup-dir /var/rtr-rib/wakeup
//! ```

use clap::{Parser, Subcommand};
use rtr_rib::{Builder, BuilderConfig, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RPKI-to-Router (RTR) origin authentication service.
#[derive(Parser, Debug)]
#[command(name = "rtr-rib")]
#[command(about = "RPKI-to-Router origin authentication: RIB builder, server, and debug client")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode ROAs and write a new versioned RIB snapshot.
    Builder {
        /// Directory to scan recursively for `*.roa` files. Repeatable.
        #[arg(long = "roa-dir", required = true)]
        roa_dirs: Vec<PathBuf>,

        /// Where AXFR/IXFR files and `current` live.
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Serve the current RIB snapshot over stdio to one RTR client.
    Server {
        /// Where AXFR/IXFR files and `current` live.
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Where this server's wakeup socket is created.
        #[arg(long, default_value = "./wakeup")]
        wakeup_dir: PathBuf,
    },

    /// Debug client: spawn a server subprocess and print its replies.
    Client {
        /// Path to the `rtr-rib` executable to spawn as the server.
        #[arg(long, default_value = "rtr-rib")]
        server_exe: String,

        /// Where AXFR/IXFR files and `current` live.
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Where the spawned server's wakeup socket is created.
        #[arg(long, default_value = "./wakeup")]
        wakeup_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match args.command {
        Commands::Builder { roa_dirs, data_dir } => {
            let config = BuilderConfig::new(roa_dirs, data_dir)?;
            let serial = Builder::new(config).run()?;
            println!("built serial {serial}");
            Ok(())
        }
        Commands::Server { data_dir, wakeup_dir } => {
            let config = ServerConfig::new(data_dir, wakeup_dir)?;
            rtr_rib::server::serve_stdio(&config).await?;
            Ok(())
        }
        Commands::Client {
            server_exe,
            data_dir,
            wakeup_dir,
        } => {
            rtr_rib::client::run_against_subprocess(
                &server_exe,
                &data_dir.to_string_lossy(),
                &wakeup_dir.to_string_lossy(),
            )
            .await?;
            Ok(())
        }
    }
}
