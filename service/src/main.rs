// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runs the sociograph GraphQL service.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sociograph_server::{listen_for_shutdown_signals, GraphQlService, ServiceConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "sociograph",
    about = "Run the GraphQL service that exposes the sociograph API"
)]
struct ServiceOptions {
    /// The port on which to run the server.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Path to the SQLite database holding the social graph.
    #[arg(long, env = "SOCIOGRAPH_DATABASE", default_value = "sociograph.sqlite")]
    database_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    use is_terminal::IsTerminal as _;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let options = ServiceOptions::parse();
    let config = ServiceConfig {
        port: options.port,
        database_path: options.database_path,
    };

    info!("Starting sociograph service on port {}", config.port);
    let service = GraphQlService::new(config).await?;

    let cancellation_token = CancellationToken::new();
    let child_token = cancellation_token.child_token();
    tokio::spawn(listen_for_shutdown_signals(cancellation_token));
    service.run(child_token).await
}
