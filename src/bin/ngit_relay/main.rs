// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Main relay server: binds the combined event-bus/blob-service HTTP
//! listener and runs the proactive-sync scheduler alongside it.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use ngit_relay::blob::{BlobService, FsBlobStorage};
use ngit_relay::config::{Cli, Config};
use ngit_relay::http::HttpServer;
use ngit_relay::{relay, scheduler, Error};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Error> {
    ngit_relay::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env(cli)?;

    let (relay, reconciler) = relay::build_relay(&config).await?;

    let blob_storage = FsBlobStorage::open(config.blossom_data_dir.join("blobs")).await?;
    let blob = Arc::new(
        BlobService::init(
            Arc::new(blob_storage),
            config.owner.clone(),
            config.blossom_max_file_size_bytes,
            config.blossom_max_capacity_bytes,
        )
        .await?,
    );

    let info = HttpServer::info_for(&config);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:3334".parse().expect("fallback address is valid"));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let scheduler_handle = tokio::spawn(scheduler::run(reconciler.as_ref().clone(), config.sync_interval));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, remote) = accepted?;
                let io = TokioIo::new(socket);
                let server = HttpServer::new(relay.clone(), blob.clone(), info.clone(), remote);
                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, server)
                        .with_upgrades()
                        .await
                    {
                        tracing::debug!(%remote, error = %e, "connection closed with error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal");
                scheduler_handle.abort();
                break;
            }
        }
    }

    Ok(())
}
