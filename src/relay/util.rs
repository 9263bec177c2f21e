// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::TcpListener;

use crate::error::Error;

/// Scan upward from port 8000 for the first port a listener can bind to.
/// Used by tests that need to stand up an in-process relay on an ephemeral
/// port without colliding with other test processes.
pub async fn find_available_port() -> Result<u16, Error> {
    for port in 8000..u16::MAX {
        if port_is_available(port).await {
            return Ok(port);
        }
    }

    Err(Error::NoPortAvailable)
}

#[inline]
pub async fn port_is_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
        .await
        .is_ok()
}
