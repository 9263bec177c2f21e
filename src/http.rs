// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! HTTP front door (spec §6): the event bus and the blob service share a
//! single listener. A websocket upgrade request is handed to [`Relay`];
//! everything else is routed to the relay information document or the
//! blob service's upload/download/delete endpoints
//! (`original_source/src/ngit-relay-khatru/blossom.go`), following the
//! hyper upgrade-handshake pattern `nostr-relay-builder` itself ships as
//! an example alongside its native websocket listener.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use nostr::hashes::sha1::Hash as Sha1Hash;
use nostr::hashes::{Hash, HashEngine};
use nostr::{Event, PublicKey, Timestamp};
use serde::Serialize;

use crate::blob::{BlobService, UploadDecision};
use crate::config::Config;
use crate::relay::Relay;

/// Relay information document served on `Accept: application/nostr+json`
/// (NIP-11). Hand-rolled rather than `nostr::nips::nip11` because that
/// module isn't compiled into this build of the `nostr` crate (its feature
/// is never enabled); the field names still follow the NIP-11 shape.
#[derive(Debug, Clone, Serialize)]
struct RelayInfo {
    name: String,
    description: String,
    pubkey: String,
    supported_nips: Vec<u16>,
    software: String,
    version: String,
}

impl RelayInfo {
    fn from_config(config: &Config) -> Self {
        Self {
            name: config.relay_name.clone(),
            description: config.relay_description.clone(),
            pubkey: config.owner.to_hex(),
            supported_nips: vec![1, 11, 34],
            software: "https://github.com/nostr-protocol/nips/blob/master/34.md".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Copied from the websocket handshake RFC (6455): derive the
/// `Sec-WebSocket-Accept` response header from a client's
/// `Sec-WebSocket-Key` so the upgrade can be answered without a
/// round-trip through a dedicated websocket-handshake crate.
fn derive_accept_key(request_key: &[u8]) -> String {
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut engine = Sha1Hash::engine();
    engine.input(request_key);
    engine.input(WS_GUID);
    let hash: Sha1Hash = Sha1Hash::from_engine(engine);
    BASE64_STANDARD.encode(hash)
}

fn is_websocket_upgrade(req: &Request<Incoming>) -> bool {
    let is_upgrade = req
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let is_websocket = req
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    is_upgrade && is_websocket
}

fn wants_relay_info(req: &Request<Incoming>) -> bool {
    req.headers()
        .get(hyper::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("application/nostr+json"))
        .unwrap_or(false)
}

/// The HTTP service bound once per accepted TCP connection, cloned cheaply
/// (every field is an `Arc` or a small value) for hyper's `Service` trait.
#[derive(Clone)]
pub struct HttpServer {
    relay: Relay,
    blob: Arc<BlobService>,
    info: Arc<RelayInfo>,
    remote: SocketAddr,
}

impl HttpServer {
    /// Bind a service instance to a single accepted connection's remote
    /// address; `relay` and `blob` are shared across every connection.
    pub fn new(relay: Relay, blob: Arc<BlobService>, info: Arc<RelayInfo>, remote: SocketAddr) -> Self {
        Self { relay, blob, info, remote }
    }

    /// Precompute the [`RelayInfo`] once at startup
    pub fn info_for(config: &Config) -> Arc<RelayInfo> {
        Arc::new(RelayInfo::from_config(config))
    }

    async fn route(&self, req: Request<Incoming>) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        if is_websocket_upgrade(&req) {
            return self.upgrade(req);
        }

        if req.uri().path() == "/" && wants_relay_info(&req) {
            return self.relay_info();
        }

        match (req.method(), req.uri().path()) {
            (&Method::PUT, "/upload") => self.handle_upload(req).await,
            (&Method::GET, path) | (&Method::HEAD, path) if path.len() > 1 => {
                self.handle_download(path).await
            }
            (&Method::DELETE, path) if path.len() > 1 => self.handle_delete(req, path).await,
            _ => not_found(),
        }
    }

    fn upgrade(&self, req: Request<Incoming>) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        if !self.relay.admit_connection(self.remote.ip()) {
            return json_error(StatusCode::TOO_MANY_REQUESTS, "connection rate limit exceeded");
        }

        let derived = req
            .headers()
            .get("sec-websocket-key")
            .map(|k| derive_accept_key(k.as_bytes()));

        let Some(accept_key) = derived else {
            return json_error(StatusCode::BAD_REQUEST, "missing sec-websocket-key");
        };

        let relay = self.relay.clone();
        let addr = self.remote;
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    if let Err(e) = relay.take_connection(TokioIo::new(upgraded), addr).await {
                        tracing::error!(%addr, error = %e, "websocket connection exited with error");
                    }
                }
                Err(e) => tracing::error!(%addr, error = %e, "websocket upgrade failed"),
            }
        });

        Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(CONNECTION, "upgrade")
            .header(UPGRADE, "websocket")
            .header(SEC_WEBSOCKET_ACCEPT, accept_key)
            .body(empty())
            .expect("response with known-valid headers")
    }

    fn relay_info(&self) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        let body = serde_json::to_string(self.info.as_ref()).unwrap_or_else(|_| "{}".to_string());
        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/nostr+json")
            .header("access-control-allow-origin", "*")
            .body(full(body))
            .expect("response with known-valid headers")
    }

    async fn handle_upload(
        &self,
        req: Request<Incoming>,
    ) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        let uploader = match authorize(&req, "upload", None) {
            Ok(pk) => pk,
            Err(message) => return json_error(StatusCode::UNAUTHORIZED, &message),
        };

        let bytes = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return json_error(StatusCode::BAD_REQUEST, "could not read request body"),
        };

        match self.blob.put(&uploader, &bytes).await {
            Ok(outcome) => match outcome.decision {
                UploadDecision::Accepted => Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", "application/json")
                    .body(full(format!(
                        "{{\"sha256\":\"{}\",\"size\":{}}}",
                        outcome.digest,
                        bytes.len()
                    )))
                    .expect("response with known-valid headers"),
                UploadDecision::TooLarge => {
                    json_error(StatusCode::PAYLOAD_TOO_LARGE, "file too large")
                }
                UploadDecision::InsufficientStorage => {
                    json_error(StatusCode::INSUFFICIENT_STORAGE, "blossom server full")
                }
            },
            Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }

    async fn handle_download(&self, path: &str) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        let Some(digest) = parse_digest(path) else {
            return not_found();
        };
        match self.blob.get(&digest).await {
            Ok(Some(bytes)) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/octet-stream")
                .body(full(bytes))
                .expect("response with known-valid headers"),
            Ok(None) => not_found(),
            Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }

    async fn handle_delete(
        &self,
        req: Request<Incoming>,
        path: &str,
    ) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
        let Some(digest) = parse_digest(path) else {
            return not_found();
        };
        if let Err(message) = authorize(&req, "delete", Some(&digest)) {
            return json_error(StatusCode::UNAUTHORIZED, &message);
        }
        match self.blob.delete(&digest).await {
            Ok(()) => Response::builder()
                .status(StatusCode::OK)
                .body(empty())
                .expect("response with known-valid headers"),
            Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }
}

impl Service<Request<Incoming>> for HttpServer {
    type Response = Response<BoxBody<Bytes, std::convert::Infallible>>;
    type Error = std::convert::Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.route(req).await) })
    }
}

/// Parse the Blossom-style `Authorization: Nostr <base64 kind-24242 event>`
/// header. The embedded event must verify, carry a `t` tag matching
/// `action`, an unexpired `expiration` tag, and — for `action == "delete"` —
/// an `x` tag matching `digest`. Returns the uploader/deleter's pubkey.
fn authorize(
    req: &Request<Incoming>,
    action: &str,
    digest: Option<&str>,
) -> Result<PublicKey, String> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let encoded = header
        .strip_prefix("Nostr ")
        .ok_or_else(|| "Authorization scheme must be Nostr".to_string())?;

    let decoded = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| "Authorization value is not valid base64".to_string())?;
    let json = String::from_utf8(decoded).map_err(|_| "Authorization payload is not UTF-8".to_string())?;

    let event = Event::from_json(&json).map_err(|_| "malformed auth event".to_string())?;
    event.verify().map_err(|_| "auth event signature is invalid".to_string())?;

    if event.kind.as_u16() != 24242 {
        return Err("auth event must be kind 24242".to_string());
    }

    let tag_value = |name: &str| -> Option<&str> {
        event.tags.iter().find_map(|tag| {
            let raw = tag.as_vec();
            if raw.first().map(String::as_str) == Some(name) {
                raw.get(1).map(String::as_str)
            } else {
                None
            }
        })
    };

    if tag_value("t") != Some(action) {
        return Err(format!("auth event must be tagged for the {action} action"));
    }

    let expiration: u64 = tag_value("expiration")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| "auth event missing expiration tag".to_string())?;
    if Timestamp::from(expiration) < Timestamp::now() {
        return Err("auth event has expired".to_string());
    }

    if let Some(digest) = digest {
        let matches = event.tags.iter().any(|tag| {
            let raw = tag.as_vec();
            raw.first().map(String::as_str) == Some("x") && raw.get(1).map(String::as_str) == Some(digest)
        });
        if !matches {
            return Err("auth event does not authorize this digest".to_string());
        }
    }

    Ok(event.pubkey)
}

fn parse_digest(path: &str) -> Option<String> {
    let name = path.trim_start_matches('/');
    let hex = name.split('.').next().unwrap_or(name);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex.to_lowercase())
    } else {
        None
    }
}

fn full<T: Into<Bytes>>(body: T) -> BoxBody<Bytes, std::convert::Infallible> {
    Full::new(body.into()).map_err(|never| match never {}).boxed()
}

fn empty() -> BoxBody<Bytes, std::convert::Infallible> {
    full(Bytes::new())
}

fn not_found() -> Response<BoxBody<Bytes, std::convert::Infallible>> {
    json_error(StatusCode::NOT_FOUND, "not found")
}

fn json_error(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, std::convert::Infallible>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full(format!("{{\"message\":\"{message}\"}}")))
        .expect("response with known-valid headers")
}
