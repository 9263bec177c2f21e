// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! The event-stream engine: accepts a websocket-upgraded connection per
//! client, runs the write-policy chain over inbound events, persists them,
//! and dispatches saved-event hooks in the background (spec §5, component H).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_utility::futures_util::stream::{self, SplitSink, SplitStream};
use async_utility::futures_util::{SinkExt, StreamExt};
use async_wsocket::native::{self, Message, WebSocketStream};
use nostr::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, watch};

use super::session::Session;
use crate::policy::{PolicyChain, PolicyResult, TokenBucket};
use crate::reconciler::Reconciler;
use crate::store::{EventStore, SaveOutcome};
use crate::Error;

/// Maximum concurrent REQ subscriptions per connection
const MAX_REQS: usize = 20;
/// Connection-rate-limiter burst (spec §4.4)
const CONNECTION_BURST: u32 = 2000;
/// Connection-rate-limiter refill quantity, added every `CONNECTION_REFILL_PERIOD`
const CONNECTION_REFILL: u32 = 10;
/// Connection-rate-limiter refill period (10/minute, spec §4.4)
const CONNECTION_REFILL_PERIOD: Duration = Duration::from_secs(60);

type WsTx<S> = SplitSink<WebSocketStream<S>, Message>;
type WsRx<S> = SplitStream<WebSocketStream<S>>;

/// The shared, cloneable handle every connection task operates through
#[derive(Debug, Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: EventStore,
    write_policy: PolicyChain,
    reconciler: Arc<Reconciler>,
    new_event: broadcast::Sender<Event>,
    connection_limiter: TokenBucket,
    proactive_sync_git: bool,
}

impl Relay {
    /// Build the engine over an already-open event store, the admission
    /// policy chain, and the reconciler hook dispatch depends on.
    /// `proactive_sync_git` gates whether a saved `RepoState` event triggers
    /// the post-state proactive-sync hook (spec's `NGIT_PROACTIVE_SYNC_GIT`).
    pub fn new(
        store: EventStore,
        write_policy: PolicyChain,
        reconciler: Arc<Reconciler>,
        proactive_sync_git: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                write_policy,
                reconciler,
                new_event: broadcast::channel(1024).0,
                connection_limiter: TokenBucket::new(
                    CONNECTION_BURST,
                    CONNECTION_REFILL,
                    CONNECTION_REFILL_PERIOD,
                ),
                proactive_sync_git,
            }),
        }
    }

    /// `true` unless `addr` has exhausted the new-connection rate limit;
    /// loopback callers (the pre/post-receive hooks) always bypass it.
    pub fn admit_connection(&self, addr: IpAddr) -> bool {
        addr.is_loopback() || self.inner.connection_limiter.try_acquire(addr)
    }

    /// Drive a single client connection to completion over an
    /// already-upgraded duplex stream (a raw `TcpStream`, or the `Upgraded`
    /// body of an HTTP/1.1 websocket upgrade).
    pub async fn take_connection<S>(&self, io: S, addr: SocketAddr) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws_stream = native::accept(io)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let new_event = self.inner.new_event.subscribe();
        let (ws_tx, ws_rx) = ws_stream.split();

        let session = Session::new();

        let (nostr_tx, nostr_rx) = mpsc::channel::<Vec<RelayMessage>>(256);
        let (pong_tx, pong_rx) = watch::channel::<Vec<u8>>(Vec::new());

        tokio::select! {
            res = self.receiver_message_handler(ws_rx, &nostr_tx, pong_tx, &session, &addr) => {
                if let Err(e) = res {
                    tracing::debug!(%addr, error = %e, "connection receiver exited with error");
                }
            }
            res = self.sender_message_handler(ws_tx, nostr_rx, pong_rx) => {
                if let Err(e) = res {
                    tracing::debug!(%addr, error = %e, "connection sender exited with error");
                }
            }
            res = self.new_event_dispatcher(new_event, &nostr_tx, &session) => {
                if let Err(e) = res {
                    tracing::debug!(%addr, error = %e, "new-event dispatcher exited with error");
                }
            }
        }

        tracing::debug!(%addr, "connection terminated");
        Ok(())
    }

    async fn receiver_message_handler<S>(
        &self,
        mut ws_rx: WsRx<S>,
        nostr_tx: &mpsc::Sender<Vec<RelayMessage>>,
        pong_tx: watch::Sender<Vec<u8>>,
        session: &Session,
        addr: &SocketAddr,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::trace!(%addr, error = %e, "websocket read error");
                    break;
                }
            };
            match msg {
                Message::Text(json) => {
                    let parsed = match ClientMessage::from_json(json) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::trace!(%addr, error = %e, "failed to parse client message");
                            continue;
                        }
                    };
                    self.handle_client_msg(session, nostr_tx, parsed, addr).await?;
                }
                Message::Binary(..) => {
                    let msg = RelayMessage::notice("binary messages are not processed by this relay");
                    self.send_msg(nostr_tx, msg).await?;
                }
                Message::Ping(val) => {
                    let _ = pong_tx.send(val);
                }
                Message::Pong(..) | Message::Close(..) | Message::Frame(..) => {}
            }
        }

        Ok(())
    }

    async fn sender_message_handler<S>(
        &self,
        mut ws_tx: WsTx<S>,
        mut nostr_rx: mpsc::Receiver<Vec<RelayMessage>>,
        mut pong_rx: watch::Receiver<Vec<u8>>,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            tokio::select! {
                Some(msgs) = nostr_rx.recv() => {
                    let iter = msgs.into_iter().map(|msg| Ok(Message::Text(msg.as_json())));
                    let mut s = stream::iter(iter);
                    ws_tx
                        .send_all(&mut s)
                        .await
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                }
                Ok(()) = pong_rx.changed() => {
                    let data = pong_rx.borrow_and_update().to_vec();
                    ws_tx
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                }
                else => break,
            }
        }

        let _ = ws_tx.close().await;
        Ok(())
    }

    async fn new_event_dispatcher(
        &self,
        mut new_event: broadcast::Receiver<Event>,
        nostr_tx: &mpsc::Sender<Vec<RelayMessage>>,
        session: &Session,
    ) -> Result<(), Error> {
        while let Ok(event) = new_event.recv().await {
            let subs = session.subscriptions.read().await;
            for (id, filters) in subs.iter() {
                if filters.iter().any(|f| f.match_event(&event)) {
                    self.send_msg(nostr_tx, RelayMessage::event(id.clone(), event.clone())).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_client_msg(
        &self,
        session: &Session,
        tx: &mpsc::Sender<Vec<RelayMessage>>,
        msg: ClientMessage,
        addr: &SocketAddr,
    ) -> Result<(), Error> {
        match msg {
            ClientMessage::Event(event) => self.handle_event(tx, *event, addr).await,
            ClientMessage::Req { subscription_id, filters } => {
                {
                    let subs = session.subscriptions.read().await;
                    if subs.len() >= MAX_REQS && !subs.contains_key(&subscription_id) {
                        return self
                            .send_msg(
                                tx,
                                RelayMessage::Closed {
                                    subscription_id,
                                    message: format!("{}: too many REQs", MachineReadablePrefix::RateLimited),
                                },
                            )
                            .await;
                    }
                }

                session.subscriptions.write().await.insert(subscription_id.clone(), filters.clone());

                let events = self.inner.store.query(filters).await?;
                let mut msgs: Vec<RelayMessage> = Vec::with_capacity(events.len() + 1);
                msgs.extend(events.into_iter().map(|e| RelayMessage::event(subscription_id.clone(), e)));
                msgs.push(RelayMessage::eose(subscription_id));
                self.send_msgs(tx, msgs).await
            }
            ClientMessage::Count { subscription_id, filters } => {
                let count = self.inner.store.count(filters).await?;
                self.send_msg(tx, RelayMessage::count(subscription_id, count)).await
            }
            ClientMessage::Close(subscription_id) => {
                session.subscriptions.write().await.remove(&subscription_id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn handle_event(
        &self,
        tx: &mpsc::Sender<Vec<RelayMessage>>,
        event: Event,
        addr: &SocketAddr,
    ) -> Result<(), Error> {
        if let PolicyResult::Reject(reason) = self.inner.write_policy.admit(&event, &addr.ip()).await {
            return self
                .send_msg(
                    tx,
                    RelayMessage::Ok {
                        event_id: event.id,
                        status: false,
                        message: format!("{}: {reason}", MachineReadablePrefix::Blocked),
                    },
                )
                .await;
        }

        if !event.verify_id() || !event.verify_signature() {
            return self
                .send_msg(
                    tx,
                    RelayMessage::Ok {
                        event_id: event.id,
                        status: false,
                        message: format!("{}: invalid event id or signature", MachineReadablePrefix::Invalid),
                    },
                )
                .await;
        }

        let outcome = self.inner.store.save(&event).await?;
        let msg = match outcome {
            SaveOutcome::Saved => {
                let _ = self.inner.new_event.send(event.clone());
                let reconciler = self.inner.reconciler.clone();
                let dispatched = event.clone();
                let proactive_sync_git = self.inner.proactive_sync_git;
                tokio::spawn(async move {
                    super::hooks::dispatch_saved_event(reconciler, dispatched, proactive_sync_git).await;
                });
                RelayMessage::Ok { event_id: event.id, status: true, message: String::new() }
            }
            SaveOutcome::Stale => RelayMessage::Ok {
                event_id: event.id,
                status: true,
                message: format!("{}: have a newer event", MachineReadablePrefix::Duplicate),
            },
            SaveOutcome::Duplicate => RelayMessage::Ok {
                event_id: event.id,
                status: true,
                message: format!("{}: already have this event", MachineReadablePrefix::Duplicate),
            },
            SaveOutcome::Other => RelayMessage::Ok {
                event_id: event.id,
                status: false,
                message: format!("{}: could not save event", MachineReadablePrefix::Error),
            },
        };

        self.send_msg(tx, msg).await
    }

    #[inline]
    async fn send_msg(&self, tx: &mpsc::Sender<Vec<RelayMessage>>, msg: RelayMessage) -> Result<(), Error> {
        self.send_msgs(tx, vec![msg]).await
    }

    #[inline]
    async fn send_msgs(&self, tx: &mpsc::Sender<Vec<RelayMessage>>, msgs: Vec<RelayMessage>) -> Result<(), Error> {
        let _ = tx.send(msgs).await;
        Ok(())
    }
}
