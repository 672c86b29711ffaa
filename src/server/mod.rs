// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! TCP service exposing the pattern trie over the framing envelope.
//!
//! One tokio task per connection; frames on a connection are processed in
//! arrival order and answered in the same order. Per-frame errors (bad
//! payload, unknown command) produce an error status on a still-open
//! connection; transport errors and idle timeouts close it. Shutdown is a
//! cancellation signal passed through the accept loop and every
//! connection task.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use snafu::ResultExt;
use tokio::io::{AsyncWrite, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{IoSnafu, Result};
use crate::net::frame;
use crate::net::wire::{self, Command, PayloadCursor, Status};
use crate::trie::{snapshot, PatternTrie, Subscriber};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// When set, commands other than AUTH and PING require a successful
    /// AUTH with this token first.
    pub auth_token: Option<String>,
    /// Snapshot path used by SAVE, auto-save and startup restore.
    pub save_path: Option<PathBuf>,
    pub max_frame_len: usize,
    /// Commands allowed per connection within a sliding one-second window.
    pub rate_limit: usize,
    /// Idle time since the last successful frame before the connection is
    /// closed.
    pub idle_timeout: Duration,
    /// Interval for automatic snapshots; requires `save_path`.
    pub autosave: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9999,
            auth_token: None,
            save_path: None,
            max_frame_len: frame::DEFAULT_MAX_FRAME_LEN,
            rate_limit: 1000,
            idle_timeout: Duration::from_secs(30),
            autosave: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicU64,
    commands: AtomicU64,
}

/// Shared state handed to every connection task.
struct Shared {
    config: ServerConfig,
    trie: RwLock<PatternTrie>,
    counters: Counters,
    started: Instant,
}

/// Triggers a clean shutdown of a running [`TrieServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The trie service. [`TrieServer::bind`] restores any snapshot and claims
/// the socket, [`TrieServer::run`] serves until the shutdown handle fires.
pub struct TrieServer {
    shared: Arc<Shared>,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl TrieServer {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let trie = match &config.save_path {
            Some(path) if path.exists() => {
                let trie = snapshot::load(path)?;
                info!(
                    patterns = trie.pattern_count(),
                    "restored trie from {}",
                    path.display()
                );
                trie
            }
            _ => PatternTrie::new(),
        };

        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr).await.context(IoSnafu)?;
        let local_addr = listener.local_addr().context(IoSnafu)?;
        info!("trie server listening on {local_addr}");

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                trie: RwLock::new(trie),
                counters: Counters::default(),
                started: Instant::now(),
            }),
            listener,
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until the shutdown handle fires, then write a
    /// final snapshot if a save path is configured.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if let (Some(interval), Some(_)) = (self.shared.config.autosave, &self.shared.config.save_path)
        {
            let shared = self.shared.clone();
            let mut autosave_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(e) = save_snapshot(&shared).await {
                                warn!("auto-save failed: {e}");
                            }
                        }
                        _ = autosave_rx.changed() => {
                            if *autosave_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("connection from {peer}");
                            let shared = self.shared.clone();
                            let shutdown_rx = self.shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                shared.counters.connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = serve_connection(&shared, stream, shutdown_rx).await {
                                    debug!("connection {peer} closed: {e}");
                                }
                                shared.counters.connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        if self.shared.config.save_path.is_some() {
            if let Err(e) = save_snapshot(&self.shared).await {
                warn!("final snapshot failed: {e}");
            }
        }
        Ok(())
    }
}

async fn save_snapshot(shared: &Shared) -> Result<()> {
    let Some(path) = &shared.config.save_path else {
        return Ok(());
    };
    let trie = shared.trie.read().await;
    snapshot::save(&trie, path)?;
    debug!(
        patterns = trie.pattern_count(),
        "snapshot written to {}",
        path.display()
    );
    Ok(())
}

/// Sliding one-second window of command timestamps.
struct RateWindow {
    timestamps: VecDeque<Instant>,
    limit: usize,
}

impl RateWindow {
    fn new(limit: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(limit.min(4096)),
            limit,
        }
    }

    /// Record an attempt; `true` when it exceeds the limit.
    fn over_limit(&mut self, now: Instant) -> bool {
        while self
            .timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= Duration::from_secs(1))
        {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(now);
        self.timestamps.len() > self.limit
    }
}

struct ConnState {
    authenticated: bool,
    window: RateWindow,
}

async fn serve_connection(
    shared: &Shared,
    stream: TcpStream,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut stream = BufStream::new(stream);
    let mut state = ConnState {
        authenticated: false,
        window: RateWindow::new(shared.config.rate_limit),
    };

    loop {
        let frame = tokio::select! {
            read = tokio::time::timeout(
                shared.config.idle_timeout,
                frame::read_frame(&mut stream, shared.config.max_frame_len),
            ) => match read {
                Err(_elapsed) => {
                    debug!("idle timeout");
                    return Ok(());
                }
                Ok(frame) => frame?,
            },
            _ = shutdown_rx.wait_for(|stop| *stop) => return Ok(()),
        };
        let Some(body) = frame else {
            return Ok(()); // peer closed cleanly
        };

        shared.counters.commands.fetch_add(1, Ordering::Relaxed);
        let response = process_frame(shared, &mut state, &body).await;
        write_response(&mut stream, response).await?;
    }
}

async fn write_response<S>(stream: &mut S, (status, data): (Status, BytesMut)) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut body = BytesMut::with_capacity(1 + data.len());
    body.extend_from_slice(&[status.as_byte()]);
    body.extend_from_slice(&data);
    frame::write_frame(stream, &body).await
}

/// Decode and execute one frame; infallible in the sense that every
/// malformed input maps to a status code, never a dropped connection.
async fn process_frame(
    shared: &Shared,
    state: &mut ConnState,
    body: &[u8],
) -> (Status, BytesMut) {
    let empty = BytesMut::new;

    if state.window.over_limit(Instant::now()) {
        return (Status::RateLimited, empty());
    }

    let Some(command) = Command::from_byte(body[0]) else {
        return (Status::InvalidCmd, empty());
    };
    let payload = &body[1..];

    let auth_required = shared.config.auth_token.is_some()
        && !state.authenticated
        && !matches!(command, Command::Auth | Command::Ping);
    if auth_required {
        return (Status::AuthRequired, empty());
    }

    match execute(shared, state, command, payload).await {
        Ok(data) => (Status::Ok, data),
        Err(status) => (status, empty()),
    }
}

/// Command bodies successfully executed return their response data; any
/// failure collapses to a status code.
async fn execute(
    shared: &Shared,
    state: &mut ConnState,
    command: Command,
    payload: &[u8],
) -> std::result::Result<BytesMut, Status> {
    let mut cursor = PayloadCursor::new(payload);
    let mut data = BytesMut::new();
    match command {
        Command::Add | Command::Subscribe => {
            let pattern = cursor.str().map_err(|_| Status::Error)?.to_string();
            let id = cursor.u64().map_err(|_| Status::Error)?;
            let name = cursor.str().map_err(|_| Status::Error)?.to_string();
            let mut trie = shared.trie.write().await;
            if !trie.add(&pattern, Subscriber { id, name }) {
                return Err(Status::Error);
            }
        }
        Command::Remove => {
            let pattern = cursor.str().map_err(|_| Status::Error)?.to_string();
            let mut trie = shared.trie.write().await;
            if !trie.remove(&pattern) {
                return Err(Status::Error);
            }
        }
        Command::Unsubscribe => {
            let pattern = cursor.str().map_err(|_| Status::Error)?.to_string();
            let id = cursor.u64().map_err(|_| Status::Error)?;
            let mut trie = shared.trie.write().await;
            if !trie.unsubscribe(&pattern, id) {
                return Err(Status::Error);
            }
        }
        Command::Match => {
            let input = cursor.str().map_err(|_| Status::Error)?.to_string();
            let trie = shared.trie.read().await;
            let matches = trie.matches(&input);
            wire::put_u64(&mut data, matches.len() as u64);
            for subscriber in matches {
                wire::put_u64(&mut data, subscriber.id);
                wire::put_bytes(&mut data, subscriber.name.as_bytes());
            }
        }
        Command::List => {
            let trie = shared.trie.read().await;
            let patterns = trie.patterns();
            wire::put_u64(&mut data, patterns.len() as u64);
            for pattern in patterns {
                wire::put_bytes(&mut data, pattern.as_bytes());
            }
        }
        Command::Stats => {
            let trie = shared.trie.read().await;
            wire::put_u64(&mut data, trie.pattern_count() as u64);
            wire::put_u64(&mut data, trie.subscriber_count() as u64);
            wire::put_u64(&mut data, trie.node_count() as u64);
            drop(trie);
            wire::put_u64(
                &mut data,
                shared.counters.connections.load(Ordering::Relaxed),
            );
            wire::put_u64(&mut data, shared.counters.commands.load(Ordering::Relaxed));
            wire::put_u64(&mut data, shared.started.elapsed().as_secs());
        }
        Command::Save => {
            if shared.config.save_path.is_none() {
                return Err(Status::Error);
            }
            save_snapshot(shared).await.map_err(|e| {
                warn!("save failed: {e}");
                Status::Error
            })?;
        }
        Command::Ping => {}
        Command::Auth => {
            let token = cursor.str().map_err(|_| Status::Error)?;
            match &shared.config.auth_token {
                Some(expected) if expected == token => state.authenticated = true,
                Some(_) => return Err(Status::Error),
                // No token configured: AUTH is a no-op success.
                None => state.authenticated = true,
            }
        }
    }
    Ok(data)
}
