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

//! Async client for the trie service: one method per wire command.
//!
//! Methods return the response [`Status`] alongside any decoded data, so
//! callers can observe non-OK statuses (rate limiting, auth) without those
//! being conflated with transport errors.

use bytes::BytesMut;
use snafu::ResultExt;
use tokio::io::BufStream;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{IoSnafu, OutOfSpecSnafu, Result};
use crate::net::frame;
use crate::net::wire::{self, Command, PayloadCursor, Status};
use crate::trie::Subscriber;

/// Counters reported by a STATS response, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub patterns: u64,
    pub subscribers: u64,
    pub nodes: u64,
    pub connections: u64,
    pub commands: u64,
    pub uptime_secs: u64,
}

/// A connection to a trie server.
pub struct TrieClient {
    stream: BufStream<TcpStream>,
    max_frame_len: usize,
}

impl TrieClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.context(IoSnafu)?;
        debug!("connected to {:?}", stream.peer_addr().ok());
        Ok(Self {
            stream: BufStream::new(stream),
            max_frame_len: frame::DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Send one command frame and read back `(status, response data)`.
    pub async fn send(&mut self, command: Command, payload: &[u8]) -> Result<(Status, Vec<u8>)> {
        let mut body = BytesMut::with_capacity(1 + payload.len());
        body.extend_from_slice(&[command.as_byte()]);
        body.extend_from_slice(payload);
        frame::write_frame(&mut self.stream, &body).await?;

        let response = frame::read_frame(&mut self.stream, self.max_frame_len)
            .await?
            .ok_or_else(|| {
                OutOfSpecSnafu {
                    msg: "server closed the connection before responding",
                }
                .build()
            })?;
        let status = Status::from_byte(response[0])?;
        Ok((status, response[1..].to_vec()))
    }

    pub async fn ping(&mut self) -> Result<Status> {
        Ok(self.send(Command::Ping, &[]).await?.0)
    }

    pub async fn auth(&mut self, token: &str) -> Result<Status> {
        let mut payload = BytesMut::new();
        wire::put_bytes(&mut payload, token.as_bytes());
        Ok(self.send(Command::Auth, &payload).await?.0)
    }

    pub async fn add(&mut self, pattern: &str, id: u64, name: &str) -> Result<Status> {
        self.subscribe_with(Command::Add, pattern, id, name).await
    }

    pub async fn subscribe(&mut self, pattern: &str, id: u64, name: &str) -> Result<Status> {
        self.subscribe_with(Command::Subscribe, pattern, id, name)
            .await
    }

    async fn subscribe_with(
        &mut self,
        command: Command,
        pattern: &str,
        id: u64,
        name: &str,
    ) -> Result<Status> {
        let mut payload = BytesMut::new();
        wire::put_bytes(&mut payload, pattern.as_bytes());
        wire::put_u64(&mut payload, id);
        wire::put_bytes(&mut payload, name.as_bytes());
        Ok(self.send(command, &payload).await?.0)
    }

    pub async fn remove(&mut self, pattern: &str) -> Result<Status> {
        let mut payload = BytesMut::new();
        wire::put_bytes(&mut payload, pattern.as_bytes());
        Ok(self.send(Command::Remove, &payload).await?.0)
    }

    pub async fn unsubscribe(&mut self, pattern: &str, id: u64) -> Result<Status> {
        let mut payload = BytesMut::new();
        wire::put_bytes(&mut payload, pattern.as_bytes());
        wire::put_u64(&mut payload, id);
        Ok(self.send(Command::Unsubscribe, &payload).await?.0)
    }

    /// All subscribers matching `input`. Data is only present on OK.
    pub async fn match_input(&mut self, input: &str) -> Result<(Status, Vec<Subscriber>)> {
        let mut payload = BytesMut::new();
        wire::put_bytes(&mut payload, input.as_bytes());
        let (status, data) = self.send(Command::Match, &payload).await?;
        if status != Status::Ok {
            return Ok((status, Vec::new()));
        }

        let mut cursor = PayloadCursor::new(&data);
        let count = cursor.u64()?;
        let mut subscribers = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let id = cursor.u64()?;
            let name = cursor.str()?.to_string();
            subscribers.push(Subscriber { id, name });
        }
        Ok((status, subscribers))
    }

    /// All stored patterns. Data is only present on OK.
    pub async fn list(&mut self) -> Result<(Status, Vec<String>)> {
        let (status, data) = self.send(Command::List, &[]).await?;
        if status != Status::Ok {
            return Ok((status, Vec::new()));
        }

        let mut cursor = PayloadCursor::new(&data);
        let count = cursor.u64()?;
        let mut patterns = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            patterns.push(cursor.str()?.to_string());
        }
        Ok((status, patterns))
    }

    /// Server counters. Data is only present on OK.
    pub async fn stats(&mut self) -> Result<(Status, Option<ServerStats>)> {
        let (status, data) = self.send(Command::Stats, &[]).await?;
        if status != Status::Ok {
            return Ok((status, None));
        }

        let mut cursor = PayloadCursor::new(&data);
        let stats = ServerStats {
            patterns: cursor.u64()?,
            subscribers: cursor.u64()?,
            nodes: cursor.u64()?,
            connections: cursor.u64()?,
            commands: cursor.u64()?,
            uptime_secs: cursor.u64()?,
        };
        Ok((status, Some(stats)))
    }

    pub async fn save(&mut self) -> Result<Status> {
        Ok(self.send(Command::Save, &[]).await?.0)
    }
}
