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

//! Pattern-matching trie server over the varint framing protocol.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use varint_rust::server::{ServerConfig, TrieServer};

#[derive(Parser, Debug)]
#[command(name = "trie-server")]
#[command(author, version, about = "Pattern-matching trie server", long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "9999")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Require this token via AUTH before serving commands
    #[arg(long)]
    auth: Option<String>,

    /// Snapshot file restored at startup and written by SAVE
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write a snapshot automatically every N seconds (requires --save)
    #[arg(long)]
    autosave_secs: Option<u64>,

    /// Commands allowed per connection per second
    #[arg(long, default_value = "1000")]
    rate_limit: usize,

    /// Close connections idle for longer than N seconds
    #[arg(long, default_value = "30")]
    idle_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.autosave_secs.is_some() && args.save.is_none() {
        anyhow::bail!("--autosave-secs requires --save");
    }

    let config = ServerConfig {
        bind: args.bind,
        port: args.port,
        auth_token: args.auth,
        save_path: args.save,
        rate_limit: args.rate_limit,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        autosave: args.autosave_secs.map(Duration::from_secs),
        ..ServerConfig::default()
    };

    let server = TrieServer::bind(config)
        .await
        .context("failed to start trie server")?;

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await.context("server terminated abnormally")?;
    Ok(())
}
