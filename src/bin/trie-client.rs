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

//! Command-line client for the trie server.

use anyhow::bail;
use clap::{Parser, Subcommand};

use varint_rust::net::client::TrieClient;
use varint_rust::net::wire::Status;

#[derive(Parser, Debug)]
#[command(name = "trie-client")]
#[command(author, version, about = "Client for the pattern-matching trie server", long_about = None)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "9999")]
    port: u16,

    /// Authenticate with this token before running the command
    #[arg(long)]
    auth: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Liveness check
    Ping,
    /// Print server statistics
    Stats,
    /// Add a pattern with a subscriber
    Add { pattern: String, id: u64, name: String },
    /// Remove a whole pattern
    Remove { pattern: String },
    /// Add a subscriber to a pattern
    Subscribe { pattern: String, id: u64, name: String },
    /// Remove one subscriber from a pattern
    Unsubscribe { pattern: String, id: u64 },
    /// Match an input against the stored patterns
    Match { input: String },
    /// List stored patterns
    List,
    /// Trigger a snapshot on the server
    Save,
}

fn check(status: Status) -> anyhow::Result<()> {
    if status != Status::Ok {
        bail!("server answered {:?}", status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut client = TrieClient::connect((args.host.as_str(), args.port)).await?;

    if let Some(token) = &args.auth {
        check(client.auth(token).await?)?;
    }

    match args.command {
        Cmd::Ping => {
            check(client.ping().await?)?;
            println!("PONG");
        }
        Cmd::Stats => {
            let (status, stats) = client.stats().await?;
            check(status)?;
            if let Some(stats) = stats {
                println!("patterns:     {}", stats.patterns);
                println!("subscribers:  {}", stats.subscribers);
                println!("nodes:        {}", stats.nodes);
                println!("connections:  {}", stats.connections);
                println!("commands:     {}", stats.commands);
                println!("uptime:       {}s", stats.uptime_secs);
            }
        }
        Cmd::Add { pattern, id, name } => {
            check(client.add(&pattern, id, &name).await?)?;
            println!("added {pattern}");
        }
        Cmd::Remove { pattern } => {
            check(client.remove(&pattern).await?)?;
            println!("removed {pattern}");
        }
        Cmd::Subscribe { pattern, id, name } => {
            check(client.subscribe(&pattern, id, &name).await?)?;
            println!("subscribed {id} to {pattern}");
        }
        Cmd::Unsubscribe { pattern, id } => {
            check(client.unsubscribe(&pattern, id).await?)?;
            println!("unsubscribed {id} from {pattern}");
        }
        Cmd::Match { input } => {
            let (status, subscribers) = client.match_input(&input).await?;
            check(status)?;
            println!("{} match(es)", subscribers.len());
            for subscriber in subscribers {
                println!("  {} {}", subscriber.id, subscriber.name);
            }
        }
        Cmd::List => {
            let (status, patterns) = client.list().await?;
            check(status)?;
            for pattern in patterns {
                println!("{pattern}");
            }
        }
        Cmd::Save => {
            check(client.save().await?)?;
            println!("saved");
        }
    }
    Ok(())
}
