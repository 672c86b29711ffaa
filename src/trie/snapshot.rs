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

//! Trie snapshot file format.
//!
//! ```text
//! "TRIE" [version: 1 byte]
//! [pattern_count: tagged][node_count: tagged][subscriber_count: tagged]
//! node := [flags: 1 byte]                   bit 0 terminal,
//!                                           bits 1-2 segment type
//!                                           (0 literal, 1 star, 2 hash)
//!         [segment_len: tagged][segment bytes]
//!         [subscriber_count: tagged]
//!           { [id: tagged][name_len: tagged][name bytes] } x count
//!         [child_count: tagged] { node } x count
//! ```
//!
//! Node records nest recursively starting at the root, but both directions
//! here run on explicit stacks. Snapshots above 16 MiB are refused on both
//! save and load; a bad magic, version or structure refuses the load
//! without touching any live trie.

use std::path::Path;

use bytes::{BufMut, BytesMut};
use snafu::{ensure, ResultExt};

use crate::encoding::tagged;
use crate::error::{
    InvalidMagicSnafu, IoSnafu, OutOfSpecSnafu, Result, SnapshotTooLargeSnafu,
    UnsupportedVersionSnafu,
};

use super::{NodeId, PatternTrie, Segment, Subscriber};

pub const MAGIC: [u8; 4] = *b"TRIE";
pub const VERSION: u8 = 1;
pub const MAX_SNAPSHOT_SIZE: usize = 16 * 1024 * 1024;

const FLAG_TERMINAL: u8 = 0b0000_0001;
const SEGMENT_SHIFT: u32 = 1;
const SEGMENT_MASK: u8 = 0b0000_0110;

fn segment_flags(segment: &Segment, terminal: bool) -> u8 {
    let kind: u8 = match segment {
        Segment::Literal(_) => 0,
        Segment::Star => 1,
        Segment::Hash => 2,
    };
    (kind << SEGMENT_SHIFT) | u8::from(terminal)
}

fn parse_flags(flags: u8, segment_text: &str) -> Result<(Segment, bool)> {
    let terminal = flags & FLAG_TERMINAL != 0;
    let segment = match (flags & SEGMENT_MASK) >> SEGMENT_SHIFT {
        0 => Segment::Literal(segment_text.to_string()),
        1 => Segment::Star,
        2 => Segment::Hash,
        _ => {
            return OutOfSpecSnafu {
                msg: "snapshot node carries an unknown segment type",
            }
            .fail()
        }
    };
    Ok((segment, terminal))
}

/// Serialize `trie` to an in-memory snapshot.
pub fn serialize(trie: &PatternTrie) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    tagged::put(&mut buf, trie.pattern_count() as u64);
    tagged::put(&mut buf, trie.node_count() as u64);
    tagged::put(&mut buf, trie.subscriber_count() as u64);

    let mut stack = vec![PatternTrie::ROOT];
    while let Some(id) = stack.pop() {
        let node = &trie.nodes[id];
        buf.put_u8(segment_flags(&node.segment, node.terminal));

        let segment = match &node.segment {
            Segment::Literal(literal) => literal.as_bytes(),
            Segment::Star | Segment::Hash => &[],
        };
        tagged::put(&mut buf, segment.len() as u64);
        buf.put_slice(segment);

        tagged::put(&mut buf, node.subscribers.len() as u64);
        for subscriber in &node.subscribers {
            tagged::put(&mut buf, subscriber.id);
            tagged::put(&mut buf, subscriber.name.len() as u64);
            buf.put_slice(subscriber.name.as_bytes());
        }

        tagged::put(&mut buf, node.children.len() as u64);
        // Children go on the stack reversed so the preorder byte stream
        // nests them in their stored order.
        for &child in node.children.iter().rev() {
            stack.push(child);
        }
    }

    ensure!(
        buf.len() <= MAX_SNAPSHOT_SIZE,
        SnapshotTooLargeSnafu {
            size: buf.len() as u64,
            max: MAX_SNAPSHOT_SIZE as u64,
        }
    );
    Ok(buf.to_vec())
}

struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    fn u64(&mut self) -> Result<u64> {
        let (value, consumed) = tagged::get(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    fn byte(&mut self) -> Result<u8> {
        let byte = crate::encoding::take(&self.buf[self.pos..], 1)?[0];
        self.pos += 1;
        Ok(byte)
    }

    fn str(&mut self, len: usize) -> Result<&'a str> {
        let bytes = crate::encoding::take(&self.buf[self.pos..], len)?;
        self.pos += len;
        std::str::from_utf8(bytes).map_err(|_| {
            OutOfSpecSnafu {
                msg: "snapshot string is not valid UTF-8",
            }
            .build()
        })
    }
}

/// One node record: flags + segment + subscribers + child count.
fn read_node(reader: &mut SnapshotReader<'_>) -> Result<(Segment, bool, Vec<Subscriber>, u64)> {
    let flags = reader.byte()?;
    let segment_len = reader.u64()? as usize;
    let segment_text = reader.str(segment_len)?.to_string();
    let (segment, terminal) = parse_flags(flags, &segment_text)?;

    let subscriber_count = reader.u64()?;
    let mut subscribers = Vec::new();
    for _ in 0..subscriber_count {
        let id = reader.u64()?;
        let name_len = reader.u64()? as usize;
        let name = reader.str(name_len)?.to_string();
        subscribers.push(Subscriber { id, name });
    }

    let child_count = reader.u64()?;
    Ok((segment, terminal, subscribers, child_count))
}

/// Rebuild a trie from snapshot bytes.
pub fn deserialize(bytes: &[u8]) -> Result<PatternTrie> {
    ensure!(
        bytes.len() <= MAX_SNAPSHOT_SIZE,
        SnapshotTooLargeSnafu {
            size: bytes.len() as u64,
            max: MAX_SNAPSHOT_SIZE as u64,
        }
    );
    ensure!(
        crate::encoding::take(bytes, 4)? == &MAGIC[..],
        InvalidMagicSnafu
    );
    let mut reader = SnapshotReader { buf: bytes, pos: 4 };
    let version = reader.byte()?;
    ensure!(version == VERSION, UnsupportedVersionSnafu { version });

    let pattern_count = reader.u64()?;
    let node_count = reader.u64()?;
    let subscriber_count = reader.u64()?;

    let mut trie = PatternTrie::new();
    let (segment, terminal, subscribers, root_children) = read_node(&mut reader)?;
    {
        let root = &mut trie.nodes[PatternTrie::ROOT];
        root.segment = segment;
        root.terminal = terminal;
        root.subscribers = subscribers;
    }

    // (parent node, children still to read for it)
    let mut stack: Vec<(NodeId, u64)> = vec![(PatternTrie::ROOT, root_children)];
    let mut nodes_read: u64 = 1;
    while let Some((parent, remaining)) = stack.last_mut() {
        if *remaining == 0 {
            stack.pop();
            continue;
        }
        *remaining -= 1;
        let parent = *parent;

        nodes_read += 1;
        ensure!(
            nodes_read <= node_count,
            OutOfSpecSnafu {
                msg: "snapshot contains more nodes than its header claims",
            }
        );
        let (segment, terminal, subscribers, child_count) = read_node(&mut reader)?;
        let id = trie.nodes.len();
        trie.nodes.push(super::Node {
            segment,
            children: Vec::new(),
            subscribers,
            terminal,
        });
        trie.nodes[parent].children.push(id);
        stack.push((id, child_count));
    }

    ensure!(
        reader.pos == bytes.len(),
        OutOfSpecSnafu {
            msg: "snapshot has trailing bytes after the root subtree",
        }
    );
    ensure!(
        nodes_read == node_count
            && trie.pattern_count() as u64 == pattern_count
            && trie.subscriber_count() as u64 == subscriber_count,
        OutOfSpecSnafu {
            msg: "snapshot header counters do not match its contents",
        }
    );
    Ok(trie)
}

/// Write a snapshot of `trie` to `path`.
pub fn save(trie: &PatternTrie, path: &Path) -> Result<()> {
    let bytes = serialize(trie)?;
    std::fs::write(path, bytes).context(IoSnafu)
}

/// Load a trie from the snapshot at `path`.
///
/// Refuses oversized files before reading their contents.
pub fn load(path: &Path) -> Result<PatternTrie> {
    let size = std::fs::metadata(path).context(IoSnafu)?.len();
    ensure!(
        size <= MAX_SNAPSHOT_SIZE as u64,
        SnapshotTooLargeSnafu {
            size,
            max: MAX_SNAPSHOT_SIZE as u64,
        }
    );
    let bytes = std::fs::read(path).context(IoSnafu)?;
    deserialize(&bytes)
}
