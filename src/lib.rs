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

//! A family of variable-length integer codecs and the block encodings built
//! on top of them.
//!
//! The low-level primitives are two varint flavours:
//!
//! - [`encoding::tagged`]: the encoded length is recoverable from the first
//!   byte alone, so streaming consumers can read one byte and know how many
//!   more to request.
//! - [`encoding::external`]: a little-endian integer at a caller-supplied
//!   byte width, for payloads where the width lives in a block header and
//!   random access must be O(1).
//!
//! Block codecs compose these with [`encoding::zigzag_encode`]:
//! [`encoding::delta`] for sequential streams, [`encoding::frame_of_reference`]
//! for clustered values, [`encoding::pfor`] for clustered values with
//! outliers, [`encoding::dict`] for low-cardinality data,
//! [`encoding::bitmap`] for integer sets, [`encoding::float`] for
//! floating-point columns and [`encoding::adaptive`] to pick a strategy from
//! measured statistics.
//!
//! All codecs are pure functions over caller buffers: encoders append to a
//! [`bytes::BytesMut`] and return the bytes written, decoders read from a
//! byte slice and fill a caller-provided buffer.
//!
//! The [`net`] module layers a length-prefixed framing envelope over the
//! tagged varint, plus the wire schema of the pattern-matching trie service
//! ([`trie`], [`server`]) that demonstrates the codecs over TCP.

pub mod encoding;
pub mod error;
pub mod net;
pub mod trie;

#[cfg(feature = "async")]
pub mod server;

pub use error::{Result, VarintError};
