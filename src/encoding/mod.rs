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

//! Encoding/decoding logic for the varint codec family.
//!
//! Encoders append to a [`bytes::BytesMut`] and return the number of bytes
//! written; decoders take `&[u8]` and fill caller-provided buffers. None of
//! the codecs hold state between calls, so buffers that do not overlap may
//! be encoded/decoded from multiple threads freely.

pub mod adaptive;
pub mod bitmap;
pub mod delta;
pub mod dict;
pub mod external;
pub mod float;
pub mod frame_of_reference;
pub mod pfor;
pub mod tagged;
mod util;

pub use util::{zigzag_decode, zigzag_encode};

pub(crate) use util::take;

/// Largest payload width any codec in this family uses, in bytes.
pub const MAX_WIDTH: usize = 8;

/// Byte widths are carried in single header bytes; anything outside 1..=8
/// marks a corrupt header.
pub(crate) fn validate_width(width: u8) -> crate::error::Result<usize> {
    snafu::ensure!(
        (1..=MAX_WIDTH as u8).contains(&width),
        crate::error::InvalidWidthSnafu { width }
    );
    Ok(width as usize)
}
