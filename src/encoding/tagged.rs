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

//! Tagged varint: the total encoded length is recoverable from the first
//! byte alone.
//!
//! Layout: the high nibble of the first byte is the number of *additional*
//! bytes (0..=8), the low nibble holds the low 4 bits of the value, and the
//! remaining value bits follow little-endian. A value therefore occupies
//! 1..=9 bytes, and a streaming parser can read one byte, learn the total
//! length via [`peek_len`], then request the rest in a single read.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{InvalidWidthSnafu, Result, VarintTooLargeSnafu};

use super::util::take;

/// Longest possible tagged varint encoding (1 lead byte + 8 value bytes).
pub const MAX_LEN: usize = 9;

/// Number of bytes [`put`] will emit for `value`.
#[inline]
pub fn encoded_len(value: u64) -> usize {
    if value < 16 {
        return 1;
    }
    let bits = 64 - value.leading_zeros() as usize;
    // 4 bits ride in the lead byte, the rest is whole little-endian bytes.
    1 + (bits - 4).div_ceil(8)
}

/// Append `value` in minimal form, returning the bytes written.
pub fn put(writer: &mut BytesMut, value: u64) -> usize {
    let extra = encoded_len(value) - 1;
    writer.put_u8(((extra as u8) << 4) | (value & 0x0F) as u8);
    let rest = (value >> 4).to_le_bytes();
    writer.put_slice(&rest[..extra]);
    extra + 1
}

/// Total encoded length determined by the first byte.
///
/// Lead-byte tags above 8 do not correspond to any encoder output and fail
/// with an invalid-width error.
#[inline]
pub fn peek_len(first_byte: u8) -> Result<usize> {
    let extra = (first_byte >> 4) as usize;
    ensure!(extra <= MAX_LEN - 1, InvalidWidthSnafu { width: first_byte });
    Ok(extra + 1)
}

/// Decode one tagged varint from the front of `buf`.
///
/// Returns the value and the bytes consumed. Fails if the length tag is
/// invalid, the buffer is shorter than the tag promises, or the encoded
/// value would exceed 64 bits.
pub fn get(buf: &[u8]) -> Result<(u64, usize)> {
    let lead = take(buf, 1)?[0];
    let total = peek_len(lead)?;
    let tail = &take(buf, total)?[1..];

    let mut rest = [0_u8; 8];
    rest[..tail.len()].copy_from_slice(tail);
    let high = u64::from_le_bytes(rest);
    // 9-byte encodings carry 68 bits of capacity; the top 4 must be clear.
    ensure!(high >> 60 == 0 || total < MAX_LEN, VarintTooLargeSnafu);

    Ok(((lead & 0x0F) as u64 | high << 4, total))
}
