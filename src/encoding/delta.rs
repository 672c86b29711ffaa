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

//! Delta codec: an absolute base value followed by ZigZag-encoded deltas of
//! the running predecessor.
//!
//! Layout:
//!
//! ```text
//! [base_width:1][base: LE base_width bytes]
//! { [delta_width:1][zigzag(delta): LE delta_width bytes] } x (count - 1)
//! ```
//!
//! Every element carries its own width byte, so decoding is strictly
//! sequential and random access is O(i). That is the intended trade: delta
//! streams are for sorted or near-monotonic data (timestamps, ids) where a
//! sequential scan is the access pattern anyway. The unsigned variant keeps
//! ZigZag on the deltas so decreasing runs still shrink.

use bytes::{BufMut, BytesMut};

use crate::error::Result;

use super::{
    external,
    util::{take, zigzag_decode, zigzag_encode},
    validate_width,
};

/// Upper bound on the encoded size of `count` values: one width byte and up
/// to eight value bytes for the base, then up to nine bytes per delta.
#[inline]
pub fn max_encoded_size(count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    1 + 8 + (count - 1) * 9
}

/// Append one width-prefixed raw value.
fn put_raw(writer: &mut BytesMut, value: u64) -> usize {
    let width = external::unsigned_encoding(value);
    writer.put_u8(width as u8);
    external::put_fixed_width(writer, value, width);
    1 + width
}

/// Read one width-prefixed raw value, returning it and the bytes consumed.
fn get_raw(buf: &[u8]) -> Result<(u64, usize)> {
    let width = validate_width(take(buf, 1)?[0])?;
    let value = external::get(&buf[1..], width)?;
    Ok((value, 1 + width))
}

/// Append a single ZigZag-encoded delta, returning the bytes written.
pub fn put_delta(writer: &mut BytesMut, delta: i64) -> usize {
    put_raw(writer, zigzag_encode(delta))
}

/// Read a single ZigZag-encoded delta, returning it and the bytes consumed.
pub fn get_delta(buf: &[u8]) -> Result<(i64, usize)> {
    let (zigzag, consumed) = get_raw(buf)?;
    Ok((zigzag_decode(zigzag), consumed))
}

/// Encode `values` as base + deltas, returning the bytes written.
pub fn encode(writer: &mut BytesMut, values: &[i64]) -> usize {
    let Some((&base, rest)) = values.split_first() else {
        return 0;
    };
    let mut written = put_raw(writer, base as u64);
    let mut prev = base;
    for &value in rest {
        written += put_delta(writer, value.wrapping_sub(prev));
        prev = value;
    }
    written
}

/// Decode `count` values from `src` into `out`, returning the bytes read.
///
/// A malformed width byte aborts the decode; nothing is appended to `out`
/// for the failing element or any element after it.
pub fn decode(src: &[u8], count: usize, out: &mut Vec<i64>) -> Result<usize> {
    if count == 0 {
        return Ok(0);
    }
    let (base, mut consumed) = get_raw(src)?;
    let mut prev = base as i64;
    out.push(prev);
    for _ in 1..count {
        let (delta, read) = get_delta(&src[consumed..])?;
        consumed += read;
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }
    Ok(consumed)
}

/// Unsigned variant of [`encode`]: deltas are computed on unsigned values
/// but still ZigZag-encoded, so decreases are representable.
pub fn encode_unsigned(writer: &mut BytesMut, values: &[u64]) -> usize {
    let Some((&base, rest)) = values.split_first() else {
        return 0;
    };
    let mut written = put_raw(writer, base);
    let mut prev = base;
    for &value in rest {
        written += put_delta(writer, value.wrapping_sub(prev) as i64);
        prev = value;
    }
    written
}

/// Unsigned variant of [`decode`]; accumulation wraps around.
pub fn decode_unsigned(src: &[u8], count: usize, out: &mut Vec<u64>) -> Result<usize> {
    if count == 0 {
        return Ok(0);
    }
    let (base, mut consumed) = get_raw(src)?;
    let mut prev = base;
    out.push(prev);
    for _ in 1..count {
        let (delta, read) = get_delta(&src[consumed..])?;
        consumed += read;
        prev = prev.wrapping_add(delta as u64);
        out.push(prev);
    }
    Ok(consumed)
}
