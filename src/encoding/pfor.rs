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

//! Patched Frame-of-Reference (PFOR): FOR that tolerates outliers.
//!
//! The offset width is chosen to cover at least 95% of the offsets from the
//! block minimum. Values wider than that keep their low bytes in the
//! uniform stream and park their high bits in a patch list appended after
//! the payload:
//!
//! ```text
//! [min: tagged][count: tagged][offset_width: 1][patch_count: tagged]
//! [offset low bytes: LE offset_width bytes] x count
//! { [index: tagged][high_bits: tagged] } x patch_count
//! ```
//!
//! A handful of large outliers no longer force the whole block to 8-byte
//! offsets; with no outliers the patch list is empty and the block costs
//! one header byte more than plain FOR.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::{external, tagged, util::take, validate_width, MAX_WIDTH};

/// Fraction of offsets the uniform width must cover before the rest become
/// patches.
pub const PATCH_PERCENTILE: f64 = 0.95;

/// Per-block metadata, filled by [`analyze`] or [`read_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PforMeta {
    pub min: u64,
    pub count: u64,
    pub encoded_size: u64,
    pub patch_count: u64,
    pub max: u64,
    pub offset_width: u8,
}

const _: () = assert!(std::mem::size_of::<PforMeta>() <= 48);

/// Offset width covering [`PATCH_PERCENTILE`] of the offsets from `min`.
fn percentile_width(values: &[u64], min: u64) -> usize {
    let mut histogram = [0_usize; MAX_WIDTH + 1];
    for &value in values {
        histogram[external::unsigned_encoding(value - min)] += 1;
    }
    let need = (values.len() as f64 * PATCH_PERCENTILE).ceil() as usize;
    let mut covered = 0;
    for width in 1..=MAX_WIDTH {
        covered += histogram[width];
        if covered >= need {
            return width;
        }
    }
    MAX_WIDTH
}

/// Single pass for min/max, then width selection and exact size accounting.
pub fn analyze(values: &[u64]) -> PforMeta {
    debug_assert!(!values.is_empty(), "cannot analyze an empty block");
    let first = values.first().copied().unwrap_or(0);
    let (mut min, mut max) = (first, first);
    for &value in values {
        min = min.min(value);
        max = max.max(value);
    }

    let offset_width = percentile_width(values, min);
    let mut patch_count = 0_u64;
    let mut patch_bytes = 0_usize;
    if offset_width < MAX_WIDTH {
        for (index, &value) in values.iter().enumerate() {
            let high = (value - min) >> (8 * offset_width);
            if high != 0 {
                patch_count += 1;
                patch_bytes += tagged::encoded_len(index as u64) + tagged::encoded_len(high);
            }
        }
    }

    let encoded_size = tagged::encoded_len(min)
        + tagged::encoded_len(values.len() as u64)
        + 1
        + tagged::encoded_len(patch_count)
        + values.len() * offset_width
        + patch_bytes;

    PforMeta {
        min,
        count: values.len() as u64,
        encoded_size: encoded_size as u64,
        patch_count,
        max,
        offset_width: offset_width as u8,
    }
}

/// Encode `values`, returning the bytes written.
pub fn encode(writer: &mut BytesMut, values: &[u64], meta: Option<&PforMeta>) -> usize {
    let owned;
    let meta = match meta {
        Some(meta) if meta.count == values.len() as u64 => meta,
        _ => {
            owned = analyze(values);
            &owned
        }
    };
    let width = meta.offset_width as usize;
    let mask = if width == MAX_WIDTH {
        u64::MAX
    } else {
        (1 << (8 * width)) - 1
    };

    let mut written = tagged::put(writer, meta.min);
    written += tagged::put(writer, meta.count);
    writer.put_u8(meta.offset_width);
    written += 1 + tagged::put(writer, meta.patch_count);

    for &value in values {
        external::put_fixed_width(writer, (value - meta.min) & mask, width);
        written += width;
    }
    if width < MAX_WIDTH {
        for (index, &value) in values.iter().enumerate() {
            let high = (value - meta.min) >> (8 * width);
            if high != 0 {
                written += tagged::put(writer, index as u64);
                written += tagged::put(writer, high);
            }
        }
    }
    written
}

/// Parse the header and patch list, returning full metadata.
///
/// `max` is unknowable without reconstructing the payload and comes back as
/// `min`; everything else, including the exact encoded size, is derived by
/// walking the patch list.
pub fn read_metadata(src: &[u8]) -> Result<PforMeta> {
    let (min, min_len) = tagged::get(src)?;
    let mut pos = min_len;
    let (count, count_len) = tagged::get(&src[pos..])?;
    pos += count_len;
    let offset_width = validate_width(take(&src[pos..], 1)?[0])?;
    pos += 1;
    let (patch_count, patch_len) = tagged::get(&src[pos..])?;
    pos += patch_len;

    let payload = (count as usize)
        .checked_mul(offset_width)
        .filter(|payload| pos + payload <= src.len());
    ensure!(
        payload.is_some(),
        OutOfSpecSnafu {
            msg: "PFOR count overruns the encoded block",
        }
    );
    pos += payload.unwrap_or(0);

    for _ in 0..patch_count {
        let (_, index_len) = tagged::get(&src[pos..])?;
        pos += index_len;
        let (_, high_len) = tagged::get(&src[pos..])?;
        pos += high_len;
    }

    Ok(PforMeta {
        min,
        count,
        encoded_size: pos as u64,
        patch_count,
        max: min,
        offset_width: offset_width as u8,
    })
}

/// Decode a whole block into `out`, refusing when the encoded count exceeds
/// `max_count`. Returns the number of values decoded.
pub fn decode(src: &[u8], max_count: usize, out: &mut Vec<u64>) -> Result<usize> {
    let (min, min_len) = tagged::get(src)?;
    let mut pos = min_len;
    let (count, count_len) = tagged::get(&src[pos..])?;
    pos += count_len;
    let offset_width = validate_width(take(&src[pos..], 1)?[0])?;
    pos += 1;
    let (patch_count, patch_len) = tagged::get(&src[pos..])?;
    pos += patch_len;

    let count = count as usize;
    ensure!(
        count <= max_count,
        BufferTooSmallSnafu {
            count: count as u64,
            max_count: max_count as u64,
        }
    );
    let payload = count
        .checked_mul(offset_width)
        .filter(|payload| pos + payload <= src.len());
    ensure!(
        payload.is_some(),
        OutOfSpecSnafu {
            msg: "PFOR count overruns the encoded block",
        }
    );

    let start = out.len();
    out.reserve(count);
    for i in 0..count {
        let offset = external::get(&src[pos + i * offset_width..], offset_width)?;
        out.push(offset);
    }
    pos += payload.unwrap_or(0);

    for _ in 0..patch_count {
        let (index, index_len) = tagged::get(&src[pos..])?;
        pos += index_len;
        let (high, high_len) = tagged::get(&src[pos..])?;
        pos += high_len;
        let index = index as usize;
        if index >= count || offset_width >= MAX_WIDTH {
            out.truncate(start);
            return OutOfSpecSnafu {
                msg: "PFOR patch entry does not address the payload",
            }
            .fail();
        }
        out[start + index] |= high << (8 * offset_width);
    }

    for value in &mut out[start..] {
        *value = min.wrapping_add(*value);
    }
    Ok(count)
}
