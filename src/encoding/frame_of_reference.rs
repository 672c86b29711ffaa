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

//! Frame-of-Reference (FOR) codec: every value is stored as a fixed-width
//! offset from the block minimum.
//!
//! Layout:
//!
//! ```text
//! [min: tagged varint][offset_width: 1 byte][count: tagged varint]
//! [offset: LE offset_width bytes] x count
//! ```
//!
//! The header is self-describing (tagged varints for `min` and `count`),
//! the payload is uniform-width, so `get(i)` is pure integer arithmetic.
//! Offset width is the single design variable: `ceil(bits(max - min) / 8)`,
//! minimum 1. The header tax is 3..=19 bytes.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::{external, tagged, util::take, validate_width};

/// Per-block metadata, filled by [`analyze`] or [`read_metadata`].
///
/// Callers pre-compute this and hand it back to [`encode`], so the field
/// order and the one-cache-line bound are part of the public ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ForMeta {
    pub min: u64,
    pub max: u64,
    pub range: u64,
    pub count: u64,
    pub encoded_size: u64,
    pub offset_width: u8,
}

const _: () = assert!(std::mem::size_of::<ForMeta>() <= 64);

/// Optimal offset width for a given range.
#[inline]
pub fn compute_width(range: u64) -> usize {
    external::unsigned_encoding(range)
}

/// Single pass over `values` computing min, max, range, offset width and
/// the resulting encoded size.
pub fn analyze(values: &[u64]) -> ForMeta {
    debug_assert!(!values.is_empty(), "cannot analyze an empty block");
    let first = values.first().copied().unwrap_or(0);
    let (mut min, mut max) = (first, first);
    for &value in values {
        min = min.min(value);
        max = max.max(value);
    }
    let range = max - min;
    let mut meta = ForMeta {
        min,
        max,
        range,
        count: values.len() as u64,
        encoded_size: 0,
        offset_width: compute_width(range) as u8,
    };
    meta.encoded_size = encoded_size(&meta) as u64;
    meta
}

/// Encoded size implied by `meta`: self-describing header plus the
/// fixed-width offset payload.
pub fn encoded_size(meta: &ForMeta) -> usize {
    tagged::encoded_len(meta.min)
        + 1
        + tagged::encoded_len(meta.count)
        + meta.count as usize * meta.offset_width as usize
}

/// Encode `values`, returning the bytes written.
///
/// Uses `meta` when the caller already analyzed this exact block, otherwise
/// analyzes internally.
pub fn encode(writer: &mut BytesMut, values: &[u64], meta: Option<&ForMeta>) -> usize {
    let owned;
    let meta = match meta {
        Some(meta) if meta.count == values.len() as u64 => meta,
        _ => {
            owned = analyze(values);
            &owned
        }
    };

    let mut written = tagged::put(writer, meta.min);
    writer.put_u8(meta.offset_width);
    written += 1 + tagged::put(writer, meta.count);

    let width = meta.offset_width as usize;
    for &value in values {
        external::put_fixed_width(writer, value - meta.min, width);
        written += width;
    }
    written
}

/// Parse the header of an encoded block.
///
/// `max` and `range` are unknowable without scanning the payload and come
/// back as `min` and `0` respectively; `encoded_size` is derived from the
/// parsed fields.
pub fn read_metadata(src: &[u8]) -> Result<ForMeta> {
    let (min, min_len) = tagged::get(src)?;
    let offset_width = validate_width(take(&src[min_len..], 1)?[0])?;
    let (count, count_len) = tagged::get(&src[min_len + 1..])?;

    let header = min_len + 1 + count_len;
    let payload = (count as usize)
        .checked_mul(offset_width)
        .filter(|payload| header + payload <= src.len());
    ensure!(
        payload.is_some(),
        OutOfSpecSnafu {
            msg: "FOR count overruns the encoded block",
        }
    );

    Ok(ForMeta {
        min,
        max: min,
        range: 0,
        count,
        encoded_size: (header + payload.unwrap_or(0)) as u64,
        offset_width: offset_width as u8,
    })
}

/// Decode a whole block into `out`, refusing when the encoded count exceeds
/// `max_count`. Returns the number of values decoded.
pub fn decode(src: &[u8], max_count: usize, out: &mut Vec<u64>) -> Result<usize> {
    let view = ForView::new(src)?;
    ensure!(
        view.len() <= max_count,
        BufferTooSmallSnafu {
            count: view.len() as u64,
            max_count: max_count as u64,
        }
    );
    out.reserve(view.len());
    for i in 0..view.len() {
        out.push(view.get_unchecked(i));
    }
    Ok(view.len())
}

/// O(1) random access without a full decode.
pub fn get_at(src: &[u8], index: usize) -> Result<u64> {
    let view = ForView::new(src)?;
    view.get(index).ok_or_else(|| {
        OutOfSpecSnafu {
            msg: format!("index {index} out of bounds for count {}", view.len()),
        }
        .build()
    })
}

/// Block minimum straight from the header.
pub fn min_value(src: &[u8]) -> Result<u64> {
    Ok(read_metadata(src)?.min)
}

/// Element count straight from the header.
pub fn count(src: &[u8]) -> Result<u64> {
    Ok(read_metadata(src)?.count)
}

/// Offset width straight from the header.
pub fn offset_width(src: &[u8]) -> Result<usize> {
    Ok(read_metadata(src)?.offset_width as usize)
}

/// Typed view over an encoded block: header widths are computed once at
/// construction (where all bounds checks happen), after which indexing is
/// integer arithmetic into the borrowed payload.
#[derive(Debug, Clone, Copy)]
pub struct ForView<'a> {
    payload: &'a [u8],
    min: u64,
    count: usize,
    offset_width: usize,
}

impl<'a> ForView<'a> {
    pub fn new(src: &'a [u8]) -> Result<Self> {
        let meta = read_metadata(src)?;
        let count = meta.count as usize;
        let offset_width = meta.offset_width as usize;
        let header = meta.encoded_size as usize - count * offset_width;
        Ok(Self {
            payload: &src[header..meta.encoded_size as usize],
            min: meta.min,
            count,
            offset_width,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        (index < self.count).then(|| self.get_unchecked(index))
    }

    fn get_unchecked(&self, index: usize) -> u64 {
        let start = index * self.offset_width;
        let mut le = [0_u8; 8];
        le[..self.offset_width].copy_from_slice(&self.payload[start..start + self.offset_width]);
        self.min.wrapping_add(u64::from_le_bytes(le))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.count).map(|i| self.get_unchecked(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn roundtrip(values: &[u64]) -> Vec<u64> {
        let mut buf = BytesMut::new();
        let written = encode(&mut buf, values, None);
        assert_eq!(written, buf.len());
        assert_eq!(written, encoded_size(&analyze(values)));
        let mut out = vec![];
        let count = decode(&buf, values.len(), &mut out).unwrap();
        assert_eq!(count, values.len());
        out
    }

    #[test]
    fn width_computation() {
        assert_eq!(compute_width(255), 1);
        assert_eq!(compute_width(65_535), 2);
        assert_eq!(compute_width(16_777_215), 3);
        assert_eq!(compute_width(0), 1);
        assert_eq!(compute_width(u64::MAX), 8);
    }

    #[test]
    fn analyze_fills_metadata() {
        let meta = analyze(&[1000, 1010, 1020, 1030]);
        assert_eq!(meta.min, 1000);
        assert_eq!(meta.max, 1030);
        assert_eq!(meta.range, 30);
        assert_eq!(meta.count, 4);
        assert_eq!(meta.offset_width, 1);
    }

    #[test]
    fn basic_roundtrip() {
        let values = [100, 105, 110, 115, 120];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn tight_cluster_compresses() {
        let values: Vec<u64> = (0..100).map(|i| 1_000_000 + i).collect();
        let mut buf = BytesMut::new();
        let written = encode(&mut buf, &values, None);
        // Naive encoding is 800 bytes; range < 256 means 1-byte offsets.
        assert!(written <= 200, "encoded {written} bytes");
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn random_access_matches_full_decode() {
        let values = [500, 510, 520, 530, 540];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, None);
        let decoded = roundtrip(&values);
        for (i, &expected) in decoded.iter().enumerate() {
            assert_eq!(get_at(&buf, i).unwrap(), expected);
        }
        assert!(get_at(&buf, values.len()).is_err());
    }

    #[test]
    fn single_value_block() {
        let values = [12_345];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, None);
        let meta = read_metadata(&buf).unwrap();
        assert_eq!(meta.count, 1);
        assert_eq!(meta.offset_width, 1);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn all_equal_uses_one_byte_offsets() {
        let values = [777_u64; 10];
        let meta = analyze(&values);
        assert_eq!(meta.offset_width, 1);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn full_range_falls_back_to_widest_offsets() {
        let values = [0, u64::MAX / 2, u64::MAX];
        let meta = analyze(&values);
        assert_eq!(meta.offset_width, 8);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn header_accessors() {
        let values = [1000, 1005, 1010];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, None);
        assert_eq!(min_value(&buf).unwrap(), 1000);
        assert_eq!(count(&buf).unwrap(), 3);
        assert_eq!(offset_width(&buf).unwrap(), 1);
    }

    #[test]
    fn read_metadata_matches_analysis_header() {
        let values = [9_000_000_000, 9_000_000_100];
        let analyzed = analyze(&values);
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, Some(&analyzed));
        let parsed = read_metadata(&buf).unwrap();
        assert_eq!(parsed.min, analyzed.min);
        assert_eq!(parsed.count, analyzed.count);
        assert_eq!(parsed.offset_width, analyzed.offset_width);
        assert_eq!(parsed.encoded_size, analyzed.encoded_size);
        // Unknown without scanning the payload.
        assert_eq!(parsed.max, parsed.min);
        assert_eq!(parsed.range, 0);
    }

    #[test]
    fn decode_refuses_small_output_budget() {
        let values = [1, 2, 3, 4];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, None);
        let mut out = vec![];
        assert!(decode(&buf, 3, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn count_overrunning_buffer_fails() {
        let values = [10, 20, 30];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values, None);
        assert!(read_metadata(&buf[..buf.len() - 1]).is_err());
        let mut out = vec![];
        assert!(decode(&buf[..buf.len() - 1], 3, &mut out).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_for(values in prop::collection::vec(any::<u64>(), 1..=512)) {
            prop_assert_eq!(roundtrip(&values), values);
        }

        #[test]
        fn get_at_equals_decode(values in prop::collection::vec(0_u64..1_000_000, 1..=128)) {
            let mut buf = BytesMut::new();
            encode(&mut buf, &values, None);
            let view = ForView::new(&buf)?;
            for (i, &expected) in values.iter().enumerate() {
                prop_assert_eq!(view.get(i), Some(expected));
            }
        }
    }
}
