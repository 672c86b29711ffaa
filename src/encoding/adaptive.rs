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

//! Adaptive codec: measure the block, then delegate to whichever family
//! member encodes it smallest.
//!
//! Layout is a one-byte strategy tag followed by a self-delimiting payload:
//!
//! ```text
//! [strategy: 1 byte][payload]
//! ```
//!
//! FOR/PFOR/Dict/Bitmap payloads are those codecs' own blocks. Raw and
//! Delta payloads carry a leading tagged count (the delta stream has no
//! count of its own).
//!
//! [`analyze`] projects the exact encoded size of every candidate without
//! encoding any of them, so selection is a size comparison, not a bake-off.
//! Raw (`count` tagged + 8-byte LE words) is the fallback that keeps the
//! identity contract unconditional.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::{
    bitmap, delta, dict, external, frame_of_reference, pfor, tagged,
    util::{take, zigzag_encode},
};

/// Sub-codec selected for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Strategy {
    Raw = 0,
    For = 1,
    Delta = 2,
    Dict = 3,
    Bitmap = 4,
    Pfor = 5,
}

impl Strategy {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Raw),
            1 => Some(Self::For),
            2 => Some(Self::Delta),
            3 => Some(Self::Dict),
            4 => Some(Self::Bitmap),
            5 => Some(Self::Pfor),
            _ => None,
        }
    }
}

/// One-pass measurements plus the projected payload size per candidate.
/// `u64::MAX` marks a strategy that is not applicable to this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AdaptiveDataStats {
    pub min: u64,
    pub max: u64,
    pub count: u64,
    pub distinct: u64,
    pub for_size: u64,
    pub delta_size: u64,
    pub dict_size: u64,
    pub bitmap_size: u64,
    pub pfor_size: u64,
    pub sorted_unique: bool,
}

const _: () = assert!(std::mem::size_of::<AdaptiveDataStats>() <= 80);

/// Header-level description of an encoded adaptive block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AdaptiveMeta {
    pub count: u64,
    pub encoded_size: u64,
    pub min: u64,
    pub max: u64,
    pub range: u64,
    pub strategy: Strategy,
}

const _: () = assert!(std::mem::size_of::<AdaptiveMeta>() <= 72);

fn raw_size(count: usize) -> u64 {
    (tagged::encoded_len(count as u64) + count * 8) as u64
}

/// Exact size of a count-prefixed delta payload without building it.
fn delta_size(values: &[u64]) -> u64 {
    let Some((&base, rest)) = values.split_first() else {
        return 0;
    };
    let mut size = tagged::encoded_len(values.len() as u64) + 1 + external::unsigned_encoding(base);
    let mut prev = base;
    for &value in rest {
        let delta = zigzag_encode(value.wrapping_sub(prev) as i64);
        size += 1 + external::unsigned_encoding(delta);
        prev = value;
    }
    size as u64
}

/// Projected bitmap payload size, or `None` when the block is not a
/// strictly-ascending set over a supported universe.
fn bitmap_size(min: u64, range: u64, sorted_unique: bool, count: u64) -> Option<u64> {
    if count == 0 || !sorted_unique {
        return None;
    }
    let span = range.checked_add(64)?;
    let words = span / 64;
    if words > bitmap::MAX_WORDS {
        return None;
    }
    Some((tagged::encoded_len(min) + tagged::encoded_len(words) + words as usize * 8) as u64)
}

/// Measure `values` and project every candidate's payload size.
pub fn analyze(values: &[u64]) -> AdaptiveDataStats {
    let first = values.first().copied().unwrap_or(0);
    let (mut min, mut max) = (first, first);
    let mut sorted_unique = true;
    let mut prev = None;
    for &value in values {
        min = min.min(value);
        max = max.max(value);
        if prev.is_some_and(|prev| prev >= value) {
            sorted_unique = false;
        }
        prev = Some(value);
    }
    let range = max - min;

    let dict_stats = dict::analyze(values);
    let (for_size, pfor_size) = if values.is_empty() {
        (u64::MAX, u64::MAX)
    } else {
        (
            frame_of_reference::analyze(values).encoded_size,
            pfor::analyze(values).encoded_size,
        )
    };

    AdaptiveDataStats {
        min,
        max,
        count: values.len() as u64,
        distinct: dict_stats.distinct,
        for_size,
        delta_size: if values.is_empty() {
            u64::MAX
        } else {
            delta_size(values)
        },
        dict_size: dict_stats.encoded_size,
        bitmap_size: bitmap_size(min, range, sorted_unique, values.len() as u64)
            .unwrap_or(u64::MAX),
        pfor_size,
        sorted_unique,
    }
}

/// Pick the smallest projected payload; ties go to the earlier entry in
/// the candidate order (FOR first for its random access).
pub fn choose(stats: &AdaptiveDataStats) -> Strategy {
    if stats.count == 0 {
        return Strategy::Raw;
    }
    let candidates = [
        (Strategy::For, stats.for_size),
        (Strategy::Pfor, stats.pfor_size),
        (Strategy::Delta, stats.delta_size),
        (Strategy::Dict, stats.dict_size),
        (Strategy::Bitmap, stats.bitmap_size),
        (Strategy::Raw, raw_size(stats.count as usize)),
    ];
    let mut best = candidates[0];
    for candidate in candidates {
        if candidate.1 < best.1 {
            best = candidate;
        }
    }
    best.0
}

/// Encode `values` under the best-fitting strategy.
pub fn encode(writer: &mut BytesMut, values: &[u64]) -> Result<AdaptiveMeta> {
    let stats = analyze(values);
    let strategy = choose(&stats);
    writer.put_u8(strategy as u8);
    let payload = match strategy {
        Strategy::Raw => {
            let mut written = tagged::put(writer, values.len() as u64);
            for &value in values {
                writer.put_u64_le(value);
                written += 8;
            }
            written
        }
        Strategy::For => frame_of_reference::encode(writer, values, None),
        Strategy::Pfor => pfor::encode(writer, values, None),
        Strategy::Delta => {
            tagged::put(writer, values.len() as u64) + delta::encode_unsigned(writer, values)
        }
        Strategy::Dict => dict::encode(writer, values),
        Strategy::Bitmap => bitmap::encode(writer, values)?,
    };
    Ok(AdaptiveMeta {
        count: stats.count,
        encoded_size: 1 + payload as u64,
        min: stats.min,
        max: stats.max,
        range: stats.max - stats.min,
        strategy,
    })
}

/// Decode a block into `out`, refusing when the encoded count exceeds
/// `max_count`. Returns the number of values decoded.
pub fn decode(src: &[u8], max_count: usize, out: &mut Vec<u64>) -> Result<usize> {
    let tag = take(src, 1)?[0];
    let strategy = Strategy::from_byte(tag);
    let src = &src[1..];
    match strategy {
        Some(Strategy::Raw) => {
            let (count, count_len) = tagged::get(src)?;
            ensure!(
                count <= max_count as u64,
                BufferTooSmallSnafu {
                    count,
                    max_count: max_count as u64,
                }
            );
            let count = count as usize;
            let payload = take(&src[count_len..], count * 8)?;
            out.reserve(count);
            for chunk in payload.chunks_exact(8) {
                let mut le = [0_u8; 8];
                le.copy_from_slice(chunk);
                out.push(u64::from_le_bytes(le));
            }
            Ok(count)
        }
        Some(Strategy::For) => frame_of_reference::decode(src, max_count, out),
        Some(Strategy::Pfor) => pfor::decode(src, max_count, out),
        Some(Strategy::Delta) => {
            let (count, count_len) = tagged::get(src)?;
            ensure!(
                count <= max_count as u64,
                BufferTooSmallSnafu {
                    count,
                    max_count: max_count as u64,
                }
            );
            delta::decode_unsigned(&src[count_len..], count as usize, out)?;
            Ok(count as usize)
        }
        Some(Strategy::Dict) => dict::decode(src, max_count, out),
        Some(Strategy::Bitmap) => bitmap::decode(src, max_count, out),
        None => OutOfSpecSnafu {
            msg: format!("unknown adaptive strategy {tag}"),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::{any, prop, prop_assert_eq, proptest};

    fn roundtrip(values: &[u64]) -> (Vec<u64>, Strategy) {
        let mut buf = BytesMut::new();
        let meta = encode(&mut buf, values).unwrap();
        assert_eq!(meta.encoded_size as usize, buf.len());
        let mut out = vec![];
        let count = decode(&buf, values.len(), &mut out).unwrap();
        assert_eq!(count, values.len());
        (out, meta.strategy)
    }

    #[test]
    fn clustered_block_picks_for() {
        let values: Vec<u64> = (0..200).map(|i| 5_000_000 + (i * 37) % 250).collect();
        let (out, strategy) = roundtrip(&values);
        assert_eq!(out, values);
        assert_eq!(strategy, Strategy::For);
    }

    #[test]
    fn tiny_steps_with_level_jumps_pick_delta() {
        // Mostly +1 steps with occasional huge level shifts: the range
        // prices FOR out, the shifts are too frequent to patch cheaply.
        let mut values = Vec::with_capacity(500);
        let mut v = 0_u64;
        for i in 0..500_u64 {
            v += if i % 100 == 0 { 1 << 45 } else { 1 };
            values.push(v);
        }
        let stats = analyze(&values);
        assert!(stats.delta_size < stats.for_size);
        assert!(stats.delta_size < stats.pfor_size);
        let (out, strategy) = roundtrip(&values);
        assert_eq!(out, values);
        assert_eq!(strategy, Strategy::Delta);
    }

    #[test]
    fn low_cardinality_wide_values_pick_dict() {
        let states = [1 << 60, 1 << 61, (1 << 60) + 12_345];
        let values: Vec<u64> = (0..300).map(|i| states[(i * 7) % 3]).collect();
        let (out, strategy) = roundtrip(&values);
        assert_eq!(out, values);
        assert_eq!(strategy, Strategy::Dict);
    }

    #[test]
    fn dense_ascending_set_picks_bitmap() {
        let values: Vec<u64> = (10_000..12_000).collect();
        let stats = analyze(&values);
        assert!(stats.sorted_unique);
        let (out, strategy) = roundtrip(&values);
        assert_eq!(out, values);
        assert_eq!(strategy, Strategy::Bitmap);
    }

    #[test]
    fn outlier_cluster_picks_pfor() {
        let mut values: Vec<u64> = (0..300).map(|i| 40_000 + (i * 13) % 200).collect();
        values[7] = u64::MAX / 3;
        values[250] = u64::MAX / 2;
        let (out, strategy) = roundtrip(&values);
        assert_eq!(out, values);
        assert_eq!(strategy, Strategy::Pfor);
    }

    #[test]
    fn empty_block_is_raw() {
        let (out, strategy) = roundtrip(&[]);
        assert!(out.is_empty());
        assert_eq!(strategy, Strategy::Raw);
    }

    #[test]
    fn unknown_strategy_fails() {
        assert!(decode(&[200, 0], 8, &mut vec![]).is_err());
    }

    #[test]
    fn decode_refuses_small_output_budget() {
        let values: Vec<u64> = (0..10).collect();
        let mut buf = BytesMut::new();
        encode(&mut buf, &values).unwrap();
        assert!(decode(&buf, 9, &mut vec![]).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_adaptive(values in prop::collection::vec(any::<u64>(), 0..=512)) {
            let (out, _) = roundtrip(&values);
            prop_assert_eq!(out, values);
        }

        #[test]
        fn roundtrip_adaptive_structured(
            base: u32,
            step in 0_u64..1000,
            len in 1_usize..=512,
        ) {
            let values: Vec<u64> = (0..len as u64).map(|i| base as u64 + i * step).collect();
            let (out, _) = roundtrip(&values);
            prop_assert_eq!(out, values);
        }
    }
}
