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

//! Dictionary codec: low-cardinality data stored as a sorted value table
//! plus fixed-width indexes into it.
//!
//! ```text
//! [distinct: tagged][count: tagged][index_width: 1 byte]
//! [table entry: tagged varint] x distinct          (ascending)
//! [index: LE index_width bytes] x count
//! ```
//!
//! `index_width` is the minimum width for `distinct - 1`, so a column with
//! up to 256 distinct values costs one byte per element regardless of the
//! magnitude of the values themselves.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::{external, tagged, util::take, validate_width};

/// Per-block statistics, filled by [`analyze`] or [`read_metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DictStats {
    pub distinct: u64,
    pub count: u64,
    pub encoded_size: u64,
    pub table_size: u64,
    pub min: u64,
    pub max: u64,
    pub index_width: u8,
}

const _: () = assert!(std::mem::size_of::<DictStats>() <= 56);

/// Sorted deduplicated table of `values`.
fn build_table(values: &[u64]) -> Vec<u64> {
    let mut table = values.to_vec();
    table.sort_unstable();
    table.dedup();
    table
}

fn index_width(distinct: usize) -> usize {
    external::unsigned_encoding(distinct.saturating_sub(1) as u64)
}

/// Build the table and project the encoded size.
pub fn analyze(values: &[u64]) -> DictStats {
    let table = build_table(values);
    let index_width = index_width(table.len());
    let table_size: usize = table.iter().map(|&v| tagged::encoded_len(v)).sum();
    let encoded_size = tagged::encoded_len(table.len() as u64)
        + tagged::encoded_len(values.len() as u64)
        + 1
        + table_size
        + values.len() * index_width;

    DictStats {
        distinct: table.len() as u64,
        count: values.len() as u64,
        encoded_size: encoded_size as u64,
        table_size: table_size as u64,
        min: table.first().copied().unwrap_or(0),
        max: table.last().copied().unwrap_or(0),
        index_width: index_width as u8,
    }
}

/// Encode `values`, returning the bytes written.
pub fn encode(writer: &mut BytesMut, values: &[u64]) -> usize {
    let table = build_table(values);
    let width = index_width(table.len());

    let mut written = tagged::put(writer, table.len() as u64);
    written += tagged::put(writer, values.len() as u64);
    writer.put_u8(width as u8);
    written += 1;

    for &entry in &table {
        written += tagged::put(writer, entry);
    }
    for &value in values {
        let index = table
            .binary_search(&value)
            .expect("every value is present in its own table");
        external::put_fixed_width(writer, index as u64, width);
        written += width;
    }
    written
}

/// Parse the header and table, returning full statistics.
pub fn read_metadata(src: &[u8]) -> Result<DictStats> {
    let (distinct, distinct_len) = tagged::get(src)?;
    let mut pos = distinct_len;
    let (count, count_len) = tagged::get(&src[pos..])?;
    pos += count_len;
    let width = validate_width(take(&src[pos..], 1)?[0])?;
    pos += 1;

    let table_start = pos;
    let (mut min, mut max) = (0, 0);
    for i in 0..distinct {
        let (entry, entry_len) = tagged::get(&src[pos..])?;
        pos += entry_len;
        if i == 0 {
            min = entry;
        }
        max = entry;
    }
    let table_size = pos - table_start;

    let indexes = (count as usize)
        .checked_mul(width)
        .filter(|indexes| pos + indexes <= src.len());
    ensure!(
        indexes.is_some(),
        OutOfSpecSnafu {
            msg: "dictionary count overruns the encoded block",
        }
    );

    Ok(DictStats {
        distinct,
        count,
        encoded_size: (pos + indexes.unwrap_or(0)) as u64,
        table_size: table_size as u64,
        min,
        max,
        index_width: width as u8,
    })
}

/// Decode a whole block into `out`, refusing when the encoded count exceeds
/// `max_count`. Returns the number of values decoded.
pub fn decode(src: &[u8], max_count: usize, out: &mut Vec<u64>) -> Result<usize> {
    let (distinct, distinct_len) = tagged::get(src)?;
    let mut pos = distinct_len;
    let (count, count_len) = tagged::get(&src[pos..])?;
    pos += count_len;
    let width = validate_width(take(&src[pos..], 1)?[0])?;
    pos += 1;

    ensure!(
        count <= max_count as u64,
        BufferTooSmallSnafu {
            count,
            max_count: max_count as u64,
        }
    );
    ensure!(
        distinct <= count || count == 0,
        OutOfSpecSnafu {
            msg: "dictionary table larger than the encoded column",
        }
    );

    let mut table = Vec::with_capacity(distinct as usize);
    for _ in 0..distinct {
        let (entry, entry_len) = tagged::get(&src[pos..])?;
        pos += entry_len;
        table.push(entry);
    }

    let count = count as usize;
    take(&src[pos..], count * width)?;
    let start = out.len();
    out.reserve(count);
    for i in 0..count {
        let index = external::get(&src[pos + i * width..], width)? as usize;
        match table.get(index) {
            Some(&value) => out.push(value),
            None => {
                out.truncate(start);
                return OutOfSpecSnafu {
                    msg: "dictionary index out of range",
                }
                .fail();
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn roundtrip(values: &[u64]) -> Vec<u64> {
        let mut buf = BytesMut::new();
        let written = encode(&mut buf, values);
        assert_eq!(written, buf.len());
        assert_eq!(written as u64, analyze(values).encoded_size);
        let mut out = vec![];
        let count = decode(&buf, values.len(), &mut out).unwrap();
        assert_eq!(count, values.len());
        out
    }

    #[test]
    fn low_cardinality_compresses() {
        // 1000 elements drawn from 4 distinct large values.
        let states = [10_000_000_000, 20_000_000_000, 30_000_000_000, 40_000_000_000];
        let values: Vec<u64> = (0..1000).map(|i| states[i % 4]).collect();
        let stats = analyze(&values);
        assert_eq!(stats.distinct, 4);
        assert_eq!(stats.index_width, 1);
        // One byte per element plus a small table, against 8000 naive bytes.
        assert!(stats.encoded_size < 1100);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn stats_track_table_bounds() {
        let stats = analyze(&[7, 3, 7, 9, 3]);
        assert_eq!(stats.distinct, 3);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 3);
        assert_eq!(stats.max, 9);
    }

    #[test]
    fn read_metadata_matches_analysis() {
        let values = [5, 5, 5, 800, 800, 70_000];
        let analyzed = analyze(&values);
        let mut buf = BytesMut::new();
        encode(&mut buf, &values);
        let parsed = read_metadata(&buf).unwrap();
        assert_eq!(parsed, analyzed);
    }

    #[test]
    fn single_and_empty_blocks() {
        assert_eq!(roundtrip(&[42]), [42]);
        assert_eq!(roundtrip(&[]), []);
    }

    #[test]
    fn corrupt_index_fails_cleanly() {
        // distinct=2, count=3, width=1, table {4, 9}, indexes [0, 1, 5].
        let buf = [0x02, 0x03, 0x01, 0x04, 0x09, 0, 1, 5];
        let mut out = vec![];
        assert!(decode(&buf, 8, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn decode_refuses_small_output_budget() {
        let values = [1, 2, 3];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values);
        assert!(decode(&buf, 2, &mut vec![]).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_dict(values in prop::collection::vec(any::<u64>(), 0..=512)) {
            prop_assert_eq!(roundtrip(&values), values);
        }

        #[test]
        fn roundtrip_dict_low_cardinality(
            states in prop::collection::vec(any::<u64>(), 1..=16),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 1..=512),
        ) {
            let values: Vec<u64> = picks.iter().map(|i| states[i.index(states.len())]).collect();
            prop_assert_eq!(roundtrip(&values), values);
        }
    }
}
