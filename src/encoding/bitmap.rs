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

//! Bitmap codec: a set of integers stored as a bit per candidate value.
//!
//! ```text
//! [min: tagged][word_count: tagged][word: 8 bytes LE] x word_count
//! ```
//!
//! Bit `i` of the word array means `min + i` is a member. Membership tests
//! are O(1) and dense clusters cost an eighth of a byte per candidate, so
//! this is the format of choice for id sets with a bounded universe. The
//! supported domain is sets: decoding yields members in ascending order.

use bytes::{BufMut, BytesMut};
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::tagged;

/// Hard ceiling on the word array (2^25 words = 256 MiB of bits) so corrupt
/// headers cannot ask for absurd allocations.
pub const MAX_WORDS: u64 = 1 << 25;

/// Per-set statistics, from [`Bitmap::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BitmapStats {
    pub bits_set: u64,
    pub word_count: u64,
    pub encoded_size: u64,
}

const _: () = assert!(std::mem::size_of::<BitmapStats>() <= 24);

/// In-memory integer set over a dense universe starting at `min`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    min: u64,
    words: Vec<u64>,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary values (duplicates collapse).
    pub fn from_values(values: &[u64]) -> Result<Self> {
        let mut bitmap = Self::new();
        let Some(&min) = values.iter().min() else {
            return Ok(bitmap);
        };
        // Seeding with the minimum means no insert below ever rebases.
        bitmap.try_insert(min)?;
        for &value in values {
            bitmap.try_insert(value)?;
        }
        Ok(bitmap)
    }

    fn slot(&self, value: u64) -> Option<(usize, u32)> {
        let offset = value.checked_sub(self.min)?;
        Some(((offset / 64) as usize, (offset % 64) as u32))
    }

    /// Insert `value`, returning whether it was newly added.
    ///
    /// Inserting below the current base rebases the set, shifting every
    /// existing bit up; prefer seeding with the minimum (or
    /// [`Bitmap::from_values`]) for large sets.
    pub fn insert(&mut self, value: u64) -> bool {
        self.try_insert(value).unwrap_or(false)
    }

    /// [`Bitmap::insert`] that surfaces universe overflow instead of
    /// swallowing it.
    pub fn try_insert(&mut self, value: u64) -> Result<bool> {
        if self.words.is_empty() {
            self.min = value;
        } else if value < self.min {
            self.rebase(value)?;
        }
        let (word, bit) = match self.slot(value) {
            Some(slot) => slot,
            None => unreachable!("value is at or above the base after rebase"),
        };
        ensure!(
            (word as u64) < MAX_WORDS,
            OutOfSpecSnafu {
                msg: "bitmap universe exceeds the supported range",
            }
        );
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & (1 << bit) == 0;
        self.words[word] |= 1 << bit;
        Ok(fresh)
    }

    /// Move the base down to `new_min`, shifting existing bits up.
    fn rebase(&mut self, new_min: u64) -> Result<()> {
        let delta = self.min - new_min;
        let word_shift = (delta / 64) as usize;
        let bit_shift = (delta % 64) as u32;
        let grown = self.words.len() + word_shift + usize::from(bit_shift > 0);
        ensure!(
            (grown as u64) <= MAX_WORDS,
            OutOfSpecSnafu {
                msg: "bitmap universe exceeds the supported range",
            }
        );

        let mut words = vec![0_u64; grown];
        for (i, &word) in self.words.iter().enumerate() {
            if bit_shift == 0 {
                words[i + word_shift] = word;
            } else {
                words[i + word_shift] |= word << bit_shift;
                words[i + word_shift + 1] = word >> (64 - bit_shift);
            }
        }
        while words.last() == Some(&0) {
            words.pop();
        }
        self.min = new_min;
        self.words = words;
        Ok(())
    }

    pub fn contains(&self, value: u64) -> bool {
        match self.slot(value) {
            Some((word, bit)) => self
                .words
                .get(word)
                .is_some_and(|w| w & (1 << bit) != 0),
            None => false,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> BitmapIter<'_> {
        BitmapIter {
            bitmap: self,
            word: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    pub fn stats(&self) -> BitmapStats {
        BitmapStats {
            bits_set: self.len() as u64,
            word_count: self.words.len() as u64,
            encoded_size: (tagged::encoded_len(self.min)
                + tagged::encoded_len(self.words.len() as u64)
                + self.words.len() * 8) as u64,
        }
    }

    /// Encode the set, returning the bytes written.
    pub fn encode(&self, writer: &mut BytesMut) -> usize {
        let mut written = tagged::put(writer, self.min);
        written += tagged::put(writer, self.words.len() as u64);
        for &word in &self.words {
            writer.put_u64_le(word);
            written += 8;
        }
        written
    }

    /// Decode a set from the front of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let (min, min_len) = tagged::get(src)?;
        let (word_count, count_len) = tagged::get(&src[min_len..])?;
        ensure!(
            word_count <= MAX_WORDS,
            OutOfSpecSnafu {
                msg: "bitmap word count exceeds the supported range",
            }
        );
        let mut pos = min_len + count_len;
        let payload = (word_count as usize)
            .checked_mul(8)
            .filter(|payload| pos + payload <= src.len());
        ensure!(
            payload.is_some(),
            OutOfSpecSnafu {
                msg: "bitmap word count overruns the encoded block",
            }
        );

        let mut words = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            let mut le = [0_u8; 8];
            le.copy_from_slice(&src[pos..pos + 8]);
            words.push(u64::from_le_bytes(le));
            pos += 8;
        }
        Ok(Self { min, words })
    }
}

impl<'a> IntoIterator for &'a Bitmap {
    type Item = u64;
    type IntoIter = BitmapIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending member iterator.
#[derive(Debug, Clone)]
pub struct BitmapIter<'a> {
    bitmap: &'a Bitmap,
    word: usize,
    current: u64,
}

impl Iterator for BitmapIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.current == 0 {
            self.word += 1;
            self.current = *self.bitmap.words.get(self.word)?;
        }
        let bit = self.current.trailing_zeros();
        self.current &= self.current - 1;
        Some(self.bitmap.min + self.word as u64 * 64 + bit as u64)
    }
}

/// Encode `values` as a set, returning the bytes written.
pub fn encode(writer: &mut BytesMut, values: &[u64]) -> Result<usize> {
    Ok(Bitmap::from_values(values)?.encode(writer))
}

/// Decode members in ascending order into `out`, refusing when the member
/// count exceeds `max_count`. Returns the number of members decoded.
pub fn decode(src: &[u8], max_count: usize, out: &mut Vec<u64>) -> Result<usize> {
    let bitmap = Bitmap::decode(src)?;
    let count = bitmap.len();
    ensure!(
        count <= max_count,
        BufferTooSmallSnafu {
            count: count as u64,
            max_count: max_count as u64,
        }
    );
    out.extend(bitmap.iter());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn roundtrip(values: &[u64]) -> Vec<u64> {
        let mut buf = BytesMut::new();
        let written = encode(&mut buf, values).unwrap();
        assert_eq!(written, buf.len());
        let mut out = vec![];
        decode(&buf, values.len().max(1), &mut out).unwrap();
        out
    }

    #[test]
    fn membership_and_iteration() {
        let mut bitmap = Bitmap::new();
        assert!(bitmap.insert(100));
        assert!(bitmap.insert(164));
        assert!(bitmap.insert(101));
        assert!(!bitmap.insert(100));
        assert!(bitmap.contains(100));
        assert!(bitmap.contains(164));
        assert!(!bitmap.contains(102));
        assert!(!bitmap.contains(0));
        assert_eq!(bitmap.len(), 3);
        assert_eq!(bitmap.iter().collect::<Vec<_>>(), [100, 101, 164]);
    }

    #[test]
    fn insert_below_base_rebases() {
        let mut bitmap = Bitmap::new();
        bitmap.insert(1000);
        bitmap.insert(1070);
        bitmap.insert(995);
        assert!(bitmap.contains(995));
        assert!(bitmap.contains(1000));
        assert!(bitmap.contains(1070));
        assert_eq!(bitmap.iter().collect::<Vec<_>>(), [995, 1000, 1070]);
    }

    #[test]
    fn set_roundtrip_is_sorted_unique() {
        let values = [50, 10, 30, 10, 50, 11];
        assert_eq!(roundtrip(&values), [10, 11, 30, 50]);
    }

    #[test]
    fn dense_cluster_is_compact() {
        let values: Vec<u64> = (1000..2000).collect();
        let bitmap = Bitmap::from_values(&values).unwrap();
        let stats = bitmap.stats();
        assert_eq!(stats.bits_set, 1000);
        // 1000 members in 16 words: ~130 bytes against 8000 naive.
        assert!(stats.encoded_size < 200);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn empty_set() {
        let bitmap = Bitmap::new();
        assert!(bitmap.is_empty());
        assert_eq!(roundtrip(&[]), []);
    }

    #[test]
    fn sparse_universe_guard() {
        let mut bitmap = Bitmap::new();
        bitmap.insert(0);
        assert!(bitmap.try_insert(u64::MAX).is_err());
        assert!(Bitmap::from_values(&[0, u64::MAX]).is_err());
    }

    #[test]
    fn oversized_word_count_fails() {
        let mut buf = BytesMut::new();
        tagged::put(&mut buf, 0);
        tagged::put(&mut buf, MAX_WORDS + 1);
        assert!(Bitmap::decode(&buf).is_err());
    }

    #[test]
    fn decode_refuses_small_output_budget() {
        let mut buf = BytesMut::new();
        encode(&mut buf, &[1, 2, 3]).unwrap();
        assert!(decode(&buf, 2, &mut vec![]).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_bitmap(values in prop::collection::vec(0_u64..100_000, 0..=512)) {
            let mut expected = values.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(roundtrip(&values), expected);
        }

        #[test]
        fn iter_matches_contains(values in prop::collection::vec(0_u64..10_000, 1..=256)) {
            let bitmap = Bitmap::from_values(&values)?;
            for member in bitmap.iter() {
                prop_assert!(bitmap.contains(member));
            }
            prop_assert_eq!(bitmap.iter().count(), bitmap.len());
        }
    }
}
