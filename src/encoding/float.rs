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

//! Float codec: lossless encoding of `f32`/`f64` columns.
//!
//! Two strategies behind a one-byte tag:
//!
//! - `0` raw: `[count: tagged]` followed by the IEEE 754 bit patterns
//!   little-endian. Always applicable, preserves NaN payloads bit-exactly.
//! - `1` integral: every value is exactly representable as an `i64`
//!   (measurement series frequently are), so the values are ZigZag-mapped
//!   and stored as a Frame-of-Reference block.

use bytes::{BufMut, BytesMut};
use num::ToPrimitive;
use snafu::ensure;

use crate::error::{BufferTooSmallSnafu, OutOfSpecSnafu, Result};

use super::{
    frame_of_reference, tagged,
    util::{take, zigzag_decode, zigzag_encode},
};

/// Generically represent `f32` and `f64`.
pub trait Float: num::Float + ToPrimitive + std::fmt::Debug + Copy + 'static {
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    const BYTE_SIZE: usize;

    fn to_le_bytes(self) -> Self::Bytes;
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    fn from_i64_exact(value: i64) -> Option<Self>;
}

impl Float for f32 {
    type Bytes = [u8; 4];

    const BYTE_SIZE: usize = 4;

    #[inline]
    fn to_le_bytes(self) -> Self::Bytes {
        self.to_le_bytes()
    }

    #[inline]
    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        Self::from_le_bytes(bytes)
    }

    #[inline]
    fn from_i64_exact(value: i64) -> Option<Self> {
        let float = value as f32;
        (float.to_i64() == Some(value)).then_some(float)
    }
}

impl Float for f64 {
    type Bytes = [u8; 8];

    const BYTE_SIZE: usize = 8;

    #[inline]
    fn to_le_bytes(self) -> Self::Bytes {
        self.to_le_bytes()
    }

    #[inline]
    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        Self::from_le_bytes(bytes)
    }

    #[inline]
    fn from_i64_exact(value: i64) -> Option<Self> {
        let float = value as f64;
        (float.to_i64() == Some(value)).then_some(float)
    }
}

pub const STRATEGY_RAW: u8 = 0;
pub const STRATEGY_INTEGRAL: u8 = 1;

/// Per-block metadata, filled by [`analyze`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct FloatMeta {
    pub count: u64,
    pub encoded_size: u64,
    pub min: f64,
    pub max: f64,
    pub strategy: u8,
}

const _: () = assert!(std::mem::size_of::<FloatMeta>() <= 48);

/// Exact `i64` rendering of `value`, when one exists.
///
/// Compares bit patterns, not float equality: `-0.0` must not be collapsed
/// into `0` and truncating conversions must not slip through.
fn as_exact_i64<T: Float>(value: T) -> Option<i64> {
    let int = value.to_i64()?;
    let back = T::from_i64_exact(int)?;
    (back.to_le_bytes().as_ref() == value.to_le_bytes().as_ref()).then_some(int)
}

/// Decide the strategy and project the encoded size.
pub fn analyze<T: Float>(values: &[T]) -> FloatMeta {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &value in values {
        let value = value.to_f64().unwrap_or(f64::NAN);
        min = min.min(value);
        max = max.max(value);
    }
    if values.is_empty() {
        (min, max) = (0.0, 0.0);
    }

    let integral: Option<Vec<u64>> = values
        .iter()
        .map(|&value| as_exact_i64(value).map(zigzag_encode))
        .collect();
    let (strategy, payload_size) = match integral {
        Some(mapped) if !mapped.is_empty() => (
            STRATEGY_INTEGRAL,
            frame_of_reference::encoded_size(&frame_of_reference::analyze(&mapped)),
        ),
        _ => (
            STRATEGY_RAW,
            tagged::encoded_len(values.len() as u64) + values.len() * T::BYTE_SIZE,
        ),
    };

    FloatMeta {
        count: values.len() as u64,
        encoded_size: 1 + payload_size as u64,
        min,
        max,
        strategy,
    }
}

/// Encode `values`, returning the bytes written.
pub fn encode<T: Float>(writer: &mut BytesMut, values: &[T]) -> usize {
    let integral: Option<Vec<u64>> = values
        .iter()
        .map(|&value| as_exact_i64(value).map(zigzag_encode))
        .collect();
    match integral {
        Some(mapped) if !mapped.is_empty() => {
            writer.put_u8(STRATEGY_INTEGRAL);
            1 + frame_of_reference::encode(writer, &mapped, None)
        }
        _ => {
            writer.put_u8(STRATEGY_RAW);
            let mut written = 1 + tagged::put(writer, values.len() as u64);
            for &value in values {
                writer.put_slice(value.to_le_bytes().as_ref());
                written += T::BYTE_SIZE;
            }
            written
        }
    }
}

/// Decode a block into `out`, refusing when the encoded count exceeds
/// `max_count`. Returns the number of values decoded.
pub fn decode<T: Float>(src: &[u8], max_count: usize, out: &mut Vec<T>) -> Result<usize> {
    let strategy = take(src, 1)?[0];
    let src = &src[1..];
    match strategy {
        STRATEGY_RAW => {
            let (count, count_len) = tagged::get(src)?;
            ensure!(
                count <= max_count as u64,
                BufferTooSmallSnafu {
                    count,
                    max_count: max_count as u64,
                }
            );
            let count = count as usize;
            let payload = take(&src[count_len..], count * T::BYTE_SIZE)?;
            out.reserve(count);
            for chunk in payload.chunks_exact(T::BYTE_SIZE) {
                let mut bytes = T::Bytes::default();
                bytes.as_mut().copy_from_slice(chunk);
                out.push(T::from_le_bytes(bytes));
            }
            Ok(count)
        }
        STRATEGY_INTEGRAL => {
            let mut mapped = vec![];
            let count = frame_of_reference::decode(src, max_count, &mut mapped)?;
            out.reserve(count);
            for zigzag in mapped {
                let float = T::from_i64_exact(zigzag_decode(zigzag));
                match float {
                    Some(float) => out.push(float),
                    None => {
                        return OutOfSpecSnafu {
                            msg: "integral float payload is not representable",
                        }
                        .fail()
                    }
                }
            }
            Ok(count)
        }
        other => OutOfSpecSnafu {
            msg: format!("unknown float strategy {other}"),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip<T: Float>(values: &[T]) -> Vec<T> {
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
    fn integral_series_uses_for_payload() {
        let values: Vec<f64> = (0..100).map(|i| (1_000_000 + i) as f64).collect();
        let meta = analyze(&values);
        assert_eq!(meta.strategy, STRATEGY_INTEGRAL);
        // Far below the 800 bytes of raw f64 storage.
        assert!(meta.encoded_size < 200);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn fractional_values_fall_back_to_raw() {
        let values = [1.5_f64, -0.25, 3.141592653589793];
        let meta = analyze(&values);
        assert_eq!(meta.strategy, STRATEGY_RAW);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn negative_integrals_roundtrip() {
        let values = [-5.0_f64, -4.0, 0.0, 10.0];
        let meta = analyze(&values);
        assert_eq!(meta.strategy, STRATEGY_INTEGRAL);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn nan_and_infinities_preserved() {
        let values = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values);
        let mut out: Vec<f64> = vec![];
        decode(&buf, values.len(), &mut out).unwrap();
        assert_eq!(out.len(), values.len());
        for (actual, expected) in out.iter().zip(&values) {
            assert_eq!(actual.to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn f32_roundtrip() {
        let values = [1.0_f32, 2.5, f32::MAX, f32::MIN_POSITIVE];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn large_magnitude_floats_stay_raw() {
        // Exceeds exact i64 range, must not go through the integral path.
        let values = [1e300_f64, -1e300];
        let meta = analyze(&values);
        assert_eq!(meta.strategy, STRATEGY_RAW);
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn empty_block() {
        let values: [f64; 0] = [];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn unknown_strategy_fails() {
        assert!(decode::<f64>(&[9, 0], 8, &mut vec![]).is_err());
    }

    #[test]
    fn decode_refuses_small_output_budget() {
        let values = [1.5_f64, 2.5, 3.5];
        let mut buf = BytesMut::new();
        encode(&mut buf, &values);
        assert!(decode::<f64>(&buf, 2, &mut vec![]).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_f64(values in prop::collection::vec(any::<f64>(), 0..=128)) {
            let mut buf = BytesMut::new();
            encode(&mut buf, &values);
            let mut out: Vec<f64> = vec![];
            decode(&buf, values.len(), &mut out)?;
            prop_assert_eq!(out.len(), values.len());
            for (actual, expected) in out.iter().zip(&values) {
                prop_assert_eq!(actual.to_bits(), expected.to_bits());
            }
        }

        #[test]
        fn roundtrip_f32(values in prop::collection::vec(any::<f32>(), 0..=128)) {
            let mut buf = BytesMut::new();
            encode(&mut buf, &values);
            let mut out: Vec<f32> = vec![];
            decode(&buf, values.len(), &mut out)?;
            prop_assert_eq!(out.len(), values.len());
            for (actual, expected) in out.iter().zip(&values) {
                prop_assert_eq!(actual.to_bits(), expected.to_bits());
            }
        }
    }
}
