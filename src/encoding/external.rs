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

//! External-width varint: a little-endian integer at a caller-supplied byte
//! width 1..=8. The width is not stored in-band; block codecs carry it in
//! their headers so payload elements stay uniform and random access stays
//! O(1).

use bytes::{BufMut, BytesMut};

use crate::error::Result;

use super::{util::take, validate_width, MAX_WIDTH};

/// Minimum width such that `range < 256^width`, floor 1, cap 8.
#[inline]
pub fn unsigned_encoding(range: u64) -> usize {
    let bits = 64 - range.leading_zeros() as usize;
    bits.div_ceil(8).clamp(1, MAX_WIDTH)
}

/// Append `value` as a `width`-byte little-endian integer.
///
/// `value` must fit in `width` bytes; callers compute the width from the
/// value range first (see [`unsigned_encoding`]).
pub fn put_fixed_width(writer: &mut BytesMut, value: u64, width: usize) {
    debug_assert!((1..=MAX_WIDTH).contains(&width), "width must be 1..=8");
    debug_assert!(
        width == MAX_WIDTH || value < 1 << (8 * width),
        "value does not fit in width"
    );
    writer.put_slice(&value.to_le_bytes()[..width]);
}

/// Read a `width`-byte little-endian integer from the front of `buf`.
pub fn get(buf: &[u8], width: usize) -> Result<u64> {
    let width = validate_width(u8::try_from(width).unwrap_or(u8::MAX))?;
    let bytes = take(buf, width)?;
    let mut le = [0_u8; 8];
    le[..width].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(le))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn width_table() {
        assert_eq!(unsigned_encoding(0), 1);
        assert_eq!(unsigned_encoding(1), 1);
        assert_eq!(unsigned_encoding(255), 1);
        assert_eq!(unsigned_encoding(256), 2);
        assert_eq!(unsigned_encoding(65_535), 2);
        assert_eq!(unsigned_encoding(65_536), 3);
        assert_eq!(unsigned_encoding(16_777_215), 3);
        assert_eq!(unsigned_encoding(u64::MAX), 8);
    }

    #[test]
    fn little_endian_layout() {
        let mut buf = BytesMut::new();
        put_fixed_width(&mut buf, 0x0102, 3);
        assert_eq!(&buf[..], &[0x02, 0x01, 0x00]);
    }

    #[test]
    fn truncated_or_invalid_width_fails() {
        assert!(get(&[1, 2], 3).is_err());
        assert!(get(&[1], 0).is_err());
        assert!(get(&[1; 9], 9).is_err());
    }

    proptest! {
        #[test]
        fn fidelity_within_width(value: u64, width in 1..=8_usize) {
            let value = if width == 8 { value } else { value & ((1 << (8 * width)) - 1) };
            let mut buf = BytesMut::new();
            put_fixed_width(&mut buf, value, width);
            prop_assert_eq!(buf.len(), width);
            prop_assert_eq!(get(&buf, width)?, value);
        }

        #[test]
        fn minimum_width_is_sufficient_and_tight(range: u64) {
            let w = unsigned_encoding(range);
            let mut buf = BytesMut::new();
            put_fixed_width(&mut buf, range, w);
            prop_assert_eq!(get(&buf, w)?, range);
            if w > 1 {
                // One byte fewer cannot represent the range.
                prop_assert!(range >= 1 << (8 * (w - 1)));
            }
        }
    }
}
