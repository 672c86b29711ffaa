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

use crate::error::{Result, TruncatedInputSnafu};
use snafu::ensure;

/// ZigZag encoding stores the sign bit in the least significant bit, so
/// small-magnitude values of either sign stay small as unsigned integers.
///
/// `n >> 63` is an arithmetic shift and fills with the sign bit: for
/// non-negative `n` the result is `n << 1`, for negative `n` it is
/// `!(n << 1)`.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

/// Borrow the next `n` bytes of `buf`, failing uniformly on truncation.
#[inline]
pub(crate) fn take(buf: &[u8], n: usize) -> Result<&[u8]> {
    ensure!(
        buf.len() >= n,
        TruncatedInputSnafu {
            needed: n - buf.len(),
            remaining: buf.len(),
        }
    );
    Ok(&buf[..n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zigzag_encode() {
        assert_eq!(0, zigzag_encode(0));
        assert_eq!(1, zigzag_encode(-1));
        assert_eq!(2, zigzag_encode(1));
        assert_eq!(3, zigzag_encode(-2));
        assert_eq!(4, zigzag_encode(2));
        assert_eq!(5, zigzag_encode(-3));
        assert_eq!(6, zigzag_encode(3));

        assert_eq!(u64::MAX - 1, zigzag_encode(i64::MAX));
        assert_eq!(u64::MAX, zigzag_encode(i64::MIN));
    }

    #[test]
    fn test_zigzag_decode() {
        assert_eq!(0, zigzag_decode(0));
        assert_eq!(-1, zigzag_decode(1));
        assert_eq!(1, zigzag_decode(2));
        assert_eq!(-2, zigzag_decode(3));
        assert_eq!(2, zigzag_decode(4));
        assert_eq!(-3, zigzag_decode(5));
        assert_eq!(3, zigzag_decode(6));

        assert_eq!(i64::MAX, zigzag_decode(u64::MAX - 1));
        assert_eq!(i64::MIN, zigzag_decode(u64::MAX));
    }

    proptest! {
        #[test]
        fn roundtrip_zigzag(value: i64) {
            let out = zigzag_decode(zigzag_encode(value));
            prop_assert_eq!(value, out);
        }

        #[test]
        fn roundtrip_zigzag_unsigned(value: u64) {
            let out = zigzag_encode(zigzag_decode(value));
            prop_assert_eq!(value, out);
        }
    }

    #[test]
    fn take_reports_truncation() {
        let buf = [1_u8, 2, 3];
        assert!(take(&buf, 3).is_ok());
        let err = take(&buf, 5).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
