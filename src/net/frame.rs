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

//! Framing envelope: `[length: tagged varint][payload: length bytes]`.
//!
//! The length field is a tagged varint precisely so a stream reader can
//! pull one byte, learn the width of the length field, read the remainder
//! of the field, then read exactly `length` payload bytes. Zero-length and
//! over-limit frames are rejected; frame boundaries are the protocol's
//! resynchronisation points.

use bytes::BytesMut;
use snafu::ensure;

use crate::encoding::tagged;
use crate::error::{EmptyFrameSnafu, FrameTooLargeSnafu, Result};

/// Default ceiling on frame payloads accepted from a peer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Append a frame around `body`, returning the bytes written.
pub fn encode(writer: &mut BytesMut, body: &[u8]) -> Result<usize> {
    ensure!(!body.is_empty(), EmptyFrameSnafu);
    let written = tagged::put(writer, body.len() as u64);
    writer.extend_from_slice(body);
    Ok(written + body.len())
}

/// Decode one frame from the front of `src`, returning the payload and the
/// total bytes consumed.
pub fn decode(src: &[u8], max_len: usize) -> Result<(&[u8], usize)> {
    let (length, length_len) = tagged::get(src)?;
    ensure!(length > 0, EmptyFrameSnafu);
    ensure!(
        length <= max_len as u64,
        FrameTooLargeSnafu {
            length,
            max: max_len as u64,
        }
    );
    let body = crate::encoding::take(&src[length_len..], length as usize)?;
    Ok((body, length_len + length as usize))
}

#[cfg(feature = "async")]
mod tokio_io {
    use snafu::{ensure, ResultExt};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use crate::encoding::tagged;
    use crate::error::{EmptyFrameSnafu, FrameTooLargeSnafu, IoSnafu, Result};

    /// Read one frame from `reader`.
    ///
    /// Returns `Ok(None)` on a clean EOF before the first length byte; any
    /// other short read is an error, since it cuts a frame in half.
    pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut length_buf = [0_u8; tagged::MAX_LEN];
        match reader.read_exact(&mut length_buf[..1]).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context(IoSnafu),
        }

        let length_len = tagged::peek_len(length_buf[0])?;
        if length_len > 1 {
            reader
                .read_exact(&mut length_buf[1..length_len])
                .await
                .context(IoSnafu)?;
        }
        let (length, _) = tagged::get(&length_buf[..length_len])?;
        ensure!(length > 0, EmptyFrameSnafu);
        ensure!(
            length <= max_len as u64,
            FrameTooLargeSnafu {
                length,
                max: max_len as u64,
            }
        );

        let mut body = vec![0_u8; length as usize];
        reader.read_exact(&mut body).await.context(IoSnafu)?;
        Ok(Some(body))
    }

    /// Write one frame around `body` and flush it.
    pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        ensure!(!body.is_empty(), EmptyFrameSnafu);
        let mut frame = bytes::BytesMut::with_capacity(tagged::MAX_LEN + body.len());
        super::encode(&mut frame, body)?;
        writer.write_all(&frame).await.context(IoSnafu)?;
        writer.flush().await.context(IoSnafu)
    }
}

#[cfg(feature = "async")]
pub use tokio_io::{read_frame, write_frame};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn roundtrip_sync() {
        let mut buf = BytesMut::new();
        let written = encode(&mut buf, b"hello").unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(buf[0], 5);

        let (body, consumed) = decode(&buf, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(consumed, written);
    }

    #[test]
    fn empty_frames_rejected_both_ways() {
        let mut buf = BytesMut::new();
        assert!(encode(&mut buf, b"").is_err());
        assert!(decode(&[0x00], DEFAULT_MAX_FRAME_LEN).is_err());
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        encode(&mut buf, &[7; 100]).unwrap();
        assert!(decode(&buf, 99).is_err());
        assert!(decode(&buf, 100).is_ok());
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut buf = BytesMut::new();
        encode(&mut buf, b"abcdef").unwrap();
        assert!(decode(&buf[..buf.len() - 1], DEFAULT_MAX_FRAME_LEN).is_err());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode(&mut buf, b"one").unwrap();
        encode(&mut buf, b"three").unwrap();
        let (body, consumed) = decode(&buf, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(body, b"one");
        let (body, _) = decode(&buf[consumed..], DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(body, b"three");
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn roundtrip_async() {
            let (mut client, mut server) = tokio::io::duplex(1024);
            write_frame(&mut client, b"ping").await.unwrap();
            let body = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(body, b"ping");
        }

        #[tokio::test]
        async fn clean_eof_is_none() {
            let (client, mut server) = tokio::io::duplex(64);
            drop(client);
            let got = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            assert!(got.is_none());
        }

        #[tokio::test]
        async fn eof_mid_frame_is_error() {
            let (mut client, mut server) = tokio::io::duplex(64);
            use tokio::io::AsyncWriteExt;
            // Length says 10 bytes follow, only 2 arrive.
            client.write_all(&[10, b'a', b'b']).await.unwrap();
            drop(client);
            assert!(read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await.is_err());
        }

        #[tokio::test]
        async fn oversized_length_rejected_before_body_read() {
            let (mut client, mut server) = tokio::io::duplex(64);
            use tokio::io::AsyncWriteExt;
            let mut buf = BytesMut::new();
            crate::encoding::tagged::put(&mut buf, 1 << 40);
            client.write_all(&buf).await.unwrap();
            assert!(read_frame(&mut server, DEFAULT_MAX_FRAME_LEN).await.is_err());
        }
    }
}
