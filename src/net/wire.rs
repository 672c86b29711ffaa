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

//! The trie service wire schema, shared by server and client so the two
//! can never disagree on a code.
//!
//! A request body is `[command: 1 byte]` followed by a concatenation of
//! tagged varints and tagged-varint-length-prefixed byte strings; a
//! response body is `[status: 1 byte]` followed by the same building
//! blocks. [`PayloadCursor`] consumes those fields one at a time and
//! reports truncation uniformly.

use bytes::{BufMut, BytesMut};

use crate::encoding::tagged;
use crate::error::{Result, TruncatedInputSnafu, UnknownStatusSnafu};

/// Request command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Add = 0x01,
    Remove = 0x02,
    Subscribe = 0x03,
    Unsubscribe = 0x04,
    Match = 0x05,
    List = 0x06,
    Stats = 0x07,
    Save = 0x08,
    Ping = 0x09,
    Auth = 0x0A,
}

impl Command {
    /// `None` for unassigned codes; the server answers those with
    /// [`Status::InvalidCmd`] rather than dropping the connection.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Add),
            0x02 => Some(Self::Remove),
            0x03 => Some(Self::Subscribe),
            0x04 => Some(Self::Unsubscribe),
            0x05 => Some(Self::Match),
            0x06 => Some(Self::List),
            0x07 => Some(Self::Stats),
            0x08 => Some(Self::Save),
            0x09 => Some(Self::Ping),
            0x0A => Some(Self::Auth),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x01,
    AuthRequired = 0x02,
    RateLimited = 0x03,
    InvalidCmd = 0x04,
}

impl Status {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::Ok),
            0x01 => Ok(Self::Error),
            0x02 => Ok(Self::AuthRequired),
            0x03 => Ok(Self::RateLimited),
            0x04 => Ok(Self::InvalidCmd),
            code => UnknownStatusSnafu { code }.fail(),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Append a bare tagged varint field.
pub fn put_u64(writer: &mut BytesMut, value: u64) {
    tagged::put(writer, value);
}

/// Append a length-prefixed byte-string field.
pub fn put_bytes(writer: &mut BytesMut, bytes: &[u8]) {
    tagged::put(writer, bytes.len() as u64);
    writer.put_slice(bytes);
}

/// Sequential field reader over a payload.
///
/// Every accessor fails with the same truncation error shape, so callers
/// can collapse "any malformed payload" into a single error response.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a bare tagged varint.
    pub fn u64(&mut self) -> Result<u64> {
        let (value, consumed) = tagged::get(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a tagged-varint-length-prefixed byte string.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let length = self.u64()? as usize;
        snafu::ensure!(
            self.remaining() >= length,
            TruncatedInputSnafu {
                needed: length - self.remaining(),
                remaining: self.remaining(),
            }
        );
        let bytes = &self.buf[self.pos..self.pos + length];
        self.pos += length;
        Ok(bytes)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn str(&mut self) -> Result<&'a str> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes).map_err(|_| {
            crate::error::OutOfSpecSnafu {
                msg: "payload string is not valid UTF-8",
            }
            .build()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_codes_are_exhaustive_and_stable() {
        let table = [
            (0x01, Command::Add),
            (0x02, Command::Remove),
            (0x03, Command::Subscribe),
            (0x04, Command::Unsubscribe),
            (0x05, Command::Match),
            (0x06, Command::List),
            (0x07, Command::Stats),
            (0x08, Command::Save),
            (0x09, Command::Ping),
            (0x0A, Command::Auth),
        ];
        for (code, command) in table {
            assert_eq!(Command::from_byte(code), Some(command));
            assert_eq!(command.as_byte(), code);
        }
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::from_byte(0x0B), None);
        assert_eq!(Command::from_byte(0xFF), None);
    }

    #[test]
    fn status_codes_are_stable() {
        for (code, status) in [
            (0x00, Status::Ok),
            (0x01, Status::Error),
            (0x02, Status::AuthRequired),
            (0x03, Status::RateLimited),
            (0x04, Status::InvalidCmd),
        ] {
            assert_eq!(Status::from_byte(code).unwrap(), status);
            assert_eq!(status.as_byte(), code);
        }
        assert!(Status::from_byte(0x05).is_err());
    }

    #[test]
    fn cursor_walks_mixed_fields() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, b"stock.nasdaq.aapl");
        put_u64(&mut buf, 42);
        put_bytes(&mut buf, b"AAPL");

        let mut cursor = PayloadCursor::new(&buf);
        assert_eq!(cursor.bytes().unwrap(), b"stock.nasdaq.aapl");
        assert_eq!(cursor.u64().unwrap(), 42);
        assert_eq!(cursor.str().unwrap(), "AAPL");
        assert!(cursor.is_empty());
    }

    #[test]
    fn cursor_reports_truncation() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, b"pattern");
        let cut = &buf[..buf.len() - 2];

        let mut cursor = PayloadCursor::new(cut);
        assert!(cursor.bytes().is_err());

        let mut cursor = PayloadCursor::new(&[]);
        assert!(cursor.u64().is_err());
    }

    #[test]
    fn cursor_rejects_invalid_utf8() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, &[0xFF, 0xFE]);
        let mut cursor = PayloadCursor::new(&buf);
        assert!(cursor.str().is_err());
    }
}
