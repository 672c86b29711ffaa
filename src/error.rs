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

use snafu::prelude::*;
use snafu::Location;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VarintError {
    #[snafu(display("Failed to read, source: {}", source))]
    IoError {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Out of spec, message: {}", msg))]
    OutOfSpec {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Varint being decoded is too large"))]
    VarintTooLarge {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid width: {}", width))]
    InvalidWidth {
        #[snafu(implicit)]
        location: Location,
        width: u8,
    },

    #[snafu(display("Input truncated: need {} more bytes, {} remaining", needed, remaining))]
    TruncatedInput {
        #[snafu(implicit)]
        location: Location,
        needed: usize,
        remaining: usize,
    },

    #[snafu(display("Encoded count {} exceeds caller maximum {}", count, max_count))]
    BufferTooSmall {
        #[snafu(implicit)]
        location: Location,
        count: u64,
        max_count: u64,
    },

    #[snafu(display("Frame length may not be zero"))]
    EmptyFrame {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Frame length {} exceeds maximum {}", length, max))]
    FrameTooLarge {
        #[snafu(implicit)]
        location: Location,
        length: u64,
        max: u64,
    },

    #[snafu(display("Snapshot magic does not match"))]
    InvalidMagic {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unsupported snapshot version: {}", version))]
    UnsupportedVersion {
        #[snafu(implicit)]
        location: Location,
        version: u8,
    },

    #[snafu(display("Snapshot size {} exceeds maximum {}", size, max))]
    SnapshotTooLarge {
        #[snafu(implicit)]
        location: Location,
        size: u64,
        max: u64,
    },

    #[snafu(display("Unknown status code: {:#04x}", code))]
    UnknownStatus {
        #[snafu(implicit)]
        location: Location,
        code: u8,
    },
}

pub type Result<T, E = VarintError> = std::result::Result<T, E>;
