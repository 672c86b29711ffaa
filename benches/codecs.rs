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

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use varint_rust::encoding::{adaptive, delta, frame_of_reference, pfor, tagged};

fn clustered(count: u64) -> Vec<u64> {
    (0..count).map(|i| 1_000_000 + (i * 37) % 250).collect()
}

fn timestamps(count: i64) -> Vec<i64> {
    (0..count).map(|i| 1_700_000_000 + i).collect()
}

fn bench_tagged(c: &mut Criterion) {
    let values: Vec<u64> = (0..1024).map(|i| i * 0x0123_4567).collect();
    let mut encoded = BytesMut::new();
    for &value in &values {
        tagged::put(&mut encoded, value);
    }

    c.bench_function("tagged_put_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(1024 * tagged::MAX_LEN);
            for &value in &values {
                tagged::put(&mut buf, black_box(value));
            }
            buf
        })
    });

    c.bench_function("tagged_get_1k", |b| {
        b.iter(|| {
            let mut pos = 0;
            let mut sum = 0_u64;
            while pos < encoded.len() {
                let (value, consumed) = tagged::get(&encoded[pos..]).unwrap();
                sum = sum.wrapping_add(value);
                pos += consumed;
            }
            black_box(sum)
        })
    });
}

fn bench_for(c: &mut Criterion) {
    let values = clustered(1024);
    let mut encoded = BytesMut::new();
    frame_of_reference::encode(&mut encoded, &values, None);

    c.bench_function("for_encode_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(2048);
            frame_of_reference::encode(&mut buf, black_box(&values), None);
            buf
        })
    });

    c.bench_function("for_decode_1k", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(1024);
            frame_of_reference::decode(black_box(&encoded), 1024, &mut out).unwrap();
            out
        })
    });

    c.bench_function("for_get_at", |b| {
        let view = frame_of_reference::ForView::new(&encoded).unwrap();
        b.iter(|| black_box(view.get(black_box(512))))
    });
}

fn bench_delta(c: &mut Criterion) {
    let values = timestamps(1024);
    let mut encoded = BytesMut::new();
    delta::encode(&mut encoded, &values);

    c.bench_function("delta_encode_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(delta::max_encoded_size(1024));
            delta::encode(&mut buf, black_box(&values));
            buf
        })
    });

    c.bench_function("delta_decode_1k", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(1024);
            delta::decode(black_box(&encoded), 1024, &mut out).unwrap();
            out
        })
    });
}

fn bench_pfor(c: &mut Criterion) {
    let mut values = clustered(1024);
    values[100] = u64::MAX / 2;
    values[900] = u64::MAX / 3;

    c.bench_function("pfor_encode_1k_with_outliers", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(2048);
            pfor::encode(&mut buf, black_box(&values), None);
            buf
        })
    });
}

fn bench_adaptive(c: &mut Criterion) {
    let values = clustered(1024);

    c.bench_function("adaptive_analyze_1k", |b| {
        b.iter(|| adaptive::analyze(black_box(&values)))
    });

    c.bench_function("adaptive_encode_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(2048);
            adaptive::encode(&mut buf, black_box(&values)).unwrap();
            buf
        })
    });
}

criterion_group!(
    benches,
    bench_tagged,
    bench_for,
    bench_delta,
    bench_pfor,
    bench_adaptive
);
criterion_main!(benches);
