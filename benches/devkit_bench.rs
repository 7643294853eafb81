// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Benchmarks for the parsing hot paths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use devkit::arn::Arn;
use devkit::flex;
use devkit::pypi::{sort_versions, LooseVersion, StrictVersion};
use devkit::systools::filter_ansi;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Payload {
    social_number: String,
    display_name: String,
    retry_count: u32,
    tags: Vec<String>,
}

fn bench_flex(c: &mut Criterion) {
    let value = json!({
        "SocialNumber": "123-45-6789",
        "display-name": "Someone",
        "RETRY_COUNT": 3,
        "Tags": ["a", "b", "c"],
        "ignored": {"deep": [1, 2, 3]},
    });
    c.bench_function("flex_deserialize", |b| {
        b.iter(|| flex::deserialize::<Payload>(black_box(value.clone())))
    });
    c.bench_function("lookup_key", |b| b.iter(|| flex::lookup_key(black_box("Some_Mixed-Key.Name"))));
}

fn bench_versions(c: &mut Criterion) {
    let releases: Vec<String> = (0..200)
        .map(|index| format!("{}.{}.{}", index / 50, (index / 10) % 5, index % 10))
        .collect();
    c.bench_function("strict_version_parse", |b| {
        b.iter(|| {
            releases
                .iter()
                .filter_map(|release| StrictVersion::parse(black_box(release)).ok())
                .count()
        })
    });
    c.bench_function("loose_version_sort", |b| {
        b.iter(|| {
            let mut versions: Vec<LooseVersion> = releases.iter().map(|release| LooseVersion::new(release)).collect();
            sort_versions(&mut versions, false);
            versions
        })
    });
}

fn bench_parsing(c: &mut Criterion) {
    c.bench_function("arn_parse", |b| {
        b.iter(|| Arn::parse(black_box("arn:aws:s3:us-east-1:123456789012:bucket/key/with/slashes")))
    });
    let colored = b"\x1b[31merror\x1b[0m: \x1b[1mcannot\x1b[0m find module".repeat(20);
    c.bench_function("filter_ansi", |b| b.iter(|| filter_ansi(black_box(&colored))));
}

criterion_group!(benches, bench_flex, bench_versions, bench_parsing);
criterion_main!(benches);
