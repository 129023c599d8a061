//! Benchmarks for line classification and spot extraction.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use hamalert_bridge::session::classify;
use hamalert_bridge::spot::SpotRecord;

/// Sample JSON-mode spot lines for benchmarking.
const SAMPLE_SPOTS: &[&str] = &[
    r#"{"fullCallsign":"RW1M","spotter":"EA5WU","frequency":"7018.3","mode":"cw","time":"22:59"}"#,
    r#"{"fullCallsign":"CS3B","spotter":"KM3T","frequency":14100.0,"mode":"CW","band":"20m"}"#,
    r#"{"callsign":"VA3XCD/B","spotter":"K9LC","frequency":"28169.9","mode":"CW","time":1700000000}"#,
    r#"{"dx":"PT7KM","de":"DJ9IE","freq":7028000,"mode":"FT8"}"#,
    r#"{"callsign":"K7ABC/P","spotter":"W7XYZ","frequency":"14062","mode":"CW","summitName":"Mount Si","summitRef":"W7W/KG-063","summitPoints":4,"summitHeight":1270}"#,
];

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    group.throughput(Throughput::Elements(1));
    group.bench_function("single", |b| {
        b.iter(|| {
            SpotRecord::parse(black_box(SAMPLE_SPOTS[0]))
                .ok()
                .and_then(|record| record.extract())
        })
    });

    group.throughput(Throughput::Elements(SAMPLE_SPOTS.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for line in SAMPLE_SPOTS {
                if let Ok(record) = SpotRecord::parse(black_box(line)) {
                    let _ = record.extract();
                }
            }
        })
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    let prompt = "W1AW de HamAlert >";
    let greeting = "Hello W1AW, this is HamAlert";

    group.bench_function("spot", |b| b.iter(|| classify(black_box(SAMPLE_SPOTS[0]))));
    group.bench_function("prompt", |b| b.iter(|| classify(black_box(prompt))));
    group.bench_function("greeting", |b| b.iter(|| classify(black_box(greeting))));

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");

    // Mix of spots and server chatter
    let mixed_lines: Vec<&str> = vec![
        SAMPLE_SPOTS[0],
        "Hello W1AW, this is HamAlert",
        SAMPLE_SPOTS[1],
        "",
        SAMPLE_SPOTS[4],
        "W1AW de HamAlert >",
    ];

    group.throughput(Throughput::Elements(mixed_lines.len() as u64));
    group.bench_function("mixed_input", |b| {
        b.iter(|| {
            for line in &mixed_lines {
                if let Ok(record) = SpotRecord::parse(black_box(line)) {
                    let _ = record.extract();
                }
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_extract, bench_classify, bench_full_pipeline);
criterion_main!(benches);
