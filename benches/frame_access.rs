#![allow(missing_docs)]

use criterion::{Criterion, criterion_group, criterion_main};
use evframe::file::{FrameFile, FrameReader, FrameSequence, FrameWriter};
use evframe::payload::{ChannelKey, F64Value, Pulse, PulseSeriesMap};
use evframe::views::{PackedPulses, PulseMask};
use evframe::{Frame, SequenceOptions, Stream, TypeRegistry};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn event_pulses(seed: u32) -> PulseSeriesMap {
    (0..80)
        .map(|module| {
            let series = (0..12u8)
                .map(|i| Pulse {
                    time: f64::from(seed) + 7.0 * f64::from(i),
                    charge: 0.25 * f32::from(i % 7 + 1),
                    width: 6.0,
                    flags: 0,
                })
                .collect();
            (ChannelKey::new(36, module, 0), series)
        })
        .collect()
}

fn bench_frame_access(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::standard().expect("standard registry"));
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let mut writer = FrameWriter::create(file.path()).expect("Failed to create writer");
    let mut geometry = Frame::new(Stream::Geometry, Arc::clone(&registry));
    geometry.put("depth", F64Value(1950.0)).expect("put");
    writer.write(&geometry).expect("write");
    for event in 0..200 {
        let mut frame = Frame::new(Stream::Physics, Arc::clone(&registry));
        frame.put("packed", PackedPulses::pack(&event_pulses(event))).expect("put");
        let mask =
            PulseMask::from_predicate(&frame, "packed", |_, p| p.charge > 1.0).expect("mask");
        frame.put("bright", mask).expect("put");
        frame.put("energy", F64Value(f64::from(event))).expect("put");
        writer.write(&frame).expect("write");
    }
    writer.finish().expect("finish");
    let path = file.path().to_owned();

    let mut group = c.benchmark_group("Frame Access");

    group.bench_function("stream_read_keys_only", |b| {
        b.iter(|| {
            let reader = FrameReader::open(&path, Arc::clone(&registry)).expect("open");
            let keys: usize = reader.map(|f| f.expect("frame").len()).sum();
            black_box(keys);
        });
    });

    group.bench_function("stream_read_one_scalar", |b| {
        b.iter(|| {
            let reader = FrameReader::open(&path, Arc::clone(&registry)).expect("open");
            let mut total = 0.0;
            for frame in reader {
                let frame = frame.expect("frame");
                total += frame.get::<F64Value>("energy").expect("get").map_or(0.0, |v| v.0);
            }
            black_box(total);
        });
    });

    group.bench_function("masked_view", |b| {
        let sequence = FrameSequence::new(
            FrameFile::open(&path).expect("open"),
            Arc::clone(&registry),
            SequenceOptions::default(),
        );
        b.iter(|| {
            let frame = sequence.frame(black_box(120)).expect("frame");
            let pulses = frame.get::<PulseSeriesMap>("bright").expect("view").expect("present");
            black_box(pulses.pulse_count());
        });
    });

    group.bench_function("random_access_mixed", |b| {
        let sequence = FrameSequence::open(&path, Arc::clone(&registry), SequenceOptions::default())
            .expect("open");
        let mut position = 1;
        b.iter(|| {
            position = (position * 37) % 200 + 1;
            let frame = sequence.frame(position).expect("frame");
            black_box(frame.get::<F64Value>("depth").expect("get"));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_frame_access);
criterion_main!(benches);
