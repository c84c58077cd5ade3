#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use evframe::archive::{self, TypeRegistry};
use evframe::codec::{Decoder, Encoder};
use evframe::compression::Compression;
use evframe::file::{FrameFile, FrameIndex, FrameWriter};
use evframe::payload::{F64Map, StringValue};
use evframe::{Frame, Stream};
use std::hint::black_box;
use std::sync::Arc;

fn file_bytes(registry: &Arc<TypeRegistry>, frames: usize, compression: Compression) -> Vec<u8> {
    let mut writer = FrameWriter::builder()
        .compression(compression)
        .build(Vec::new())
        .expect("writer");
    for i in 0..frames {
        let mut frame = Frame::new(Stream::Physics, Arc::clone(registry));
        frame.put("label", StringValue(format!("event {i}"))).expect("put");
        frame
            .put("fit", F64Map::from_iter([("zenith", 1.1), ("azimuth", 0.3), ("logl", -42.0)]))
            .expect("put");
        writer.write(&frame).expect("write");
    }
    writer.finish().expect("finish")
}

fn bench_scan(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::standard().expect("standard registry"));
    let mut group = c.benchmark_group("Scan");

    for frames in [100usize, 1_000] {
        let plain = file_bytes(&registry, frames, Compression::None);
        group.bench_with_input(BenchmarkId::new("index", frames), &plain, |b, bytes| {
            b.iter(|| black_box(FrameIndex::from_bytes(bytes).expect("index").len()));
        });

        let compressed = file_bytes(&registry, frames, Compression::Lz4);
        group.bench_with_input(BenchmarkId::new("open_lz4", frames), &compressed, |b, bytes| {
            b.iter(|| black_box(FrameFile::from_bytes(bytes.clone()).expect("file").len()));
        });
    }

    group.bench_function("codec_counts", |b| {
        b.iter(|| {
            let mut enc = Encoder::new();
            for n in 0..1_000u64 {
                enc.put_count(black_box(n * 977));
            }
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            let mut sum = 0u64;
            while !dec.is_empty() {
                sum = sum.wrapping_add(dec.get_count().expect("count"));
            }
            black_box(sum);
        });
    });

    group.bench_function("object_graph", |b| {
        let value = Arc::new(F64Map::from_iter((0..64).map(|i| (format!("p{i}"), f64::from(i)))));
        b.iter(|| {
            let bytes = archive::to_bytes(&registry, &value).expect("encode");
            let back: Arc<F64Map> = archive::from_bytes(&registry, &bytes).expect("decode");
            black_box(back.0.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
