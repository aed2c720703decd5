use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mill_pool::SegBuffer;

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("seg_buffer_push_pop");

    for seg_size in [64usize, 1024, 4096] {
        let total = 256 * 1024;
        group.throughput(Throughput::Bytes(total as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(seg_size),
            &seg_size,
            |b, &size| {
                let seg = vec![0xabu8; size];
                b.iter(|| {
                    let mut buf = SegBuffer::new();
                    for _ in 0..total / size {
                        buf.push(seg.clone());
                    }
                    // pops straddle segment boundaries on purpose
                    while !buf.is_empty() {
                        black_box(buf.pop(size + size / 2));
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_chunk_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("seg_buffer_chunk_advance");

    // mimics a socket that accepts a bit less than one segment per write
    for seg_size in [1024usize, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(seg_size),
            &seg_size,
            |b, &size| {
                let seg = vec![0x5au8; size];
                b.iter(|| {
                    let mut buf = SegBuffer::new();
                    for _ in 0..64 {
                        buf.push(seg.clone());
                    }
                    while !buf.is_empty() {
                        let n = buf.chunk().len().min(size - 7).max(1);
                        black_box(buf.chunk());
                        buf.advance(n);
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_chunk_advance);
criterion_main!(benches);
