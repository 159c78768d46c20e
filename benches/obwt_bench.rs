use criterion::{black_box, criterion_group, criterion_main, Criterion};
use obwt::OnlineRlbwt;

/// Deterministic DNA-ish input with separators every 100 symbols.
fn make_input(len: usize) -> Vec<u8> {
    let mut state = 0x9E3779B97F4A7C15u64;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            if i % 100 == 99 {
                1u8
            } else {
                b"acgt"[(state % 4) as usize]
            }
        })
        .collect()
}

fn bench_extend(c: &mut Criterion) {
    let mut group = c.benchmark_group("extend");
    let input = make_input(20_000);

    group.bench_function("exact", |b| {
        b.iter(|| {
            let mut rlbwt = OnlineRlbwt::new(1);
            for &ch in &input {
                rlbwt.extend(ch);
            }
            black_box(rlbwt.num_runs())
        })
    });

    group.bench_function("sap", |b| {
        b.iter(|| {
            let mut rlbwt = OnlineRlbwt::new(1);
            for &ch in &input {
                rlbwt.sap_extend(ch);
            }
            black_box(rlbwt.num_runs())
        })
    });
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    let input = make_input(20_000);
    let mut rlbwt = OnlineRlbwt::new(1);
    for &ch in &input {
        rlbwt.extend(ch);
    }
    let n = rlbwt.len_with_endmarker() - 1;

    group.bench_function("total_rank", |b| {
        b.iter(|| {
            for i in (0..n).step_by(17) {
                black_box(rlbwt.drle().rank(b'c', i, true));
            }
        })
    });
}

criterion_group!(benches, bench_extend, bench_rank);
criterion_main!(benches);
