use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SIZE: usize = 10_000;

#[derive(Clone, Copy)]
struct RandomKeys {
    state: u64,
}

impl RandomKeys {
    fn new() -> Self {
        RandomKeys { state: 0 }
    }
}

impl Iterator for RandomKeys {
    type Item = u64;
    fn next(&mut self) -> Option<u64> {
        // Add 1 then multiply by some 32 bit prime.
        self.state = self.state.wrapping_add(1).wrapping_mul(3_787_392_781);
        Some(self.state)
    }
}

fn read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    group.bench_function("guava", |b| {
        let m = guava::HashMap::<u64>::new();

        for i in RandomKeys::new().take(SIZE) {
            m.pin().insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.pin().get(i), Some(&i)));
            }
        });
    });

    group.bench_function("std", |b| {
        let mut m = HashMap::<u64, u64>::default();
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.get(&i), Some(&i)));
            }
        });
    });

    group.finish();
}

fn insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("guava", |b| {
        b.iter(|| {
            let m = guava::HashMap::<u64>::new();
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.pin().insert(i, i));
            }
        });
    });

    group.bench_function("std", |b| {
        b.iter(|| {
            let mut m = HashMap::<u64, u64>::default();
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.insert(i, i));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, read, insert);
criterion_main!(benches);
