use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use coroswap_runtime::{Engine, EngineConfig, SchedPolicy};

const ROUNDS: usize = 1000;

fn engine() -> Engine {
    let config = EngineConfig::new()
        .policy(SchedPolicy::RoundRobin)
        .check_thread_stack(false);
    Engine::with_config(config).unwrap()
}

#[inline(never)]
fn dive(engine: &Engine, depth: usize, rounds: usize) -> u64 {
    let pad = black_box([depth as u8; 128]);
    if depth == 0 {
        for _ in 0..rounds {
            engine.yield_now();
        }
        return pad[0] as u64;
    }
    dive(engine, depth - 1, rounds) + pad[127] as u64
}

/// Two coroutines yielding to each other `ROUNDS` times each, at `depth`
/// extra frames of 128 bytes
fn ping_pong(engine: &Engine, depth: usize) {
    engine
        .start(move |engine| {
            for _ in 0..2 {
                engine
                    .spawn(move |engine| {
                        black_box(dive(engine, depth, ROUNDS));
                    })
                    .unwrap();
            }
        })
        .unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("yield_ping_pong", |b| b.iter(|| ping_pong(&engine, 0)));

    let mut group = c.benchmark_group("deep_stack_switch");
    for depth in [8usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| ping_pong(&engine, depth))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
