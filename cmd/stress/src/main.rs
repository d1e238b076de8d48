//! Stress test - many coroutines on one stack
//!
//! Spawns N coroutines that each recurse to a different depth and yield
//! there, so every switch moves a differently sized stack image.
//!
//! Usage: `stress [coroutines] [yields]`

use coroswap::{run_with_config, Engine, EngineConfig};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;
use std::time::Instant;

/// Recurse `depth` frames of 64 bytes, yielding `yields` times at the bottom
#[inline(never)]
fn burrow(engine: &Engine, depth: usize, yields: usize) -> usize {
    let frame = black_box([depth as u8; 64]);
    if depth == 0 {
        for _ in 0..yields {
            engine.yield_now();
        }
        return frame.len();
    }
    burrow(engine, depth - 1, yields) + frame[0] as usize % 2
}

fn main() {
    println!("=== coroswap Stress Test ===\n");

    let num_coroutines: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000);
    let yields: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let config = EngineConfig::from_env();
    if config.debug_logging {
        config.print();
    }

    println!("Spawning {} coroutines, {} yields each...", num_coroutines, yields);

    let completed = Rc::new(Cell::new(0usize));
    let c = completed.clone();
    let start = Instant::now();

    let result = run_with_config(config, move |engine| {
        for i in 0..num_coroutines {
            let c = c.clone();
            let spawned = engine.spawn(move |engine| {
                black_box(burrow(engine, i % 97, yields));
                c.set(c.get() + 1);
            });
            if let Err(e) = spawned {
                eprintln!("spawn failed: {}", e);
                return;
            }

            // Progress indicator
            if (i + 1) % 1000 == 0 {
                print!("\rSpawned: {}/{}", i + 1, num_coroutines);
            }
        }
    });

    let total_time = start.elapsed();
    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("\nengine error: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n\n=== Results ===");
    println!("Total coroutines: {}", num_coroutines);
    println!("Completed:        {}", completed.get());
    println!("Switches:         {}", stats.switches);
    println!("Bytes saved:      {}", stats.bytes_saved);
    println!("Bytes restored:   {}", stats.bytes_restored);
    println!("Buffers:          {} allocated, {} released", stats.buffers_allocated, stats.buffers_released);
    println!("Peak image:       {} bytes", stats.peak_image);
    println!("Total time:       {:?}", total_time);
    println!("Throughput:       {:.0} switches/sec",
        stats.switches as f64 / total_time.as_secs_f64());

    println!("\n=== Stress Test Complete ===");
}
