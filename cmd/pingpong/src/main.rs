//! Ping-pong over block/unblock
//!
//! Two coroutines pass a ball back and forth. Each one blocks until the
//! other hands it the ball, so every exchange is a Store of the sender and
//! a Restore of the receiver.
//!
//! # Environment Variables
//!
//! - `COROSWAP_LOG_LEVEL=debug` - Show spawn/block/unblock events
//! - `COROSWAP_POLICY=head-first` - Use the head-first yield policy

use coroswap::{run, CoroutineId, Engine};
use coroswap::{kdebug, kinfo};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Who holds the ball, and how many times it has crossed
struct Table {
    players: RefCell<[CoroutineId; 2]>,
    hits: Cell<u32>,
    rounds: u32,
}

impl Table {
    /// Hit the ball to the other side and wait for it to come back
    fn play(&self, engine: &Engine, side: usize) {
        let name = ["ping", "pong"][side];
        loop {
            let hits = self.hits.get();
            if hits >= self.rounds {
                break;
            }
            self.hits.set(hits + 1);
            kdebug!("{} {}", name, hits + 1);
            if (hits + 1) % 1000 == 0 || self.rounds <= 10 {
                println!("{:>4} {}", name, hits + 1);
            }

            let other = self.players.borrow()[1 - side];
            engine.unblock(other).ok();
            if self.hits.get() < self.rounds {
                engine.block(CoroutineId::NONE).ok();
            }
        }

        // Let the other side see the final count
        let other = self.players.borrow()[1 - side];
        engine.unblock(other).ok();
    }
}

// COROSWAP_LOG_LEVEL=debug cargo run -p coroswap-pingpong -- 10
fn main() {
    println!("=== coroswap Ping-Pong ===\n");

    let rounds: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let table = Rc::new(Table {
        players: RefCell::new([CoroutineId::NONE; 2]),
        hits: Cell::new(0),
        rounds,
    });

    let t = table.clone();
    let start = std::time::Instant::now();
    let result = run(move |engine| {
        for side in 0..2 {
            let t2 = t.clone();
            match engine.spawn(move |engine| t2.play(engine, side)) {
                Ok(id) => t.players.borrow_mut()[side] = id,
                Err(e) => eprintln!("spawn failed: {}", e),
            }
        }
        kinfo!("players {} and {}", t.players.borrow()[0], t.players.borrow()[1]);
    });
    let elapsed = start.elapsed();

    match result {
        Ok(stats) => {
            println!("\n=== Results ===");
            println!("Hits:            {}", table.hits.get());
            println!("Switches:        {}", stats.switches);
            println!("Bytes saved:     {}", stats.bytes_saved);
            println!("Peak image:      {} bytes", stats.peak_image);
            println!("Time:            {:?}", elapsed);
            if stats.switches > 0 {
                println!(
                    "Per switch:      {:.0} ns",
                    elapsed.as_nanos() as f64 / stats.switches as f64
                );
            }
        }
        Err(e) => {
            eprintln!("engine error: {}", e);
            std::process::exit(1);
        }
    }

    println!("\n=== Ping-Pong Complete ===");
}
