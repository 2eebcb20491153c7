/*
 * myspin.rs - A handy program for testing minish
 *
 * usage: myspin <ms>
 * Sleeps for <ms> milliseconds in 10ms chunks, then exits 0.
 */

use std::env;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <ms>", args[0]);
        process::exit(0);
    }

    let ms = args[1].parse::<u64>().unwrap_or_else(|_| {
        eprintln!("Error: <ms> must be a non-negative integer");
        process::exit(1);
    });

    let deadline = Instant::now() + Duration::from_millis(ms);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    process::exit(0);
}
