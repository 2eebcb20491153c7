/*
 * myint.rs - Another handy routine for testing minish
 *
 * usage: myint <ms>
 * Sleeps for <ms> milliseconds and sends SIGINT to itself.
 */

use nix::sys::signal::{self, Signal};
use std::env;
use std::process;
use std::thread;
use std::time::Duration;

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

    thread::sleep(Duration::from_millis(ms));

    if let Err(err) = signal::raise(Signal::SIGINT) {
        eprintln!("raise (int) error: {}", err);
    }

    // Only reached if SIGINT was caught or ignored.
    process::exit(2);
}
