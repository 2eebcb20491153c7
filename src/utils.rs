use nix::errno::Errno;
use std::process;

pub fn print_usage() -> ! {
    println!("Usage: minish [-hvp] [-c config]");
    println!("   -h          Print this help message");
    println!("   -v          Enable verbose (debug) logging");
    println!("   -p          Do not print a command prompt");
    println!("   -c config   Read configuration from this file");
    process::exit(1);
}

/// Repeats a system call for as long as it fails with EINTR.
pub fn retry_eintr<T, F>(mut f: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}
