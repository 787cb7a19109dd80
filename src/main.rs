//! shepherd CLI binary
//!
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    // cli::run() prints everything including errors; main only maps to the process exit
    if let Err(code) = shepherd::cli::run() {
        std::process::exit(code.as_i32());
    }
}
