//! uxpal CLI binary
//!
//! Minimal entrypoint; all logic is in the library.

fn main() {
    // cli::run() handles all output including errors
    if let Err(code) = uxpal::cli::run() {
        std::process::exit(code.as_i32());
    }
}
