//! Logging initialization and error-report installation shared by
//! `radiome`'s CLI entry point (§10). Everything here is meant to be called
//! exactly once, from the binary crate's `main` — library crates never
//! install a global subscriber or panic hook themselves.

mod logging;

pub use logging::{init_logging, install_error_handling, LoggingFormat, LoggingLevel};
