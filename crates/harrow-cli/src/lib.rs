#![forbid(unsafe_code)]

//! Command-line interface for harrow.

mod cli;

pub use cli::run;
