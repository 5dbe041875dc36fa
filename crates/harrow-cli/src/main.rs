#![forbid(unsafe_code)]

//! Thin entrypoint that delegates to the library for CLI execution.

#[tokio::main]
async fn main() {
    let exit_code = harrow_cli::run().await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
