//! Binary entrypoint for the harness CLI.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = indy_harness_cli::run().await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
