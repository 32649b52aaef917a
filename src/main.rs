//! lunet-rs CLI.
//!
//! - `lunet-rs run` - startup sync, then keep the ledger current
//! - `lunet-rs sync | add-user | remove-user` - provisioning
//! - `lunet-rs traffic | online | summary | totals | reset` - telemetry

use std::process::ExitCode;

use clap::Parser;
use lunet_agent::AgentArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = AgentArgs::parse();

    match lunet_agent::cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {} ({})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}
