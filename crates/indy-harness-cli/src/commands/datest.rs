use indy_harness_core::datest::run_datest;
use tracing::warn;

use crate::cli::DatestArgs;
use crate::client::{AppContext, CliError, CliResult, require};

pub(crate) async fn handle_datest(ctx: &AppContext, args: DatestArgs) -> CliResult<()> {
    require("DA group", &args.da_group)?;
    if !args.report_dir.is_dir() {
        return Err(CliError::validation(format!(
            "report directory {} does not exist",
            args.report_dir.display()
        )));
    }

    let outcome = run_datest(
        &ctx.client,
        &args.target,
        &args.da_group,
        &args.report_dir,
        args.workers,
    )
    .await?;
    if !outcome.is_success() {
        warn!(
            failed = outcome.failed,
            attempted = outcome.attempted,
            "some metadata lookups failed"
        );
    }
    println!(
        "Looked up {} metadata files through {}: {} failed",
        outcome.attempted, args.da_group, outcome.failed
    );
    Ok(())
}
