use std::time::Duration;

use indy_harness_core::{IntegrationOptions, run_integration};

use crate::cli::IntegrationArgs;
use crate::client::{AppContext, CliResult, require};

pub(crate) async fn handle_integration(ctx: &AppContext, args: IntegrationArgs) -> CliResult<()> {
    require("dataset repository", &args.dataset_repo)?;
    require("build id", &args.build_id)?;

    let defaults = IntegrationOptions::new(args.target, args.dataset_repo, args.build_id);
    let options = IntegrationOptions {
        workers: args.workers,
        promote_target: args.promote_target.filter(|target| !target.trim().is_empty()),
        meta_check_repo: args.meta_check_repo,
        clear_cache: args.clear_cache,
        dry_run: args.dry_run,
        keep_alive: args.keep_alive,
        settle_delay: Duration::from_secs(args.settle_secs),
        workspace: args.workspace.unwrap_or_else(|| defaults.workspace.clone()),
        cache: ctx.cache.clone(),
        ..defaults
    };
    let report = run_integration(&ctx.client, &options).await?;

    println!(
        "Integration test of {} finished as {}: {} uploads, {} metadata files checked, \
         cleaned up: {}",
        options.build_id,
        report.replay.build_name,
        report.replay.uploads.attempted,
        report.metadata_files.len(),
        report.cleaned_up
    );
    Ok(())
}
