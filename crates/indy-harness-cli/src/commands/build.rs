use indy_harness_core::{ReplayOptions, run_replay};
use tracing::info;

use crate::cli::BuildArgs;
use crate::client::{AppContext, CliResult, require, tracking_record};

pub(crate) async fn handle_build(ctx: &AppContext, args: BuildArgs) -> CliResult<()> {
    require("original server", &args.original)?;
    let record = tracking_record(
        ctx,
        &args.original,
        &args.tracking_id,
        args.record_file.as_deref(),
    )
    .await?;

    let target = match args.target.filter(|target| !target.trim().is_empty()) {
        Some(target) => target,
        None => {
            info!(
                original = %args.original,
                "no target server given, replaying against the original server"
            );
            args.original.clone()
        }
    };

    let options = ReplayOptions {
        workers: args.workers,
        fail_fast: args.fail_fast,
        clear_cache: args.clear_cache,
        dry_run: args.dry_run,
        additional_repos: args.additional_repos,
        cache: ctx.cache.clone(),
        ..ReplayOptions::new(args.original, target, args.package_type)
    };
    let report = run_replay(&ctx.client, &record, &options).await?;

    println!(
        "Replayed {} as {}: {} downloads, {} uploads, sealed: {}",
        record.tracking_key.id,
        report.build_name,
        report.downloads.attempted,
        report.uploads.attempted,
        report.sealed
    );
    Ok(())
}
