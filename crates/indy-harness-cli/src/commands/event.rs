use std::time::Duration;

use indy_harness_core::{EventOptions, run_event};
use tracing::info;

use crate::cli::EventArgs;
use crate::client::{AppContext, CliResult, require, tracking_record};

pub(crate) async fn handle_event(ctx: &AppContext, args: EventArgs) -> CliResult<()> {
    require("original server", &args.original)?;
    let record = tracking_record(ctx, &args.original, &args.tracking_id, None).await?;

    let target = match args.target.filter(|target| !target.trim().is_empty()) {
        Some(target) => target,
        None => {
            info!(
                original = %args.original,
                "no target server given, checking events on the original server"
            );
            args.original.clone()
        }
    };
    let options = EventOptions {
        workers: args.workers,
        clear_cache: !args.keep_cache,
        dry_run: args.dry_run,
        additional_repos: args.additional_repos,
        cache: ctx.cache.clone(),
        settle_delay: Duration::from_secs(args.settle_secs),
        ..EventOptions::new(args.original, target, args.package_type)
    };
    let report = run_event(&ctx.client, &record, &options).await?;

    println!(
        "Event checks for {} passed as {}: {} uploads, sealed: {}",
        record.tracking_key.id, report.build_name, report.uploads.attempted, report.sealed
    );
    Ok(())
}
