use anyhow::anyhow;
use indy_harness_config::PackageType;
use indy_harness_core::folo::fetch_record;
use indy_harness_core::promote::DEFAULT_PROMOTE_TARGET;
use indy_harness_core::rewrite::rule_for;
use indy_harness_core::{PromoteOptions, promote_build, validate_server};
use tracing::info;

use crate::cli::PromoteArgs;
use crate::client::{AppContext, CliError, CliResult, require};

/// Expand a bare repository name to a hosted store key.
fn target_store(package_type: PackageType, target: Option<&str>) -> String {
    match target.map(str::trim).filter(|target| !target.is_empty()) {
        Some(key) if key.contains(':') => key.to_string(),
        Some(name) => format!("{}:hosted:{name}", package_type.as_str()),
        None => format!("{}:hosted:{DEFAULT_PROMOTE_TARGET}", package_type.as_str()),
    }
}

pub(crate) async fn handle_promote(ctx: &AppContext, args: PromoteArgs) -> CliResult<()> {
    require("tracking id", &args.tracking_id)?;
    let server = validate_server(&ctx.client, &args.target).await?;
    let record = fetch_record(&ctx.client, &server.base_url, &args.tracking_id).await?;

    let options = PromoteOptions {
        source: args.source,
        target: target_store(args.package_type, args.promote_target.as_deref()),
        new_version: args.new_version,
        dry_run: args.dry_run,
    };
    info!(record = %args.tracking_id, target = %options.target, "promoting tracked uploads");
    let response = promote_build(
        &ctx.client,
        &server.base_url,
        &record,
        options,
        rule_for(args.package_type),
    )
    .await?;

    if !response.success {
        return Err(CliError::failure(anyhow!(
            "promotion of {} failed with status {}: {}",
            args.tracking_id,
            response.status,
            response.body
        )));
    }
    println!("{}", response.body);
    Ok(())
}
