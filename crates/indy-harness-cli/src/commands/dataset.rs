use indy_harness_core::dataset::run_dataset;

use crate::cli::DatasetArgs;
use crate::client::{AppContext, CliResult, require};

pub(crate) async fn handle_dataset(ctx: &AppContext, args: DatasetArgs) -> CliResult<()> {
    require("PNC base URL", &args.pnc)?;
    require("indy base URL", &args.indy)?;
    require("build id", &args.build_id)?;

    let dir = run_dataset(&ctx.client, &args.pnc, &args.indy, &args.build_id, &args.root).await?;
    println!("Dataset for {} written to {}", args.build_id, dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use anyhow::{Result, anyhow};
    use httpmock::prelude::*;
    use indy_harness_core::dataset::{ALIGN_LOG, BUILD_JSON, DA_JSON, DATASET_DIR, INFO_JSON};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn collects_a_single_build() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/pnc-rest/v2/group-builds/2836");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/pnc-rest/v2/builds/2836");
            then.status(200).json_body(json!({
                "id": "2836",
                "temporaryBuild": false,
                "buildConfigRevision": {"buildType": "MVN"}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/pnc-rest/v2/builds/2836/logs/align");
            then.status(200).body("REST Client returned {org.x:y:1.0}");
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/folo/admin/build-2836/report");
            then.status(200).json_body(json!({"key": {"id": "build-2836"}}));
        });
        let root = TempDir::new()?;
        let ctx = context(&root)?;

        handle_dataset(
            &ctx,
            DatasetArgs {
                pnc: server.base_url(),
                indy: server.base_url(),
                build_id: "2836".into(),
                root: root.path().to_path_buf(),
            },
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        let dir = root.path().join(DATASET_DIR).join("2836");
        for name in [BUILD_JSON, INFO_JSON, ALIGN_LOG, DA_JSON] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_build_id_is_rejected() -> Result<()> {
        let root = TempDir::new()?;
        let ctx = context(&root)?;
        let result = handle_dataset(
            &ctx,
            DatasetArgs {
                pnc: "http://pnc".into(),
                indy: "http://indy".into(),
                build_id: String::new(),
                root: root.path().to_path_buf(),
            },
        )
        .await;
        assert!(matches!(result, Err(crate::client::CliError::Validation(_))));
        Ok(())
    }
}
