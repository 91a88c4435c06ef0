#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Environment-driven settings for the Indy replay harness.
//!
//! Layout: `model.rs` (typed settings), `validate.rs` (parsing helpers shared
//! with the CLI), `loader.rs` (environment lookup), `error.rs` (`ConfigError`).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_BUILD_PROC_NUM, ENV_BUILD_TYPE, ENV_KEYCLOAK_CLIENT_CREDENTIAL, ENV_KEYCLOAK_CLIENT_ID,
    ENV_KEYCLOAK_REALM, ENV_KEYCLOAK_SERVER_URL, ENV_TARGET, ENV_TEST_MOUNT_PATH,
};
pub use model::{CacheLayout, EnvironmentSettings, KeycloakSettings, PackageType};
pub use validate::{parse_package_type, parse_workers};
