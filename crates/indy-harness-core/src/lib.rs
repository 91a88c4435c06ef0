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

//! Build replay and server verification workflows for the Indy artifact
//! repository.
//!
//! Layout:
//! - `model.rs`, `rewrite.rs`: tracking records, session names and URL/path
//!   rewriting.
//! - `http.rs`, `auth.rs`, `server.rs`: the HTTP collaborator, bearer tokens
//!   and server validation.
//! - `templates.rs`, `provision.rs`: repository definitions and the session
//!   namespace lifecycle.
//! - `batch.rs`, `files.rs`: the bounded worker pool and checksum utilities.
//! - `replay.rs`, `folo.rs`, `promote.rs`: replay, tracking record handling
//!   and promotion.
//! - `event.rs`, `integration.rs`, `datest.rs`, `dataset.rs`, `depgraph.rs`,
//!   `git.rs`: the supplementary workflows.

pub mod auth;
pub mod batch;
pub mod dataset;
pub mod datest;
pub mod depgraph;
pub mod error;
pub mod event;
pub mod files;
pub mod folo;
pub mod git;
pub mod http;
pub mod integration;
pub mod model;
pub mod promote;
pub mod provision;
pub mod replay;
pub mod rewrite;
pub mod server;
pub mod templates;

pub use auth::{Authenticator, KeycloakAuthenticator};
pub use batch::{BatchOutcome, BatchPolicy, run_batch};
pub use error::{HarnessError, HarnessResult};
pub use event::{EventOptions, EventReport, run_event};
pub use http::{HttpResponse, IndyClient};
pub use integration::{IntegrationOptions, IntegrationReport, run_integration};
pub use model::{BuildName, TrackedContent, TrackedContentEntry};
pub use promote::{PromoteOptions, promote_build};
pub use provision::Provisioner;
pub use replay::{ReplayOptions, ReplayReport, run_replay};
pub use server::{IndyServer, validate_server};
