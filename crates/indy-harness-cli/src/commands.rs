//! Handlers for each harness workflow.

pub(crate) mod build;
pub(crate) mod dataset;
pub(crate) mod datest;
pub(crate) mod event;
pub(crate) mod integration;
pub(crate) mod promote;
