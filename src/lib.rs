//! # tagship
//!
//! A read-only CommonJS/npm-compatible package registry backed by a
//! directory of bare git repositories, one repository per package.
//! Tagged commits (`refs/tags/v*`) are treated as immutable releases:
//! version metadata is synthesized from each tagged tree's
//! `package.json`, source trees are streamed as gzipped tarballs on
//! demand, and packages that are not hosted locally are proxied from an
//! upstream public registry.
//!
//! ## Key modules
//!
//! - [`store`]: bare repositories on disk, object peeling
//! - [`archive`]: deterministic tar streaming of tagged trees
//! - [`package`]: package root documents with `dist` injection
//! - [`sha_cache`]: bounded cache of archive digests
//! - [`upstream`]: pass-through proxying to the fallback registry
//! - [`server`]: route surface and lifecycle

pub mod archive;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod package;
pub mod server;
pub mod sha_cache;
pub mod state;
pub mod stats;
pub mod store;
pub mod upstream;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use state::{AppState, SharedState};
