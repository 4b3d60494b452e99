//! # dbal-core — shared types for the DBAL service
//!
//! This crate defines the **pure core** of the database abstraction layer:
//! errors, route parsing, connection-URL validation, client configuration,
//! and the metadata cache. It has no HTTP or driver dependencies.
//!
//! Concrete pieces live in sibling crates:
//! - `dbal-adapters` — the `Adapter` trait, factory, and built-in backends
//! - `dbal-blob` — the S3-style blob storage facade and backends
//! - `dbal-daemon` — the HTTP daemon wiring everything together
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Error`] | Closed error union with wire codes and HTTP statuses |
//! | [`Route`] | Parsed `/{tenant}/{package}/{entity}[/{id}[/{action}]]` path |
//! | [`ClientConfig`] | Adapter configuration validated before connecting |
//! | [`MetadataCache`] | TTL cache for entity names and schemas |
//! | [`ListOptions`] / [`ListResult`] | Query shape shared with adapters |

pub mod cache;
pub mod config;
pub mod error;
pub mod route;
pub mod types;
pub mod validator;

pub use cache::MetadataCache;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use route::{parse_route, Route};
pub use types::{ListOptions, ListResult};
pub use validator::{validate_url, ValidatedUrl};
