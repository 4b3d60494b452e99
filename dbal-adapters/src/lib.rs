//! # dbal-adapters — pluggable storage backends
//!
//! Defines the uniform capability set every backend implements
//! ([`Adapter`]), the factory that maps connection URLs onto backends, and
//! the [`Client`] facade the daemon talks to.
//!
//! Built-in backends:
//! - [`MemoryAdapter`] — in-process document store with snapshot
//!   transactions; backs tests and sandboxed clients.
//! - [`SqlAdapter`] — sqlx-based SQL backend covering `sqlite`,
//!   `postgres`, `mysql`, and their wire-compatible relatives
//!   (`cockroachdb`, `tidb`).
//!
//! The remaining backend tags of the closed set validate their URLs here
//! but construct only when their driver crates are linked in; see
//! [`factory::create_from_type`].

pub mod adapter;
pub mod client;
pub mod factory;
pub mod memory;
pub mod query;
pub mod sql;

pub use adapter::Adapter;
pub use client::Client;
pub use memory::MemoryAdapter;
pub use sql::SqlAdapter;
