//! # dbal-daemon — the DBAL HTTP daemon
//!
//! One process fronts one active storage backend and exposes:
//! - generic entity CRUD and listing under `/{tenant}/{package}/{entity}`
//! - transactional single-entity bulk (`/_bulk/*`) and multi-entity batch
//!   (`/_batch`) operations
//! - an S3-style blob surface under `/{tenant}/{package}/blob`
//! - bearer-gated admin endpoints for runtime backend switching, seeding,
//!   and schema migration management
//! - the legacy JSON RPC surface at `/api/dbal`
//!
//! The daemon owns the active adapter, the metadata cache, the rate
//! limiters, and the blob backend; request handlers borrow them through
//! [`state::AppState`].

pub mod config;
pub mod envelope;
pub mod handlers;
pub mod limit;
pub mod routes;
pub mod schema_registry;
pub mod seed;
pub mod state;

pub use config::{DaemonConfig, ServiceConfig};
pub use routes::build_router;
pub use state::AppState;

pub const SERVICE_VERSION: &str = "1.0.0";
