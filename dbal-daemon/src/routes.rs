//! Route catalog.
//!
//! Literal segments (`/_batch`, `/blob`, `/_stats`, `/_bulk/*`) are matched
//! ahead of the `/{tenant}/{package}/{entity}` captures by the router, so
//! the wildcard entity surface never shadows the specialized endpoints.
//! Every response leaves with `Server: DBAL/1.0.0`, and panics escaping a
//! handler become a generic 500 envelope.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use http::header::{HeaderValue, SERVER};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::envelope;
use crate::handlers::{admin, batch, blob, bulk, entity, health, rpc, schema};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Liveness and metadata
        .route("/health", get(health::health).options(health::health))
        .route("/healthz", get(health::health).options(health::health))
        .route("/version", get(health::version).options(health::version))
        .route("/api/version", get(health::version).options(health::version))
        .route("/status", get(health::status).options(health::status))
        .route("/api/status", get(health::status).options(health::status))
        // Schema management and legacy RPC
        .route("/api/dbal/schema", get(schema::get).post(schema::post))
        .route("/api/dbal", post(rpc::handle))
        // Admin surface (bearer-gated)
        .route(
            "/admin/config",
            get(admin::config).post(admin::config).options(admin::config),
        )
        .route(
            "/admin/adapters",
            get(admin::adapters).options(admin::adapters),
        )
        .route(
            "/admin/test-connection",
            post(admin::test_connection).options(admin::test_connection),
        )
        .route("/admin/seed", post(admin::seed).options(admin::seed))
        // Transactional bulk and batch
        .route("/{tenant}/{package}/_batch", post(batch::handle))
        .route("/{tenant}/{package}/{entity}/_bulk/create", post(bulk::create))
        .route("/{tenant}/{package}/{entity}/_bulk/update", post(bulk::update))
        .route("/{tenant}/{package}/{entity}/_bulk/delete", post(bulk::delete))
        // Blob storage
        .route("/{tenant}/{package}/blob", get(blob::list).options(blob::list))
        .route(
            "/{tenant}/{package}/blob/_stats",
            get(blob::stats).options(blob::stats),
        )
        .route(
            "/{tenant}/{package}/blob/{key}",
            get(blob::item)
                .put(blob::item)
                .delete(blob::item)
                .options(blob::item),
        )
        .route(
            "/{tenant}/{package}/blob/{key}/{action}",
            get(blob::action).post(blob::action).options(blob::action),
        )
        // Generic entity surface
        .route(
            "/{tenant}/{package}/{entity}",
            get(entity::collection).post(entity::collection),
        )
        .route(
            "/{tenant}/{package}/{entity}/{id}",
            get(entity::item)
                .post(entity::item)
                .put(entity::item)
                .patch(entity::item)
                .delete(entity::item),
        )
        .route(
            "/{tenant}/{package}/{entity}/{id}/{action}",
            get(entity::action).post(entity::action),
        )
        // Blob uploads and the RPC surface accept large payloads; the RPC
        // handler enforces its own 10 MB ceiling below this one.
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .layer(CatchPanicLayer::custom(|_: Box<dyn std::any::Any + Send>| {
            envelope::failure(http::StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }))
        .layer(SetResponseHeaderLayer::overriding(
            SERVER,
            HeaderValue::from_static(envelope::SERVER_HEADER),
        ))
        .with_state(state)
}
