//! vipgrid-api — membership API for a running daemon.
//!
//! The daemon holds the node store's file lock for its whole lifetime, so
//! every other process reaches the node group through this API instead of
//! opening the store.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | List nodes with their addresses |
//! | POST | `/api/v1/nodes` | Register a node (scale-out) |
//! | GET | `/api/v1/nodes/{id}` | Get one node |
//! | DELETE | `/api/v1/nodes/{id}` | Remove a node (scale-in) |

pub mod client;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use vipgrid_state::NodeStore;

pub use client::{ApiClient, ClientError, ClientResult};
pub use handlers::RegisterRequest;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: NodeStore,
}

/// Build the API router over `store`.
pub fn build_router(store: NodeStore) -> Router {
    let api_routes = Router::new()
        .route("/nodes", get(handlers::list_nodes).post(handlers::register_node))
        .route("/nodes/{id}", get(handlers::get_node).delete(handlers::remove_node))
        .with_state(ApiState { store });

    Router::new().nest("/api/v1", api_routes)
}
