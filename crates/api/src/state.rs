use std::sync::Arc;

use crate::config::ServerConfig;
use crate::control::QueueControl;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool is reference counted and the config sits
/// behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: genq_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Queue operations over this state's pool.
    pub fn queue(&self) -> QueueControl<'_> {
        QueueControl::new(&self.pool)
    }
}
