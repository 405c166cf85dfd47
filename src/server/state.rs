//! Shared server state

use crate::core::router::Router;
use std::sync::Arc;

/// State handed to every handler.
pub struct AppState {
    pub router: Arc<Router>,
}
