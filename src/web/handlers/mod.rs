use std::sync::Arc;

use axum::Router;

use crate::AppContext;

pub mod meetings;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new().nest("/api", meetings::meetings_router(ctx))
}
