/*
 * Responsibility
 * - v1 URL structure
 * - /health stays outside authentication; everything else goes through access middleware
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::v1::handlers::{fs, health::health, tools, whoami};
use crate::middleware::auth::access;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/whoami", get(whoami::whoami))
        .route("/tenant", get(whoami::tenant))
        .route("/fs", get(fs::read_root))
        .route(
            "/fs/{*path}",
            get(fs::read).put(fs::write).delete(fs::delete),
        )
        .route("/tools/{tool}/check", post(tools::check_tool));

    Router::new()
        .route("/health", get(health))
        .merge(access::apply(protected, state))
}
