use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate it against the auth service
    let user = match app_state.auth.validate(&token).await {
        Ok(user) => user,
        Err(e) => {
            error!("Token validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    info!("Token validated successfully for user {}", user.user_id);

    // 3. Expose the caller identity to downstream handlers
    req.extensions_mut().insert(user);

    // Token is valid, proceed to next middleware/handler
    Ok(next.run(req).await)
}
