//! OpenAPI document for the session API, served as JSON.

use axum::Json;
use utoipa::OpenApi;

use crate::handlers::admin::sessions::AdminSessionResponse;
use crate::handlers::sessions::SessionResponse;
use crate::models::user::{LoginRequest, LoginResponse, RefreshResponse, UserResponse};
use crate::services::session::SessionStats;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "advisory-backend session API",
        description = "Session and token management: login, refresh-token \
            rotation, session validation, and administrative revocation."
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        RefreshResponse,
        UserResponse,
        SessionResponse,
        AdminSessionResponse,
        SessionStats,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
