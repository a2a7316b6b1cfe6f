use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;

use crate::core::error::AppError;
use crate::core::middleware::{cors_headers, CorsHeaders};
use crate::features::media::handlers::{list_media, sign_upload, upload_media};
use crate::features::media::services::MediaService;

/// Answer every method the route does not serve with a JSON 405, then wrap
/// the whole route (OPTIONS included) in the CORS middleware
fn with_cors(
    route: MethodRouter<Arc<MediaService>>,
    allow_origin: &str,
    allow_methods: &'static str,
    not_allowed: &'static str,
) -> MethodRouter<Arc<MediaService>> {
    route
        .fallback(move || async move { AppError::MethodNotAllowed(not_allowed.to_string()) })
        .layer(from_fn_with_state(
            CorsHeaders::new(allow_origin, allow_methods),
            cors_headers,
        ))
}

/// Create routes for the media feature
pub fn routes(
    media_service: Arc<MediaService>,
    cors_allow_origin: &str,
    max_upload_size: usize,
) -> Router {
    Router::new()
        .route(
            "/api/upload",
            with_cors(
                post(upload_media).layer(DefaultBodyLimit::max(max_upload_size)),
                cors_allow_origin,
                "POST, OPTIONS",
                "Only POST is supported",
            ),
        )
        .route(
            "/api/get-photos",
            with_cors(
                get(list_media),
                cors_allow_origin,
                "GET, OPTIONS",
                "Only GET is supported",
            ),
        )
        .route(
            "/api/sign-upload",
            with_cors(
                get(sign_upload),
                cors_allow_origin,
                "GET, OPTIONS",
                "Only GET is supported",
            ),
        )
        .with_state(media_service)
}
