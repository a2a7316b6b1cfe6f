use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

/// Request ID generator using UUID v7 (time-ordered)
#[derive(Clone, Copy)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Custom MakeSpan that includes request_id in the tracing span
#[derive(Clone, Debug)]
pub struct MakeSpanWithRequestId;

impl<B> tower_http::trace::MakeSpan<B> for MakeSpanWithRequestId {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// CORS headers attached to every response of one route
#[derive(Clone, Debug)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl CorsHeaders {
    /// `allow_methods` is the literal header value, e.g. `"GET, OPTIONS"`
    pub fn new(allow_origin: &str, allow_methods: &'static str) -> Self {
        Self {
            allow_origin: HeaderValue::from_str(allow_origin)
                .unwrap_or_else(|_| HeaderValue::from_static("*")),
            allow_methods: HeaderValue::from_static(allow_methods),
        }
    }
}

/// Answers `OPTIONS` with an empty 200 and stamps CORS headers on every
/// other response of the route
pub async fn cors_headers(
    State(cors): State<CorsHeaders>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.allow_origin);
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, cors.allow_methods);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

pub fn basic_auth_middleware(
    valid_credentials: Arc<String>,
) -> impl Fn(
    Request,
    Next,
)
    -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Response>> + Send>>
       + Clone {
    move |req: Request, next: Next| {
        let credentials = valid_credentials.clone();
        Box::pin(async move {
            let auth_header = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|header| header.to_str().ok());

            if let Some(auth_header) = auth_header {
                if let Some(encoded) = auth_header.strip_prefix("Basic ") {
                    if let Ok(decoded) = BASE64_STANDARD.decode(encoded) {
                        if let Ok(creds) = String::from_utf8(decoded) {
                            if creds == *credentials {
                                return Ok(next.run(req).await);
                            }
                        }
                    }
                }
            }

            let response = (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"Swagger UI\"")],
                Body::from("Unauthorized"),
            )
                .into_response();

            Err(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware::from_fn_with_state, routing::get, Router};
    use axum_test::TestServer;

    fn server() -> TestServer {
        let route = get(|| async { "ok" })
            .layer(from_fn_with_state(CorsHeaders::new("*", "GET, OPTIONS"), cors_headers));
        TestServer::new(Router::new().route("/ping", route)).unwrap()
    }

    #[tokio::test]
    async fn test_cors_headers_on_regular_response() {
        let response = server().get("/ping").await;

        response.assert_status_ok();
        response.assert_text("ok");
        assert_eq!(response.header("access-control-allow-origin"), "*");
        assert_eq!(response.header("access-control-allow-methods"), "GET, OPTIONS");
        assert_eq!(response.header("access-control-allow-headers"), "Content-Type");
    }

    #[tokio::test]
    async fn test_options_short_circuits_with_empty_body() {
        let response = server().method(Method::OPTIONS, "/ping").await;

        response.assert_status_ok();
        response.assert_text("");
        assert_eq!(response.header("access-control-allow-origin"), "*");
    }

    #[test]
    fn test_invalid_origin_falls_back_to_wildcard() {
        let cors = CorsHeaders::new("bad\norigin", "GET");
        assert_eq!(cors.allow_origin, "*");
    }
}
