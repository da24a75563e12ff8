use axum::{
    http::{header, HeaderValue, Method},
};
use tower_http::cors::CorsLayer;

/// Only the bundled UI, served from the same port, may call the API.
pub fn create_cors_layer(port: u16) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = [
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(60 * 60)) // 1 hour
}
