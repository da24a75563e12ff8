pub mod cors;
pub mod security;
pub mod validation;

pub use cors::create_cors_layer;
pub use security::security_headers;
