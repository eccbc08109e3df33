//! MIME type constants for HTTP responses and encoded frames.

pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const JPEG: &str = "image/jpeg";
}
