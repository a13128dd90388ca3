use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Encode credentials as an HTTP Basic authorization value.
/// Returns `"Basic <base64(user:password)>"`.
pub fn encode(user: &str, password: &str) -> String {
    let credentials = format!("{}:{}", user, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}
