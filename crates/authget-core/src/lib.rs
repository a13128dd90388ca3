pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod logger;
pub mod negotiate;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{AuthScheme, ClientConfig};
pub use error::{AuthError, Result};
pub use logger::ExchangeLogger;
pub use negotiate::{authenticate, AuthState, Negotiator, Verdict};
pub use transport::{TcpTransport, Transport};
