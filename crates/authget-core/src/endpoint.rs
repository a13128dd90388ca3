/// Endpoint resolution.
///
/// Turns the target URL (and optional proxy URL) into the socket address to
/// dial, the `Host` header value and the request target. With a proxy the
/// connection goes to the proxy while `Host` and the path still name the
/// origin, and a plain relative GET is issued (no CONNECT, no absolute form).

use crate::error::{AuthError, Result};
use crate::headers::HeaderMode;
use tracing::warn;
use url::{Host, Url};

pub const DEFAULT_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    /// Host in socket form (IPv6 without brackets).
    pub host: String,
    pub port: u16,
    /// Host in header form, with `:port` when the URL named a non-default port.
    pub authority: String,
    /// Path plus `?query`; never empty.
    pub path: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: String| AuthError::InvalidUrl {
            url: raw.to_string(),
            message,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty URL".into()));
        }

        let url = if has_scheme(trimmed) {
            Url::parse(trimmed)
        } else {
            // No scheme: treat it as a network-path reference over plain HTTP.
            Url::parse("http://localhost/").and_then(|base| base.join(&format!("//{trimmed}")))
        }
        .map_err(|e| invalid(e.to_string()))?;

        let (host, header_host) = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => (d.to_string(), d.to_string()),
            Some(Host::Ipv4(addr)) => (addr.to_string(), addr.to_string()),
            Some(Host::Ipv6(addr)) => (addr.to_string(), format!("[{addr}]")),
            _ => return Err(invalid("missing host".into())),
        };

        if url.scheme() == "https" {
            warn!(url = %trimmed, "TLS is not supported; speaking plain HTTP to the target port");
        }

        let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
        let authority = match url.port() {
            Some(p) => format!("{header_host}:{p}"),
            None => header_host,
        };

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Endpoint {
            scheme: url.scheme().to_string(),
            host,
            port,
            authority,
            path,
        })
    }
}

/// A `scheme://` prefix counts only before the first `/`, `?` or `#`, so a
/// scheme-less URL may still carry `://` in its path or query.
fn has_scheme(url: &str) -> bool {
    match url.find("://") {
        Some(i) => !url[..i].contains(['/', '?', '#']),
        None => false,
    }
}

/// Origin plus optional proxy for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub origin: Endpoint,
    pub proxy: Option<Endpoint>,
}

impl Target {
    pub fn resolve(url: &str, proxy: Option<&str>) -> Result<Self> {
        let origin = Endpoint::parse(url)?;
        let proxy = proxy.map(Endpoint::parse).transpose()?;
        Ok(Target { origin, proxy })
    }

    fn connect_endpoint(&self) -> &Endpoint {
        self.proxy.as_ref().unwrap_or(&self.origin)
    }

    pub fn connect_host(&self) -> &str {
        &self.connect_endpoint().host
    }

    pub fn connect_port(&self) -> u16 {
        self.connect_endpoint().port
    }

    /// `host:port` of the socket actually dialled, for logs.
    pub fn connect_addr(&self) -> String {
        let ep = self.connect_endpoint();
        if ep.host.contains(':') {
            format!("[{}]:{}", ep.host, ep.port)
        } else {
            format!("{}:{}", ep.host, ep.port)
        }
    }

    pub fn host_header(&self) -> &str {
        &self.origin.authority
    }

    pub fn request_target(&self) -> &str {
        &self.origin.path
    }

    pub fn using_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn header_mode(&self) -> HeaderMode {
        if self.using_proxy() {
            HeaderMode::Proxy
        } else {
            HeaderMode::Origin
        }
    }
}
