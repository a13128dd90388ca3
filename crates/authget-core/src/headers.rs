/// Request header sets and challenge header parsing.

use crate::config::AuthScheme;
use crate::error::{AuthError, Result};

pub const HOST: &str = "Host";

/// Which header pair carries authentication: origin or proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    Origin,
    Proxy,
}

impl HeaderMode {
    pub fn authenticate_header(&self) -> &'static str {
        match self {
            HeaderMode::Origin => "WWW-Authenticate",
            HeaderMode::Proxy => "Proxy-Authenticate",
        }
    }

    pub fn authorization_header(&self) -> &'static str {
        match self {
            HeaderMode::Origin => "Authorization",
            HeaderMode::Proxy => "Proxy-Authorization",
        }
    }
}

// ---------------------------------------------------------------------------
// Outgoing headers
// ---------------------------------------------------------------------------

/// Headers for a single request. Built fresh for every connection and never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new(host: impl Into<String>) -> Self {
        RequestHeaders {
            entries: vec![(HOST.to_string(), host.into())],
        }
    }

    /// Returns a copy carrying the authorization header for `mode`.
    pub fn with_authorization(mut self, mode: HeaderMode, value: impl Into<String>) -> Self {
        let name = mode.authorization_header();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.push((name.to_string(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_authorization(&self) -> bool {
        [HeaderMode::Origin, HeaderMode::Proxy]
            .iter()
            .any(|m| self.get(m.authorization_header()).is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Challenge headers
// ---------------------------------------------------------------------------

/// A parsed `*-Authenticate` value: `"<Scheme> [<token>]"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge<'a> {
    pub scheme: &'a str,
    pub token: Option<&'a str>,
}

impl<'a> Challenge<'a> {
    /// Splits on the first space. Returns `None` for a blank value.
    pub fn parse(value: &'a str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.split_once(' ') {
            Some((scheme, rest)) => {
                let rest = rest.trim();
                Some(Challenge {
                    scheme,
                    token: (!rest.is_empty()).then_some(rest),
                })
            }
            None => Some(Challenge { scheme: value, token: None }),
        }
    }
}

/// Pick the first challenge offering `scheme` among every instance of the
/// authenticate header.
pub fn select_challenge<'a>(values: &[&'a str], scheme: AuthScheme) -> Result<Challenge<'a>> {
    let challenges: Vec<Challenge<'a>> = values.iter().copied().filter_map(Challenge::parse).collect();
    if challenges.is_empty() {
        return Err(AuthError::protocol("missing challenge header"));
    }

    challenges
        .iter()
        .copied()
        .find(|c| scheme.matches(c.scheme))
        .ok_or_else(|| AuthError::UnsupportedScheme {
            expected: scheme.to_string(),
            offered: challenges
                .iter()
                .map(|c| c.scheme)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_pairs() {
        assert_eq!(HeaderMode::Origin.authenticate_header(), "WWW-Authenticate");
        assert_eq!(HeaderMode::Origin.authorization_header(), "Authorization");
        assert_eq!(HeaderMode::Proxy.authenticate_header(), "Proxy-Authenticate");
        assert_eq!(HeaderMode::Proxy.authorization_header(), "Proxy-Authorization");
    }

    #[test]
    fn test_builder_is_fresh_per_request() {
        let probe = RequestHeaders::new("origin:8080");
        assert_eq!(probe.names(), vec!["Host"]);
        assert!(!probe.has_authorization());

        let authed = probe.clone().with_authorization(HeaderMode::Proxy, "Basic abc");
        assert_eq!(authed.names(), vec!["Host", "Proxy-Authorization"]);
        assert_eq!(authed.get("proxy-authorization"), Some("Basic abc"));
        assert!(authed.get("Authorization").is_none());
        assert!(authed.has_authorization());

        // The probe headers are untouched.
        assert_eq!(probe.names(), vec!["Host"]);
    }

    #[test]
    fn test_authorization_replaced_not_duplicated() {
        let headers = RequestHeaders::new("h")
            .with_authorization(HeaderMode::Origin, "NTLM one")
            .with_authorization(HeaderMode::Origin, "NTLM two");
        assert_eq!(headers.names(), vec!["Host", "Authorization"]);
        assert_eq!(headers.get("Authorization"), Some("NTLM two"));
    }

    #[test]
    fn test_parse_challenge() {
        let c = Challenge::parse("Basic realm=\"x\"").unwrap();
        assert_eq!(c.scheme, "Basic");
        assert_eq!(c.token, Some("realm=\"x\""));

        let c = Challenge::parse("NTLM").unwrap();
        assert_eq!(c.scheme, "NTLM");
        assert_eq!(c.token, None);

        let c = Challenge::parse("NTLM TlRMTVNTUAACAAAA").unwrap();
        assert_eq!(c.token, Some("TlRMTVNTUAACAAAA"));

        assert!(Challenge::parse("   ").is_none());
    }

    #[test]
    fn test_select_among_repeated_headers() {
        let values = ["Negotiate", "NTLM"];
        let c = select_challenge(&values, AuthScheme::Ntlm).unwrap();
        assert_eq!(c.scheme, "NTLM");

        let values = ["basic realm=\"corp\""];
        assert!(select_challenge(&values, AuthScheme::Basic).is_ok());
    }

    #[test]
    fn test_select_unsupported() {
        let values = ["Negotiate", "Digest realm=\"x\""];
        match select_challenge(&values, AuthScheme::Basic) {
            Err(AuthError::UnsupportedScheme { expected, offered }) => {
                assert_eq!(expected, "Basic");
                assert_eq!(offered, "Negotiate, Digest");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_select_missing_header() {
        assert!(matches!(
            select_challenge(&[], AuthScheme::Ntlm),
            Err(AuthError::ProtocolViolation(_))
        ));
    }
}
