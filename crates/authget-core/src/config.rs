use crate::error::{AuthError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Ntlm,
}

impl AuthScheme {
    /// Scheme token as it appears in challenge and authorization headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "Basic",
            AuthScheme::Ntlm => "NTLM",
        }
    }

    pub fn matches(&self, token: &str) -> bool {
        token.eq_ignore_ascii_case(self.as_str())
    }
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub domain: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Everything one invocation needs besides the target URL.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub proxy: Option<String>,
    pub timeout_secs: u64,
}

impl ClientConfig {
    /// Validate and build a configuration.
    ///
    /// User and password are always required. A domain selects NTLM, so a
    /// domain that is present but blank is rejected rather than silently
    /// falling back to Basic.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        domain: Option<String>,
        proxy: Option<String>,
    ) -> Result<Self> {
        let user = user.into();
        let password = password.into();

        if user.is_empty() {
            return Err(AuthError::InvalidConfig("a user is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidConfig("a password is required".into()));
        }
        if let Some(d) = &domain {
            if d.trim().is_empty() {
                return Err(AuthError::InvalidConfig(
                    "the domain must not be blank when NTLM is requested".into(),
                ));
            }
        }
        let proxy = match proxy {
            Some(p) if p.trim().is_empty() => {
                return Err(AuthError::InvalidConfig("the proxy URL must not be blank".into()));
            }
            other => other,
        };

        Ok(ClientConfig {
            credentials: Credentials { user, password, domain },
            proxy,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn scheme(&self) -> AuthScheme {
        if self.credentials.domain.is_some() {
            AuthScheme::Ntlm
        } else {
            AuthScheme::Basic
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
