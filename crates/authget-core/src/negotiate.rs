/// Authentication orchestration.
///
/// Probes the target, checks the offered scheme, then either replays the
/// request with Basic credentials or drives the two NTLM rounds. Every request
/// goes out on its own connection with a freshly built header set, and any
/// unexpected status or malformed challenge ends the flow.

use crate::auth::{basic, ntlm, NtlmClient, NtlmCodec};
use crate::config::{AuthScheme, ClientConfig};
use crate::endpoint::Target;
use crate::error::{AuthError, Result};
use crate::headers::{select_challenge, Challenge, RequestHeaders};
use crate::logger::{ExchangeLogger, ExchangeRecord, Phase};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use std::time::Instant;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// State and verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Initial,
    Probed,
    Challenged,
    Round1Done,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The probe succeeded without credentials.
    NotRequired,
    Authenticated,
    /// The probe answered below 400 but neither 200 nor a challenge.
    Inconclusive { status: u16 },
    /// Credentials were sent and refused.
    Rejected { status: u16, reason: String },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::NotRequired | Verdict::Authenticated)
    }
}

enum Probe {
    Done(Verdict),
    Challenged(HttpResponse),
}

// ---------------------------------------------------------------------------
// Negotiator
// ---------------------------------------------------------------------------

pub struct Negotiator<'a> {
    transport: &'a dyn Transport,
    target: &'a Target,
    logger: Option<&'a ExchangeLogger>,
    state: AuthState,
    requests_sent: usize,
}

impl<'a> Negotiator<'a> {
    pub fn new(transport: &'a dyn Transport, target: &'a Target) -> Self {
        Negotiator {
            transport,
            target,
            logger: None,
            state: AuthState::Initial,
            requests_sent: 0,
        }
    }

    pub fn with_logger(mut self, logger: &'a ExchangeLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn requests_sent(&self) -> usize {
        self.requests_sent
    }

    pub async fn basic(&mut self, user: &str, password: &str) -> Result<Verdict> {
        let result = self.run_basic(user, password).await;
        self.finish(result)
    }

    pub async fn ntlm<C: NtlmCodec>(&mut self, codec: &mut C) -> Result<Verdict> {
        let result = self.run_ntlm(codec).await;
        self.finish(result)
    }

    async fn run_basic(&mut self, user: &str, password: &str) -> Result<Verdict> {
        let challenged = match self.probe().await? {
            Probe::Done(verdict) => return Ok(verdict),
            Probe::Challenged(response) => response,
        };
        self.expect_scheme(&challenged, AuthScheme::Basic)?;

        let response = self
            .send(Phase::Credentials, Some(basic::encode(user, password)))
            .await?;
        if response.status < 400 {
            Ok(Verdict::Authenticated)
        } else {
            warn!(
                status = response.status,
                reason = %response.reason,
                "failed authentication for HTTP request"
            );
            Ok(Verdict::Rejected {
                status: response.status,
                reason: response.reason,
            })
        }
    }

    async fn run_ntlm<C: NtlmCodec>(&mut self, codec: &mut C) -> Result<Verdict> {
        let challenged = match self.probe().await? {
            Probe::Done(verdict) => return Ok(verdict),
            Probe::Challenged(response) => response,
        };
        self.expect_scheme(&challenged, AuthScheme::Ntlm)?;

        // Round 1: negotiate. NTLM over HTTP always takes two challenge
        // rounds, so anything but another 401/407 is a violation.
        let negotiate = codec.negotiate();
        let response = self
            .send(Phase::Negotiate, Some(ntlm::header_value(&negotiate)))
            .await?;
        if !matches!(response.status, 401 | 407) {
            return Err(AuthError::protocol(format!(
                "first round failed: {} {}",
                response.status, response.reason
            )));
        }

        let values = response.header_values(self.target.header_mode().authenticate_header());
        let challenge = select_challenge(&values, AuthScheme::Ntlm).map_err(|e| match e {
            AuthError::UnsupportedScheme { offered, .. } => {
                AuthError::protocol(format!("round-one challenge is not NTLM: {offered}"))
            }
            other => other,
        })?;
        let token = challenge
            .token
            .ok_or_else(|| AuthError::protocol("NTLM challenge header carries no message"))?;
        codec.parse_challenge(&ntlm::decode_token(token)?)?;
        self.advance(AuthState::Round1Done);

        // Round 2: authenticate.
        let authenticate = codec.authenticate()?;
        let response = self
            .send(Phase::Authenticate, Some(ntlm::header_value(&authenticate)))
            .await?;
        if response.status >= 400 {
            return Err(AuthError::protocol(format!(
                "second round failed: {} {}",
                response.status, response.reason
            )));
        }
        Ok(Verdict::Authenticated)
    }

    /// Unauthenticated first request. Returns early verdicts for 200 and other
    /// sub-400 answers; 401/407 continue the flow.
    async fn probe(&mut self) -> Result<Probe> {
        let response = self.send(Phase::Probe, None).await?;
        self.advance(AuthState::Probed);

        match response.status {
            200 => {
                info!("no authentication required");
                Ok(Probe::Done(Verdict::NotRequired))
            }
            status if status < 400 => {
                warn!(status, reason = %response.reason, "probe answered without a challenge");
                Ok(Probe::Done(Verdict::Inconclusive { status }))
            }
            401 | 407 => {
                info!(status = response.status, "authentication required");
                Ok(Probe::Challenged(response))
            }
            status => Err(AuthError::UnexpectedStatus {
                status,
                reason: response.reason,
            }),
        }
    }

    fn expect_scheme<'r>(&mut self, response: &'r HttpResponse, scheme: AuthScheme) -> Result<Challenge<'r>> {
        let values = response.header_values(self.target.header_mode().authenticate_header());
        let challenge = select_challenge(&values, scheme)?;
        self.advance(AuthState::Challenged);
        Ok(challenge)
    }

    async fn send(&mut self, phase: Phase, authorization: Option<String>) -> Result<HttpResponse> {
        let mode = self.target.header_mode();
        let mut headers = RequestHeaders::new(self.target.host_header());
        if let Some(value) = authorization {
            headers = headers.with_authorization(mode, value);
        }
        let request = HttpRequest {
            host: self.target.connect_host().to_string(),
            port: self.target.connect_port(),
            path: self.target.request_target().to_string(),
            headers,
        };

        debug!(
            phase = %phase,
            connect = %self.target.connect_addr(),
            host = %self.target.host_header(),
            path = %request.path,
            headers = ?request.headers.names(),
            "sending request"
        );
        self.requests_sent += 1;
        let started = Instant::now();
        let outcome = self.transport.get(&request).await;

        if let Some(logger) = self.logger {
            logger.log_exchange(&ExchangeRecord::new(phase, &request, &outcome, started.elapsed()));
        }

        let response = outcome?;
        debug!(phase = %phase, status = response.status, reason = %response.reason, "response received");
        Ok(response)
    }

    fn advance(&mut self, next: AuthState) {
        debug!(from = ?self.state, to = ?next, "auth state transition");
        self.state = next;
    }

    fn finish(&mut self, result: Result<Verdict>) -> Result<Verdict> {
        let next = match &result {
            Ok(verdict) if verdict.is_success() => AuthState::Authenticated,
            _ => AuthState::Failed,
        };
        self.advance(next);
        result
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolve `url` (and the configured proxy) and run the flow the credentials
/// select: NTLM when a domain is present, Basic otherwise.
pub async fn authenticate(
    transport: &dyn Transport,
    config: &ClientConfig,
    url: &str,
    logger: Option<&ExchangeLogger>,
) -> Result<Verdict> {
    let target = Target::resolve(url, config.proxy.as_deref())?;
    info!(
        scheme = %config.scheme(),
        connect = %target.connect_addr(),
        host = %target.host_header(),
        proxy = target.using_proxy(),
        "starting authenticated GET"
    );

    let mut negotiator = Negotiator::new(transport, &target);
    if let Some(logger) = logger {
        negotiator = negotiator.with_logger(logger);
    }

    let creds = &config.credentials;
    match &creds.domain {
        Some(domain) => {
            let mut codec = NtlmClient::new(&creds.user, domain, &creds.password);
            negotiator.ntlm(&mut codec).await
        }
        None => negotiator.basic(&creds.user, &creds.password).await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
