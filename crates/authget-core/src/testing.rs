//! Test doubles shared by the unit tests.

use crate::error::{AuthError, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned responses in order and records every request it is given.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<HttpResponse>>) -> Self {
        ScriptedTransport {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::transport("no scripted response left")))
    }
}

pub fn response(status: u16, reason: &str, headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status,
        reason: reason.to_string(),
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
    }
}

/// Build a Type 2 message the way a server would.
pub fn challenge_message(flags: u32, server_challenge: [u8; 8], target: &str) -> Vec<u8> {
    let target: Vec<u8> = target.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    let offset = 48u32;

    let mut msg = Vec::new();
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&2u32.to_le_bytes());
    msg.extend_from_slice(&(target.len() as u16).to_le_bytes());
    msg.extend_from_slice(&(target.len() as u16).to_le_bytes());
    msg.extend_from_slice(&offset.to_le_bytes());
    msg.extend_from_slice(&flags.to_le_bytes());
    msg.extend_from_slice(&server_challenge);
    msg.extend_from_slice(&[0u8; 8]); // reserved
    msg.extend_from_slice(&[0u8; 8]); // empty target info
    msg.extend_from_slice(&target);
    msg
}
