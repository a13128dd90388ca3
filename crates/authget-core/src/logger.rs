/// JSON-lines audit log of every request/response exchange.
///
/// Records carry header names only; credentials and handshake blobs never
/// reach the log.

use crate::error::Result;
use crate::transport::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::Duration;
use tracing::error;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Probe,
    Credentials,
    Negotiate,
    Authenticate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Probe => "probe",
            Phase::Credentials => "credentials",
            Phase::Negotiate => "negotiate",
            Phase::Authenticate => "authenticate",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct ExchangeRecord {
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub connect: String,
    pub host: Option<String>,
    pub path: String,
    pub headers: Vec<String>,
    pub status: Option<u16>,
    pub reason: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ExchangeRecord {
    pub fn new(
        phase: Phase,
        request: &HttpRequest,
        outcome: &Result<HttpResponse>,
        elapsed: Duration,
    ) -> Self {
        let (status, reason, error) = match outcome {
            Ok(resp) => (Some(resp.status), Some(resp.reason.clone()), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        ExchangeRecord {
            timestamp: Utc::now(),
            phase,
            connect: format!("{}:{}", request.host, request.port),
            host: request.headers.get(crate::headers::HOST).map(str::to_string),
            path: request.path.clone(),
            headers: request.headers.names().into_iter().map(str::to_string).collect(),
            status,
            reason,
            duration_ms: elapsed.as_millis() as u64,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct ExchangeLogger {
    log_path: String,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl ExchangeLogger {
    /// An empty path disables file output.
    pub fn new(log_path: &str) -> std::io::Result<Self> {
        let writer = if !log_path.is_empty() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(ExchangeLogger {
            log_path: log_path.to_string(),
            writer: Mutex::new(writer),
        })
    }

    pub fn log_exchange(&self, record: &ExchangeRecord) {
        match serde_json::to_string(record) {
            Ok(line) => self.write_line(&line),
            Err(e) => error!("Failed to serialize ExchangeRecord: {}", e),
        }
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(ref mut w) = *guard {
                let _ = writeln!(w, "{}", line);
                let _ = w.flush();
            }
        }
    }

    pub fn log_path(&self) -> &str {
        &self.log_path
    }
}
