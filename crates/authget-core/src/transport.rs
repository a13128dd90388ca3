/// HTTP/1.1 transport.
///
/// One call = one connection: connect, send a single GET, read the status
/// line and headers, close. No pooling, no retries, no TLS.

use crate::error::{AuthError, Result};
use crate::headers::RequestHeaders;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_DRAIN_BYTES: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Socket host to dial (origin or proxy).
    pub host: String,
    pub port: u16,
    /// Request target written on the request line.
    pub path: String,
    pub headers: RequestHeaders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Every value of `name`, in arrival order. Case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

// ---------------------------------------------------------------------------
// TCP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        TcpTransport { timeout }
    }

    async fn exchange(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let stream = TcpStream::connect((request.host.as_str(), request.port)).await?;
        let mut reader = BufReader::new(stream);

        reader.get_mut().write_all(encode_request(request).as_bytes()).await?;
        let response = read_http_response(&mut reader).await?;

        if let Some(len) = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            let mut body = (&mut reader).take(len.min(MAX_DRAIN_BYTES));
            tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        }

        // Dropping the stream closes it on every other path.
        let _ = reader.get_mut().shutdown().await;
        Ok(response)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new(Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        match timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "no response from {}:{} within {}s",
                    request.host,
                    request.port,
                    self.timeout.as_secs()
                ),
            ))),
        }
    }
}

fn encode_request(request: &HttpRequest) -> String {
    let mut req = format!("GET {} HTTP/1.1\r\n", request.path);
    for (name, value) in request.headers.iter() {
        req.push_str(&format!("{}: {}\r\n", name, value));
    }
    req.push_str("Connection: close\r\n\r\n");
    req
}

/// Read one line, up to and including `\n`, pulling at most `budget` bytes
/// off the wire. Header bytes are decoded lossily; servers do send Latin-1.
async fn read_header_line<R>(reader: &mut R, budget: usize, buf: &mut Vec<u8>) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    buf.clear();
    let mut limited = (&mut *reader).take(budget as u64 + 1);
    limited.read_until(b'\n', buf).await?;
    if buf.len() > budget {
        return Err(AuthError::transport("HTTP response header too large"));
    }
    Ok(String::from_utf8_lossy(buf).into_owned())
}

/// Read the status line and headers up to the blank line.
async fn read_http_response<R>(reader: &mut R) -> Result<HttpResponse>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);

    let line = read_header_line(reader, MAX_HEADER_BYTES, &mut buf).await?;
    if buf.is_empty() {
        return Err(AuthError::transport("connection closed before any response"));
    }
    let mut consumed = buf.len();

    let status_line = line.trim_end().to_string();
    trace!(status_line = %status_line, "response status line");
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        return Err(AuthError::transport(format!("malformed HTTP status line: {}", status_line)));
    }
    let status: u16 = parts[1]
        .parse()
        .map_err(|_| AuthError::transport(format!("non-numeric status code: {}", parts[1])))?;
    let reason = parts.get(2).map(|s| s.to_string()).unwrap_or_default();

    let mut headers = Vec::new();
    loop {
        let line = read_header_line(reader, MAX_HEADER_BYTES - consumed, &mut buf).await?;
        if buf.is_empty() {
            return Err(AuthError::transport("connection closed inside response headers"));
        }
        consumed += buf.len();

        let l = line.trim_end_matches(['\r', '\n']);
        if l.is_empty() {
            break;
        }
        if let Some((name, value)) = l.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(HttpResponse { status, reason, headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderMode;
    use tokio::net::TcpListener;

    /// Serve one canned response and hand back the raw request text.
    async fn serve_once(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut tmp = [0u8; 1024];
            while !buf.ends_with(b"\r\n\r\n") {
                let n = stream.read(&mut tmp).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
            }
            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8(buf).unwrap()
        });
        (port, handle)
    }

    fn request(port: u16, headers: RequestHeaders) -> HttpRequest {
        HttpRequest {
            host: "127.0.0.1".into(),
            port,
            path: "/secure/page?x=1".into(),
            headers,
        }
    }

    #[tokio::test]
    async fn test_get_reads_status_and_headers() {
        let (port, server) = serve_once(
            b"HTTP/1.1 401 Unauthorized\r\n\
             WWW-Authenticate: Negotiate\r\n\
             WWW-Authenticate: NTLM\r\n\
             Content-Length: 5\r\n\r\nnope!",
        )
        .await;

        let headers = RequestHeaders::new("origin.local:8080")
            .with_authorization(HeaderMode::Origin, "Basic YTpi");
        let resp = TcpTransport::default().get(&request(port, headers)).await.unwrap();

        assert_eq!(resp.status, 401);
        assert_eq!(resp.reason, "Unauthorized");
        assert_eq!(resp.header_values("www-authenticate"), vec!["Negotiate", "NTLM"]);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /secure/page?x=1 HTTP/1.1\r\n"));
        assert!(raw.contains("Host: origin.local:8080\r\n"));
        assert!(raw.contains("Authorization: Basic YTpi\r\n"));
        assert!(raw.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_status_line() {
        let (port, _server) = serve_once(b"garbage\r\n\r\n").await;
        let err = TcpTransport::default()
            .get(&request(port, RequestHeaders::new("h")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let err = TcpTransport::new(Duration::from_secs(2))
            .get(&request(port, RequestHeaders::new("h")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }

    #[tokio::test]
    async fn test_read_response_without_reason() {
        let mut input: &[u8] = b"HTTP/1.0 200\r\nX-A: 1\r\n\r\n";
        let resp = read_http_response(&mut input).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "");
        assert_eq!(resp.header("x-a"), Some("1"));
    }

    #[tokio::test]
    async fn test_non_utf8_realm_is_decoded_lossily() {
        let (port, _server) = serve_once(
            b"HTTP/1.1 401 Unauthorized\r\n\
              WWW-Authenticate: Basic realm=\"\xC1rea\"\r\n\r\n",
        )
        .await;
        let resp = TcpTransport::default()
            .get(&request(port, RequestHeaders::new("h")))
            .await
            .unwrap();
        assert_eq!(resp.status, 401);
        let challenge = resp.header("WWW-Authenticate").unwrap();
        assert!(challenge.starts_with("Basic realm=\""));
        assert!(challenge.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_status_line_without_newline_is_capped() {
        // Never yields a newline.
        let mut reader = BufReader::new(tokio::io::repeat(b'a'));
        let err = read_http_response(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);
    }

    #[tokio::test]
    async fn test_header_block_over_limit() {
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        while raw.len() <= MAX_HEADER_BYTES {
            raw.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        let mut input: &[u8] = &raw;
        assert!(read_http_response(&mut input).await.is_err());
    }
}
