//! Blocking HTTP access to the registry and to cluster services.
//!
//! All network calls of a collection cycle go through [`HttpTransport`], which
//! returns the response body as text. The production implementation,
//! [`ReqwestTransport`], bounds every request with a timeout so a stalled
//! service cannot hang a namespace forever.

use std::fmt;

/// HTTP method of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Error type for transport failures.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The HTTP client could not be built.
    Client(String),
    /// Connection refused, DNS failure, unreachable host.
    Connect { url: String, message: String },
    /// The request did not complete within the configured timeout.
    Timeout { url: String },
    /// The server answered with a non-success status.
    Status { url: String, status: u16 },
    /// Any other request failure.
    Request { url: String, message: String },
    /// The response body could not be read.
    Body { url: String, message: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Client(msg) => write!(f, "cannot build HTTP client: {}", msg),
            TransportError::Connect { url, message } => {
                write!(f, "cannot connect to {}: {}", url, message)
            }
            TransportError::Timeout { url } => write!(f, "request to {} timed out", url),
            TransportError::Status { url, status } => {
                write!(f, "{} answered with status {}", url, status)
            }
            TransportError::Request { url, message } => {
                write!(f, "request to {} failed: {}", url, message)
            }
            TransportError::Body { url, message } => {
                write!(f, "cannot read response from {}: {}", url, message)
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Abstraction for the HTTP calls made during a collection cycle.
pub trait HttpTransport: Send + Sync {
    /// Performs a request and returns the response body.
    fn request(&self, method: HttpMethod, url: &str) -> Result<String, TransportError>;

    fn get(&self, url: &str) -> Result<String, TransportError> {
        self.request(HttpMethod::Get, url)
    }

    /// Sends a POST without a body.
    fn post(&self, url: &str) -> Result<String, TransportError> {
        self.request(HttpMethod::Post, url)
    }
}

/// Transport backed by a shared `reqwest` blocking client.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    /// Creates a transport whose requests (connect included) are bounded by `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("sdsmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(feature = "http")]
impl HttpTransport for ReqwestTransport {
    fn request(&self, method: HttpMethod, url: &str) -> Result<String, TransportError> {
        let builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };

        let response = builder.send().map_err(|e| Self::classify(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| TransportError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Normalizes a registry endpoint: adds `http://` when no scheme is given
/// and strips trailing slashes.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Builds the URL of a path served by a `host:port` service address.
pub fn service_url(address: &str, path: &str) -> String {
    format!("{}{}", normalize_endpoint(address), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("127.0.0.1:6000"), "http://127.0.0.1:6000");
        assert_eq!(
            normalize_endpoint("http://10.0.0.1:6000/"),
            "http://10.0.0.1:6000"
        );
        assert_eq!(
            normalize_endpoint(" https://proxy.local "),
            "https://proxy.local"
        );
    }

    #[test]
    fn test_service_url() {
        assert_eq!(
            service_url("10.0.0.1:6200", "/stat"),
            "http://10.0.0.1:6200/stat"
        );
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Status {
            url: "http://10.0.0.1:6000/x".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "http://10.0.0.1:6000/x answered with status 503"
        );
    }
}

#[cfg(all(test, feature = "http"))]
mod reqwest_tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Serves a single connection with a canned raw HTTP response.
    fn serve_once(response: &'static str) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/stat", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        (url, handle)
    }

    fn transport(timeout_secs: u64) -> ReqwestTransport {
        ReqwestTransport::new(Duration::from_secs(timeout_secs)).unwrap()
    }

    #[test]
    fn test_success_returns_body() {
        let (url, handle) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 19\r\nConnection: close\r\n\r\ncounter req.hits 3\n",
        );

        let body = transport(5).get(&url).unwrap();
        handle.join().unwrap();
        assert_eq!(body, "counter req.hits 3\n");
    }

    #[test]
    fn test_error_status() {
        let (url, handle) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        let err = transport(5).post(&url).unwrap_err();
        handle.join().unwrap();
        assert_eq!(err, TransportError::Status { url, status: 503 });
    }

    #[test]
    fn test_silent_server_times_out() {
        // The kernel completes the handshake; nobody ever answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/stat", listener.local_addr().unwrap());

        let err = transport(1).get(&url).unwrap_err();
        assert_eq!(err, TransportError::Timeout { url });
        drop(listener);
    }

    #[test]
    fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/stat", listener.local_addr().unwrap());
        drop(listener);

        let err = transport(5).get(&url).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "{:?}", err);
    }
}
