//! Transports carrying manager actions

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, Url};
use tokio::sync::Semaphore;
use tracing::trace;

use crate::action::Action;
use crate::endpoint::ManagerEndpoint;
use crate::error::ManagerError;

/// Sends one action and returns the raw reply body
///
/// Implementations must allow concurrent calls: a worker keeps a `WaitEvent`
/// long-poll outstanding while it issues other actions.
pub trait ManagerTransport: Send + Sync + 'static {
    fn send(&self, action: &Action) -> impl Future<Output = Result<String, ManagerError>> + Send;
}

/// Creates a fresh transport (and with it a fresh session) per connection
pub trait ManagerConnector: Send + Sync + 'static {
    type Transport: ManagerTransport;

    fn connect(&self) -> Result<Self::Transport, ManagerError>;
}

impl ManagerConnector for ManagerEndpoint {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<HttpTransport, ManagerError> {
        HttpTransport::new(&self.base_uri()?, self.max_requests)
    }
}

/// HTTP transport with a cookie session and a bounded request count
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    permits: Arc<Semaphore>,
}

impl HttpTransport {
    /// Create a transport for `base` allowing `max_requests` outstanding
    /// requests (at least one); further callers wait for a free slot
    pub fn new(base: &Url, max_requests: usize) -> Result<Self, ManagerError> {
        let endpoint = base.join("rawman").map_err(|e| ManagerError::InvalidUri {
            uri: base.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder().cookie_store(true).build()?;

        Ok(Self {
            client,
            endpoint,
            permits: Arc::new(Semaphore::new(max_requests.max(1))),
        })
    }

    /// Full `rawman` URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ManagerTransport for HttpTransport {
    async fn send(&self, action: &Action) -> Result<String, ManagerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ManagerError::Transport("request limiter closed".to_string()))?;

        trace!("{} -> {}", self.endpoint, action.name());
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&action.query())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::HttpStatus {
                action: action.name().to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        trace!("{} <- {} bytes for {}", self.endpoint, body.len(), action.name());
        Ok(body)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve `bodies` one connection at a time, forwarding each request head
    async fn serve(bodies: Vec<(&'static str, &'static str)>) -> (Url, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (headers, body) in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let _ = tx.send(String::from_utf8_lossy(&request).into_owned());

                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    body.len(),
                    headers,
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        let base = Url::parse(&format!("http://{addr}/asterisk/")).unwrap();
        (base, rx)
    }

    #[tokio::test]
    async fn test_query_and_session_cookie() {
        let (base, mut requests) = serve(vec![
            (
                "Set-Cookie: mansession_id=\"4f2c\"; Version=1; Max-Age=60\r\n",
                "Response: Success\r\nMessage: Authentication accepted\r\n\r\n",
            ),
            ("", "Response: Success\r\n\r\n"),
        ])
        .await;
        let transport = HttpTransport::new(&base, 2).unwrap();

        let login = Action::new("Login").param("Username", "relay").param("Secret", "a b");
        let body = transport.send(&login).await.unwrap();
        assert!(body.starts_with("Response: Success"));

        let first = requests.recv().await.unwrap();
        assert!(first.starts_with("GET /asterisk/rawman?action=Login&Username=relay&Secret=a+b "));

        let ping = Action::new("Ping");
        transport.send(&ping).await.unwrap();
        let second = requests.recv().await.unwrap();
        assert!(second.to_lowercase().contains("cookie: mansession_id="));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        });

        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let transport = HttpTransport::new(&base, 1).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), transport.send(&Action::new("Ping")))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ManagerError::HttpStatus { status: 404, .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn test_connect_from_endpoint() {
        let mut endpoint = ManagerEndpoint::new("pbx", "relay", "pw");
        endpoint.path = "ami".into();
        let transport = endpoint.connect().unwrap();
        assert_eq!(transport.endpoint().as_str(), "http://pbx:8088/ami/rawman");
    }

    #[test]
    fn test_endpoint_resolves_rawman() {
        let base = Url::parse("http://pbx:8088/asterisk/").unwrap();
        let transport = HttpTransport::new(&base, 0).unwrap();
        assert_eq!(transport.endpoint().as_str(), "http://pbx:8088/asterisk/rawman");
        assert_eq!(transport.permits.available_permits(), 1);
    }
}
