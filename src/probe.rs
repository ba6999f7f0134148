//! Stateless health probes against a forwarded local port.

use std::sync::OnceLock;
use std::time::Duration;

/// Shared HTTP client for health probes.
///
/// A single pooled client prevents file descriptor exhaustion when many
/// services probe over HTTP. The builder timeout is a generous fallback;
/// each request carries its own timeout.
static SHARED_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build shared HTTP client")
    })
}

/// Resolved probe method for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Tcp,
    Http,
}

/// TCP-connect probe against `localhost:<port>`. Open ⇒ true.
pub async fn probe_tcp(port: &str, timeout: Duration) -> bool {
    let addr = format!("localhost:{}", port);
    matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// HTTP GET `http://localhost:<port><path>`. Any 2xx/3xx ⇒ healthy.
pub async fn probe_http(port: &str, path: &str, timeout: Duration) -> bool {
    let path = if path.is_empty() { "/" } else { path };
    let url = format!("http://localhost:{}{}", port, path);

    match http_client().get(&url).timeout(timeout).send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            (200..400).contains(&code)
        }
        Err(_) => false,
    }
}

/// Pick the best probe method for a port: TCP when the port doesn't answer
/// (or doesn't speak HTTP), HTTP when a GET on `/` comes back 2xx/3xx.
pub async fn auto_detect(port: &str, timeout: Duration) -> ProbeKind {
    if !probe_tcp(port, timeout).await {
        return ProbeKind::Tcp;
    }
    if probe_http(port, "/", timeout).await {
        return ProbeKind::Http;
    }
    ProbeKind::Tcp
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();

        // Keep accepting so connects complete
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        assert!(probe_tcp(&port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn tcp_probe_fails_on_closed_port() {
        // Bind-then-drop gives us a port that is almost certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        drop(listener);

        assert!(!probe_tcp(&port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn http_probe_fails_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        drop(listener);

        assert!(!probe_http(&port, "/health", Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn auto_detect_falls_back_to_tcp_for_non_http_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();

        // Accept and hang up without speaking HTTP
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        assert_eq!(
            auto_detect(&port, Duration::from_millis(500)).await,
            ProbeKind::Tcp
        );
    }

    #[tokio::test]
    async fn auto_detect_returns_tcp_when_port_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        drop(listener);

        assert_eq!(
            auto_detect(&port, Duration::from_millis(500)).await,
            ProbeKind::Tcp
        );
    }
}
