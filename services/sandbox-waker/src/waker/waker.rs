//! Sandbox waker - responsibility and behavior
//!
//! The hosting platform suspends the application sandbox when it sits idle
//! and resumes it on inbound traffic. The waker exploits that: it GET-polls
//! the sandbox base URL until the application answers 200, treating 502/503
//! as "still asleep" and everything else (unexpected statuses and outright
//! connection failures alike) as reason to wait and probe again.
//!
//! The probe deliberately does not distinguish a 4xx from a refused
//! connection. Both get a warning, the fixed delay, and another attempt.

use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::instrument;

/// Hosted sandbox for the application; machines suspend when idle and resume
/// on inbound traffic.
pub const SANDBOX_BASE_URL: &str = "https://onboardhq-staging.fly.dev";

/// Probe loop knobs. Production uses [`WakerConfig::default`], which carries
/// the build-time constants; tests shrink the delay.
#[derive(Debug, Clone)]
pub struct WakerConfig {
    /// Base URL probed for liveness.
    pub base_url: String,
    /// Probes issued before giving up.
    pub max_attempts: u32,
    /// Fixed pause after every failed probe.
    pub wake_delay: Duration,
    /// Per-probe deadline.
    pub probe_timeout: Duration,
}

impl Default for WakerConfig {
    fn default() -> Self {
        Self {
            base_url: SANDBOX_BASE_URL.to_string(),
            max_attempts: 10,
            wake_delay: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(15),
        }
    }
}

/// GET-polls the sandbox until it reports ready.
#[derive(Debug)]
pub struct SandboxWaker {
    client: reqwest::Client,
    config: WakerConfig,
}

impl SandboxWaker {
    /// Build the probe client with the per-probe timeout.
    pub fn new(config: WakerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Poll the base URL until it answers 200 or the attempt budget runs
    /// out. Returns whether the sandbox ended up awake.
    ///
    /// Every failed probe, whatever its class, is followed by the fixed
    /// delay; only a 200 returns early.
    #[instrument(
        name = "sandbox_waker::wake_up",
        target = "waker::waker::SandboxWaker",
        skip_all,
        level = "debug"
    )]
    pub async fn wake_up(&self) -> bool {
        tracing::info!(base_url = %self.config.base_url, "Attempting to wake up sandbox");

        for attempt in 1..=self.config.max_attempts {
            tracing::info!(
                attempt,
                max_attempts = self.config.max_attempts,
                "Wake attempt"
            );

            match self.client.get(&self.config.base_url).send().await {
                Ok(response) => {
                    let status = response.status();
                    match status {
                        StatusCode::OK => {
                            tracing::info!("Sandbox is awake and responding");
                            return true;
                        }
                        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                            tracing::info!(
                                status = status.as_u16(),
                                delay_secs = self.config.wake_delay.as_secs_f64(),
                                "Sandbox still asleep, waiting before the next probe"
                            );
                        }
                        other => {
                            tracing::warn!(
                                status = other.as_u16(),
                                "Unexpected status code from wake probe"
                            );
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Wake probe request failed");
                }
            }

            sleep(self.config.wake_delay).await;
        }

        tracing::error!(
            max_attempts = self.config.max_attempts,
            "Failed to wake up sandbox after maximum attempts"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn test_config(base_url: &str, max_attempts: u32, wake_delay: Duration) -> WakerConfig {
        WakerConfig {
            base_url: base_url.to_string(),
            max_attempts,
            wake_delay,
            probe_timeout: Duration::from_secs(5),
        }
    }

    const ASLEEP_RESPONSE: &str =
        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const AWAKE_RESPONSE: &str =
        "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";

    /// Serves one canned HTTP/1.1 response per connection, in order. mockito
    /// cannot vary the response of a single route across hits, so probe
    /// sequences go through this instead.
    async fn spawn_scripted_server(
        responses: Vec<String>,
    ) -> (String, tokio::task::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind scripted server");
        let addr = listener.local_addr().expect("scripted server addr");
        let handle = tokio::spawn(async move {
            let mut served = 0usize;
            for response in responses {
                let (mut socket, _) = listener.accept().await.expect("accept connection");
                read_request_head(&mut socket).await;
                socket.write_all(response.as_bytes()).await.expect("write response");
                socket.flush().await.expect("flush response");
                served += 1;
            }
            served
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request_head(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.expect("read request");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
    }

    #[tokio::test]
    async fn reports_awake_on_an_immediate_200() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(200).expect(1).create_async().await;

        let waker =
            SandboxWaker::new(test_config(&server.url(), 10, Duration::from_millis(1)))
                .expect("waker");

        assert!(waker.wake_up().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn gives_up_after_the_maximum_number_of_probes() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(503).expect(10).create_async().await;

        let waker =
            SandboxWaker::new(test_config(&server.url(), 10, Duration::from_millis(1)))
                .expect("waker");

        assert!(!waker.wake_up().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unexpected_statuses_are_retried_like_outages() {
        // A 404 from the probe is deliberately handled the same way as a
        // temporary outage.
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(404).expect(3).create_async().await;

        let waker =
            SandboxWaker::new(test_config(&server.url(), 3, Duration::from_millis(1)))
                .expect("waker");

        assert!(!waker.wake_up().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transport_failures_are_retried_like_outages() {
        // Bind then drop so the port is free and connections are refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let port = listener.local_addr().expect("probe port addr").port();
        drop(listener);

        let waker = SandboxWaker::new(test_config(
            &format!("http://127.0.0.1:{port}"),
            2,
            Duration::from_millis(1),
        ))
        .expect("waker");

        assert!(!waker.wake_up().await);
    }

    #[tokio::test]
    async fn wakes_after_two_asleep_probes() {
        let delay = Duration::from_millis(25);
        let (url, server) = spawn_scripted_server(vec![
            ASLEEP_RESPONSE.to_string(),
            ASLEEP_RESPONSE.to_string(),
            AWAKE_RESPONSE.to_string(),
        ])
        .await;

        let waker = SandboxWaker::new(test_config(&url, 10, delay)).expect("waker");

        let started = tokio::time::Instant::now();
        assert!(waker.wake_up().await);

        // Three probes, and the fixed delay slept after each of the two
        // failed ones.
        assert_eq!(server.await.expect("server task"), 3);
        assert!(started.elapsed() >= delay * 2);
    }
}
