//! Lifecycle of the Tor relay the crawler routes through.
//!
//! The relay is either adopted (already running, or explicitly requested) or
//! launched as a child process. Either way, nothing is crawled until a request
//! through the SOCKS endpoint has been confirmed by the Tor check service.
//! Routing is carried by an explicit [`reqwest::Client`]; no process-wide
//! socket state is touched.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

pub const DEFAULT_SOCKS_PORT: u16 = 9050;
pub const DEFAULT_CONTROL_PORT: u16 = 9051;
pub const DEFAULT_CHECK_URL: &str = "https://check.torproject.org/";
pub const DEFAULT_CHECK_MARKER: &str = "Congratulations";

// Tor Browser's user agent, so crawled sites see the same fingerprint as other Tor users.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0";

/// The relay contract the crawler depends on.
#[async_trait]
pub trait AnonymizingTransport: Send {
    /// Adopt or launch the relay, then [`verify`](Self::verify) it.
    async fn start(&mut self, use_existing: bool) -> Result<(), TransportError>;

    /// Confirm traffic really leaves through the relay.
    async fn verify(&mut self) -> Result<(), TransportError>;

    /// Stop the relay if this instance launched it. Safe to call repeatedly.
    async fn stop(&mut self);

    /// HTTP client whose requests are routed through the relay.
    fn client(&self) -> &Client;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub socks_port: u16,
    pub control_port: u16,
    pub executable: PathBuf,
    pub check_url: String,
    pub check_marker: String,
    pub request_timeout: Duration,
    pub bootstrap_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            socks_port: DEFAULT_SOCKS_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            executable: PathBuf::from("tor"),
            check_url: DEFAULT_CHECK_URL.to_string(),
            check_marker: DEFAULT_CHECK_MARKER.to_string(),
            request_timeout: Duration::from_secs(30),
            bootstrap_timeout: Duration::from_secs(180),
        }
    }
}

impl TransportConfig {
    /// `socks5h` so hostnames are resolved by the relay, not locally.
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.socks_port)
    }
}

/// What a line of Tor's startup output tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchEvent {
    Progress(u8),
    Ready,
    PortsInUse,
    Other,
}

pub fn classify_launch_line(line: &str) -> LaunchEvent {
    if line.contains("Failed to bind one of the listener ports")
        || line.contains("Address already in use")
    {
        return LaunchEvent::PortsInUse;
    }

    if let Some((_, rest)) = line.split_once("Bootstrapped ") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(percent) = digits.parse::<u8>() {
            return if percent >= 100 {
                LaunchEvent::Ready
            } else {
                LaunchEvent::Progress(percent)
            };
        }
    }

    LaunchEvent::Other
}

/// Fetch `check_url` with `client` and require `marker` in the body.
pub async fn verify_routing(
    client: &Client,
    check_url: &str,
    marker: &str,
) -> Result<(), TransportError> {
    let response = client
        .get(check_url)
        .send()
        .await
        .map_err(|e| TransportError::Verification(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Verification(format!(
            "check endpoint returned {}",
            status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Verification(e.to_string()))?;

    if body.contains(marker) {
        Ok(())
    } else {
        Err(TransportError::Verification(
            "connected to the internet, but not through Tor".to_string(),
        ))
    }
}

enum LaunchOutcome {
    Ready(Child),
    AlreadyRunning,
}

/// Tor relay managed through its SOCKS and control ports.
pub struct TorTransport {
    config: TransportConfig,
    client: Client,
    process: Option<Child>,
}

impl TorTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let proxy = Proxy::all(config.proxy_url())
            .map_err(|e| TransportError::Client(e.to_string()))?;

        let client = Client::builder()
            .proxy(proxy)
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout / 2)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            config,
            client,
            process: None,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether this instance owns a running relay process.
    pub fn owns_process(&self) -> bool {
        self.process.is_some()
    }

    async fn control_port_reachable(&self) -> bool {
        let address = (self.config.host.as_str(), self.config.control_port);
        matches!(
            tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(address)).await,
            Ok(Ok(_))
        )
    }

    async fn launch(&self) -> Result<LaunchOutcome, TransportError> {
        let executable = &self.config.executable;
        let mut child = Command::new(executable)
            .arg("--SocksPort")
            .arg(self.config.socks_port.to_string())
            .arg("--ControlPort")
            .arg(self.config.control_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransportError::ExecutableNotFound(executable.display().to_string())
                } else {
                    TransportError::Launch(e.to_string())
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Launch("Tor stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let watch = async {
            let mut ports_in_use = false;
            let mut last_line = String::new();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        match classify_launch_line(&line) {
                            LaunchEvent::Ready => {
                                info!("Tor: {}", line);
                                return Ok(true);
                            }
                            LaunchEvent::Progress(_) => info!("Tor: {}", line),
                            LaunchEvent::PortsInUse => {
                                debug!("Tor: {}", line);
                                ports_in_use = true;
                            }
                            LaunchEvent::Other => debug!("Tor: {}", line),
                        }
                        last_line = line;
                    }
                    Ok(None) if ports_in_use => return Ok(false),
                    Ok(None) => {
                        return Err(TransportError::Launch(format!(
                            "Tor exited before bootstrapping: {}",
                            last_line
                        )));
                    }
                    Err(e) => return Err(TransportError::Launch(e.to_string())),
                }
            }
        };

        let outcome = tokio::time::timeout(self.config.bootstrap_timeout, watch).await;
        match outcome {
            Ok(Ok(true)) => Ok(LaunchOutcome::Ready(child)),
            Ok(Ok(false)) => {
                let _ = child.wait().await;
                Ok(LaunchOutcome::AlreadyRunning)
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(e)
            }
            Err(_) => {
                let _ = child.kill().await;
                Err(TransportError::Launch(format!(
                    "Tor did not bootstrap within {}s",
                    self.config.bootstrap_timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl AnonymizingTransport for TorTransport {
    async fn start(&mut self, use_existing: bool) -> Result<(), TransportError> {
        info!("Setting up Tor connection via {}", self.config.proxy_url());

        if use_existing || self.control_port_reachable().await {
            info!("Using existing Tor process");
        } else {
            info!("Starting new Tor process...");
            match self.launch().await? {
                LaunchOutcome::Ready(child) => self.process = Some(child),
                LaunchOutcome::AlreadyRunning => {
                    warn!("Tor ports already in use, attempting to use the existing Tor process");
                }
            }
        }

        self.verify().await
    }

    async fn verify(&mut self) -> Result<(), TransportError> {
        info!("Testing Tor connection...");
        match verify_routing(&self.client, &self.config.check_url, &self.config.check_marker).await
        {
            Ok(()) => {
                info!("Successfully connected to Tor network");
                Ok(())
            }
            Err(e) => {
                warn!("Error connecting to Tor: {}", e);
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.process.take() {
            info!("Stopping Tor...");
            if let Err(e) = child.kill().await {
                warn!("Failed to stop Tor process: {}", e);
            }
        }
    }

    fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_classify_launch_line() {
        assert_eq!(
            classify_launch_line("Nov 01 12:00:00.000 [notice] Bootstrapped 45% (loading_descriptors)"),
            LaunchEvent::Progress(45)
        );
        assert_eq!(
            classify_launch_line("[notice] Bootstrapped 100% (done): Done"),
            LaunchEvent::Ready
        );
        assert_eq!(
            classify_launch_line("[err] Failed to bind one of the listener ports."),
            LaunchEvent::PortsInUse
        );
        assert_eq!(
            classify_launch_line(
                "[warn] Could not bind to 127.0.0.1:9050: Address already in use. Is Tor already running?"
            ),
            LaunchEvent::PortsInUse
        );
        assert_eq!(
            classify_launch_line("[notice] Opening Socks listener"),
            LaunchEvent::Other
        );
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.socks_port, 9050);
        assert_eq!(config.control_port, 9051);
        assert_eq!(config.proxy_url(), "socks5h://127.0.0.1:9050");
    }

    #[tokio::test]
    async fn test_verify_routing_accepts_marker() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<h1>Congratulations. This browser is configured to use Tor.</h1>",
            ))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let result = verify_routing(&client, &mock_server.uri(), DEFAULT_CHECK_MARKER).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_verify_routing_rejects_plain_connection() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<h1>Sorry. You are not using Tor.</h1>",
            ))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let err = verify_routing(&client, &mock_server.uri(), DEFAULT_CHECK_MARKER)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Verification(msg) if msg.contains("not through Tor")));
    }

    #[tokio::test]
    async fn test_verify_routing_rejects_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let client = Client::new();
        let err = verify_routing(&client, &mock_server.uri(), DEFAULT_CHECK_MARKER)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Verification(_)));
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_missing_executable_is_reported() {
        let config = TransportConfig {
            socks_port: unused_port(),
            control_port: unused_port(),
            executable: PathBuf::from("/nonexistent/veilcrawl-test/tor"),
            check_url: "http://127.0.0.1:1/".to_string(),
            request_timeout: Duration::from_secs(2),
            ..TransportConfig::default()
        };

        let mut transport = TorTransport::new(config).unwrap();
        let err = transport.start(false).await.unwrap_err();
        assert!(matches!(err, TransportError::ExecutableNotFound(_)));
        assert!(!transport.owns_process());
    }

    #[tokio::test]
    async fn test_reachable_control_port_adopts_existing_relay() {
        let control = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TransportConfig {
            socks_port: unused_port(),
            control_port: control.local_addr().unwrap().port(),
            executable: PathBuf::from("/nonexistent/veilcrawl-test/tor"),
            check_url: "http://127.0.0.1:1/".to_string(),
            request_timeout: Duration::from_secs(2),
            ..TransportConfig::default()
        };

        // No launch is attempted, so the failure comes from the routing check.
        let mut transport = TorTransport::new(config).unwrap();
        let err = transport.start(false).await.unwrap_err();
        assert!(matches!(err, TransportError::Verification(_)));
        assert!(!transport.owns_process());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ports_in_use_proceeds_to_verification() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tor");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '[notice] Bootstrapped 0% (starting): Starting'\n\
             echo '[warn] Could not bind to 127.0.0.1:9050: Address already in use.'\n\
             echo '[err] Failed to bind one of the listener ports.'\n\
             exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = TransportConfig {
            socks_port: unused_port(),
            control_port: unused_port(),
            executable: script,
            check_url: "http://127.0.0.1:1/".to_string(),
            request_timeout: Duration::from_secs(2),
            bootstrap_timeout: Duration::from_secs(10),
            ..TransportConfig::default()
        };

        let mut transport = TorTransport::new(config).unwrap();
        let err = transport.start(false).await.unwrap_err();
        assert!(matches!(err, TransportError::Verification(_)));
        assert!(!transport.owns_process());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relay_exiting_early_is_a_launch_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tor");
        std::fs::write(&script, "#!/bin/sh\necho '[err] Reading config failed'\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = TransportConfig {
            socks_port: unused_port(),
            control_port: unused_port(),
            executable: script,
            bootstrap_timeout: Duration::from_secs(10),
            ..TransportConfig::default()
        };

        let mut transport = TorTransport::new(config).unwrap();
        let err = transport.start(false).await.unwrap_err();
        assert!(matches!(err, TransportError::Launch(msg) if msg.contains("Reading config failed")));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_without_process() {
        let mut transport = TorTransport::new(TransportConfig::default()).unwrap();
        assert!(!transport.owns_process());
        transport.stop().await;
        transport.stop().await;
        assert!(!transport.owns_process());
    }
}
