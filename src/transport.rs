//! HTTP transports for Confluence requests.
//!
//! The primary transport is `reqwest`. Some corporate networks only let a
//! whitelisted system binary through the proxy, so a `curl` transport can
//! stand in, either on its own or as a fallback behind reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ConfluenceConfig, TransportMode};
use crate::error::TransportError;

/// Status and body of a completed request. Non-2xx statuses are still `Ok`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests. Errors mean no HTTP response was obtained at all.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

// ═══════════════════════════════════════════════════════════════════════
// reqwest
// ═══════════════════════════════════════════════════════════════════════

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("cfi/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// curl
// ═══════════════════════════════════════════════════════════════════════

/// Marker separating the body from the status code in curl's output.
const STATUS_MARKER: &str = "\n__CFI_HTTP_STATUS__:";

/// Shells out to the `curl` binary.
///
/// Headers are passed on stdin (`-H @-`) so credentials never show up in
/// the process list.
pub struct CurlTransport {
    program: String,
    timeout_secs: u64,
}

impl CurlTransport {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl HttpTransport for CurlTransport {
    fn name(&self) -> &str {
        "curl"
    }

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let mut child = Command::new(&self.program)
            .args(["--silent", "--show-error", "--location"])
            .arg("--max-time")
            .arg(self.timeout_secs.to_string())
            .args(["--header", "@-"])
            .arg("--write-out")
            .arg(format!("{}%{{http_code}}", STATUS_MARKER))
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TransportError::Client(format!("failed to run '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let header_lines: String = headers
                .iter()
                .map(|(name, value)| format!("{}: {}\n", name, value))
                .collect();
            stdin
                .write_all(header_lines.as_bytes())
                .await
                .map_err(|e| TransportError::Client(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::Client(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Network(format!(
                "curl exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_curl_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_curl_output(stdout: &str) -> Result<HttpResponse, TransportError> {
    let (body, status) = stdout
        .rsplit_once(STATUS_MARKER)
        .ok_or_else(|| TransportError::Client("curl output missing status trailer".into()))?;
    let status = status
        .trim()
        .parse::<u16>()
        .map_err(|_| TransportError::Client(format!("bad status from curl: '{}'", status)))?;

    // curl reports 000 when no response arrived
    if status == 0 {
        return Err(TransportError::Network("no HTTP response received".into()));
    }

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Fallback
// ═══════════════════════════════════════════════════════════════════════

/// Tries `primary`, switching to `secondary` on network-level failure.
///
/// HTTP responses (any status) come back from whichever transport produced
/// them; only missing responses trigger the fallback. After the first
/// network failure every later request goes straight to `secondary`.
pub struct FallbackTransport {
    primary: Box<dyn HttpTransport>,
    secondary: Box<dyn HttpTransport>,
    primary_blocked: AtomicBool,
}

impl FallbackTransport {
    pub fn new(primary: Box<dyn HttpTransport>, secondary: Box<dyn HttpTransport>) -> Self {
        Self {
            primary,
            secondary,
            primary_blocked: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl HttpTransport for FallbackTransport {
    fn name(&self) -> &str {
        "auto"
    }

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        if self.primary_blocked.load(Ordering::Relaxed) {
            return self.secondary.get(url, headers).await;
        }

        match self.primary.get(url, headers).await {
            Err(TransportError::Network(reason)) => {
                warn!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    %reason,
                    "primary HTTP client failed, switching transports"
                );
                self.primary_blocked.store(true, Ordering::Relaxed);
                self.secondary.get(url, headers).await
            }
            other => other,
        }
    }
}

/// Build the transport selected by `confluence.transport`.
pub fn build_transport(config: &ConfluenceConfig) -> Result<Box<dyn HttpTransport>> {
    debug!(mode = ?config.transport, "building HTTP transport");
    let transport: Box<dyn HttpTransport> = match config.transport {
        TransportMode::Reqwest => Box::new(ReqwestTransport::new(config.timeout_secs)?),
        TransportMode::Curl => Box::new(CurlTransport::new(
            config.curl_path.clone(),
            config.timeout_secs,
        )),
        TransportMode::Auto => Box::new(FallbackTransport::new(
            Box::new(ReqwestTransport::new(config.timeout_secs)?),
            Box::new(CurlTransport::new(
                config.curl_path.clone(),
                config.timeout_secs,
            )),
        )),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Scripted {
        label: &'static str,
        fail_network: bool,
        status: u16,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        fn name(&self) -> &str {
            self.label
        }

        async fn get(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_network {
                Err(TransportError::Network("blocked by proxy".into()))
            } else {
                Ok(HttpResponse {
                    status: self.status,
                    body: self.label.to_string(),
                })
            }
        }
    }

    fn scripted(label: &'static str, fail_network: bool, status: u16) -> (Scripted, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Scripted {
                label,
                fail_network,
                status,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[test]
    fn parses_curl_trailer() {
        let out = format!("{{\"id\":\"1\"}}{}200", STATUS_MARKER);
        let resp = parse_curl_output(&out).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "{\"id\":\"1\"}");
    }

    #[test]
    fn curl_zero_status_is_network_error() {
        let out = format!("{}000", STATUS_MARKER);
        assert!(matches!(
            parse_curl_output(&out),
            Err(TransportError::Network(_))
        ));
    }

    #[test]
    fn curl_missing_trailer_is_client_error() {
        assert!(matches!(
            parse_curl_output("garbage"),
            Err(TransportError::Client(_))
        ));
    }

    #[tokio::test]
    async fn fallback_switches_and_sticks() {
        let (primary, primary_calls) = scripted("reqwest", true, 0);
        let (secondary, secondary_calls) = scripted("curl", false, 200);
        let t = FallbackTransport::new(Box::new(primary), Box::new(secondary));

        let first = t.get("u", &[]).await.unwrap();
        assert_eq!(first.body, "curl");
        let second = t.get("u", &[]).await.unwrap();
        assert_eq!(second.body, "curl");

        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fallback_does_not_retry_http_status() {
        let (primary, _) = scripted("reqwest", false, 403);
        let (secondary, secondary_calls) = scripted("curl", false, 200);
        let t = FallbackTransport::new(Box::new(primary), Box::new(secondary));

        let resp = t.get("u", &[]).await.unwrap();
        assert_eq!(resp.status, 403);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    /// Write an executable stand-in for curl into `dir`.
    #[cfg(unix)]
    fn fake_curl(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-curl");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn curl_sends_headers_on_stdin() {
        let tmp = tempfile::TempDir::new().unwrap();
        // Echo the URL (last argument) and the stdin headers, then the status trailer.
        let program = fake_curl(
            tmp.path(),
            "#!/bin/sh\nfor last; do :; done\nheaders=$(cat)\nprintf '%s\\n%s\\n__CFI_HTTP_STATUS__:200' \"$last\" \"$headers\"\n",
        );
        let t = CurlTransport::new(program, 5);

        let headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), "Bearer s3cret".to_string()),
        ];
        let resp = t.get("https://h/wiki/rest/api/content/1", &headers).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body,
            "https://h/wiki/rest/api/content/1\nAccept: application/json\nAuthorization: Bearer s3cret"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn curl_passes_http_error_status_through() {
        let tmp = tempfile::TempDir::new().unwrap();
        let program = fake_curl(
            tmp.path(),
            "#!/bin/sh\ncat >/dev/null\nprintf 'denied\\n__CFI_HTTP_STATUS__:403'\n",
        );
        let resp = CurlTransport::new(program, 5).get("u", &[]).await.unwrap();
        assert_eq!(resp.status, 403);
        assert_eq!(resp.body, "denied");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn curl_failure_exit_is_network_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let program = fake_curl(
            tmp.path(),
            "#!/bin/sh\ncat >/dev/null\necho 'curl: (7) Failed to connect' >&2\nexit 7\n",
        );
        let err = CurlTransport::new(program, 5).get("u", &[]).await.unwrap_err();
        match err {
            TransportError::Network(msg) => assert!(msg.contains("Failed to connect")),
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn curl_missing_binary_is_client_error() {
        let t = CurlTransport::new("/nonexistent/definitely-not-curl", 5);
        let err = t.get("http://127.0.0.1:9/", &[]).await.unwrap_err();
        assert!(matches!(err, TransportError::Client(_)));
    }
}
