//! ClamAV scanner adapter.
//!
//! Wraps the clamd TCP protocol behind the pipeline's [`VirusScanner`]
//! trait. The adapter only reports what the engine said: clean, infected
//! with a threat label, or unavailable. The fail-open/fail-closed policy
//! lives with the orchestrator's configuration, not here.

use std::str;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clamav_client::{clean, Tcp};

use rentiva_pipeline::traits::{ScanVerdict, VirusScanner};

#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
}

impl ClamAvScanner {
    /// Create a new scanner for a clamd daemon (typically port 3310).
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 30)
    }

    /// Create with a custom scan timeout (for large files or slow instances).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }

    fn parse_threat_name(response_bytes: &[u8]) -> String {
        let response_str = match str::from_utf8(response_bytes) {
            Ok(s) => s.trim(),
            Err(_) => "unknown",
        };
        if response_str.contains("FOUND") {
            response_str
                .split(':')
                .nth(1)
                .unwrap_or("unknown")
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .to_string()
        } else {
            "unknown".to_string()
        }
    }

    /// Scan in-memory data using the sync client inside `spawn_blocking` to
    /// avoid !Send tokio futures. A timeout is reported as unavailable,
    /// never as an indefinite wait.
    pub async fn scan_bytes(&self, data: &[u8]) -> ScanVerdict {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, "Starting ClamAV scan");
        let data = data.to_vec();
        let host = self.host.clone();
        let port = self.port;
        let timeout_secs = self.timeout_secs;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let address = format!("{}:{}", host, port);
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                match clamav_client::scan_buffer(data.as_slice(), connection, None) {
                    Ok(response_bytes) => match clean(&response_bytes) {
                        Ok(true) => {
                            tracing::info!(
                                duration_ms = start.elapsed().as_millis(),
                                "File scan completed: clean"
                            );
                            ScanVerdict::Clean
                        }
                        Ok(false) => {
                            let threat = Self::parse_threat_name(&response_bytes);
                            tracing::warn!(
                                duration_ms = start.elapsed().as_millis(),
                                threat = %threat,
                                "File scan detected threat"
                            );
                            ScanVerdict::Infected(threat)
                        }
                        Err(e) => {
                            let detail = format!("Failed to parse ClamAV response: {}", e);
                            tracing::error!(error = %detail, "ClamAV response unparseable");
                            ScanVerdict::Unavailable(detail)
                        }
                    },
                    Err(e) => {
                        let detail = format!("ClamAV scan error: {}", e);
                        tracing::error!(error = %detail, "ClamAV scan failed");
                        ScanVerdict::Unavailable(detail)
                    }
                }
            }),
        )
        .await;

        match result {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                let detail = format!("ClamAV scan task join error: {}", e);
                tracing::error!(error = %detail, "ClamAV scan panicked");
                ScanVerdict::Unavailable(detail)
            }
            Err(_) => {
                let detail = format!("ClamAV scan timeout (exceeded {} seconds)", timeout_secs);
                tracing::error!(error = %detail, "ClamAV scan timeout");
                ScanVerdict::Unavailable(detail)
            }
        }
    }
}

#[async_trait]
impl VirusScanner for ClamAvScanner {
    async fn scan(&self, data: &[u8]) -> ScanVerdict {
        self.scan_bytes(data).await
    }
}
