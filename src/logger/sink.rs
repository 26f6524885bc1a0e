//! Log sinks: console, append-only file and HTTP webhook.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Timeout applied to each webhook delivery.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

// == Sink Trait ==
/// Destination for fully formatted log lines.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

// == Console Sink ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Writes lines to the process's stdout or stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    stream: ConsoleStream,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            stream: ConsoleStream::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: ConsoleStream::Stderr,
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn send(&self, message: &str) -> Result<()> {
        match self.stream {
            ConsoleStream::Stdout => println!("{message}"),
            ConsoleStream::Stderr => eprintln!("{message}"),
        }
        Ok(())
    }
}

// == File Sink ==
/// Appends one line per message to a file, creating it on first write.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    /// Serializes appends from concurrent deliveries
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&self, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Sink(format!("Failed to open {}: {e}", self.path.display())))?;
        file.write_all(format!("{message}\n").as_bytes())
            .await
            .map_err(|e| Error::Sink(format!("Failed to write {}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| Error::Sink(format!("Failed to flush {}: {e}", self.path.display())))
    }
}

// == Webhook Sink ==
/// POSTs `{"text": message}` to a URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid webhook URL: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "Unsupported webhook scheme: {other}"
                )))
            }
        }

        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::InvalidConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl Sink for WebhookSink {
    async fn send(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| Error::Sink(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Sink(format!("Webhook responded with {status}")));
        }
        Ok(())
    }
}
