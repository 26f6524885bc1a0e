//! Logger Module
//!
//! Multi-channel log dispatcher. A logger is built with a fixed table of
//! named channels, each holding a list of sinks; `log` formats a message
//! once and fans it out to every sink of the channel.

mod format;
mod sink;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Error, Result};

// Re-export public types
pub use format::{format_message, render_values};
pub use sink::{ConsoleSink, FileSink, Sink, WebhookSink, WEBHOOK_TIMEOUT};

/// Channels created by `Logger::console`.
pub const DEFAULT_CHANNELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Receives sink failures together with the channel they happened on.
pub type ErrorHook = Arc<dyn Fn(&Error, &str) + Send + Sync>;

// == Logger ==
pub struct Logger {
    name: Option<String>,
    channels: RwLock<HashMap<String, Vec<Arc<dyn Sink>>>>,
    error_logging: Option<ErrorHook>,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Logger with the default channels, `error` going to stderr and the
    /// rest to stdout.
    pub fn console(name: Option<&str>) -> Self {
        let mut builder = Self::builder();
        if let Some(name) = name {
            builder = builder.name(name);
        }
        for channel in DEFAULT_CHANNELS {
            let sink: Arc<dyn Sink> = if channel == "error" {
                Arc::new(ConsoleSink::stderr())
            } else {
                Arc::new(ConsoleSink::stdout())
            };
            builder = builder.channel(channel, vec![sink]);
        }
        builder.build()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    // == Register ==
    /// Adds a sink to a channel, creating the channel if needed.
    pub fn register(&self, channel: &str, sink: Arc<dyn Sink>) -> &Self {
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(sink);
        self
    }

    // == Log ==
    /// Formats `values` and delivers the line to every sink of `channel`.
    ///
    /// Sink failures go to the error hook (or `tracing::error!`) and never
    /// fail the call; only an unknown channel does.
    pub async fn log(&self, channel: &str, values: &[Value]) -> Result<()> {
        let sinks = self
            .channels
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))?;

        let message = format_message(channel, self.name.as_deref(), &render_values(values));
        let outcomes = join_all(sinks.iter().map(|sink| sink.send(&message))).await;

        for err in outcomes.into_iter().filter_map(|outcome| outcome.err()) {
            self.report(&err, channel);
        }
        Ok(())
    }

    pub async fn debug(&self, values: &[Value]) -> Result<()> {
        self.log("debug", values).await
    }

    pub async fn info(&self, values: &[Value]) -> Result<()> {
        self.log("info", values).await
    }

    pub async fn warn(&self, values: &[Value]) -> Result<()> {
        self.log("warn", values).await
    }

    pub async fn error(&self, values: &[Value]) -> Result<()> {
        self.log("error", values).await
    }

    // == Notify ==
    /// Best-effort single message; a missing channel is only traced.
    pub async fn notify(&self, channel: &str, message: impl Into<String>) {
        let message = Value::String(message.into());
        if let Err(err) = self.log(channel, std::slice::from_ref(&message)).await {
            debug!(channel, error = %err, "Log notice dropped");
        }
    }

    // == Spawn Notify ==
    /// `notify` on its own task, so the caller never waits on slow sinks.
    /// Outside a Tokio runtime the notice is dropped.
    pub fn spawn_notify(self: &Arc<Self>, channel: &str, message: impl Into<String>) {
        let channel = channel.to_string();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(channel, "No runtime for log notice, dropped");
            return;
        };
        let logger = Arc::clone(self);
        let message = message.into();
        runtime.spawn(async move {
            logger.notify(&channel, message).await;
        });
    }

    fn report(&self, err: &Error, channel: &str) {
        match &self.error_logging {
            Some(hook) => hook(err, channel),
            None => error!(channel, error = %err, "Log sink failed"),
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("channels", &self.channels())
            .finish()
    }
}

// == Logger Builder ==
#[derive(Default)]
pub struct LoggerBuilder {
    name: Option<String>,
    channels: HashMap<String, Vec<Arc<dyn Sink>>>,
    error_logging: Option<ErrorHook>,
}

impl LoggerBuilder {
    /// Name printed after the channel in every line.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares a channel; repeated calls for one channel append sinks.
    pub fn channel(mut self, channel: impl Into<String>, sinks: Vec<Arc<dyn Sink>>) -> Self {
        self.channels.entry(channel.into()).or_default().extend(sinks);
        self
    }

    pub fn error_logging<H>(mut self, hook: H) -> Self
    where
        H: Fn(&Error, &str) + Send + Sync + 'static,
    {
        self.error_logging = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            name: self.name,
            channels: RwLock::new(self.channels),
            error_logging: self.error_logging,
        }
    }
}
