//! Downstream delivery of a cycle's batch.
//!
//! A sink either accepts the whole batch or returns an error, in which case
//! the caller must not persist the cycle's state. An empty batch is never
//! sent.

use std::io::Write;

use serde_json::{Value, json};
use tracing::{debug, info};
use vigil_core::config::{ApiConfig, SinkConfig, SinkKind};
use vigil_types::EventRecord;

use crate::error::RunnerError;
use crate::transport::Transport;

/// Events per HTTP request.
const HTTP_CHUNK: usize = 1_000;

/// The configured sink.
#[derive(Debug)]
pub enum EventSink {
    /// Publish every event on a NATS subject.
    Nats(NatsSink),
    /// POST events to an HTTP collector.
    Http(HttpSink),
    /// Print every event as a JSON line.
    Stdout(StdoutSink),
}

impl EventSink {
    /// Connect the sink described by `config`.
    ///
    /// `api` supplies the timeout, TLS and retry settings reused by the HTTP
    /// sink.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Sink`] if NATS is unreachable, or
    /// [`RunnerError::Client`] if the HTTP client cannot be built.
    pub async fn connect(config: &SinkConfig, api: &ApiConfig) -> Result<Self, RunnerError> {
        let labels = Labels {
            vendor: config.vendor.clone(),
            product: config.product.clone(),
        };
        Ok(match config.kind {
            SinkKind::Nats => Self::Nats(NatsSink::connect(&config.nats_url, labels).await?),
            SinkKind::Http => Self::Http(HttpSink {
                transport: Transport::new(api)?,
                url: config.http_url.clone(),
                token: config.token.clone(),
                labels,
            }),
            SinkKind::Stdout => Self::Stdout(StdoutSink { labels }),
        })
    }

    /// Deliver `batch`. Does nothing for an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Sink`] if any part of the batch was not
    /// accepted.
    pub async fn deliver(&self, batch: &[EventRecord]) -> Result<(), RunnerError> {
        if batch.is_empty() {
            debug!(sink = self.name(), "empty batch, nothing to deliver");
            return Ok(());
        }
        match self {
            Self::Nats(sink) => sink.deliver(batch).await?,
            Self::Http(sink) => sink.deliver(batch).await?,
            Self::Stdout(sink) => sink.deliver(batch)?,
        }
        info!(sink = self.name(), events = batch.len(), "batch delivered");
        Ok(())
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nats(_) => "nats",
            Self::Http(_) => "http",
            Self::Stdout(_) => "stdout",
        }
    }
}

/// Vendor and product the events are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Labels {
    vendor: String,
    product: String,
}

// ---------------------------------------------------------------------------
// NATS
// ---------------------------------------------------------------------------

/// Publishes each event on `events.{vendor}.{product}`.
pub struct NatsSink {
    client: async_nats::Client,
    subject: String,
}

impl NatsSink {
    async fn connect(url: &str, labels: Labels) -> Result<Self, RunnerError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| RunnerError::Sink(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self {
            client,
            subject: nats_subject(&labels),
        })
    }

    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), RunnerError> {
        for record in batch {
            let payload = serde_json::to_vec(record)?;
            self.client
                .publish(self.subject.clone(), payload.into())
                .await
                .map_err(|e| {
                    RunnerError::Sink(format!("failed to publish to {}: {e}", self.subject))
                })?;
        }
        self.client
            .flush()
            .await
            .map_err(|e| RunnerError::Sink(format!("flush failed: {e}")))
    }
}

impl std::fmt::Debug for NatsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSink")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

fn nats_subject(labels: &Labels) -> String {
    format!(
        "events.{}.{}",
        subject_token(&labels.vendor),
        subject_token(&labels.product)
    )
}

/// NATS subject tokens cannot contain separators, wildcards or whitespace.
fn subject_token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// POSTs events in chunks to a collector endpoint.
pub struct HttpSink {
    transport: Transport,
    url: String,
    token: Option<String>,
    labels: Labels,
}

impl HttpSink {
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), RunnerError> {
        for chunk in batch.chunks(HTTP_CHUNK) {
            let mut builder = self
                .transport
                .client()
                .post(&self.url)
                .json(&http_payload(&self.labels, chunk));
            if let Some(token) = &self.token {
                builder = builder.bearer_auth(token);
            }
            let request = builder
                .build()
                .map_err(|e| RunnerError::Sink(format!("cannot build request: {e}")))?;
            self.transport
                .execute(request)
                .await
                .map_err(|e| RunnerError::Sink(e.to_string()))?;
            debug!(events = chunk.len(), "chunk accepted");
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("url", &self.url)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

fn http_payload(labels: &Labels, events: &[EventRecord]) -> Value {
    json!({
        "vendor": labels.vendor,
        "product": labels.product,
        "events": events,
    })
}

// ---------------------------------------------------------------------------
// Stdout
// ---------------------------------------------------------------------------

/// Writes one JSON object per line to standard output.
#[derive(Debug)]
pub struct StdoutSink {
    labels: Labels,
}

impl StdoutSink {
    fn deliver(&self, batch: &[EventRecord]) -> Result<(), RunnerError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write_lines(&mut out, &self.labels, batch)
            .map_err(|e| RunnerError::Sink(format!("failed to write to stdout: {e}")))
    }
}

fn write_lines(out: &mut impl Write, labels: &Labels, batch: &[EventRecord]) -> std::io::Result<()> {
    for record in batch {
        let mut fields = record.fields().clone();
        fields.insert("vendor".to_owned(), Value::String(labels.vendor.clone()));
        fields.insert("product".to_owned(), Value::String(labels.product.clone()));
        serde_json::to_writer(&mut *out, &fields)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
