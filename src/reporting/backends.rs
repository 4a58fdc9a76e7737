//! Telemetry receivers
//!
//! A backend is a capability: `{name, send(batch)}`. The queue iterates
//! configured backends in order; new receiver types are added by
//! implementing [`Backend`], not by branching on type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::BackendTarget;
use crate::error::PipelineError;
use crate::reporting::ErrorReportBatch;

const HTTP_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// External telemetry receiver
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the receiver, as configured
    fn name(&self) -> &str;

    /// Deliver one batch. The batch is never partially applied: any error
    /// means the whole batch moves on to the next backend in the chain.
    async fn send(&self, batch: &ErrorReportBatch) -> Result<(), String>;
}

/// Receiver that POSTs the batch as JSON to a collector endpoint
pub struct HttpBackend {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(HTTP_SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl HttpBackend {
    async fn deliver(&self, batch: &ErrorReportBatch) -> crate::error::Result<()> {
        let response = self.client.post(&self.endpoint).json(batch).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::BackendRejected {
                name: self.name.clone(),
                reason: format!("collector returned status {}", response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, batch: &ErrorReportBatch) -> Result<(), String> {
        self.deliver(batch).await.map_err(|e| e.to_string())
    }
}

/// Receiver that logs the batch locally. Used as the default target in
/// every preset so development traffic never leaves the machine.
pub struct ConsoleBackend {
    name: String,
}

impl ConsoleBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Backend for ConsoleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, batch: &ErrorReportBatch) -> Result<(), String> {
        info!(
            batch_id = %batch.batch_id,
            records = batch.records.len(),
            breadcrumbs = batch.breadcrumbs.len(),
            "error report batch"
        );
        Ok(())
    }
}

/// Build the fallback chain from configured targets: enabled targets only,
/// sorted by `order`
pub fn build(targets: &[BackendTarget]) -> Vec<Arc<dyn Backend>> {
    let mut targets: Vec<&BackendTarget> = targets.iter().filter(|t| t.enabled).collect();
    targets.sort_by_key(|t| t.order);
    targets
        .into_iter()
        .map(|t| -> Arc<dyn Backend> {
            if t.endpoint_or_key.starts_with("http://") || t.endpoint_or_key.starts_with("https://")
            {
                Arc::new(HttpBackend::new(t.name.clone(), t.endpoint_or_key.clone()))
            } else {
                Arc::new(ConsoleBackend::new(t.name.clone()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, endpoint: &str, enabled: bool, order: u32) -> BackendTarget {
        BackendTarget {
            name: name.to_string(),
            endpoint_or_key: endpoint.to_string(),
            enabled,
            order,
        }
    }

    #[test]
    fn test_build_filters_disabled_and_sorts_by_order() {
        let chain = build(&[
            target("secondary", "https://b.example.com/errors", true, 2),
            target("disabled", "https://c.example.com/errors", false, 0),
            target("primary", "https://a.example.com/errors", true, 1),
        ]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name(), "primary");
        assert_eq!(chain[1].name(), "secondary");
    }

    #[test]
    fn test_non_http_target_becomes_console() {
        let chain = build(&[target("console", "", true, 0)]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "console");
    }
}
