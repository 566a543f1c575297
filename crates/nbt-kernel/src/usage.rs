//! Fire-and-forget usage pings. Failures are logged at debug level and
//! never reach the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use nbt_types::config::UsageConfig;

#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub event: String,
    pub origin: String,
    pub id: String,
    pub at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn tool_loaded(origin: &str, id: &str) -> Self {
        Self {
            event: "tool_loaded".to_string(),
            origin: origin.to_string(),
            id: id.to_string(),
            at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct UsageReporter {
    endpoint: Option<String>,
    client: reqwest::Client,
    runtime: Handle,
}

impl UsageReporter {
    pub fn new(config: &UsageConfig, runtime: Handle) -> Self {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| config.enabled && !e.is_empty());
        Self {
            endpoint,
            client: reqwest::Client::new(),
            runtime,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Post `event` in the background. `None` when reporting is disabled.
    pub fn ping(&self, event: UsageEvent) -> Option<JoinHandle<()>> {
        let endpoint = self.endpoint.clone()?;
        let client = self.client.clone();
        Some(self.runtime.spawn(async move {
            match client.post(&endpoint).json(&event).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    debug!("Usage ping to {} returned {}", endpoint, resp.status())
                }
                Ok(_) => {}
                Err(e) => debug!("Usage ping to {} failed: {}", endpoint, e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_without_endpoint_or_flag() {
        let off = UsageReporter::new(&UsageConfig::default(), Handle::current());
        assert!(!off.is_enabled());
        assert!(off.ping(UsageEvent::tool_loaded("Notebook", "plot")).is_none());

        let flag_only = UsageReporter::new(
            &UsageConfig {
                enabled: false,
                endpoint: Some("http://127.0.0.1:9/usage".into()),
            },
            Handle::current(),
        );
        assert!(!flag_only.is_enabled());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_silent() {
        let reporter = UsageReporter::new(
            &UsageConfig {
                enabled: true,
                endpoint: Some("http://127.0.0.1:9/usage".into()),
            },
            Handle::current(),
        );
        assert!(reporter.is_enabled());
        let ping = reporter
            .ping(UsageEvent::tool_loaded("Notebook", "plot"))
            .expect("reporting is enabled");
        ping.await.expect("ping task panicked");
    }
}
