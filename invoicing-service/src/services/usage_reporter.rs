//! Usage reporting to billing-service.
//!
//! Invoice and client creations feed the subscription gate's usage counters
//! through billing-service's usage-event endpoint. Reporting is advisory: a
//! failed report is logged and dropped, and billing-service can overwrite a
//! drifted counter with an absolute count during reconciliation.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct UsageEvent<'a> {
    resource: &'a str,
    delta: i32,
}

#[derive(Clone)]
pub struct UsageReporter {
    client: Client,
    base_url: String,
}

impl UsageReporter {
    /// An empty `base_url` disables reporting entirely.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// Report a usage delta without blocking the caller. The handler's
    /// response never waits on billing-service.
    pub fn spawn_report(&self, tenant_id: Uuid, resource: &'static str, delta: i32) {
        if !self.is_configured() {
            tracing::debug!(resource, delta, "Usage reporting disabled, dropping event");
            return;
        }

        let reporter = self.clone();
        tokio::spawn(async move {
            reporter.report(tenant_id, resource, delta).await;
        });
    }

    async fn report(&self, tenant_id: Uuid, resource: &str, delta: i32) {
        let url = format!("{}/usage/events", self.base_url);
        let result = self
            .client
            .post(&url)
            .header("X-Tenant-ID", tenant_id.to_string())
            .timeout(REPORT_TIMEOUT)
            .json(&UsageEvent { resource, delta })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(resource, delta, "Usage event reported");
            }
            Ok(response) => {
                tracing::warn!(
                    resource,
                    delta,
                    status = %response.status(),
                    "Usage event rejected by billing-service"
                );
            }
            Err(e) => {
                tracing::warn!(resource, delta, error = %e, "Usage event delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_base_url_disables_reporting() {
        assert!(!UsageReporter::new(String::new()).is_configured());
        assert!(UsageReporter::new("http://billing:8080".to_string()).is_configured());
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let reporter = UsageReporter::new("http://billing:8080/".to_string());
        assert_eq!(reporter.base_url, "http://billing:8080");
    }

    #[test]
    fn test_event_payload_shape() {
        let event = UsageEvent {
            resource: "invoices",
            delta: -1,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "resource": "invoices", "delta": -1 })
        );
    }
}
