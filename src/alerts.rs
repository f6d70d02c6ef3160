use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::drift::DriftReport;

/// Sink for drift alerts.
///
/// Implementations must not block for long: `notify` is called inline by
/// `DriftMonitor::detect_drift`. An `Err` is logged and recorded on the
/// report, never propagated.
pub trait Notifier: Send + Sync {
    fn notify(&self, report: &DriftReport) -> Result<()>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, report: &DriftReport) -> Result<()> {
        warn!(
            "DRIFT ALERT severity={} accuracy_drift={:+.4} brier_drift={:+.4} roi_drift={:+.4}: {}",
            report.severity,
            report.metrics.accuracy_drift,
            report.metrics.brier_drift,
            report.metrics.roi_drift,
            report.recommendation
        );
        Ok(())
    }
}

/// Discards alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _report: &DriftReport) -> Result<()> {
        Ok(())
    }
}

/// POSTs the JSON report to a webhook.
///
/// Delivery is fire-and-forget on the current tokio runtime; `notify` only
/// fails when there is no runtime to dispatch on or the report cannot be
/// serialized. HTTP failures are logged by the background task.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid webhook URL {}", url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Webhook URL must be http(s), got {}", url.scheme());
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        info!("Drift alerts will be posted to {}", url);
        Ok(WebhookNotifier { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, report: &DriftReport) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("no tokio runtime to deliver webhook alert on"))?;
        let body = serde_json::to_value(report).context("Failed to serialize drift report")?;
        let http = self.http.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            match http.post(url.clone()).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Drift alert delivered to {}", url);
                }
                Ok(resp) => warn!("Drift webhook {} answered {}", url, resp.status()),
                Err(e) => warn!("Drift webhook {} failed: {}", url, e),
            }
        });
        Ok(())
    }
}
