//! The cloud collaborator contract and its implementations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CloudError;
use crate::instance::{InstanceMetrics, RawInstance};

/// Source of inventory and CPU metrics.
///
/// Implementations must be cheap to share across tasks; the reconciler calls
/// `instance_metrics` concurrently for every listed instance.
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    /// List every instance visible to this provider.
    async fn list_instances(&self) -> Result<Vec<RawInstance>, CloudError>;

    /// Average CPU metrics for one instance over the trailing `window`.
    async fn instance_metrics(
        &self,
        instance_id: &str,
        window: Duration,
    ) -> Result<InstanceMetrics, CloudError>;
}

#[async_trait]
impl<P: CloudProvider + ?Sized> CloudProvider for Arc<P> {
    async fn list_instances(&self) -> Result<Vec<RawInstance>, CloudError> {
        (**self).list_instances().await
    }

    async fn instance_metrics(
        &self,
        instance_id: &str,
        window: Duration,
    ) -> Result<InstanceMetrics, CloudError> {
        (**self).instance_metrics(instance_id, window).await
    }
}

// ── Mock ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockState {
    instances: Vec<RawInstance>,
    metrics: HashMap<String, InstanceMetrics>,
    fail_inventory: bool,
    fail_metrics: bool,
}

/// In-memory provider whose inventory is set directly.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the inventory.
    pub async fn set_instances(&self, instances: Vec<RawInstance>) {
        self.state.lock().await.instances = instances;
    }

    /// Set the metrics reported for one instance.
    pub async fn set_metrics(&self, instance_id: impl Into<String>, metrics: InstanceMetrics) {
        self.state
            .lock()
            .await
            .metrics
            .insert(instance_id.into(), metrics);
    }

    /// Make every inventory call fail until reset.
    pub async fn fail_inventory(&self, fail: bool) {
        self.state.lock().await.fail_inventory = fail;
    }

    /// Make every metrics call fail until reset.
    pub async fn fail_metrics(&self, fail: bool) {
        self.state.lock().await.fail_metrics = fail;
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn list_instances(&self) -> Result<Vec<RawInstance>, CloudError> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(CloudError::Inventory("mock inventory failure".to_owned()));
        }
        Ok(state.instances.clone())
    }

    async fn instance_metrics(
        &self,
        instance_id: &str,
        _window: Duration,
    ) -> Result<InstanceMetrics, CloudError> {
        let state = self.state.lock().await;
        if state.fail_metrics {
            return Err(CloudError::Metrics {
                instance_id: instance_id.to_owned(),
                reason: "mock metrics failure".to_owned(),
            });
        }
        Ok(state.metrics.get(instance_id).copied().unwrap_or_default())
    }
}

// ── File ────────────────────────────────────────────────────────────────────

/// One entry of an inventory file: a raw instance with optional metrics.
#[derive(Debug, Deserialize)]
struct InventoryEntry {
    #[serde(flatten)]
    instance: RawInstance,
    #[serde(default)]
    metrics: Option<InstanceMetrics>,
}

/// Provider backed by a JSON inventory file, re-read on every listing.
///
/// The file holds an array of raw instances, each optionally carrying a
/// `metrics` object. Metrics are served from the most recent listing.
#[derive(Debug)]
pub struct FileProvider {
    path: PathBuf,
    region: Option<String>,
    metrics: Mutex<HashMap<String, InstanceMetrics>>,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            region: None,
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Only list instances whose availability zone lies in `region`.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    fn in_region(&self, instance: &RawInstance) -> bool {
        match (&self.region, &instance.availability_zone) {
            (None, _) => true,
            (Some(region), Some(zone)) => zone.starts_with(region.as_str()),
            (Some(_), None) => false,
        }
    }
}

#[async_trait]
impl CloudProvider for FileProvider {
    async fn list_instances(&self) -> Result<Vec<RawInstance>, CloudError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let entries: Vec<InventoryEntry> = serde_json::from_slice(&bytes)?;

        let mut metrics = HashMap::new();
        let mut instances = Vec::with_capacity(entries.len());
        for entry in entries {
            if !self.in_region(&entry.instance) {
                continue;
            }
            if let Some(m) = entry.metrics {
                metrics.insert(entry.instance.instance_id.clone(), m);
            }
            instances.push(entry.instance);
        }

        debug!(
            path = %self.path.display(),
            count = instances.len(),
            "read inventory file"
        );
        *self.metrics.lock().await = metrics;
        Ok(instances)
    }

    async fn instance_metrics(
        &self,
        instance_id: &str,
        _window: Duration,
    ) -> Result<InstanceMetrics, CloudError> {
        self.metrics
            .lock()
            .await
            .get(instance_id)
            .copied()
            .ok_or_else(|| CloudError::Metrics {
                instance_id: instance_id.to_owned(),
                reason: "no metrics in inventory file".to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::PowerState;
    use std::io::Write;

    const WINDOW: Duration = Duration::from_secs(600);

    const INVENTORY: &str = r#"[
        {
            "instance_id": "i-1",
            "instance_type": "t2.micro",
            "state": "running",
            "availability_zone": "us-east-1a",
            "tags": [{"key": "Name", "value": "web.api.prod"}],
            "metrics": {"cpu_utilization": 50.0, "cpu_credit_balance": 100.0}
        },
        {
            "instance_id": "i-2",
            "instance_type": "m4.2xlarge",
            "state": "stopped",
            "availability_zone": "eu-west-1b"
        }
    ]"#;

    fn inventory_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_provider_lists_and_serves_metrics() {
        let file = inventory_file();
        let provider = FileProvider::new(file.path());

        let instances = provider.list_instances().await.unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].state, PowerState::Stopped);

        let m = provider.instance_metrics("i-1", WINDOW).await.unwrap();
        assert_eq!(m.cpu_utilization, 50.0);
        assert_eq!(m.cpu_credit_balance, Some(100.0));

        assert!(matches!(
            provider.instance_metrics("i-2", WINDOW).await,
            Err(CloudError::Metrics { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_provider_region_filter() {
        let file = inventory_file();
        let provider = FileProvider::new(file.path()).with_region("eu-west-1");

        let instances = provider.list_instances().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_id, "i-2");
    }

    #[tokio::test]
    async fn test_file_provider_missing_file() {
        let provider = FileProvider::new("/nonexistent/inventory.json");
        assert!(matches!(
            provider.list_instances().await,
            Err(CloudError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_file_provider_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let provider = FileProvider::new(file.path());
        assert!(matches!(
            provider.list_instances().await,
            Err(CloudError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_provider_failures() {
        let mock = MockProvider::new();
        assert!(mock.list_instances().await.unwrap().is_empty());

        mock.fail_inventory(true).await;
        assert!(mock.list_instances().await.is_err());

        mock.fail_metrics(true).await;
        assert!(mock.instance_metrics("i-1", WINDOW).await.is_err());
    }
}
