//! Compute provider trait definition

use crate::error::Result;
use crate::filter::TagFilter;
use crate::model::{Instance, InstanceState, Snapshot, Volume};
use async_trait::async_trait;

/// Region-scoped handle on a compute provider.
///
/// Every method is a single remote call. Implementations must not cache
/// results between calls: the provider is the only source of truth.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Region this handle is scoped to (e.g. "us-east-1")
    fn region(&self) -> &str;

    /// List instances, narrowed by the tag filter when it carries a project
    async fn list_instances(&self, filter: &TagFilter) -> Result<Vec<Instance>>;

    /// List volumes currently attached to an instance
    async fn list_volumes(&self, instance_id: &str) -> Result<Vec<Volume>>;

    /// List snapshots taken from a volume, in provider order
    async fn list_snapshots(&self, volume_id: &str) -> Result<Vec<Snapshot>>;

    /// Current lifecycle state of a single instance
    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState>;

    /// Request an instance stop; returns once the provider accepted it
    async fn stop_instance(&self, instance_id: &str) -> Result<()>;

    /// Request an instance start; returns once the provider accepted it
    async fn start_instance(&self, instance_id: &str) -> Result<()>;

    /// Request snapshot creation and return the new snapshot id.
    ///
    /// Does not wait for the snapshot to complete.
    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String>;
}

/// Opens region-scoped providers for the multi-region scan.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn connect(&self, region: &str) -> Result<Box<dyn ComputeProvider>>;
}
