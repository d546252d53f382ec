//! In-memory compute provider
//!
//! Records every call it receives and lets tests inject failures per call,
//! so orchestration code can be exercised without a real cloud account.

use crate::error::{CloudError, Result};
use crate::filter::TagFilter;
use crate::model::{Instance, InstanceState, Snapshot, SnapshotState, Volume};
use crate::provider::{ComputeProvider, ProviderFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single provider call, as recorded by [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListInstances,
    ListVolumes(String),
    ListSnapshots(String),
    InstanceState(String),
    Stop(String),
    Start(String),
    CreateSnapshot(String),
}

impl Call {
    /// Id of the resource the call targets, if any
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Call::ListInstances => None,
            Call::ListVolumes(id)
            | Call::ListSnapshots(id)
            | Call::InstanceState(id)
            | Call::Stop(id)
            | Call::Start(id)
            | Call::CreateSnapshot(id) => Some(id.as_str()),
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Stop(_) | Call::Start(_) | Call::CreateSnapshot(_))
    }
}

#[derive(Default)]
struct Inner {
    instances: Vec<Instance>,
    volumes: Vec<Volume>,
    snapshots: Vec<Snapshot>,
    calls: Vec<Call>,
    failures: HashMap<Call, CloudError>,
    /// instance id -> (state it settles into, polls left before it does)
    transitions: HashMap<String, (InstanceState, u32)>,
    /// Instances whose transitions never settle
    stuck: Vec<String>,
    settle_after_polls: u32,
    next_snapshot: u32,
}

/// Cheaply cloneable in-memory provider; clones share state.
#[derive(Clone)]
pub struct MockProvider {
    region: String,
    inner: Arc<Mutex<Inner>>,
}

impl MockProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            inner: Arc::new(Mutex::new(Inner {
                settle_after_polls: 1,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        self.add_instance(instance);
        self
    }

    pub fn with_volume(self, volume: Volume) -> Self {
        self.state().volumes.push(volume);
        self
    }

    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        self.state().snapshots.push(snapshot);
        self
    }

    /// Make every future `call` fail with `error`
    pub fn with_failure(self, call: Call, error: CloudError) -> Self {
        self.fail(call, error);
        self
    }

    /// Number of `instance_state` polls an instance spends in the transitional
    /// state (`stopping`/`pending`) before it settles. Defaults to 1.
    pub fn with_settle_after(self, polls: u32) -> Self {
        self.state().settle_after_polls = polls;
        self
    }

    /// Keep an instance in its transitional state forever
    pub fn with_stuck_instance(self, instance_id: impl Into<String>) -> Self {
        self.state().stuck.push(instance_id.into());
        self
    }

    pub fn add_instance(&self, instance: Instance) {
        self.state().instances.push(instance);
    }

    pub fn fail(&self, call: Call, error: CloudError) {
        self.state().failures.insert(call, error);
    }

    /// Force an instance into a state, bypassing any pending transition
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    /// Mutating calls that targeted `resource_id`, in order
    pub fn mutations_for(&self, resource_id: &str) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutation() && c.resource_id() == Some(resource_id))
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state().snapshots.clone()
    }

    pub fn current_state(&self, instance_id: &str) -> Option<InstanceState> {
        self.state()
            .instances
            .iter()
            .find(|i| i.id == instance_id)
            .map(|i| i.state.clone())
    }

    /// Record the call and return the injected failure, if any
    fn record(&self, call: Call) -> Result<()> {
        let mut inner = self.state();
        inner.calls.push(call.clone());
        match inner.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn begin_transition(
        &self,
        instance_id: &str,
        via: InstanceState,
        to: InstanceState,
    ) -> Result<()> {
        let mut inner = self.state();
        let polls = inner.settle_after_polls;
        let instance = inner
            .instances
            .iter_mut()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| CloudError::ResourceNotFound(instance_id.to_string()))?;

        if polls == 0 {
            instance.state = to;
        } else {
            instance.state = via;
            inner.transitions.insert(instance_id.to_string(), (to, polls));
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    fn region(&self) -> &str {
        &self.region
    }

    async fn list_instances(&self, filter: &TagFilter) -> Result<Vec<Instance>> {
        self.record(Call::ListInstances)?;
        Ok(self
            .state()
            .instances
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn list_volumes(&self, instance_id: &str) -> Result<Vec<Volume>> {
        self.record(Call::ListVolumes(instance_id.to_string()))?;
        Ok(self
            .state()
            .volumes
            .iter()
            .filter(|v| v.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn list_snapshots(&self, volume_id: &str) -> Result<Vec<Snapshot>> {
        self.record(Call::ListSnapshots(volume_id.to_string()))?;
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.volume_id == volume_id)
            .cloned()
            .collect())
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        self.record(Call::InstanceState(instance_id.to_string()))?;

        let mut inner = self.state();
        let stuck = inner.stuck.iter().any(|id| id == instance_id);
        let settled = match inner.transitions.get_mut(instance_id) {
            Some((_, remaining)) if !stuck => {
                if *remaining == 0 {
                    true
                } else {
                    *remaining -= 1;
                    false
                }
            }
            _ => false,
        };
        if settled {
            if let Some((target, _)) = inner.transitions.remove(instance_id) {
                if let Some(instance) = inner.instances.iter_mut().find(|i| i.id == instance_id) {
                    instance.state = target;
                }
            }
        }

        inner
            .instances
            .iter()
            .find(|i| i.id == instance_id)
            .map(|i| i.state.clone())
            .ok_or_else(|| CloudError::ResourceNotFound(instance_id.to_string()))
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.record(Call::Stop(instance_id.to_string()))?;
        self.begin_transition(instance_id, InstanceState::Stopping, InstanceState::Stopped)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.record(Call::Start(instance_id.to_string()))?;
        self.begin_transition(instance_id, InstanceState::Pending, InstanceState::Running)
    }

    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String> {
        self.record(Call::CreateSnapshot(volume_id.to_string()))?;

        let mut inner = self.state();
        inner.next_snapshot += 1;
        let id = format!("snap-{:04}", inner.next_snapshot);
        inner.snapshots.push(
            Snapshot::new(id.clone(), volume_id, SnapshotState::Pending)
                .with_description(description),
        );
        Ok(id)
    }
}

/// Hands out one [`MockProvider`] per region; unknown regions are empty.
#[derive(Clone, Default)]
pub struct MockFactory {
    providers: Arc<Mutex<HashMap<String, MockProvider>>>,
    unreachable: Arc<Mutex<HashMap<String, CloudError>>>,
    connected: Arc<Mutex<Vec<String>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(self, provider: MockProvider) -> Self {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.region().to_string(), provider);
        self
    }

    /// Make `connect(region)` itself fail
    pub fn with_unreachable(self, region: impl Into<String>, error: CloudError) -> Self {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(region.into(), error);
        self
    }

    /// Regions connected to so far, in order
    pub fn connected(&self) -> Vec<String> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    async fn connect(&self, region: &str) -> Result<Box<dyn ComputeProvider>> {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(region.to_string());

        if let Some(err) = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(region)
        {
            return Err(err.clone());
        }

        let provider = self
            .providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(region.to_string())
            .or_insert_with(|| MockProvider::new(region))
            .clone();
        Ok(Box::new(provider))
    }
}
