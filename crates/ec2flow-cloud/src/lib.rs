//! ec2flow core
//!
//! Provider abstraction and lifecycle orchestration for EC2-style compute
//! resources: project-tag selection, region enumeration, the
//! instance → volume → snapshot listing walk, and the stop → snapshot →
//! start workflow with per-instance error isolation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  ec2ctl (CLI)                    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                ec2flow-cloud                     │
//! │  TagFilter ─► ResourceGraphWalker                │
//! │           └─► SnapshotWorkflow / power actions   │
//! │  RegionEnumerator wraps selection per region     │
//! │  every per-resource call goes through isolate()  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ComputeProvider / ProviderFactory  │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ ec2flow-cloud │ │ MockProvider  │
//! │     -aws      │ │ (feature mock)│
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod filter;
pub mod isolate;
pub mod model;
pub mod provider;
pub mod region;
pub mod wait;
pub mod walker;
pub mod workflow;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-exports
pub use error::{CloudError, Result, SelectionError};
pub use filter::{TagFilter, select_instances};
pub use isolate::{IsolatedFailure, Outcome, isolate};
pub use model::{
    DEFAULT_SNAPSHOT_DESCRIPTION, Instance, InstanceState, NO_PROJECT, PROJECT_TAG_KEY, Snapshot,
    SnapshotState, Volume, VolumeState,
};
pub use provider::{ComputeProvider, ProviderFactory};
pub use region::{
    KNOWN_REGIONS, RegionEnumerator, RegionScan, is_known_region, region_display_name,
};
pub use wait::{WaitConfig, wait_for_instance_state};
pub use walker::{
    InstanceRow, ResourceGraphWalker, Row, SnapshotPolicy, SnapshotRow, VolumeRow, WalkDepth,
};
pub use workflow::{
    InstanceReport, PowerAction, SnapshotRequest, SnapshotWorkflow, WorkflowEvent, WorkflowReport,
    WorkflowState, WorkflowStep, run_power_action,
};
