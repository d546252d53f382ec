//! Remote resource handles: instances, volumes and snapshots.
//!
//! These are read-only views of what the provider reported for a single
//! query. Nothing here is cached between invocations; every listing and
//! mutation goes back to the provider.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Tag key used to partition instances into projects
pub const PROJECT_TAG_KEY: &str = "Project";

/// Shown in place of the project tag when an instance has none
pub const NO_PROJECT: &str = "<no project>";

/// Label attached to snapshots created by the lifecycle workflow
pub const DEFAULT_SNAPSHOT_DESCRIPTION: &str = "Created by SnapShotAnalyzer 3000";

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// A value this build does not know about
            Unknown(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $wire,)+
                    $name::Unknown(s) => s.as_str(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($wire => $name::$variant,)+
                    other => $name::Unknown(other.to_string()),
                })
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s.parse() {
                    Ok(v) => v,
                    Err(never) => match never {},
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Provider-owned power/lifecycle state of an instance
    InstanceState {
        Pending => "pending",
        Running => "running",
        Stopping => "stopping",
        Stopped => "stopped",
        ShuttingDown => "shutting-down",
        Terminated => "terminated",
        Terminating => "terminating",
    }
}

wire_enum! {
    VolumeState {
        Creating => "creating",
        Available => "available",
        InUse => "in-use",
        Deleting => "deleting",
        Deleted => "deleted",
    }
}

wire_enum! {
    SnapshotState {
        Pending => "pending",
        Completed => "completed",
        Error => "error",
    }
}

/// A virtual machine instance as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instance {
    pub id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub state: InstanceState,
    pub public_address: Option<String>,
    pub tags: HashMap<String, String>,
}

impl Instance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instance_type: String::new(),
            availability_zone: String::new(),
            state: InstanceState::Running,
            public_address: None,
            tags: HashMap::new(),
        }
    }

    pub fn with_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = instance_type.into();
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = zone.into();
        self
    }

    pub fn with_state(mut self, state: InstanceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_public_address(mut self, address: impl Into<String>) -> Self {
        self.public_address = Some(address.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Value of the `Project` tag, if any
    pub fn project(&self) -> Option<&str> {
        self.tags.get(PROJECT_TAG_KEY).map(String::as_str)
    }
}

/// A block-storage volume attached to an instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volume {
    pub id: String,
    /// Owning instance, as recorded by the provider's attachment
    pub instance_id: String,
    pub size_gib: i32,
    pub encrypted: bool,
    pub state: VolumeState,
}

impl Volume {
    pub fn new(id: impl Into<String>, instance_id: impl Into<String>, size_gib: i32) -> Self {
        Self {
            id: id.into(),
            instance_id: instance_id.into(),
            size_gib,
            encrypted: false,
            state: VolumeState::InUse,
        }
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

/// A point-in-time copy of a volume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: String,
    /// Volume the snapshot was taken from (provenance only)
    pub volume_id: String,
    pub state: SnapshotState,
    /// Percentage string as reported by the provider, e.g. "100%"
    pub progress: String,
    pub start_time: Option<DateTime<Utc>>,
    pub description: String,
}

impl Snapshot {
    pub fn new(id: impl Into<String>, volume_id: impl Into<String>, state: SnapshotState) -> Self {
        let progress = if state == SnapshotState::Completed {
            "100%"
        } else {
            "0%"
        };
        Self {
            id: id.into(),
            volume_id: volume_id.into(),
            state,
            progress: progress.to_string(),
            start_time: None,
            description: String::new(),
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
