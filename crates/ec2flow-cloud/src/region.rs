//! Known regions and the multi-region scan

use crate::error::SelectionError;
use crate::filter::{TagFilter, select_instances};
use crate::isolate::{IsolatedFailure, Outcome};
use crate::provider::ProviderFactory;
use crate::walker::InstanceRow;
use serde::Serialize;
use tracing::{debug, info};

/// Region codes in scan order, with their display names
pub const KNOWN_REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-1", "US West (N. California)"),
    ("us-west-2", "US West (Oregon)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
    ("ap-northeast-2", "Asia Pacific (Seoul)"),
    ("ap-south-1", "Asia Pacific (Mumbai)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-southeast-2", "Asia Pacific (Sydney)"),
    ("ca-central-1", "Canada (Central)"),
    ("eu-central-1", "EU (Frankfurt)"),
    ("eu-west-1", "EU (Ireland)"),
    ("eu-west-2", "EU (London)"),
    ("eu-west-3", "EU (Paris)"),
    ("sa-east-1", "South America (Sao Paulo)"),
];

pub fn is_known_region(code: &str) -> bool {
    KNOWN_REGIONS.iter().any(|(c, _)| *c == code)
}

pub fn region_display_name(code: &str) -> Option<&'static str> {
    KNOWN_REGIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// What one region contributed to a scan
#[derive(Debug, Clone, Serialize)]
pub struct RegionScan {
    pub region: String,
    pub outcome: Outcome<Vec<InstanceRow>>,
}

impl RegionScan {
    /// True for a clean query that found nothing (not a failed one)
    pub fn is_empty(&self) -> bool {
        matches!(&self.outcome, Outcome::Ok(rows) if rows.is_empty())
    }
}

/// Stateless iteration over a fixed, ordered list of regions.
///
/// Every call to [`RegionEnumerator::regions`] starts again from the top.
#[derive(Debug, Clone)]
pub struct RegionEnumerator {
    regions: Vec<&'static str>,
}

impl Default for RegionEnumerator {
    fn default() -> Self {
        Self {
            regions: KNOWN_REGIONS.iter().map(|(code, _)| *code).collect(),
        }
    }
}

impl RegionEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the scan to a subset, keeping the declared order
    pub fn only(codes: &[&str]) -> Self {
        Self {
            regions: KNOWN_REGIONS
                .iter()
                .map(|(code, _)| *code)
                .filter(|code| codes.contains(code))
                .collect(),
        }
    }

    pub fn regions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.regions.iter().copied()
    }

    /// Visit every region in order and list its instances.
    ///
    /// Regions are queried one after another so output stays ordered.
    /// Each finished region is handed to `sink` immediately. A region whose
    /// query fails is reported as an isolated failure and the scan moves on;
    /// an authorization failure aborts the whole scan since the same
    /// credentials are used everywhere.
    pub async fn scan<F>(
        &self,
        factory: &dyn ProviderFactory,
        profile: &str,
        filter: &TagFilter,
        mut sink: F,
    ) -> Result<Vec<RegionScan>, SelectionError>
    where
        F: FnMut(&RegionScan),
    {
        let mut scans = Vec::with_capacity(self.regions.len());

        for region in self.regions() {
            debug!(region = %region, "Scanning region");

            let outcome = match factory.connect(region).await {
                Ok(provider) => match select_instances(provider.as_ref(), profile, filter).await {
                    Ok(instances) => {
                        Outcome::Ok(instances.iter().map(InstanceRow::from).collect())
                    }
                    Err(SelectionError::Query { source, .. }) => {
                        Outcome::Isolated(region_failure(region, source))
                    }
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_authorization() => {
                    return Err(SelectionError::from_query(profile, region, e));
                }
                Err(e) => Outcome::Isolated(region_failure(region, e)),
            };

            let scan = RegionScan {
                region: region.to_string(),
                outcome,
            };
            sink(&scan);
            scans.push(scan);
        }

        info!(regions = scans.len(), "Region scan finished");
        Ok(scans)
    }
}

fn region_failure(region: &str, error: crate::error::CloudError) -> IsolatedFailure {
    IsolatedFailure {
        resource_id: region.to_string(),
        step: "scan".to_string(),
        error,
    }
}
