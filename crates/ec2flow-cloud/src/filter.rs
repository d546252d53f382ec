//! Project tag filtering and working-set selection

use crate::error::SelectionError;
use crate::model::{Instance, PROJECT_TAG_KEY};
use crate::provider::ComputeProvider;
use serde::Serialize;
use tracing::debug;

/// Predicate on the `Project` tag.
///
/// `None` selects every instance visible to the current scope; `Some(p)`
/// selects instances whose `Project` tag is exactly `p` (case-sensitive,
/// no wildcards). Untagged instances only appear without a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagFilter {
    project: Option<String>,
}

impl TagFilter {
    pub fn new(project: Option<String>) -> Self {
        Self { project }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
        }
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Provider-side filter as a (`tag:<key>`, value) pair, if any
    pub fn tag_query(&self) -> Option<(String, &str)> {
        self.project
            .as_deref()
            .map(|p| (format!("tag:{}", PROJECT_TAG_KEY), p))
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        match &self.project {
            Some(project) => instance.project() == Some(project.as_str()),
            None => true,
        }
    }
}

/// Query the provider for the working set.
///
/// The provider already narrows by tag; the predicate is applied again so
/// the result never contains an instance outside the filter. A failing
/// query is fatal: nothing has been touched yet.
pub async fn select_instances(
    provider: &dyn ComputeProvider,
    profile: &str,
    filter: &TagFilter,
) -> Result<Vec<Instance>, SelectionError> {
    let mut instances = provider
        .list_instances(filter)
        .await
        .map_err(|e| SelectionError::from_query(profile, provider.region(), e))?;

    instances.retain(|i| filter.matches(i));

    debug!(
        region = %provider.region(),
        project = ?filter.project_name(),
        count = instances.len(),
        "Selected instances"
    );
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::mock::{Call, MockProvider};

    fn fleet() -> Vec<Instance> {
        vec![
            Instance::new("i-1").with_tag(PROJECT_TAG_KEY, "alpha"),
            Instance::new("i-2"),
            Instance::new("i-3").with_tag(PROJECT_TAG_KEY, "Alpha"),
            Instance::new("i-4").with_tag(PROJECT_TAG_KEY, "beta"),
            Instance::new("i-5").with_tag("project", "alpha"),
        ]
    }

    #[test]
    fn test_matches_is_exact_and_case_sensitive() {
        let filter = TagFilter::project("alpha");
        let ids: Vec<_> = fleet()
            .into_iter()
            .filter(|i| filter.matches(i))
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["i-1"]);
    }

    #[test]
    fn test_no_filter_matches_everything() {
        let filter = TagFilter::all();
        assert!(fleet().iter().all(|i| filter.matches(i)));
        assert!(filter.tag_query().is_none());
    }

    #[test]
    fn test_tag_query() {
        let filter = TagFilter::project("alpha");
        assert_eq!(
            filter.tag_query(),
            Some(("tag:Project".to_string(), "alpha"))
        );
    }

    #[tokio::test]
    async fn test_select_with_project() {
        let provider = MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1").with_tag(PROJECT_TAG_KEY, "alpha"))
            .with_instance(Instance::new("i-2"));

        let selected = select_instances(&provider, "default", &TagFilter::project("alpha"))
            .await
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1"]);
    }

    #[tokio::test]
    async fn test_select_without_project_returns_full_set_in_order() {
        let provider = MockProvider::new("us-east-1");
        for instance in fleet() {
            provider.add_instance(instance);
        }

        let selected = select_instances(&provider, "default", &TagFilter::all())
            .await
            .unwrap();
        let ids: Vec<_> = selected.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2", "i-3", "i-4", "i-5"]);
    }

    #[tokio::test]
    async fn test_select_failure_is_fatal() {
        let provider = MockProvider::new("us-east-1").with_failure(
            Call::ListInstances,
            CloudError::Authorization("UnauthorizedOperation".to_string()),
        );

        let err = select_instances(&provider, "ops", &TagFilter::all())
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }
}
