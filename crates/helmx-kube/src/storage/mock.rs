//! In-memory release storage for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{ReleaseStorage, not_found, order_records};
use crate::error::Result;
use crate::release::ReleaseRecord;

/// Storage: namespace -> name -> revision -> release
type Store = HashMap<String, HashMap<String, HashMap<u32, ReleaseRecord>>>;

/// In-memory storage driver
#[derive(Clone, Default)]
pub struct MockStorage {
    store: Arc<RwLock<Store>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<ReleaseRecord>) -> Self {
        let driver = Self::new();
        for release in releases {
            driver.insert(release);
        }
        driver
    }

    pub fn insert(&self, release: ReleaseRecord) {
        let mut store = self.store.write().unwrap();
        store
            .entry(release.namespace.clone())
            .or_default()
            .entry(release.name.clone())
            .or_default()
            .insert(release.version, release);
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    fn count_get(&self) {
        self.operations.write().unwrap().gets += 1;
    }

    fn count_list(&self) {
        self.operations.write().unwrap().lists += 1;
    }
}

#[async_trait]
impl ReleaseStorage for MockStorage {
    async fn get(&self, namespace: &str, name: &str, revision: u32) -> Result<ReleaseRecord> {
        self.count_get();
        let store = self.store.read().unwrap();
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .and_then(|revisions| revisions.get(&revision))
            .cloned()
            .ok_or_else(|| not_found(namespace, name))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<ReleaseRecord>> {
        self.count_list();
        let store = self.store.read().unwrap();
        let releases: Vec<ReleaseRecord> = store
            .get(namespace)
            .map(|ns| ns.values().flat_map(|r| r.values()).cloned().collect())
            .unwrap_or_default();
        Ok(order_records(releases, true))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<ReleaseRecord>> {
        self.count_list();
        let store = self.store.read().unwrap();
        let releases: Vec<ReleaseRecord> = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        Ok(order_records(releases, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use crate::storage::tests::record;

    fn storage() -> MockStorage {
        MockStorage::with_releases(vec![
            record("web", 1, "v1"),
            record("web", 2, "v2"),
            record("db", 1, "db"),
        ])
    }

    #[tokio::test]
    async fn test_get_latest_picks_highest_revision() {
        let storage = storage();
        let latest = storage.get_latest("default", "web").await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.manifest, "v2");
    }

    #[tokio::test]
    async fn test_get_specific_revision() {
        let storage = storage();
        let first = storage.get("default", "web", 1).await.unwrap();
        assert_eq!(first.manifest, "v1");
        assert_eq!(storage.operation_counts().gets, 1);
    }

    #[tokio::test]
    async fn test_missing_release() {
        let storage = storage();
        let err = storage.get_latest("default", "api").await.unwrap_err();
        assert!(matches!(err, KubeError::ReleaseNotFound { name, .. } if name == "api"));
        assert!(!storage.exists("other", "web").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_history() {
        let storage = storage();

        let listed: Vec<_> = storage
            .list("default")
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.version))
            .collect();
        assert_eq!(listed, vec![("db".to_string(), 1), ("web".to_string(), 2)]);

        let history: Vec<_> = storage
            .history("default", "web")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(history, vec![2, 1]);
    }
}
