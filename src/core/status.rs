//! Status catalog resolution.

use crate::domain::model::{PrState, Status, StatusId};
use crate::domain::ports::StatusRepository;
use crate::utils::error::{AssignError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Maps symbolic status names ("OPEN", "MERGED") to catalog ids.
///
/// Without caching, every call reads the whole catalog from the store. With
/// caching, the first successful read is kept until [`StatusResolver::refresh`].
#[derive(Debug, Default)]
pub struct StatusResolver {
    cache_enabled: bool,
    cache: RwLock<Option<HashMap<String, StatusId>>>,
}

impl StatusResolver {
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            cache_enabled,
            cache: RwLock::new(None),
        }
    }

    pub fn is_caching(&self) -> bool {
        self.cache_enabled
    }

    pub async fn resolve<S>(&self, store: &S, name: &str) -> Result<StatusId>
    where
        S: StatusRepository + ?Sized,
    {
        if self.cache_enabled {
            if let Some(id) = self
                .cache
                .read()
                .await
                .as_ref()
                .and_then(|names| names.get(name).copied())
            {
                return Ok(id);
            }
        }

        let catalog = store
            .all_statuses()
            .await
            .map_err(AssignError::store("load status catalog"))?;
        let id = lookup(&catalog, name);

        if self.cache_enabled {
            let names = catalog
                .iter()
                .map(|status| (status.name.clone(), status.id))
                .collect();
            *self.cache.write().await = Some(names);
        }

        id.ok_or_else(|| AssignError::StatusNotConfigured {
            name: name.to_string(),
        })
    }

    /// Name of the status with `id`, or `None` when the row is missing.
    pub async fn name_of<S>(&self, store: &S, id: StatusId) -> Result<Option<String>>
    where
        S: StatusRepository + ?Sized,
    {
        match store.find_status(id).await {
            Ok(status) => Ok(Some(status.name)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(AssignError::store(format!("load status {id}"))(e)),
        }
    }

    /// Lifecycle state behind `id`. A catalog entry outside the known states
    /// yields `None`; a missing row fails with `StatusNotFound`.
    pub async fn state_of<S>(&self, store: &S, id: StatusId) -> Result<Option<PrState>>
    where
        S: StatusRepository + ?Sized,
    {
        match store.find_status(id).await {
            Ok(status) => Ok(PrState::from_name(&status.name)),
            Err(e) if e.is_not_found() => Err(AssignError::StatusNotFound { status_id: id }),
            Err(e) => Err(AssignError::store(format!("load status {id}"))(e)),
        }
    }

    /// Drops cached ids; the next `resolve` reads the catalog again.
    pub async fn refresh(&self) {
        *self.cache.write().await = None;
        tracing::debug!("Status catalog cache cleared");
    }
}

fn lookup(catalog: &[Status], name: &str) -> Option<StatusId> {
    catalog
        .iter()
        .find(|status| status.name == name)
        .map(|status| status.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::StoreResult;
    use crate::utils::error::{Entity, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        statuses: Vec<Status>,
        reads: AtomicUsize,
    }

    impl CountingCatalog {
        fn new(statuses: Vec<Status>) -> Self {
            Self {
                statuses,
                reads: AtomicUsize::new(0),
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusRepository for CountingCatalog {
        async fn find_status(&self, id: StatusId) -> StoreResult<Status> {
            self.statuses
                .iter()
                .find(|status| status.id == id)
                .cloned()
                .ok_or_else(|| StoreError::not_found(Entity::Status, id))
        }

        async fn all_statuses(&self) -> StoreResult<Vec<Status>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.statuses.clone())
        }
    }

    #[tokio::test]
    async fn test_resolve_without_cache_reads_every_time() {
        let catalog = CountingCatalog::new(Status::default_catalog());
        let resolver = StatusResolver::new(false);

        let first = resolver.resolve(&catalog, "OPEN").await.unwrap();
        let second = resolver.resolve(&catalog, "OPEN").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.reads(), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_and_miss_return_same_ids() {
        let catalog = CountingCatalog::new(Status::default_catalog());
        let cached = StatusResolver::new(true);
        let uncached = StatusResolver::new(false);

        for name in ["OPEN", "MERGED", "OPEN", "MERGED"] {
            let hit_or_miss = cached.resolve(&catalog, name).await.unwrap();
            let fresh = uncached.resolve(&catalog, name).await.unwrap();
            assert_eq!(hit_or_miss, fresh);
        }

        // One read for the cached resolver, four for the uncached one.
        assert_eq!(catalog.reads(), 5);
    }

    #[tokio::test]
    async fn test_refresh_forces_reload() {
        let catalog = CountingCatalog::new(Status::default_catalog());
        let resolver = StatusResolver::new(true);

        resolver.resolve(&catalog, "MERGED").await.unwrap();
        resolver.refresh().await;
        resolver.resolve(&catalog, "MERGED").await.unwrap();

        assert_eq!(catalog.reads(), 2);
    }

    #[tokio::test]
    async fn test_missing_name_is_not_configured() {
        let catalog = CountingCatalog::new(vec![Status::new("OPEN")]);
        let resolver = StatusResolver::new(true);

        let err = resolver.resolve(&catalog, "MERGED").await.unwrap_err();
        assert!(matches!(
            err,
            AssignError::StatusNotConfigured { ref name } if name == "MERGED"
        ));
    }

    #[tokio::test]
    async fn test_name_of_tolerates_missing_row() {
        let catalog = CountingCatalog::new(Status::default_catalog());
        let resolver = StatusResolver::new(false);

        let missing = resolver.name_of(&catalog, StatusId::new_v4()).await.unwrap();
        assert_eq!(missing, None);

        let open = catalog.statuses[0].id;
        let name = resolver.name_of(&catalog, open).await.unwrap();
        assert_eq!(name.as_deref(), Some("OPEN"));
    }

    #[tokio::test]
    async fn test_state_of_reports_missing_row() {
        let mut statuses = Status::default_catalog();
        statuses.push(Status::new("DRAFT"));
        let catalog = CountingCatalog::new(statuses);
        let resolver = StatusResolver::new(false);

        let merged = catalog.statuses[1].id;
        let state = resolver.state_of(&catalog, merged).await.unwrap();
        assert_eq!(state, Some(PrState::Merged));

        let draft = catalog.statuses[2].id;
        assert_eq!(resolver.state_of(&catalog, draft).await.unwrap(), None);

        let ghost = StatusId::new_v4();
        let err = resolver.state_of(&catalog, ghost).await.unwrap_err();
        assert!(matches!(err, AssignError::StatusNotFound { status_id } if status_id == ghost));
    }
}
