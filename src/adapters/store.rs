//! Allotment storage port
//!
//! Storage is keyed by IPO with create-if-absent semantics. The insert is the
//! last line of the at-most-one-draw guarantee: whichever writer lands first
//! owns the IPO, every later writer gets [`AllotError::AlreadyDrawn`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::allotment::AllotmentRecord;
use crate::applicant::IpoId;
use crate::error::{AllotError, AllotResult};

/// Allotment storage trait
#[async_trait]
pub trait AllotmentStore: Send + Sync {
    /// Persist a record unless one already exists for its IPO
    ///
    /// # Returns
    /// * `Ok(())` - Record durably written
    /// * `Err(AllotError::AlreadyDrawn)` - IPO already has a record
    /// * `Err(AllotError::PersistenceFailure)` - Write failed, nothing stored
    async fn create_if_absent(&self, record: &AllotmentRecord) -> AllotResult<()>;

    /// Fetch the record for an IPO
    async fn get(&self, ipo_id: &IpoId) -> AllotResult<Option<AllotmentRecord>>;

    /// Note that the record's outcome event was emitted
    async fn mark_published(&self, ipo_id: &IpoId) -> AllotResult<()>;

    /// Records whose outcome event has not been emitted yet
    async fn list_unpublished(&self) -> AllotResult<Vec<AllotmentRecord>>;
}

struct StoredAllotment {
    record: AllotmentRecord,
    published: bool,
}

/// In-process allotment store
#[derive(Default)]
pub struct InMemoryAllotmentStore {
    records: RwLock<HashMap<IpoId, StoredAllotment>>,
}

impl InMemoryAllotmentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn count(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the record for an IPO has been published
    pub fn is_published(&self, ipo_id: &IpoId) -> bool {
        self.records
            .read()
            .get(ipo_id)
            .map(|stored| stored.published)
            .unwrap_or(false)
    }
}

#[async_trait]
impl AllotmentStore for InMemoryAllotmentStore {
    async fn create_if_absent(&self, record: &AllotmentRecord) -> AllotResult<()> {
        let mut records = self.records.write();

        if records.contains_key(&record.ipo_id) {
            return Err(AllotError::AlreadyDrawn {
                ipo_id: record.ipo_id.clone(),
            });
        }

        records.insert(
            record.ipo_id.clone(),
            StoredAllotment {
                record: record.clone(),
                published: false,
            },
        );
        Ok(())
    }

    async fn get(&self, ipo_id: &IpoId) -> AllotResult<Option<AllotmentRecord>> {
        Ok(self
            .records
            .read()
            .get(ipo_id)
            .map(|stored| stored.record.clone()))
    }

    async fn mark_published(&self, ipo_id: &IpoId) -> AllotResult<()> {
        let mut records = self.records.write();
        let stored = records.get_mut(ipo_id).ok_or_else(|| {
            AllotError::PersistenceFailure(format!("No allotment stored for IPO {}", ipo_id))
        })?;

        stored.published = true;
        Ok(())
    }

    async fn list_unpublished(&self) -> AllotResult<Vec<AllotmentRecord>> {
        let mut pending: Vec<AllotmentRecord> = self
            .records
            .read()
            .values()
            .filter(|stored| !stored.published)
            .map(|stored| stored.record.clone())
            .collect();
        pending.sort_by(|a, b| a.ipo_id.cmp(&b.ipo_id));
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(ipo: &str) -> AllotmentRecord {
        AllotmentRecord::from_draw(
            IpoId::new(ipo),
            ipo.to_string(),
            10,
            &[],
            &BTreeSet::new(),
        )
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let store = InMemoryAllotmentStore::new();

        store.create_if_absent(&record("ipo-1")).await.unwrap();
        let second = store.create_if_absent(&record("ipo-1")).await;
        assert!(matches!(second, Err(AllotError::AlreadyDrawn { .. })));
        assert_eq!(store.count(), 1);

        let fetched = store.get(&IpoId::new("ipo-1")).await.unwrap();
        assert!(fetched.is_some());
        assert!(store.get(&IpoId::new("ipo-2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publication_bookkeeping() {
        let store = InMemoryAllotmentStore::new();
        store.create_if_absent(&record("ipo-1")).await.unwrap();
        store.create_if_absent(&record("ipo-2")).await.unwrap();

        assert_eq!(store.list_unpublished().await.unwrap().len(), 2);

        store.mark_published(&IpoId::new("ipo-1")).await.unwrap();
        assert!(store.is_published(&IpoId::new("ipo-1")));

        let pending = store.list_unpublished().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ipo_id, IpoId::new("ipo-2"));

        let missing = store.mark_published(&IpoId::new("ipo-9")).await;
        assert!(matches!(missing, Err(AllotError::PersistenceFailure(_))));
    }
}
