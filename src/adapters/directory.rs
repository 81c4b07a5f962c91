//! Application directory port
//!
//! The directory is the upstream source of application details. The tracker
//! uses it to materialize entries on approval, and the scheduler uses it to
//! enumerate approved applications for reconciliation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::applicant::{ApplicationId, ApplicationSnapshot, IpoId};
use crate::error::AllotResult;

/// Application directory trait
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    /// Look up an application
    ///
    /// # Returns
    /// * `Ok(Some(snapshot))` - Application exists
    /// * `Ok(None)` - Application is unknown
    /// * `Err(AllotError)` - Lookup could not be completed
    async fn get_application(
        &self,
        application_id: &ApplicationId,
    ) -> AllotResult<Option<ApplicationSnapshot>>;

    /// List applications approved for an IPO
    async fn list_approved_applications(&self, ipo_id: &IpoId) -> AllotResult<Vec<ApplicationId>>;
}

/// In-process application directory
///
/// Every inserted application counts as approved for its IPO.
#[derive(Default)]
pub struct InMemoryApplicationDirectory {
    applications: RwLock<HashMap<ApplicationId, ApplicationSnapshot>>,
}

impl InMemoryApplicationDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an application
    pub fn insert(&self, application_id: ApplicationId, snapshot: ApplicationSnapshot) {
        self.applications.write().insert(application_id, snapshot);
    }

    /// Remove an application
    pub fn remove(&self, application_id: &ApplicationId) -> Option<ApplicationSnapshot> {
        self.applications.write().remove(application_id)
    }
}

#[async_trait]
impl ApplicationDirectory for InMemoryApplicationDirectory {
    async fn get_application(
        &self,
        application_id: &ApplicationId,
    ) -> AllotResult<Option<ApplicationSnapshot>> {
        Ok(self.applications.read().get(application_id).cloned())
    }

    async fn list_approved_applications(&self, ipo_id: &IpoId) -> AllotResult<Vec<ApplicationId>> {
        let mut ids: Vec<ApplicationId> = self
            .applications
            .read()
            .iter()
            .filter(|(_, snapshot)| &snapshot.ipo_id == ipo_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
