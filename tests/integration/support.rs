//! Shared fixtures

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ipo_allotment::adapters::{
    AllotmentStore, ChannelPublisher, InMemoryAllotmentStore, InMemoryApplicationDirectory,
};
use ipo_allotment::{
    AllotResult, AllotmentEngine, AllotmentEngineConfig, AllotmentOutcome, AllotmentRecord,
    ApplicationId, ApplicationSnapshot, EligibilityEvent, InvestorId, IpoId, MandateId,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// In-memory store that suspends inside reads and writes
///
/// The pause gives a concurrent draw room to interleave between the
/// existence check and the insert.
pub struct PacedStore {
    inner: InMemoryAllotmentStore,
    pause: Duration,
    create_calls: AtomicUsize,
}

impl PacedStore {
    pub fn new(pause: Duration) -> Self {
        Self {
            inner: InMemoryAllotmentStore::new(),
            pause,
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    /// Number of insert attempts, successful or not
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        tokio::task::yield_now().await;
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}

#[async_trait]
impl AllotmentStore for PacedStore {
    async fn create_if_absent(&self, record: &AllotmentRecord) -> AllotResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.create_if_absent(record).await
    }

    async fn get(&self, ipo_id: &IpoId) -> AllotResult<Option<AllotmentRecord>> {
        let found = self.inner.get(ipo_id).await;
        self.pause().await;
        found
    }

    async fn mark_published(&self, ipo_id: &IpoId) -> AllotResult<()> {
        self.inner.mark_published(ipo_id).await
    }

    async fn list_unpublished(&self) -> AllotResult<Vec<AllotmentRecord>> {
        self.inner.list_unpublished().await
    }
}

pub struct Harness {
    pub engine: Arc<AllotmentEngine>,
    pub directory: Arc<InMemoryApplicationDirectory>,
    pub store: Arc<PacedStore>,
    pub outcomes: UnboundedReceiver<AllotmentOutcome>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store_pause(Duration::ZERO)
    }

    /// Harness whose store suspends for `pause` on every read and insert
    pub fn with_store_pause(pause: Duration) -> Self {
        let directory = Arc::new(InMemoryApplicationDirectory::new());
        let store = Arc::new(PacedStore::new(pause));
        let (publisher, outcomes) = ChannelPublisher::new();

        let engine = Arc::new(AllotmentEngine::new(
            AllotmentEngineConfig::default(),
            directory.clone(),
            store.clone(),
            Arc::new(publisher),
        ));

        Self {
            engine,
            directory,
            store,
            outcomes,
        }
    }

    /// File an application with the directory
    pub fn file(&self, application_id: &str, ipo_id: &str, lots: u32) {
        self.directory.insert(
            ApplicationId::new(application_id),
            ApplicationSnapshot::new(
                InvestorId::new(format!("inv-{}", application_id)),
                IpoId::new(ipo_id),
                lots,
            ),
        );
    }

    /// Deliver an approval for an application
    pub async fn approve(&self, application_id: &str) {
        self.engine
            .handle_event(EligibilityEvent::MandateApproved {
                application_id: ApplicationId::new(application_id),
                mandate_id: MandateId::new(format!("m-{}", application_id)),
            })
            .await
            .unwrap();
    }

    /// File and approve in one step
    pub async fn admit(&self, application_id: &str, ipo_id: &str, lots: u32) {
        self.file(application_id, ipo_id, lots);
        self.approve(application_id).await;
    }

    /// Outcomes published so far
    pub fn drain_outcomes(&mut self) -> Vec<AllotmentOutcome> {
        let mut drained = Vec::new();
        while let Ok(outcome) = self.outcomes.try_recv() {
            drained.push(outcome);
        }
        drained
    }
}

pub fn app(id: &str) -> ApplicationId {
    ApplicationId::new(id)
}
